// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Kenwood HF protocol driver (Kenwood, Elecraft and friends).
//!
//! Commands are ASCII: a two-letter verb, zero or more fixed-width typed
//! fields, and a `;` terminator. The declarative table below states which
//! fields each command carries on set, on get, and in its answer; the
//! formatter and parser walk that table, so there is exactly one place
//! where a command's shape is spelled out.
//!
//! The rig is put in AI mode at init, so it volunteers an `IF` frame on
//! every front-panel change; those unsolicited frames keep the
//! [`IfSnapshot`] cache warm and most reads never touch the serial line.

use super::{Pacing, RigMode, Vfo};
use crate::io::{Framing, IoHandle, IoResponse, Port};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Field types a Kenwood command may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    /// Signed, zero-padded with explicit sign (`%+05d`).
    Int,
    /// Unsigned, zero-padded.
    Uint,
    /// Unsigned 64-bit, zero-padded (frequencies).
    Big,
    /// Left-justified space-padded string.
    Str,
}

/// One parameter slot: column width and type.
#[derive(Debug, Clone, Copy)]
struct ParamSpec {
    cols: usize,
    kind: FieldKind,
}

const P_SW: ParamSpec = ParamSpec { cols: 1, kind: FieldKind::Uint };
const P_MODE: ParamSpec = ParamSpec { cols: 1, kind: FieldKind::Uint };
const P_FUNCTION: ParamSpec = ParamSpec { cols: 1, kind: FieldKind::Uint };
const P_FREQUENCY: ParamSpec = ParamSpec { cols: 11, kind: FieldKind::Big };
const P_RIT_FREQUENCY: ParamSpec = ParamSpec { cols: 5, kind: FieldKind::Int };
const P_STEP_FREQUENCY: ParamSpec = ParamSpec { cols: 5, kind: FieldKind::Uint };
const P_MEMORY_CHANNEL: ParamSpec = ParamSpec { cols: 2, kind: FieldKind::Uint };
const P_MEMORY_BANK: ParamSpec = ParamSpec { cols: 1, kind: FieldKind::Uint };
const P_MEM_SPLIT_SPEC: ParamSpec = ParamSpec { cols: 1, kind: FieldKind::Uint };
const P_MEMORY_LOCKOUT: ParamSpec = ParamSpec { cols: 1, kind: FieldKind::Uint };
const P_TX_RX: ParamSpec = ParamSpec { cols: 1, kind: FieldKind::Uint };
const P_PASSBAND: ParamSpec = ParamSpec { cols: 2, kind: FieldKind::Uint };
const P_OFFSET: ParamSpec = ParamSpec { cols: 1, kind: FieldKind::Uint };
const P_TONE_FREQUENCY: ParamSpec = ParamSpec { cols: 2, kind: FieldKind::Uint };
const P_CALL_SIGN: ParamSpec = ParamSpec { cols: 6, kind: FieldKind::Str };
const P_MODEL_NO: ParamSpec = ParamSpec { cols: 3, kind: FieldKind::Uint };

/// Command identifiers. The discriminant doubles as the capability-bitset
/// index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KhfCmd {
    Ai,
    At1,
    Di,
    Dn,
    Up,
    Ds,
    Fa,
    Fb,
    Fn,
    Hd,
    Id,
    If,
    Lk,
    Lo,
    Mc,
    Md,
    Mr,
    Ms,
    Mw,
    Os,
    Rc,
    Rd,
    Ru,
    Rt,
    Rx,
    Tx,
    Sc,
    Sh,
    Sl,
    Sp,
    St,
    Tn,
    To,
    Vb,
    Vr,
    Xt,
}

impl KhfCmd {
    /// Bitset index.
    #[must_use]
    pub fn id(self) -> u8 {
        self as u8
    }
}

/// Number of commands in the dialect (and in [`COMMANDS`]).
const KHF_CMD_COUNT: usize = 36;

struct CmdSpec {
    cmd: KhfCmd,
    verb: &'static str,
    read_prefix: &'static str,
    set_params: &'static [ParamSpec],
    get_params: &'static [ParamSpec],
    answer_params: &'static [ParamSpec],
}

/// The `IF` answer layout, shared with the parser.
const IF_ANSWER: &[ParamSpec] = &[
    P_FREQUENCY,
    P_STEP_FREQUENCY,
    P_RIT_FREQUENCY,
    P_SW, // RIT on
    P_SW, // XIT on
    P_MEMORY_BANK,
    P_MEMORY_CHANNEL,
    P_TX_RX,
    P_MODE,
    P_FUNCTION,
    P_SW, // scan
    P_SW, // split
    P_SW, // tone
    P_TONE_FREQUENCY,
    P_OFFSET,
];

static COMMANDS: &[CmdSpec] = &[
    CmdSpec { cmd: KhfCmd::Ai, verb: "AI", read_prefix: "AI", set_params: &[P_SW], get_params: &[P_SW], answer_params: &[] },
    CmdSpec { cmd: KhfCmd::At1, verb: "AT1", read_prefix: "AT", set_params: &[], get_params: &[], answer_params: &[] },
    CmdSpec { cmd: KhfCmd::Di, verb: "DI", read_prefix: "DI", set_params: &[], get_params: &[], answer_params: &[P_CALL_SIGN, P_CALL_SIGN] },
    CmdSpec { cmd: KhfCmd::Dn, verb: "DN", read_prefix: "DN", set_params: &[], get_params: &[], answer_params: &[] },
    CmdSpec { cmd: KhfCmd::Up, verb: "UP", read_prefix: "UP", set_params: &[], get_params: &[], answer_params: &[] },
    CmdSpec { cmd: KhfCmd::Ds, verb: "DS", read_prefix: "DS", set_params: &[P_SW], get_params: &[], answer_params: &[P_SW] },
    CmdSpec { cmd: KhfCmd::Fa, verb: "FA", read_prefix: "FA", set_params: &[P_FREQUENCY], get_params: &[], answer_params: &[P_FREQUENCY] },
    CmdSpec { cmd: KhfCmd::Fb, verb: "FB", read_prefix: "FB", set_params: &[P_FREQUENCY], get_params: &[], answer_params: &[P_FREQUENCY] },
    CmdSpec { cmd: KhfCmd::Fn, verb: "FN", read_prefix: "FN", set_params: &[P_FUNCTION], get_params: &[], answer_params: &[] },
    CmdSpec { cmd: KhfCmd::Hd, verb: "HD", read_prefix: "HD", set_params: &[P_SW], get_params: &[], answer_params: &[P_SW] },
    CmdSpec { cmd: KhfCmd::Id, verb: "ID", read_prefix: "ID", set_params: &[], get_params: &[], answer_params: &[P_MODEL_NO] },
    CmdSpec { cmd: KhfCmd::If, verb: "IF", read_prefix: "IF", set_params: &[], get_params: &[], answer_params: IF_ANSWER },
    CmdSpec { cmd: KhfCmd::Lk, verb: "LK", read_prefix: "LK", set_params: &[P_SW], get_params: &[], answer_params: &[P_SW] },
    CmdSpec { cmd: KhfCmd::Lo, verb: "LO", read_prefix: "LO", set_params: &[], get_params: &[], answer_params: &[] },
    CmdSpec { cmd: KhfCmd::Mc, verb: "MC", read_prefix: "MC", set_params: &[P_MEMORY_BANK, P_MEMORY_CHANNEL], get_params: &[], answer_params: &[] },
    CmdSpec { cmd: KhfCmd::Md, verb: "MD", read_prefix: "MD", set_params: &[P_MODE], get_params: &[], answer_params: &[] },
    CmdSpec { cmd: KhfCmd::Mr, verb: "MR", read_prefix: "MR", set_params: &[], get_params: &[P_MEM_SPLIT_SPEC, P_MEMORY_BANK, P_MEMORY_CHANNEL], answer_params: &[P_MEM_SPLIT_SPEC, P_MEMORY_BANK, P_MEMORY_CHANNEL, P_FREQUENCY, P_MODE, P_MEMORY_LOCKOUT, P_SW, P_TONE_FREQUENCY, P_OFFSET] },
    CmdSpec { cmd: KhfCmd::Ms, verb: "MS", read_prefix: "MS", set_params: &[P_SW], get_params: &[], answer_params: &[P_SW] },
    CmdSpec { cmd: KhfCmd::Mw, verb: "MW", read_prefix: "MW", set_params: &[P_MEM_SPLIT_SPEC, P_MEMORY_BANK, P_MEMORY_CHANNEL, P_FREQUENCY, P_MODE, P_MEMORY_LOCKOUT, P_SW, P_TONE_FREQUENCY, P_OFFSET], get_params: &[], answer_params: &[] },
    CmdSpec { cmd: KhfCmd::Os, verb: "OS", read_prefix: "OS", set_params: &[P_TONE_FREQUENCY], get_params: &[], answer_params: &[] },
    CmdSpec { cmd: KhfCmd::Rc, verb: "RC", read_prefix: "RC", set_params: &[], get_params: &[], answer_params: &[] },
    CmdSpec { cmd: KhfCmd::Rd, verb: "RD", read_prefix: "RD", set_params: &[], get_params: &[], answer_params: &[] },
    CmdSpec { cmd: KhfCmd::Ru, verb: "RU", read_prefix: "RU", set_params: &[], get_params: &[], answer_params: &[] },
    CmdSpec { cmd: KhfCmd::Rt, verb: "RT", read_prefix: "RT", set_params: &[P_SW], get_params: &[], answer_params: &[] },
    CmdSpec { cmd: KhfCmd::Rx, verb: "RX", read_prefix: "RX", set_params: &[], get_params: &[], answer_params: &[] },
    CmdSpec { cmd: KhfCmd::Tx, verb: "TX", read_prefix: "TX", set_params: &[], get_params: &[], answer_params: &[] },
    CmdSpec { cmd: KhfCmd::Sc, verb: "SC", read_prefix: "SC", set_params: &[P_SW], get_params: &[], answer_params: &[] },
    CmdSpec { cmd: KhfCmd::Sh, verb: "SH", read_prefix: "SH", set_params: &[P_PASSBAND], get_params: &[], answer_params: &[P_PASSBAND] },
    CmdSpec { cmd: KhfCmd::Sl, verb: "SL", read_prefix: "SL", set_params: &[P_PASSBAND], get_params: &[], answer_params: &[P_PASSBAND] },
    CmdSpec { cmd: KhfCmd::Sp, verb: "SP", read_prefix: "SP", set_params: &[P_SW], get_params: &[], answer_params: &[] },
    CmdSpec { cmd: KhfCmd::St, verb: "ST", read_prefix: "ST", set_params: &[P_STEP_FREQUENCY], get_params: &[], answer_params: &[] },
    CmdSpec { cmd: KhfCmd::Tn, verb: "TN", read_prefix: "TN", set_params: &[P_TONE_FREQUENCY], get_params: &[], answer_params: &[] },
    CmdSpec { cmd: KhfCmd::To, verb: "TO", read_prefix: "TO", set_params: &[P_SW], get_params: &[], answer_params: &[] },
    CmdSpec { cmd: KhfCmd::Vb, verb: "VB", read_prefix: "VB", set_params: &[P_PASSBAND], get_params: &[], answer_params: &[P_PASSBAND] },
    CmdSpec { cmd: KhfCmd::Vr, verb: "VR", read_prefix: "VR", set_params: &[], get_params: &[], answer_params: &[] },
    CmdSpec { cmd: KhfCmd::Xt, verb: "XT", read_prefix: "XT", set_params: &[P_SW], get_params: &[], answer_params: &[] },
];

fn find_command(cmd: KhfCmd) -> &'static CmdSpec {
    COMMANDS
        .iter()
        .find(|c| c.cmd == cmd)
        .expect("command table covers every KhfCmd")
}

/// A typed argument for the command formatter. The argument list must
/// line up with the command's declared parameter slots.
#[derive(Debug, Clone, Copy)]
pub enum Field<'a> {
    Int(i32),
    Uint(u32),
    Big(u64),
    Str(&'a str),
}

fn format_command(spec: &CmdSpec, set: bool, args: &[Field<'_>]) -> Result<Vec<u8>> {
    let params = if set { spec.set_params } else { spec.get_params };
    if params.len() != args.len() {
        return Err(Error::Fatal(format!(
            "{}: {} arguments for {} parameter slots",
            spec.verb,
            args.len(),
            params.len()
        )));
    }
    let mut out = String::from(spec.verb);
    for (param, arg) in params.iter().zip(args) {
        match (param.kind, arg) {
            (FieldKind::Int, Field::Int(v)) => {
                out.push_str(&format!("{:+0width$}", v, width = param.cols));
            }
            (FieldKind::Uint, Field::Uint(v)) => {
                out.push_str(&format!("{:0width$}", v, width = param.cols));
            }
            (FieldKind::Big, Field::Big(v)) => {
                out.push_str(&format!("{:0width$}", v, width = param.cols));
            }
            (FieldKind::Str, Field::Str(v)) => {
                out.push_str(&format!("{:<width$.width$}", v, width = param.cols));
            }
            _ => {
                return Err(Error::Fatal(format!(
                    "{}: argument type does not match parameter slot",
                    spec.verb
                )));
            }
        }
    }
    out.push(';');
    Ok(out.into_bytes())
}

/// A parsed answer field.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Parsed {
    Int(i64),
    Str(String),
}

impl Parsed {
    fn as_i64(&self) -> i64 {
        match self {
            Parsed::Int(v) => *v,
            Parsed::Str(_) => 0,
        }
    }
}

/// Walk an answer's declared fields over the response body.
///
/// Radios space-pad unused numeric columns, so each field skips leading
/// spaces, consumes at most its declared width of token characters, and
/// advances past what it consumed. Fields beyond the end of a short
/// frame parse as zero.
fn parse_answer(spec: &CmdSpec, resp: &IoResponse) -> Result<Vec<Parsed>> {
    let text = resp.as_str();
    let body = text
        .strip_prefix(spec.verb)
        .ok_or_else(|| Error::Protocol(format!("expected {} answer, got {:?}", spec.verb, text)))?;
    let body = body.strip_suffix(';').unwrap_or(body);

    let mut out = Vec::with_capacity(spec.answer_params.len());
    let mut pos = 0usize;
    let bytes = body.as_bytes();
    for param in spec.answer_params {
        while pos < bytes.len() && bytes[pos] == b' ' {
            pos += 1;
        }
        let end = (pos + param.cols).min(bytes.len());
        let token = &body[pos..end];
        pos = end;
        let value = match param.kind {
            FieldKind::Str => Parsed::Str(token.trim_end().to_string()),
            FieldKind::Int | FieldKind::Uint | FieldKind::Big => {
                let trimmed = token.trim();
                if trimmed.is_empty() {
                    Parsed::Int(0)
                } else {
                    Parsed::Int(trimmed.parse::<i64>().map_err(|_| {
                        Error::Protocol(format!("{}: bad numeric field {:?}", spec.verb, token))
                    })?)
                }
            }
        };
        out.push(value);
    }
    Ok(out)
}

/// Kenwood switch values.
const SW_OFF: u32 = 0;
const SW_ON: u32 = 1;

/// Kenwood mode numbers.
const KHF_MODE_LSB: u32 = 1;
const KHF_MODE_USB: u32 = 2;
const KHF_MODE_CW: u32 = 3;
const KHF_MODE_FM: u32 = 4;
const KHF_MODE_AM: u32 = 5;
const KHF_MODE_FSK: u32 = 6;
const KHF_MODE_CWN: u32 = 7;

/// Kenwood function (dial) numbers.
const FUNCTION_VFO_A: u32 = 0;
const FUNCTION_VFO_B: u32 = 1;
const FUNCTION_MEMORY: u32 = 2;
const FUNCTION_COM: u32 = 3;

fn mode_to_khf(mode: RigMode) -> Option<u32> {
    match mode {
        RigMode::Lsb => Some(KHF_MODE_LSB),
        RigMode::Usb => Some(KHF_MODE_USB),
        RigMode::Cw => Some(KHF_MODE_CW),
        RigMode::Fm => Some(KHF_MODE_FM),
        RigMode::Am => Some(KHF_MODE_AM),
        RigMode::Fsk => Some(KHF_MODE_FSK),
        RigMode::Cwn => Some(KHF_MODE_CWN),
        _ => None,
    }
}

fn khf_to_mode(mode: u32) -> RigMode {
    match mode {
        KHF_MODE_LSB => RigMode::Lsb,
        KHF_MODE_USB => RigMode::Usb,
        KHF_MODE_CW => RigMode::Cw,
        KHF_MODE_FM => RigMode::Fm,
        KHF_MODE_AM => RigMode::Am,
        KHF_MODE_FSK => RigMode::Fsk,
        KHF_MODE_CWN => RigMode::Cwn,
        _ => RigMode::Unknown,
    }
}

/// Everything the rig reported in its last `IF` answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IfSnapshot {
    pub freq: u64,
    pub step: u32,
    pub rit: i32,
    pub rit_on: bool,
    pub xit_on: bool,
    pub bank: u32,
    pub channel: u32,
    pub tx: bool,
    pub mode: u32,
    pub function: u32,
    pub scan: bool,
    pub split: bool,
    pub tone: bool,
    pub tone_freq: u32,
    pub offset: u32,
}

/// Parse an `IF` answer into a snapshot.
pub fn parse_if(resp: &IoResponse) -> Result<IfSnapshot> {
    let spec = find_command(KhfCmd::If);
    let fields = parse_answer(spec, resp)?;
    if fields.len() != IF_ANSWER.len() {
        return Err(Error::Protocol("short IF answer".into()));
    }
    Ok(IfSnapshot {
        freq: fields[0].as_i64() as u64,
        step: fields[1].as_i64() as u32,
        rit: fields[2].as_i64() as i32,
        rit_on: fields[3].as_i64() != 0,
        xit_on: fields[4].as_i64() != 0,
        bank: fields[5].as_i64() as u32,
        channel: fields[6].as_i64() as u32,
        tx: fields[7].as_i64() != 0,
        mode: fields[8].as_i64() as u32,
        function: fields[9].as_i64() as u32,
        scan: fields[10].as_i64() != 0,
        split: fields[11].as_i64() != 0,
        tone: fields[12].as_i64() != 0,
        tone_freq: fields[13].as_i64() as u32,
        offset: fields[14].as_i64() as u32,
    })
}

#[derive(Default)]
struct IfCache {
    last_if: IfSnapshot,
    /// `None` forces the next read to query the rig.
    last_tick: Option<Instant>,
}

/// Shared between the driver and the reader thread's async sink.
pub(crate) struct CacheCell {
    cache: Mutex<IfCache>,
}

impl CacheCell {
    fn store(&self, snapshot: IfSnapshot) {
        let mut cache = self.cache.lock();
        cache.last_if = snapshot;
        cache.last_tick = Some(Instant::now());
    }

    fn invalidate(&self) {
        self.cache.lock().last_tick = None;
    }

    fn fresh(&self, lifetime: Duration) -> Option<IfSnapshot> {
        let cache = self.cache.lock();
        match cache.last_tick {
            Some(tick) if tick.elapsed() < lifetime => Some(cache.last_if.clone()),
            _ => None,
        }
    }
}

/// Per-rig protocol timeouts.
#[derive(Debug, Clone, Copy)]
pub struct KhfTimeouts {
    /// Max wait for a response to begin, ms.
    pub response_timeout: u32,
    /// Max wait between characters of a response, ms.
    pub char_timeout: u32,
    /// Max wait while sending, ms.
    pub send_timeout: u32,
    /// How long a cached IF answer stays valid, ms.
    pub if_lifetime: u64,
    /// Minimum gap between commands, ms.
    pub inter_cmd_delay: u64,
}

impl Default for KhfTimeouts {
    fn default() -> Self {
        KhfTimeouts {
            response_timeout: 1_000,
            char_timeout: 50,
            send_timeout: 500,
            if_lifetime: 1_000,
            inter_cmd_delay: 0,
        }
    }
}

/// Kenwood HF driver instance.
pub struct KenwoodHf {
    io: IoHandle,
    timeouts: KhfTimeouts,
    if_lifetime: Duration,
    pacing: Pacing,
    /// One-shot extra delays applied after specific set commands.
    set_cmd_delays: [u64; KHF_CMD_COUNT],
    set_cmds: super::CommandSet,
    read_cmds: super::CommandSet,
    cache: Arc<CacheCell>,
}

impl KenwoodHf {
    /// Start the driver over `port`. The reader thread parses unsolicited
    /// `IF` frames (AI mode) straight into the cache.
    #[must_use]
    pub fn start(
        port: Arc<dyn Port>,
        timeouts: KhfTimeouts,
        set_cmds: super::CommandSet,
        read_cmds: super::CommandSet,
    ) -> Self {
        let cache = Arc::new(CacheCell {
            cache: Mutex::new(IfCache::default()),
        });
        let sink_cache = Arc::clone(&cache);
        let io = IoHandle::start(
            port,
            Framing::Terminated(b';'),
            timeouts.response_timeout,
            timeouts.char_timeout,
            Box::new(move |resp| {
                if resp.0.starts_with(b"IF") {
                    match parse_if(&resp) {
                        Ok(snapshot) => sink_cache.store(snapshot),
                        Err(e) => log::debug!("ignoring bad unsolicited IF: {}", e),
                    }
                }
            }),
        );
        KenwoodHf {
            io,
            timeouts,
            if_lifetime: Duration::from_millis(timeouts.if_lifetime),
            pacing: Pacing::new(timeouts.inter_cmd_delay),
            set_cmd_delays: [0; KHF_CMD_COUNT],
            set_cmds,
            read_cmds,
            cache,
        }
    }

    /// Extra one-shot delay queued after each listed set command, ms.
    pub fn set_cmd_delay(&mut self, cmd: KhfCmd, delay_ms: u64) {
        let idx = COMMANDS
            .iter()
            .position(|c| c.cmd == cmd)
            .expect("command table covers every KhfCmd");
        self.set_cmd_delays[idx] = delay_ms;
    }

    /// Format and send a set command; no response is awaited (AI-mode
    /// echoes arrive on the async path).
    fn set(&self, cmd: KhfCmd, args: &[Field<'_>]) -> Result<()> {
        if !self.set_cmds.contains(cmd.id()) {
            return Err(Error::NotSupported);
        }
        let spec = find_command(cmd);
        let bytes = format_command(spec, true, args)?;
        self.pacing.before_send();
        self.io
            .write(&bytes, self.timeouts.char_timeout)
            .map_err(|_| Error::NoDevice)?;
        let idx = COMMANDS.iter().position(|c| c.cmd == cmd).unwrap_or(0);
        if self.set_cmd_delays[idx] > 0 {
            self.pacing.add_delay(self.set_cmd_delays[idx]);
        }
        Ok(())
    }

    /// Format a get command, send it, and wait for the matching answer.
    fn get(&self, cmd: KhfCmd, args: &[Field<'_>]) -> Result<IoResponse> {
        if !self.read_cmds.contains(cmd.id()) {
            return Err(Error::NotSupported);
        }
        let spec = find_command(cmd);
        let bytes = format_command(spec, false, args)?;
        self.pacing.before_send();
        self.io.transact(
            &bytes,
            spec.read_prefix.as_bytes(),
            0,
            self.timeouts.char_timeout,
        )
    }

    /// Current IF snapshot, from cache when fresh, otherwise queried.
    /// Any failure zeroes the cache so the next read re-queries.
    fn update_if(&self) -> Result<IfSnapshot> {
        if let Some(snapshot) = self.cache.fresh(self.if_lifetime) {
            return Ok(snapshot);
        }
        let resp = self.get(KhfCmd::If, &[]).map_err(|e| {
            self.cache.invalidate();
            e
        })?;
        let snapshot = parse_if(&resp).map_err(|e| {
            self.cache.invalidate();
            e
        })?;
        self.cache.store(snapshot.clone());
        Ok(snapshot)
    }

    fn mutate_cache(&self, f: impl FnOnce(&mut IfSnapshot)) {
        let mut cache = self.cache.cache.lock();
        f(&mut cache.last_if);
    }

    /// Synchronize, take the front panel, enable AI mode, prime the cache.
    pub fn init(&self) -> Result<()> {
        // The first IF may fail while the rig wakes up.
        let _ = self.get(KhfCmd::If, &[]);
        self.set(KhfCmd::Lk, &[Field::Uint(SW_OFF)])?;
        self.set(KhfCmd::Ai, &[Field::Uint(SW_ON)])?;
        self.update_if().map(|_| ())
    }

    fn disable_rit_xit(&self, xit: bool) -> Result<()> {
        self.set(
            if xit { KhfCmd::Xt } else { KhfCmd::Rt },
            &[Field::Uint(SW_OFF)],
        )?;
        self.mutate_cache(|s| {
            if xit {
                s.xit_on = false;
            } else {
                s.rit_on = false;
            }
        });
        Ok(())
    }

    fn freq_cmd_for(function: u32) -> Result<KhfCmd> {
        match function {
            FUNCTION_VFO_A => Ok(KhfCmd::Fa),
            FUNCTION_VFO_B => Ok(KhfCmd::Fb),
            _ => Err(Error::InvalidArgument(
                "frequency is not settable in memory/COM mode".into(),
            )),
        }
    }

    pub fn set_frequency(&self, vfo: Option<Vfo>, freq: u64) -> Result<()> {
        // Snapshot under the cache lock, act outside it.
        let (cmd, split, rit_on, xit_on) = match vfo {
            None => {
                let snapshot = self.update_if()?;
                (
                    Self::freq_cmd_for(snapshot.function)?,
                    snapshot.split,
                    snapshot.rit_on,
                    snapshot.xit_on,
                )
            }
            Some(Vfo::A) => (KhfCmd::Fa, false, false, false),
            Some(Vfo::B) => (KhfCmd::Fb, false, false, false),
            Some(_) => {
                return Err(Error::InvalidArgument(
                    "frequency is settable on VFO A/B only".into(),
                ))
            }
        };
        self.set(cmd, &[Field::Big(freq)])?;
        self.mutate_cache(|s| s.freq = freq);
        if split {
            self.set(KhfCmd::Sp, &[Field::Uint(SW_OFF)])?;
            self.mutate_cache(|s| s.split = false);
        }
        if rit_on {
            self.disable_rit_xit(false)?;
        }
        if xit_on {
            self.disable_rit_xit(true)?;
        }
        Ok(())
    }

    pub fn set_split_frequency(&self, freq_rx: u64, freq_tx: u64) -> Result<()> {
        let snapshot = self.update_if()?;
        let (rx_cmd, tx_cmd) = match snapshot.function {
            FUNCTION_VFO_A => (KhfCmd::Fa, KhfCmd::Fb),
            FUNCTION_VFO_B => (KhfCmd::Fb, KhfCmd::Fa),
            _ => {
                return Err(Error::InvalidArgument(
                    "split requires a VFO function".into(),
                ))
            }
        };
        self.set(rx_cmd, &[Field::Big(freq_rx)])?;
        self.mutate_cache(|s| s.freq = freq_rx);
        self.set(tx_cmd, &[Field::Big(freq_tx)])?;
        // RIT and XIT would bias one side of the split.
        if snapshot.rit_on {
            self.disable_rit_xit(false)?;
        }
        if snapshot.xit_on {
            self.disable_rit_xit(true)?;
        }
        if !snapshot.split {
            self.set(KhfCmd::Sp, &[Field::Uint(SW_ON)])?;
            self.mutate_cache(|s| s.split = true);
        }
        Ok(())
    }

    pub fn get_frequency(&self, vfo: Option<Vfo>) -> Result<u64> {
        match vfo {
            None => Ok(self.update_if()?.freq),
            Some(Vfo::A) | Some(Vfo::B) => {
                let cmd = if vfo == Some(Vfo::A) {
                    KhfCmd::Fa
                } else {
                    KhfCmd::Fb
                };
                let resp = self.get(cmd, &[])?;
                let fields = parse_answer(find_command(cmd), &resp)?;
                Ok(fields
                    .first()
                    .map(|f| f.as_i64() as u64)
                    .unwrap_or_default())
            }
            Some(_) => Err(Error::InvalidArgument(
                "frequency is readable on VFO A/B only".into(),
            )),
        }
    }

    pub fn get_split_frequency(&self) -> Result<(u64, u64)> {
        let snapshot = self.update_if()?;
        if !snapshot.split && snapshot.rit_on == snapshot.xit_on {
            return Err(Error::InvalidArgument("rig is not operating split".into()));
        }
        let (rx_cmd, tx_cmd) = match snapshot.function {
            FUNCTION_VFO_A => (KhfCmd::Fa, KhfCmd::Fb),
            FUNCTION_VFO_B => (KhfCmd::Fb, KhfCmd::Fa),
            _ => {
                return Err(Error::InvalidArgument(
                    "split requires a VFO function".into(),
                ))
            }
        };
        let rx_resp = self.get(rx_cmd, &[])?;
        let mut rx = parse_answer(find_command(rx_cmd), &rx_resp)?
            .first()
            .map(|f| f.as_i64())
            .unwrap_or_default();
        let tx_resp = self.get(tx_cmd, &[])?;
        let mut tx = parse_answer(find_command(tx_cmd), &tx_resp)?
            .first()
            .map(|f| f.as_i64())
            .unwrap_or_default();
        // Incremental tuning offsets the side it is enabled for.
        if snapshot.rit_on {
            rx += i64::from(snapshot.rit);
        }
        if snapshot.xit_on {
            tx += i64::from(snapshot.rit);
        }
        Ok((rx.max(0) as u64, tx.max(0) as u64))
    }

    pub fn set_mode(&self, mode: RigMode) -> Result<()> {
        let khf_mode = mode_to_khf(mode)
            .ok_or_else(|| Error::InvalidArgument(format!("mode {:?} unsupported", mode)))?;
        self.set(KhfCmd::Md, &[Field::Uint(khf_mode)])?;
        self.mutate_cache(|s| s.mode = khf_mode);
        Ok(())
    }

    pub fn get_mode(&self) -> RigMode {
        match self.update_if() {
            Ok(snapshot) => khf_to_mode(snapshot.mode),
            Err(_) => RigMode::Unknown,
        }
    }

    pub fn set_vfo(&self, vfo: Vfo) -> Result<()> {
        let function = match vfo {
            Vfo::A => FUNCTION_VFO_A,
            Vfo::B => FUNCTION_VFO_B,
            Vfo::Memory => FUNCTION_MEMORY,
            Vfo::Com => FUNCTION_COM,
            _ => return Err(Error::InvalidArgument("no such Kenwood function".into())),
        };
        self.set(KhfCmd::Fn, &[Field::Uint(function)])?;
        // A function change can move frequency, mode, anything: force the
        // next read to ask the rig.
        self.cache.invalidate();
        Ok(())
    }

    pub fn get_vfo(&self) -> Result<Vfo> {
        let snapshot = self.update_if()?;
        match snapshot.function {
            FUNCTION_VFO_A => Ok(Vfo::A),
            FUNCTION_VFO_B => Ok(Vfo::B),
            FUNCTION_MEMORY => Ok(Vfo::Memory),
            FUNCTION_COM => Ok(Vfo::Com),
            other => Err(Error::Protocol(format!("unknown function {}", other))),
        }
    }

    pub fn set_ptt(&self, tx: bool) -> Result<()> {
        self.set(if tx { KhfCmd::Tx } else { KhfCmd::Rx }, &[])?;
        // Keying can move more than the TX flag; drop the cache.
        self.cache.invalidate();
        Ok(())
    }

    pub fn get_ptt(&self) -> Result<bool> {
        Ok(self.update_if()?.tx)
    }

    /// Hand the front panel back and stop the reader thread.
    pub fn close(&mut self) -> Result<()> {
        // Most rigs reject LO; that is fine.
        let _ = self.set(KhfCmd::Lo, &[]);
        let _ = self.set(KhfCmd::Lk, &[Field::Uint(SW_OFF)]);
        let _ = self.set(KhfCmd::Ai, &[Field::Uint(SW_OFF)]);
        self.io.stop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::testutil::MockPort;
    use crate::rig::CommandSet;

    fn all_cmds() -> CommandSet {
        CommandSet::of(&(0..COMMANDS.len() as u8).collect::<Vec<_>>())
    }

    fn driver(port: Arc<MockPort>) -> KenwoodHf {
        let timeouts = KhfTimeouts {
            response_timeout: 100,
            char_timeout: 50,
            if_lifetime: 1_000,
            ..KhfTimeouts::default()
        };
        KenwoodHf::start(port, timeouts, all_cmds(), all_cmds())
    }

    #[test]
    fn command_table_is_complete() {
        assert_eq!(COMMANDS.len(), KHF_CMD_COUNT);
        // Every command id maps back to its own table row.
        for spec in COMMANDS {
            assert_eq!(find_command(spec.cmd).verb, spec.verb);
        }
    }

    #[test]
    fn formats_set_frequency_command() {
        let spec = find_command(KhfCmd::Fa);
        let bytes = format_command(spec, true, &[Field::Big(14_250_000)]).unwrap();
        assert_eq!(bytes, b"FA00014250000;");
    }

    #[test]
    fn formats_signed_and_string_fields() {
        let spec = find_command(KhfCmd::Ai);
        assert_eq!(format_command(spec, true, &[Field::Uint(1)]).unwrap(), b"AI1;");
        let spec = find_command(KhfCmd::Mc);
        assert_eq!(
            format_command(spec, true, &[Field::Uint(1), Field::Uint(7)]).unwrap(),
            b"MC107;"
        );
    }

    #[test]
    fn arity_mismatch_is_refused() {
        let spec = find_command(KhfCmd::Fa);
        assert!(format_command(spec, true, &[]).is_err());
        assert!(format_command(spec, true, &[Field::Uint(1)]).is_err());
    }

    #[test]
    fn parses_reference_if_frame() {
        // TS-140-style frame with a blank step field and a short tail.
        let resp = IoResponse(b"IF00014250000     +00000000000000010000;".to_vec());
        let snapshot = parse_if(&resp).unwrap();
        assert_eq!(snapshot.freq, 14_250_000);
        assert_eq!(snapshot.step, 0);
        assert_eq!(snapshot.rit, 0);
        assert!(!snapshot.rit_on);
        assert!(!snapshot.xit_on);
        assert_eq!(snapshot.mode, 1);
        assert_eq!(snapshot.function, 0);
        assert!(!snapshot.split);
        assert!(!snapshot.tx);
    }

    #[test]
    fn parses_fully_populated_if_frame() {
        let frame = concat!(
            "IF",
            "00007050500", // frequency
            "00010",       // step
            "-0012",       // rit
            "1",           // rit on
            "0",           // xit on
            "0",           // bank
            "05",          // channel
            "0",           // rx
            "2",           // mode: USB
            "1",           // function: VFO B
            "0",           // scan
            "1",           // split
            "1",           // tone
            "08",          // tone freq
            "2",           // offset
            ";"
        );
        let snapshot = parse_if(&IoResponse(frame.as_bytes().to_vec())).unwrap();
        assert_eq!(snapshot.freq, 7_050_500);
        assert_eq!(snapshot.step, 10);
        assert_eq!(snapshot.rit, -12);
        assert!(snapshot.rit_on);
        assert!(!snapshot.xit_on);
        assert_eq!(snapshot.channel, 5);
        assert_eq!(snapshot.mode, 2);
        assert_eq!(snapshot.function, 1);
        assert!(snapshot.split);
        assert!(snapshot.tone);
        assert_eq!(snapshot.tone_freq, 8);
        assert_eq!(snapshot.offset, 2);
    }

    #[test]
    fn non_if_answer_is_rejected() {
        let resp = IoResponse(b"FA00014250000;".to_vec());
        assert!(parse_if(&resp).is_err());
    }

    #[test]
    fn set_frequency_emits_fa_on_vfo_a() {
        let port = MockPort::new();
        port.on_write(b"IF;", b"IF00014000000     +00000000000000000000;");
        let drv = driver(port.clone());
        drv.set_frequency(None, 14_250_000).unwrap();
        let writes = port.writes();
        assert_eq!(writes[0], b"IF;");
        assert_eq!(writes[1], b"FA00014250000;");
    }

    #[test]
    fn cache_coherence_within_lifetime() {
        let port = MockPort::new();
        port.on_write(b"IF;", b"IF00014250000     +00000000000000000000;");
        let drv = driver(port.clone());
        let f1 = drv.get_frequency(None).unwrap();
        let writes_after_first = port.write_count();
        let f2 = drv.get_frequency(None).unwrap();
        assert_eq!(f1, 14_250_000);
        assert_eq!(f2, 14_250_000);
        // The second read came from cache: no extra serial traffic.
        assert_eq!(port.write_count(), writes_after_first);
    }

    #[test]
    fn ptt_toggle_invalidates_cache() {
        let port = MockPort::new();
        port.on_write(b"IF;", b"IF00014250000     +00000000000000000000;");
        let drv = driver(port.clone());
        drv.get_frequency(None).unwrap();
        let before = port.write_count();
        drv.set_ptt(true).unwrap();
        drv.get_frequency(None).unwrap();
        // TX; plus a fresh IF; query.
        assert_eq!(port.write_count(), before + 2);
        assert_eq!(port.writes()[before], b"TX;");
    }

    #[test]
    fn unsolicited_if_updates_cache_without_traffic() {
        let port = MockPort::new();
        let drv = driver(port.clone());
        port.push_unsolicited(b"IF00021070000     +00000000000000000000;");
        // Let the reader route the frame to the sink.
        std::thread::sleep(std::time::Duration::from_millis(30));
        let before = port.write_count();
        assert_eq!(drv.get_frequency(None).unwrap(), 21_070_000);
        assert_eq!(port.write_count(), before);
    }

    #[test]
    fn split_sequence_writes_both_vfos_and_sp() {
        let port = MockPort::new();
        port.on_write(b"IF;", b"IF00014200000     +00000000000000000000;");
        let drv = driver(port.clone());
        drv.set_split_frequency(14_200_000, 14_210_000).unwrap();
        let writes = port.writes();
        let tail: Vec<&[u8]> = writes.iter().skip(1).map(|w| w.as_slice()).collect();
        assert_eq!(tail, vec![
            b"FA00014200000;".as_slice(),
            b"FB00014210000;".as_slice(),
            b"SP1;".as_slice(),
        ]);
    }

    #[test]
    fn unsupported_command_is_refused() {
        let port = MockPort::new();
        let timeouts = KhfTimeouts {
            response_timeout: 50,
            ..KhfTimeouts::default()
        };
        let drv = KenwoodHf::start(
            port,
            timeouts,
            CommandSet::of(&[KhfCmd::Fa.id()]),
            CommandSet::of(&[]),
        );
        assert!(matches!(drv.set_mode(RigMode::Usb), Err(Error::NotSupported)));
    }
}
