// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Yaesu binary CAT protocol driver (FT-736R generation).
//!
//! Every command is five bytes with the opcode last; the four parameter
//! bytes are little BCD, big BCD (top nibble may be hex a-f for two
//! leading decimal digits), fixed-width ASCII, or raw enumerations.
//! The rig never echoes, so set commands are fire-and-forget and state
//! (frequency, split offset, duplex programming, mode, PTT) is tracked
//! locally; only the squelch and s-meter tests read a response byte.

use super::{Pacing, RigMode, Vfo};
use crate::io::{Framing, IoHandle, IoResponse, Port};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Parameter encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum YbcKind {
    Bcd,
    /// BCD whose top nibble may be hex a-f, carrying 10-15 decimal.
    BigBcd,
    Ascii,
    /// One nibble folded into the tone-memory slot.
    ToneMem,
}

#[derive(Debug, Clone, Copy)]
struct YbcParamSpec {
    nybbles: usize,
    kind: YbcKind,
}

const P_FREQUENCY: YbcParamSpec = YbcParamSpec { nybbles: 8, kind: YbcKind::BigBcd };
const P_MODE: YbcParamSpec = YbcParamSpec { nybbles: 2, kind: YbcKind::Bcd };
const P_CTCSS_CODE: YbcParamSpec = YbcParamSpec { nybbles: 2, kind: YbcKind::Bcd };
const P_CALLSIGN: YbcParamSpec = YbcParamSpec { nybbles: 16, kind: YbcKind::Ascii };
const P_GROUP_CODE: YbcParamSpec = YbcParamSpec { nybbles: 5, kind: YbcKind::Bcd };
const P_TONE_MEM: YbcParamSpec = YbcParamSpec { nybbles: 1, kind: YbcKind::ToneMem };

/// Command identifiers; the discriminant is the capability-bitset index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum YbcCmd {
    CatOn,
    CatOff,
    Frequency,
    Mode,
    Tx,
    Rx,
    SplitPlus,
    SplitMinus,
    SplitOff,
    SplitOffset,
    CtcssEncDec,
    CtcssEnc,
    CtcssOff,
    CtcssToneCode,
    FullDuplexOn,
    FullDuplexOff,
    FullDuplexRxMode,
    FullDuplexTxMode,
    FullDuplexRxFreq,
    FullDuplexTxFreq,
    AqsOn,
    AqsOff,
    IdCallsignSet,
    GroupCodeSet,
    CallsignMemSet,
    CacOn,
    ControlFreqSet,
    CommFreqSet,
    AqsReset,
    DigitalSquelchOn,
    DigitalSquelchOff,
    TestSquelch,
    TestSMeter,
}

impl YbcCmd {
    /// Bitset index.
    #[must_use]
    pub fn id(self) -> u8 {
        self as u8
    }
}

struct YbcCmdSpec {
    cmd: YbcCmd,
    opcode: u8,
    params: &'static [YbcParamSpec],
    answer_bytes: usize,
}

static COMMANDS: &[YbcCmdSpec] = &[
    YbcCmdSpec { cmd: YbcCmd::CatOn, opcode: 0x00, params: &[], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::CatOff, opcode: 0x80, params: &[], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::Frequency, opcode: 0x01, params: &[P_FREQUENCY], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::Mode, opcode: 0x07, params: &[P_MODE], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::Tx, opcode: 0x08, params: &[], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::Rx, opcode: 0x88, params: &[], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::SplitPlus, opcode: 0x49, params: &[], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::SplitMinus, opcode: 0x09, params: &[], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::SplitOff, opcode: 0x89, params: &[], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::SplitOffset, opcode: 0xF9, params: &[P_FREQUENCY], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::CtcssEncDec, opcode: 0x0A, params: &[], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::CtcssEnc, opcode: 0x4A, params: &[], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::CtcssOff, opcode: 0x8A, params: &[], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::CtcssToneCode, opcode: 0xFA, params: &[P_CTCSS_CODE], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::FullDuplexOn, opcode: 0x0E, params: &[], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::FullDuplexOff, opcode: 0x8E, params: &[], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::FullDuplexRxMode, opcode: 0x17, params: &[P_MODE], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::FullDuplexTxMode, opcode: 0x27, params: &[P_MODE], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::FullDuplexRxFreq, opcode: 0x1E, params: &[P_FREQUENCY], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::FullDuplexTxFreq, opcode: 0x2E, params: &[P_FREQUENCY], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::AqsOn, opcode: 0x0B, params: &[], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::AqsOff, opcode: 0x8B, params: &[], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::IdCallsignSet, opcode: 0x05, params: &[P_CALLSIGN], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::GroupCodeSet, opcode: 0x04, params: &[P_GROUP_CODE, P_TONE_MEM], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::CallsignMemSet, opcode: 0x05, params: &[P_CALLSIGN, P_TONE_MEM], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::CacOn, opcode: 0x0D, params: &[], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::ControlFreqSet, opcode: 0x02, params: &[P_FREQUENCY], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::CommFreqSet, opcode: 0x03, params: &[P_FREQUENCY], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::AqsReset, opcode: 0x8D, params: &[], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::DigitalSquelchOn, opcode: 0x0C, params: &[], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::DigitalSquelchOff, opcode: 0x8C, params: &[], answer_bytes: 0 },
    YbcCmdSpec { cmd: YbcCmd::TestSquelch, opcode: 0xE7, params: &[], answer_bytes: 1 },
    YbcCmdSpec { cmd: YbcCmd::TestSMeter, opcode: 0xF7, params: &[], answer_bytes: 1 },
];

fn find_command(cmd: YbcCmd) -> &'static YbcCmdSpec {
    COMMANDS
        .iter()
        .find(|c| c.cmd == cmd)
        .expect("command table covers every YbcCmd")
}

/// Argument for the frame builder.
#[derive(Debug, Clone, Copy)]
pub enum YbcField<'a> {
    Num(u64),
    Str(&'a str),
}

/// Pack `val` into `nybbles` BCD digits, most significant first. In big
/// mode the leading nibble keeps values 10-15 as hex.
fn fill_bcd(buf: &mut [u8], offset: usize, nybbles: usize, big: bool, mut val: u64) -> usize {
    for i in (1..=nybbles).rev() {
        let b = offset + (i - 1) / 2;
        let ch = if i == 1 && big {
            (val & 0x0f) as u8
        } else {
            (val % 10) as u8
        };
        val /= 10;
        if i % 2 == 1 {
            buf[b] = (buf[b] & 0x0f) | (ch << 4);
        } else {
            buf[b] = (buf[b] & 0xf0) | ch;
        }
    }
    nybbles / 2
}

/// Build the five-byte frame for a command.
fn format_command(spec: &YbcCmdSpec, args: &[YbcField<'_>]) -> Result<[u8; 5]> {
    if spec.params.len() != args.len() {
        return Err(Error::Fatal(format!(
            "opcode {:#04x}: {} arguments for {} parameter slots",
            spec.opcode,
            args.len(),
            spec.params.len()
        )));
    }
    let mut frame = [0u8; 5];
    frame[4] = spec.opcode;
    let mut len = 0usize;
    for (param, arg) in spec.params.iter().zip(args) {
        match (param.kind, arg) {
            (YbcKind::Bcd, YbcField::Num(v)) => {
                len += fill_bcd(&mut frame, len, param.nybbles, false, *v);
            }
            (YbcKind::BigBcd, YbcField::Num(v)) => {
                len += fill_bcd(&mut frame, len, param.nybbles, true, *v);
            }
            (YbcKind::Ascii, YbcField::Str(s)) => {
                let mut chars = s.bytes();
                for _ in (0..param.nybbles).step_by(2) {
                    if len >= 4 {
                        break;
                    }
                    frame[len] = chars.next().unwrap_or(b' ');
                    len += 1;
                }
            }
            (YbcKind::ToneMem, YbcField::Num(v)) => {
                // High nibble of the opcode selects the memory slot.
                frame[4] |= ((*v as u8) & 0x0f) << 4;
            }
            _ => {
                return Err(Error::Fatal(format!(
                    "opcode {:#04x}: argument type does not match parameter slot",
                    spec.opcode
                )));
            }
        }
    }
    Ok(frame)
}

/// The FT-736R tunes in 10 Hz steps; round to the nearest.
fn round_freq(freq: u64) -> u64 {
    let freq = freq + 5;
    freq - (freq % 10)
}

#[derive(Debug, Default)]
struct YbcState {
    freq: u64,
    /// Nonzero when split is programmed; tx = freq + offset.
    split_offset: i64,
    duplex_rx: u64,
    duplex_tx: u64,
    duplex_rx_mode: u32,
    duplex_tx_mode: u32,
    mode: u32,
    ptt: bool,
}

/// Yaesu mode bytes.
const YBC_MODE_LSB: u32 = 0x00;
const YBC_MODE_USB: u32 = 0x01;
const YBC_MODE_CW: u32 = 0x02;
const YBC_MODE_FM: u32 = 0x08;
const YBC_MODE_CWN: u32 = 0x82;
const YBC_MODE_FMN: u32 = 0x88;

fn mode_to_ybc(mode: RigMode) -> Option<u32> {
    match mode {
        RigMode::Cw => Some(YBC_MODE_CW),
        RigMode::Cwn => Some(YBC_MODE_CWN),
        RigMode::Fm => Some(YBC_MODE_FM),
        RigMode::Fmn => Some(YBC_MODE_FMN),
        RigMode::Lsb => Some(YBC_MODE_LSB),
        RigMode::Usb => Some(YBC_MODE_USB),
        _ => None,
    }
}

fn ybc_to_mode(mode: u32) -> RigMode {
    match mode {
        YBC_MODE_CW => RigMode::Cw,
        YBC_MODE_CWN => RigMode::Cwn,
        YBC_MODE_FM => RigMode::Fm,
        YBC_MODE_FMN => RigMode::Fmn,
        YBC_MODE_LSB => RigMode::Lsb,
        YBC_MODE_USB => RigMode::Usb,
        _ => RigMode::Unknown,
    }
}

/// Per-rig protocol timeouts.
#[derive(Debug, Clone, Copy)]
pub struct YbcTimeouts {
    pub response_timeout: u32,
    pub char_timeout: u32,
    pub send_timeout: u32,
    pub inter_cmd_delay: u64,
}

impl Default for YbcTimeouts {
    fn default() -> Self {
        YbcTimeouts {
            response_timeout: 1_000,
            char_timeout: 50,
            send_timeout: 500,
            inter_cmd_delay: 0,
        }
    }
}

/// Yaesu binary CAT driver instance.
pub struct YaesuBinCat {
    io: IoHandle,
    timeouts: YbcTimeouts,
    pacing: Pacing,
    set_cmds: super::CommandSet,
    read_cmds: super::CommandSet,
    state: Mutex<YbcState>,
}

impl YaesuBinCat {
    /// Start the driver over `port`.
    #[must_use]
    pub fn start(
        port: Arc<dyn Port>,
        timeouts: YbcTimeouts,
        set_cmds: super::CommandSet,
        read_cmds: super::CommandSet,
    ) -> Self {
        let io = IoHandle::start(
            port,
            Framing::Fixed(5),
            timeouts.response_timeout,
            timeouts.char_timeout,
            // Nothing useful arrives unsolicited on this family.
            Box::new(|_| {}),
        );
        YaesuBinCat {
            io,
            timeouts,
            pacing: Pacing::new(timeouts.inter_cmd_delay),
            set_cmds,
            read_cmds,
            state: Mutex::new(YbcState::default()),
        }
    }

    fn set(&self, cmd: YbcCmd, args: &[YbcField<'_>]) -> Result<()> {
        if !self.set_cmds.contains(cmd.id()) {
            return Err(Error::NotSupported);
        }
        let frame = format_command(find_command(cmd), args)?;
        self.pacing.before_send();
        self.io
            .write(&frame, self.timeouts.char_timeout)
            .map_err(|_| Error::NoDevice)
    }

    fn get(&self, cmd: YbcCmd) -> Result<IoResponse> {
        if !self.read_cmds.contains(cmd.id()) {
            return Err(Error::NotSupported);
        }
        let spec = find_command(cmd);
        let frame = format_command(spec, &[])?;
        self.pacing.before_send();
        // Any five-byte frame is the answer; there is no tagging.
        let resp = self.io.transact(&frame, &[], 0, self.timeouts.char_timeout)?;
        if resp.len() < spec.answer_bytes {
            return Err(Error::Protocol("short CAT answer".into()));
        }
        Ok(resp)
    }

    /// Enter CAT mode.
    pub fn init(&self) -> Result<()> {
        self.set(YbcCmd::CatOn, &[])
    }

    pub fn set_frequency(&self, _vfo: Option<Vfo>, freq: u64) -> Result<()> {
        let freq = round_freq(freq);
        let (had_duplex, had_split) = {
            let st = self.state.lock();
            (st.duplex_rx != 0 || st.duplex_tx != 0, st.split_offset != 0)
        };
        if had_duplex {
            self.set(YbcCmd::FullDuplexOff, &[])?;
            let mut st = self.state.lock();
            st.duplex_rx = 0;
            st.duplex_tx = 0;
        }
        if had_split {
            self.set(YbcCmd::SplitOff, &[])?;
        }
        // No VFO select on this family: always the current dial.
        self.set(YbcCmd::Frequency, &[YbcField::Num(freq / 10)])?;
        let mut st = self.state.lock();
        st.freq = freq;
        st.split_offset = 0;
        Ok(())
    }

    pub fn set_split_frequency(&self, freq_rx: u64, freq_tx: u64) -> Result<()> {
        let freq_rx = round_freq(freq_rx);
        let freq_tx = round_freq(freq_tx);
        let had_duplex = {
            let st = self.state.lock();
            st.duplex_rx != 0 || st.duplex_tx != 0
        };
        if had_duplex {
            self.set(YbcCmd::FullDuplexOff, &[])?;
            let mut st = self.state.lock();
            st.duplex_rx = 0;
            st.duplex_tx = 0;
        }
        self.set(YbcCmd::Frequency, &[YbcField::Num(freq_rx / 10)])?;
        if freq_tx < freq_rx {
            self.set(
                YbcCmd::SplitOffset,
                &[YbcField::Num((freq_rx - freq_tx) / 10)],
            )?;
            self.set(YbcCmd::SplitMinus, &[])?;
        } else {
            self.set(
                YbcCmd::SplitOffset,
                &[YbcField::Num((freq_tx - freq_rx) / 10)],
            )?;
            self.set(YbcCmd::SplitPlus, &[])?;
        }
        let mut st = self.state.lock();
        st.freq = freq_rx;
        st.split_offset = freq_tx as i64 - freq_rx as i64;
        Ok(())
    }

    /// Full-duplex programming. The command order is fixed by the rig:
    /// duplex off is implied by a preceding split clear, then rx mode,
    /// tx mode, rx frequency, tx frequency, duplex on. A failure partway
    /// leaves the rig transitional; callers re-set frequency next.
    pub fn set_duplex(
        &self,
        freq_rx: u64,
        mode_rx: RigMode,
        freq_tx: u64,
        mode_tx: RigMode,
    ) -> Result<()> {
        let rx_mode = mode_to_ybc(mode_rx)
            .ok_or_else(|| Error::InvalidArgument(format!("mode {:?} unsupported", mode_rx)))?;
        let tx_mode = mode_to_ybc(mode_tx)
            .ok_or_else(|| Error::InvalidArgument(format!("mode {:?} unsupported", mode_tx)))?;
        let freq_rx = round_freq(freq_rx);
        let freq_tx = round_freq(freq_tx);

        let had_split = self.state.lock().split_offset != 0;
        if had_split {
            self.set(YbcCmd::SplitOff, &[])?;
        }
        self.set(YbcCmd::FullDuplexRxMode, &[YbcField::Num(u64::from(rx_mode))])?;
        self.set(YbcCmd::FullDuplexTxMode, &[YbcField::Num(u64::from(tx_mode))])?;
        self.set(YbcCmd::FullDuplexRxFreq, &[YbcField::Num(freq_rx / 10)])?;
        self.set(YbcCmd::FullDuplexTxFreq, &[YbcField::Num(freq_tx / 10)])?;
        self.set(YbcCmd::FullDuplexOn, &[])?;
        let mut st = self.state.lock();
        st.freq = freq_rx;
        st.split_offset = 0;
        st.duplex_rx = freq_rx;
        st.duplex_tx = freq_tx;
        st.duplex_rx_mode = rx_mode;
        st.duplex_tx_mode = tx_mode;
        Ok(())
    }

    pub fn set_mode(&self, mode: RigMode) -> Result<()> {
        let ymode = mode_to_ybc(mode).ok_or(Error::NotSupported)?;
        self.set(YbcCmd::Mode, &[YbcField::Num(u64::from(ymode))])?;
        self.state.lock().mode = ymode;
        Ok(())
    }

    pub fn set_ptt(&self, tx: bool) -> Result<()> {
        self.set(if tx { YbcCmd::Tx } else { YbcCmd::Rx }, &[])?;
        self.state.lock().ptt = tx;
        Ok(())
    }

    /// Last frequency programmed; the rig cannot be asked.
    pub fn get_frequency(&self, _vfo: Option<Vfo>) -> Result<u64> {
        Ok(self.state.lock().freq)
    }

    pub fn get_split_frequency(&self) -> Result<(u64, u64)> {
        let st = self.state.lock();
        if st.split_offset == 0 {
            return Err(Error::InvalidArgument("rig is not operating split".into()));
        }
        let tx = (st.freq as i64 + st.split_offset).max(0) as u64;
        Ok((st.freq, tx))
    }

    pub fn get_duplex(&self) -> Result<(u64, RigMode, u64, RigMode)> {
        let st = self.state.lock();
        if st.duplex_rx == 0 || st.duplex_tx == 0 {
            return Err(Error::InvalidArgument("rig is not operating duplex".into()));
        }
        Ok((
            st.duplex_rx,
            ybc_to_mode(st.duplex_rx_mode),
            st.duplex_tx,
            ybc_to_mode(st.duplex_tx_mode),
        ))
    }

    pub fn get_mode(&self) -> RigMode {
        ybc_to_mode(self.state.lock().mode)
    }

    #[must_use]
    pub fn get_ptt(&self) -> bool {
        self.state.lock().ptt
    }

    /// Squelch test: bit 7 of the second response byte.
    pub fn get_squelch(&self) -> Result<bool> {
        let resp = self.get(YbcCmd::TestSquelch)?;
        Ok(resp.0.get(1).is_some_and(|b| b & 0x80 != 0))
    }

    /// S-meter test: second response byte, offset from 0x20.
    pub fn get_smeter(&self) -> Result<i32> {
        if self.state.lock().ptt {
            return Ok(0);
        }
        let resp = self.get(YbcCmd::TestSMeter)?;
        let raw = i32::from(*resp.0.get(1).ok_or_else(|| {
            Error::Protocol("short s-meter answer".into())
        })?);
        Ok((raw - 0x20).max(0))
    }

    /// Force split and duplex off so the cached state starts truthful.
    pub fn force_known_state(&self) -> Result<()> {
        {
            let mut st = self.state.lock();
            st.split_offset = 1;
            st.duplex_rx = 1;
        }
        Ok(())
    }

    /// Leave CAT mode and stop the reader thread.
    pub fn close(&mut self) -> Result<()> {
        let _ = self.set(YbcCmd::CatOff, &[]);
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

    fn driver(port: Arc<MockPort>) -> YaesuBinCat {
        let timeouts = YbcTimeouts {
            response_timeout: 100,
            char_timeout: 50,
            ..YbcTimeouts::default()
        };
        YaesuBinCat::start(port, timeouts, all_cmds(), all_cmds())
    }

    #[test]
    fn bcd_packing_is_msd_first() {
        let mut buf = [0u8; 5];
        fill_bcd(&mut buf, 0, 8, true, 14_500_000);
        assert_eq!(&buf[..4], &[0x14, 0x50, 0x00, 0x00]);

        let mut buf = [0u8; 5];
        fill_bcd(&mut buf, 0, 2, false, 42);
        assert_eq!(buf[0], 0x42);
    }

    #[test]
    fn big_bcd_leading_nibble_carries_hex() {
        // 1_296_000_000 Hz / 10 = 129_600_000: leading pair "12" encodes
        // as the plain nibble 1 then 2; a 43 leading pair uses hex a-f.
        let mut buf = [0u8; 5];
        fill_bcd(&mut buf, 0, 8, true, 43_000_000);
        assert_eq!(buf[0] >> 4, 4);
        let mut buf = [0u8; 5];
        fill_bcd(&mut buf, 0, 8, true, 0x0f);
        assert_eq!(buf[0] & 0xf0, 0);
    }

    #[test]
    fn frequency_frame_has_opcode_last() {
        let spec = find_command(YbcCmd::Frequency);
        let frame = format_command(spec, &[YbcField::Num(14_520_000)]).unwrap();
        assert_eq!(frame, [0x14, 0x52, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn rounding_to_ten_hertz() {
        assert_eq!(round_freq(14_250_004), 14_250_000);
        assert_eq!(round_freq(14_250_005), 14_250_010);
        assert_eq!(round_freq(14_250_000), 14_250_000);
    }

    #[test]
    fn set_frequency_clears_split_first() {
        let port = MockPort::new();
        let drv = driver(port.clone());
        drv.force_known_state().unwrap();
        drv.set_frequency(None, 145_200_000).unwrap();
        let writes = port.writes();
        // Duplex off, split off, then the frequency frame.
        assert_eq!(writes[0][4], 0x8E);
        assert_eq!(writes[1][4], 0x89);
        assert_eq!(writes[2][4], 0x01);
        assert_eq!(&writes[2][..4], &[0x14, 0x52, 0x00, 0x00]);
        assert_eq!(drv.get_frequency(None).unwrap(), 145_200_000);
    }

    #[test]
    fn split_programs_offset_and_direction() {
        let port = MockPort::new();
        let drv = driver(port.clone());
        drv.set_split_frequency(145_200_000, 144_600_000).unwrap();
        let writes = port.writes();
        assert_eq!(writes[0][4], 0x01); // rx frequency
        assert_eq!(writes[1][4], 0xF9); // offset
        assert_eq!(&writes[1][..4], &[0x00, 0x06, 0x00, 0x00]); // 600 kHz
        assert_eq!(writes[2][4], 0x09); // minus
        let (rx, tx) = drv.get_split_frequency().unwrap();
        assert_eq!(rx, 145_200_000);
        assert_eq!(tx, 144_600_000);
    }

    #[test]
    fn duplex_sequence_order_is_strict() {
        let port = MockPort::new();
        let drv = driver(port.clone());
        drv.set_duplex(435_800_000, RigMode::Fm, 145_900_000, RigMode::Usb)
            .unwrap();
        let opcodes: Vec<u8> = port.writes().iter().map(|w| w[4]).collect();
        assert_eq!(opcodes, vec![0x17, 0x27, 0x1E, 0x2E, 0x0E]);
        let (rx, rx_mode, tx, tx_mode) = drv.get_duplex().unwrap();
        assert_eq!(rx, 435_800_000);
        assert_eq!(tx, 145_900_000);
        assert_eq!(rx_mode, RigMode::Fm);
        assert_eq!(tx_mode, RigMode::Usb);
    }

    #[test]
    fn squelch_and_smeter_read_response_bytes() {
        let port = MockPort::new();
        port.on_write(&[0, 0, 0, 0, 0xE7], &[0x00, 0x85, 0x00, 0x00, 0x00]);
        port.on_write(&[0, 0, 0, 0, 0xF7], &[0x00, 0x2A, 0x00, 0x00, 0x00]);
        let drv = driver(port.clone());
        assert!(drv.get_squelch().unwrap());
        assert_eq!(drv.get_smeter().unwrap(), 0x0A);
    }

    #[test]
    fn fsk_mode_is_not_supported() {
        let port = MockPort::new();
        let drv = driver(port);
        assert!(matches!(
            drv.set_mode(RigMode::Fsk),
            Err(Error::NotSupported)
        ));
    }
}
