// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Line-protocol command parsing and execution.
//!
//! Short commands are single bytes; long forms begin with `\` and are
//! rewritten in place before parsing. A command that returns data writes
//! its data lines; set commands answer `RPRT 0` or `RPRT -<errno>`.
//! A parse failure answers `RPRT -1` and abandons the rest of the line.
//!
//! When the rig cannot select a VFO, the per-connection [`VfoState`]
//! simulates one: `V` updates the virtual dial and pushes its saved
//! frequency and mode, and split is emulated through the paired dial.

use hrtty::rig::{Rig, RigMode, Vfo};
use hrtty::Error;

/// Long-form command names and their single-byte spellings.
const LONG_CMDS: &[(&[u8], u8)] = &[
    (b"\\set_split_freq", b'I'),
    (b"\\get_split_freq", b'i'),
    (b"\\set_split_mode", b'X'),
    (b"\\get_split_mode", b'x'),
    (b"\\set_rptr_shift", b'R'),
    (b"\\get_rptr_shift", b'r'),
    (b"\\set_ctcss_tone", b'C'),
    (b"\\get_ctcss_tone", b'c'),
    (b"\\set_rptr_offs", b'O'),
    (b"\\get_rptr_offs", b'o'),
    (b"\\set_split_vfo", b'S'),
    (b"\\get_split_vfo", b's'),
    (b"\\set_ctcss_sql", 0x90),
    (b"\\get_ctcss_sql", 0x91),
    (b"\\set_powerstat", 0x87),
    (b"\\get_powerstat", 0x88),
    (b"\\set_dcs_code", b'D'),
    (b"\\get_dcs_code", b'd'),
    (b"\\set_dcs_sql", 0x92),
    (b"\\get_dcs_sql", 0x93),
    (b"\\set_channel", b'H'),
    (b"\\get_channel", b'h'),
    (b"\\send_morse", b'b'),
    (b"\\dump_state", 0x8f),
    (b"\\set_level", b'L'),
    (b"\\get_level", b'l'),
    (b"\\send_dtmf", 0x89),
    (b"\\recv_dtmf", 0x8a),
    (b"\\dump_caps", b'1'),
    (b"\\dump_conf", b'3'),
    (b"\\set_freq", b'F'),
    (b"\\get_freq", b'f'),
    (b"\\set_mode", b'M'),
    (b"\\get_mode", b'm'),
    (b"\\set_func", b'U'),
    (b"\\get_func", b'u'),
    (b"\\set_parm", b'P'),
    (b"\\get_parm", b'p'),
    (b"\\set_bank", b'B'),
    (b"\\get_info", b'_'),
    (b"\\send_cmd", b'w'),
    (b"\\power2mW", b'2'),
    (b"\\mW2power", b'4'),
    (b"\\set_trn", b'A'),
    (b"\\get_trn", b'a'),
    (b"\\set_rit", b'J'),
    (b"\\get_rit", b'j'),
    (b"\\set_xit", b'Z'),
    (b"\\get_xit", b'z'),
    (b"\\set_ant", b'Y'),
    (b"\\get_ant", b'y'),
    (b"\\get_dcd", 0x8b),
    (b"\\chk_vfo", 0xf0),
    (b"\\set_vfo", b'V'),
    (b"\\get_vfo", b'v'),
    (b"\\set_ptt", b'T'),
    (b"\\get_ptt", b't'),
    (b"\\set_mem", b'E'),
    (b"\\get_mem", b'e'),
    (b"\\set_ts", b'N'),
    (b"\\get_ts", b'n'),
    (b"\\vfo_op", b'G'),
    (b"\\reset", b'*'),
    (b"\\scan", b'g'),
    (b"\\halt", 0xf1),
];

/// Rewrite every known long-form command in `line` to its single-byte
/// spelling. Unknown long forms are left alone.
pub fn shorten_commands(line: &mut Vec<u8>) {
    let mut from = 0usize;
    while let Some(pos) = line[from..].iter().position(|&b| b == b'\\') {
        let pos = from + pos;
        match LONG_CMDS
            .iter()
            .find(|(long, _)| line[pos..].starts_with(long))
        {
            Some((long, short)) => {
                line.splice(pos..pos + long.len(), [*short]);
                from = pos + 1;
            }
            None => from = pos + 1,
        }
    }
}

/// Per-connection virtual dial state. Only consulted when the rig lacks
/// real VFO semantics, but the frequency/mode memory is kept for every
/// rig so repeated sets can be skipped.
#[derive(Debug, Clone)]
pub struct VfoState {
    pub current: Vfo,
    pub split: bool,
    freqs: [u64; 4],
    modes: [RigMode; 4],
}

fn slot(vfo: Vfo) -> Option<usize> {
    match vfo {
        Vfo::A => Some(0),
        Vfo::B => Some(1),
        Vfo::Main => Some(2),
        Vfo::Sub => Some(3),
        _ => None,
    }
}

impl Default for VfoState {
    fn default() -> Self {
        VfoState {
            current: Vfo::A,
            split: false,
            freqs: [0; 4],
            modes: [RigMode::Unknown; 4],
        }
    }
}

impl VfoState {
    #[must_use]
    pub fn freq(&self, vfo: Vfo) -> u64 {
        slot(vfo).map(|i| self.freqs[i]).unwrap_or(0)
    }

    pub fn save_freq(&mut self, vfo: Vfo, freq: u64) {
        if let Some(i) = slot(vfo) {
            self.freqs[i] = freq;
        }
    }

    #[must_use]
    pub fn mode(&self, vfo: Vfo) -> RigMode {
        slot(vfo).map(|i| self.modes[i]).unwrap_or(RigMode::Unknown)
    }

    pub fn save_mode(&mut self, vfo: Vfo, mode: RigMode) {
        if let Some(i) = slot(vfo) {
            self.modes[i] = mode;
        }
    }

    /// Seed the cache from the rig when a connection arrives.
    pub fn seed(&mut self, rig: &Rig) {
        if let Ok((rx, tx)) = rig.get_split_frequency() {
            self.split = true;
            let on_b = matches!(rig.get_vfo(), Ok(Vfo::B));
            let (a, b) = if on_b { (tx, rx) } else { (rx, tx) };
            self.freqs[0] = a;
            self.freqs[1] = b;
            self.current = if on_b { Vfo::B } else { Vfo::A };
            self.save_mode(self.current, rig.get_mode());
        }
    }
}

fn vfo_name(vfo: Vfo) -> &'static str {
    match vfo {
        Vfo::A => "VFOA",
        Vfo::B => "VFOB",
        Vfo::Memory => "MEM",
        Vfo::Com => "COM",
        Vfo::Main => "Main",
        Vfo::Sub => "Sub",
    }
}

fn parse_vfo(name: &str) -> Option<Vfo> {
    match name {
        "VFOA" | "VFO" => Some(Vfo::A),
        "VFOB" => Some(Vfo::B),
        "MEM" => Some(Vfo::Memory),
        "Main" => Some(Vfo::Main),
        "Sub" => Some(Vfo::Sub),
        _ => None,
    }
}

fn rprt(out: &mut Vec<u8>, errno: i32) {
    out.extend_from_slice(format!("RPRT {}\n", -errno.abs()).as_bytes());
}

fn rprt_ok(out: &mut Vec<u8>) {
    out.extend_from_slice(b"RPRT 0\n");
}

fn rprt_err(out: &mut Vec<u8>, e: &Error) {
    rprt(out, e.errno());
}

/// The dial the protocol considers current.
fn current_vfo(state: &VfoState, rig: &Rig) -> Vfo {
    if rig.has_vfo_select {
        rig.get_vfo().unwrap_or(state.current)
    } else {
        state.current
    }
}

fn send_mode(out: &mut Vec<u8>, mode: RigMode) -> bool {
    match mode.protocol_name() {
        Some(name) => {
            out.extend_from_slice(format!("{}\n0\n", name).as_bytes());
            true
        }
        None => false,
    }
}

/// Program rx/tx as appropriate for the connection's split/duplex state,
/// resolving the unset side from the virtual cache with rig fallbacks.
fn do_frequency_set(
    state: &mut VfoState,
    rig: &Rig,
    vfo: Vfo,
    freq: u64,
    tx_side: bool,
) -> Result<(), Error> {
    let paired = vfo.paired();
    let own_mode = match state.mode(vfo) {
        RigMode::Unknown => rig.get_mode(),
        m => m,
    };
    let other_mode = match state.mode(paired) {
        RigMode::Unknown => own_mode,
        m => m,
    };
    let (rx_freq, tx_freq, rx_mode, tx_mode) = if tx_side {
        let mut tx_freq = freq;
        if tx_freq == 0 {
            tx_freq = rig.get_frequency(Some(vfo)).unwrap_or(0);
        }
        let mut rx_freq = state.freq(paired);
        if rx_freq == 0 {
            rx_freq = tx_freq;
        }
        (rx_freq, tx_freq, other_mode, own_mode)
    } else {
        let mut rx_freq = freq;
        if rx_freq == 0 {
            rx_freq = rig.get_frequency(Some(vfo)).unwrap_or(0);
        }
        let mut tx_freq = state.freq(paired);
        if tx_freq == 0 {
            tx_freq = rx_freq;
        }
        (rx_freq, tx_freq, own_mode, other_mode)
    };

    let result = if vfo == Vfo::Main || vfo == Vfo::Sub {
        rig.set_duplex(rx_freq, rx_mode, tx_freq, tx_mode)
    } else if state.split {
        rig.set_split_frequency(rx_freq, tx_freq)
    } else {
        rig.set_frequency(Some(vfo), freq)
    };
    if result.is_ok() {
        state.save_freq(vfo, freq);
    }
    result
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn next_cmd(&mut self) -> Option<u8> {
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            self.pos += 1;
            if b != b' ' && b != b'\r' && b != b'\n' {
                return Some(b);
            }
        }
        None
    }

    /// The next space-separated token, required by commands with
    /// arguments.
    fn next_arg(&mut self) -> Option<&'a str> {
        while self.pos < self.bytes.len() && self.bytes[self.pos] == b' ' {
            self.pos += 1;
        }
        let start = self.pos;
        while self.pos < self.bytes.len()
            && self.bytes[self.pos] != b' '
            && self.bytes[self.pos] != b'\r'
            && self.bytes[self.pos] != b'\n'
        {
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        std::str::from_utf8(&self.bytes[start..self.pos]).ok()
    }
}

/// Execute every command on one line, appending the responses to `out`.
pub fn execute_line(line: &[u8], state: &mut VfoState, rig: &Rig, out: &mut Vec<u8>) {
    let mut line = line.to_vec();
    shorten_commands(&mut line);
    let mut cur = Cursor {
        bytes: &line,
        pos: 0,
    };
    while let Some(cmd) = cur.next_cmd() {
        let ok = execute_one(cmd, &mut cur, state, rig, out);
        if !ok {
            rprt(out, 1);
            return;
        }
    }
}

/// One command; false aborts the rest of the line with `RPRT -1`.
fn execute_one(
    cmd: u8,
    cur: &mut Cursor<'_>,
    state: &mut VfoState,
    rig: &Rig,
    out: &mut Vec<u8>,
) -> bool {
    match cmd {
        b'F' => {
            let vfo = current_vfo(state, rig);
            let Some(freq) = cur.next_arg().and_then(|a| a.parse::<u64>().ok()) else {
                return false;
            };
            if state.freq(vfo) == freq {
                rprt_ok(out);
            } else {
                match do_frequency_set(state, rig, vfo, freq, false) {
                    Ok(()) => rprt_ok(out),
                    Err(e) => rprt_err(out, &e),
                }
            }
        }
        b'I' => {
            let vfo = current_vfo(state, rig).paired();
            let Some(freq) = cur.next_arg().and_then(|a| a.parse::<u64>().ok()) else {
                return false;
            };
            if state.freq(vfo) == freq {
                rprt_ok(out);
            } else {
                match do_frequency_set(state, rig, vfo, freq, true) {
                    Ok(()) => rprt_ok(out),
                    Err(e) => rprt_err(out, &e),
                }
            }
        }
        b'f' => match rig.get_frequency(None) {
            Ok(freq) if freq != 0 => {
                out.extend_from_slice(format!("{}\n", freq).as_bytes());
            }
            _ => return false,
        },
        b'i' => {
            let vfo = current_vfo(state, rig);
            let tx_freq = match rig.get_split_frequency() {
                Ok((_, tx)) => tx,
                Err(_) => state.freq(vfo.paired()),
            };
            if tx_freq == 0 {
                return false;
            }
            out.extend_from_slice(format!("{}\n", tx_freq).as_bytes());
        }
        b'M' => {
            let vfo = current_vfo(state, rig);
            let Some(mode) = cur.next_arg().map(RigMode::from_protocol_name) else {
                return false;
            };
            if mode == RigMode::Unknown {
                return false;
            }
            // The passband argument is accepted and ignored.
            if cur.next_arg().is_none() {
                return false;
            }
            let result = if state.mode(vfo) == mode {
                Ok(())
            } else {
                rig.set_mode(mode)
            };
            match result {
                Ok(()) => {
                    state.save_mode(vfo, mode);
                    rprt_ok(out);
                }
                Err(e) => rprt_err(out, &e),
            }
        }
        b'X' => {
            let vfo = current_vfo(state, rig).paired();
            let Some(mode) = cur.next_arg().map(RigMode::from_protocol_name) else {
                return false;
            };
            if mode == RigMode::Unknown {
                return false;
            }
            if cur.next_arg().is_none() {
                return false;
            }
            let result = if state.mode(vfo) == mode {
                Ok(())
            } else {
                rig.set_mode(mode)
            };
            match result {
                Ok(()) => {
                    state.save_mode(vfo, mode);
                    rprt_ok(out);
                }
                Err(e) => rprt_err(out, &e),
            }
        }
        b'm' => {
            if !send_mode(out, rig.get_mode()) {
                return false;
            }
        }
        b'x' => {
            let mode = state.mode(current_vfo(state, rig).paired());
            if !send_mode(out, mode) {
                return false;
            }
        }
        b'V' => {
            let Some(vfo) = cur.next_arg().and_then(parse_vfo) else {
                return false;
            };
            if rig.has_vfo_select {
                match rig.set_vfo(vfo) {
                    Ok(()) => {
                        state.current = vfo;
                        rprt_ok(out);
                    }
                    Err(e) => rprt_err(out, &e),
                }
            } else {
                // Simulated dial: push the remembered frequency and mode.
                if state.freq(vfo) != 0 {
                    if do_frequency_set(state, rig, vfo, state.freq(vfo), false).is_err() {
                        return false;
                    }
                }
                if state.mode(vfo) == RigMode::Unknown {
                    state.save_mode(vfo, rig.get_mode());
                } else if rig.set_mode(state.mode(vfo)).is_err() {
                    return false;
                }
                state.current = vfo;
                rprt_ok(out);
            }
        }
        b'v' => {
            let vfo = current_vfo(state, rig);
            out.extend_from_slice(format!("{}\n", vfo_name(vfo)).as_bytes());
        }
        b'S' => {
            let Some(on) = cur.next_arg().and_then(|a| a.parse::<i32>().ok()) else {
                return false;
            };
            let Some(tx_vfo) = cur.next_arg().and_then(parse_vfo) else {
                return false;
            };
            if on == 0 {
                if rig.get_split_frequency().is_ok() {
                    match rig.get_frequency(None) {
                        Ok(freq) if freq != 0 => match rig.set_frequency(None, freq) {
                            Ok(()) => {
                                state.split = false;
                                rprt_ok(out);
                            }
                            Err(e) => rprt_err(out, &e),
                        },
                        _ => rprt(out, 1),
                    }
                } else {
                    state.split = false;
                    rprt_ok(out);
                }
            } else if rig.get_split_frequency().is_ok() {
                // Already split; nothing to program.
                state.split = true;
                rprt_ok(out);
            } else {
                let rx_vfo = tx_vfo.paired();
                let mut tx_freq = state.freq(tx_vfo);
                if tx_freq == 0 {
                    if rig.has_vfo_select {
                        tx_freq = rig.get_frequency(Some(tx_vfo)).unwrap_or(0);
                    } else {
                        tx_freq = rig.get_frequency(None).unwrap_or(0);
                    }
                }
                if tx_freq == 0 {
                    return false;
                }
                state.split = true;
                match do_frequency_set(state, rig, tx_vfo, tx_freq, true) {
                    Ok(()) => {
                        // The paired dial carries receive from here on.
                        state.current = rx_vfo;
                        rprt_ok(out);
                    }
                    Err(e) => {
                        state.split = false;
                        rprt_err(out, &e);
                    }
                }
            }
        }
        b's' => {
            let split = rig.get_split_frequency().is_ok();
            let vfo = current_vfo(state, rig);
            out.extend_from_slice(if split { b"1\n" } else { b"0\n" });
            let tx_vfo = if split { vfo.paired() } else { vfo };
            out.extend_from_slice(format!("{}\n", vfo_name(tx_vfo)).as_bytes());
        }
        b'T' => {
            let Some(on) = cur.next_arg().and_then(|a| a.parse::<i32>().ok()) else {
                return false;
            };
            match rig.set_ptt(on != 0) {
                Ok(()) => rprt_ok(out),
                Err(e) => rprt_err(out, &e),
            }
        }
        b't' => match rig.get_ptt() {
            Ok(tx) => out.extend_from_slice(if tx { b"1\n" } else { b"0\n" }),
            Err(_) => return false,
        },
        0xf0 => out.extend_from_slice(b"CHKVFO 0\n"),
        0x8b => match rig.get_squelch() {
            Ok(open) => out.extend_from_slice(if open { b"1\n" } else { b"0\n" }),
            Err(_) => return false,
        },
        b'l' => {
            let Some(what) = cur.next_arg() else {
                return false;
            };
            if what != "STRENGTH" {
                return false;
            }
            match rig.get_smeter() {
                Ok(db) => out.extend_from_slice(format!("{}\n", db - 49).as_bytes()),
                Err(_) => return false,
            }
        }
        0x8f => dump_state(state, rig, out),
        b' ' | b'\r' | b'\n' => {}
        _ => return false,
    }
    true
}

/// The fixed multi-line capability summary.
fn dump_state(_state: &VfoState, rig: &Rig, out: &mut Vec<u8>) {
    let mut vfo_mask = 0x1000_0003u32; // VFO A, VFO B, MEM
    if rig.has_duplex {
        vfo_mask |= 0xc00_0000; // Main and Sub
    }
    out.extend_from_slice(b"0\n"); // protocol version
    out.extend_from_slice(b"2\n"); // rig model
    out.extend_from_slice(b"2\n"); // ITU region
    for limit in &rig.rx_limits {
        out.extend_from_slice(
            format!(
                "{} {} 0x1ff -1 -1 0x{:x} 0x01\n",
                limit.low, limit.high, vfo_mask
            )
            .as_bytes(),
        );
    }
    out.extend_from_slice(b"0 0 0 0 0 0 0\n");
    for limit in &rig.tx_limits {
        out.extend_from_slice(
            format!(
                "{} {} 0x1ff 0 100 0x{:x} 0x01\n",
                limit.low, limit.high, vfo_mask
            )
            .as_bytes(),
        );
    }
    out.extend_from_slice(b"0 0 0 0 0 0 0\n");
    out.extend_from_slice(b"0 0\n"); // tuning steps
    out.extend_from_slice(b"0 0\n"); // filter sizes
    out.extend_from_slice(b"0\n"); // max RIT
    out.extend_from_slice(b"0\n"); // max XIT
    out.extend_from_slice(b"0\n"); // max IF shift
    out.extend_from_slice(b"0\n"); // announces
    out.extend_from_slice(b"\n"); // preamp settings
    out.extend_from_slice(b"\n"); // attenuator settings
    out.extend_from_slice(b"0x0\n"); // has get func
    out.extend_from_slice(b"0x0\n"); // has set func
    let level = if rig.has_smeter { 0x4000_0000u32 } else { 0 };
    out.extend_from_slice(format!("0x{:x}\n", level).as_bytes()); // get level
    out.extend_from_slice(b"0x0\n"); // set level
    out.extend_from_slice(b"0x0\n"); // get param
    out.extend_from_slice(b"0x0\n"); // set param
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrtty::config::Ini;
    use hrtty::io::testutil::MockPort;
    use hrtty::rig::models;
    use std::sync::Arc;

    const IF_IDLE: &[u8] = b"IF00014000000     +00000000000000000000;";

    fn kenwood_rig(port: &Arc<MockPort>) -> Rig {
        port.on_write(b"IF;", IF_IDLE);
        let mut ini = Ini::parse("[hf]\nrig = TS-140S\nport = /dev/null\n").unwrap();
        models::assemble(&mut ini, "hf", port.clone()).unwrap()
    }

    fn yaesu_rig_with_hf_limits(port: &Arc<MockPort>) -> Rig {
        // Open the limits up so the classic HF test frequencies pass the
        // guard on this VHF rig.
        let mut ini = Ini::parse(
            "[vhf]\nrig = FT-736R\nport = /dev/null\n\
             rx_bandlimit_low_hf = 500000\nrx_bandlimit_high_hf = 30000000\n\
             tx_bandlimit_low_hf = 500000\ntx_bandlimit_high_hf = 30000000\n",
        )
        .unwrap();
        models::assemble(&mut ini, "vhf", port.clone()).unwrap()
    }

    fn run_lines(lines: &[&str], state: &mut VfoState, rig: &Rig) -> String {
        let mut out = Vec::new();
        for line in lines {
            execute_line(line.as_bytes(), state, rig, &mut out);
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn long_commands_are_rewritten() {
        let mut line = b"\\set_freq 14250000".to_vec();
        shorten_commands(&mut line);
        assert_eq!(line, b"F 14250000");

        let mut line = b"\\get_ptt".to_vec();
        shorten_commands(&mut line);
        assert_eq!(line, b"t");

        let mut line = b"\\dump_state".to_vec();
        shorten_commands(&mut line);
        assert_eq!(line, &[0x8f]);

        // Unknown long forms survive untouched.
        let mut line = b"\\frobnicate 1".to_vec();
        shorten_commands(&mut line);
        assert_eq!(line, b"\\frobnicate 1");
    }

    #[test]
    fn set_frequency_reaches_the_wire() {
        let port = MockPort::new();
        let rig = kenwood_rig(&port);
        let mut state = VfoState::default();
        let out = run_lines(&["F 14250000"], &mut state, &rig);
        assert_eq!(out, "RPRT 0\n");
        assert!(port.writes().contains(&b"FA00014250000;".to_vec()));
    }

    #[test]
    fn parse_failure_aborts_the_line() {
        let port = MockPort::new();
        let rig = kenwood_rig(&port);
        let mut state = VfoState::default();
        let out = run_lines(&["F notanumber", "Q 1"], &mut state, &rig);
        assert_eq!(out, "RPRT -1\nRPRT -1\n");
    }

    #[test]
    fn out_of_band_frequency_reports_einval() {
        let port = MockPort::new();
        let rig = kenwood_rig(&port);
        let mut state = VfoState::default();
        let out = run_lines(&["F 146000000"], &mut state, &rig);
        assert_eq!(out, format!("RPRT -{}\n", libc_einval()));
    }

    fn libc_einval() -> i32 {
        hrtty::Error::InvalidArgument(String::new()).errno()
    }

    #[test]
    fn split_emulation_on_a_non_vfo_rig() {
        let port = MockPort::new();
        let rig = yaesu_rig_with_hf_limits(&port);
        let mut state = VfoState::default();
        let out = run_lines(
            &[
                "V VFOA",
                "F 14200000",
                "V VFOB",
                "F 14210000",
                "S 1 VFOB",
                "f",
                "i",
            ],
            &mut state,
            &rig,
        );
        assert_eq!(
            out,
            "RPRT 0\nRPRT 0\nRPRT 0\nRPRT 0\nRPRT 0\n14200000\n14210000\n"
        );
        assert_eq!(state.current, Vfo::A);
        assert!(state.split);
    }

    #[test]
    fn virtual_vfo_coherence() {
        let port = MockPort::new();
        let rig = yaesu_rig_with_hf_limits(&port);
        let mut state = VfoState::default();
        let out = run_lines(
            &["V VFOA", "F 14200000", "V VFOB", "F 14210000", "V VFOA", "f"],
            &mut state,
            &rig,
        );
        // Switching back to VFOA pushed its saved frequency to the rig.
        assert!(out.ends_with("14200000\n"), "transcript: {}", out);
    }

    #[test]
    fn mode_set_and_get() {
        let port = MockPort::new();
        let rig = kenwood_rig(&port);
        let mut state = VfoState::default();
        let out = run_lines(&["M USB 0"], &mut state, &rig);
        assert_eq!(out, "RPRT 0\n");
        assert!(port.writes().contains(&b"MD2;".to_vec()));
        // The saved mode answers x for the paired dial without traffic.
        let out = run_lines(&["m"], &mut state, &rig);
        assert_eq!(out, "USB\n0\n");
    }

    #[test]
    fn ptt_round_trip() {
        let port = MockPort::new();
        let rig = kenwood_rig(&port);
        let mut state = VfoState::default();
        let out = run_lines(&["T 1"], &mut state, &rig);
        assert_eq!(out, "RPRT 0\n");
        assert!(port.writes().contains(&b"TX;".to_vec()));
        let out = run_lines(&["t"], &mut state, &rig);
        assert_eq!(out, "0\n");
    }

    #[test]
    fn chk_vfo_and_vfo_queries() {
        let port = MockPort::new();
        let rig = yaesu_rig_with_hf_limits(&port);
        let mut state = VfoState::default();
        let out = run_lines(&["\\chk_vfo", "v"], &mut state, &rig);
        assert_eq!(out, "CHKVFO 0\nVFOA\n");
    }

    #[test]
    fn dump_state_lists_band_limits() {
        let port = MockPort::new();
        let rig = kenwood_rig(&port);
        let state = VfoState::default();
        let mut out = Vec::new();
        dump_state(&state, &rig, &mut out);
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("0"));
        assert_eq!(lines.next(), Some("2"));
        assert_eq!(lines.next(), Some("2"));
        // One line per rx limit with the VFO mask, then the terminator.
        assert!(text.contains("500000 30000000 0x1ff -1 -1 0x10000003 0x01"));
        assert!(text.contains("14000000 14350000 0x1ff 0 100 0x10000003 0x01"));
        assert!(text.contains("0 0 0 0 0 0 0"));
    }

    #[test]
    fn multiple_commands_share_one_line() {
        let port = MockPort::new();
        let rig = yaesu_rig_with_hf_limits(&port);
        let mut state = VfoState::default();
        state.save_freq(Vfo::A, 14_200_000);
        let out = run_lines(&["F 14200000\r"], &mut state, &rig);
        // Already at that frequency: no wire traffic, immediate report.
        assert_eq!(out, "RPRT 0\n");
    }
}
