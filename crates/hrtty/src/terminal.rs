// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Terminal engine: the receive/transmit character flow.
//!
//! [`Engine`] owns the demodulator, one transmit backend (AFSK audio or
//! the FSK UART), the LTRS/FIGS shift state for each direction, a
//! bounded receive log, and an optional rigctld client for PTT and dial
//! following. The curses UI and the XML-RPC adapter both drive the same
//! operations: feed samples, send text, toggle reverse, run a macro.

use crate::afsk::{AfskModulator, AudioSink};
use crate::baudot::{self, Charset};
use crate::config::Settings;
use crate::demod::{DemodConfig, Demodulator};
use crate::fsk::FskKeyer;
use crate::rigctl::RigctlClient;
use crate::Result;

/// How much received text is retained for remote readers.
const RX_LOG_CAP: usize = 65_536;

/// A transmit path for 5-bit codes.
pub trait FskBackend {
    /// Key or unkey the path (modem lines, preamble, unkey discipline).
    fn ptt(&mut self, tx: bool) -> Result<()>;
    /// Whether the path is keyed.
    fn ptt_state(&self) -> Result<bool>;
    /// Send one 5-bit code.
    fn send_code(&mut self, code: u8) -> Result<()>;
    /// Finish a transmission (ramp-down and drain where applicable).
    fn end_tx(&mut self) -> Result<()>;
    /// Swap mark and space if the path can.
    fn toggle_reverse(&mut self);
}

/// Direct UART keying backend.
pub struct UartBackend {
    keyer: FskKeyer,
}

impl UartBackend {
    #[must_use]
    pub fn new(keyer: FskKeyer) -> Self {
        UartBackend { keyer }
    }
}

impl FskBackend for UartBackend {
    fn ptt(&mut self, tx: bool) -> Result<()> {
        if tx {
            self.keyer.ptt_on()
        } else {
            self.keyer.ptt_off()
        }
    }

    fn ptt_state(&self) -> Result<bool> {
        self.keyer.ptt()
    }

    fn send_code(&mut self, code: u8) -> Result<()> {
        self.keyer.send_code(code)
    }

    fn end_tx(&mut self) -> Result<()> {
        Ok(())
    }

    fn toggle_reverse(&mut self) {
        // A hardware keyer cannot swap mark and space.
    }
}

/// AFSK audio backend. PTT itself is the rig's business (the engine keys
/// it over rigctld); this path only renders audio.
pub struct AfskBackend<S: AudioSink> {
    modem: AfskModulator,
    sink: S,
}

impl<S: AudioSink> AfskBackend<S> {
    #[must_use]
    pub fn new(modem: AfskModulator, sink: S) -> Self {
        AfskBackend { modem, sink }
    }
}

impl<S: AudioSink> FskBackend for AfskBackend<S> {
    fn ptt(&mut self, _tx: bool) -> Result<()> {
        Ok(())
    }

    fn ptt_state(&self) -> Result<bool> {
        Ok(false)
    }

    fn send_code(&mut self, code: u8) -> Result<()> {
        self.modem.send_char(code, &mut self.sink)
    }

    fn end_tx(&mut self) -> Result<()> {
        self.modem.end_tx(&mut self.sink)
    }

    fn toggle_reverse(&mut self) {
        self.modem.toggle_reverse();
    }
}

/// The terminal core.
pub struct Engine {
    settings: Settings,
    charset: Charset,
    demod: Demodulator,
    backend: Box<dyn FskBackend>,
    rigctl: Option<RigctlClient>,
    rx_figs: bool,
    tx_figs: bool,
    rx_log: Vec<u8>,
    captured_call: String,
}

impl Engine {
    /// Assemble an engine from settings and a transmit backend.
    #[must_use]
    pub fn new(settings: Settings, backend: Box<dyn FskBackend>) -> Self {
        let charset = Charset::from_index(settings.charset).unwrap_or(Charset::Ita2);
        let demod_cfg = DemodConfig {
            sample_rate: settings.dsp_rate,
            mark_freq: settings.mark_freq,
            space_freq: settings.space_freq,
            baud_numerator: settings.baud_numerator,
            baud_denominator: settings.baud_denominator,
            lp_filter_q: settings.lp_filter_q,
        };
        Engine {
            settings,
            charset,
            demod: Demodulator::new(&demod_cfg),
            backend,
            rigctl: None,
            rx_figs: false,
            tx_figs: false,
            rx_log: Vec::new(),
            captured_call: String::new(),
        }
    }

    /// Attach a rigctld connection for PTT and dial following.
    pub fn set_rigctl(&mut self, client: RigctlClient) {
        self.rigctl = Some(client);
    }

    /// Feed received audio; returns the printable characters decoded.
    pub fn rx_process(&mut self, samples: &[i16]) -> String {
        let mut out = String::new();
        for &sample in samples {
            if let Some(code) = self.demod.process(sample) {
                if let Some(ch) = self.decode_code(code) {
                    out.push(ch as char);
                }
            }
        }
        out
    }

    /// Apply shift state to one received code.
    fn decode_code(&mut self, code: u8) -> Option<u8> {
        let ch = baudot::baudot_to_ascii(self.charset, code, self.rx_figs);
        self.log_rx(ch);
        match ch {
            0 | 0x05 | 0x07 => None,
            baudot::CH_LTRS => {
                self.rx_figs = false;
                None
            }
            baudot::CH_FIGS => {
                self.rx_figs = true;
                None
            }
            b' ' => {
                // Unshift on space.
                self.rx_figs = false;
                Some(b' ')
            }
            printable => Some(printable),
        }
    }

    fn log_rx(&mut self, ch: u8) {
        if ch == 0 {
            return;
        }
        self.rx_log.push(ch);
        if self.rx_log.len() > RX_LOG_CAP {
            let excess = self.rx_log.len() - RX_LOG_CAP;
            self.rx_log.drain(..excess);
        }
    }

    /// The last `n` bytes of the receive log (for the XML-RPC adapter).
    #[must_use]
    pub fn rx_log_tail(&self, n: usize) -> &[u8] {
        let start = self.rx_log.len().saturating_sub(n);
        &self.rx_log[start..]
    }

    /// Transmit one character, inserting shift codes as needed.
    fn tx_char(&mut self, ch: u8) -> Result<()> {
        if ch == b'\r' || ch == b'\n' {
            // Carriage handling is Baudot-conventional: line feed first,
            // then the return, both from the table.
            let lf = baudot::ascii_to_baudot(self.charset, b'\n', false).unwrap_or(0x02);
            let cr = baudot::ascii_to_baudot(self.charset, b'\r', false).unwrap_or(0x08);
            self.backend.send_code(lf & 0x1f)?;
            self.backend.send_code(cr & 0x1f)?;
            return Ok(());
        }
        // Anything the charset cannot carry goes out as LTRS: the
        // operator hears the diddle and sees nothing printed.
        let bch = baudot::ascii_to_baudot(self.charset, ch, self.tx_figs).unwrap_or(baudot::LTRS);
        let want_figs = bch & 0x20 != 0;
        if want_figs != self.tx_figs {
            self.tx_figs = want_figs;
            self.backend
                .send_code(if want_figs { baudot::FIGS } else { baudot::LTRS })?;
        }
        self.backend.send_code(bch & 0x1f)?;
        if ch == b' ' {
            self.tx_figs = false;
        }
        Ok(())
    }

    /// Key up, send `text`, unkey with the drain discipline.
    pub fn send_string(&mut self, text: &str) -> Result<()> {
        if self.settings.ctl_ptt {
            if let Some(client) = self.rigctl.as_mut() {
                client.set_ptt(true)?;
            }
        }
        self.tx_figs = false;
        self.backend.ptt(true)?;
        for ch in text.bytes() {
            self.tx_char(ch)?;
        }
        self.backend.end_tx()?;
        self.backend.ptt(false)?;
        if self.settings.ctl_ptt {
            if let Some(client) = self.rigctl.as_mut() {
                client.set_ptt(false)?;
            }
        }
        Ok(())
    }

    /// Whether the transmitter is keyed, preferring the rig's answer.
    pub fn get_rig_ptt(&mut self) -> Result<bool> {
        if self.settings.ctl_ptt {
            if let Some(client) = self.rigctl.as_mut() {
                return client.get_ptt();
            }
        }
        self.backend.ptt_state()
    }

    /// Swap mark and space on both directions.
    pub fn toggle_reverse(&mut self) -> bool {
        self.demod.toggle_reverse();
        self.backend.toggle_reverse();
        self.demod.reverse()
    }

    /// Remember a callsign captured by the logger.
    pub fn captured_callsign(&mut self, call: &str) {
        self.captured_call = call.trim().to_ascii_uppercase();
    }

    /// Send macro `n` (1-based). `%c` expands to the captured callsign,
    /// `%%` to a literal percent sign.
    pub fn do_macro(&mut self, n: usize) -> Result<()> {
        let Some(text) = self
            .settings
            .macros
            .get(n.wrapping_sub(1))
            .filter(|t| !t.is_empty())
            .cloned()
        else {
            return Ok(());
        };
        let mut expanded = String::with_capacity(text.len());
        let mut chars = text.chars();
        while let Some(ch) = chars.next() {
            if ch == '%' {
                match chars.next() {
                    Some('c') => expanded.push_str(&self.captured_call),
                    Some('%') => expanded.push('%'),
                    Some(other) => {
                        expanded.push('%');
                        expanded.push(other);
                    }
                    None => expanded.push('%'),
                }
            } else {
                expanded.push(ch);
            }
        }
        self.send_string(&expanded)
    }

    /// Tuning-aid sample pair from the demodulator.
    #[must_use]
    pub fn tuning(&self) -> (f64, f64) {
        self.demod.tuning()
    }

    /// Input level for the audio meter.
    #[must_use]
    pub fn level(&self) -> i16 {
        self.demod.level()
    }

    /// Resynchronize reception (called when switching back from TX).
    pub fn reset_rx(&mut self) {
        self.demod.reset();
        self.rx_figs = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        codes: Vec<u8>,
        keyed: Vec<bool>,
        ended: usize,
    }

    struct RecordingBackend(Rc<RefCell<Recorder>>);

    impl FskBackend for RecordingBackend {
        fn ptt(&mut self, tx: bool) -> Result<()> {
            self.0.borrow_mut().keyed.push(tx);
            Ok(())
        }
        fn ptt_state(&self) -> Result<bool> {
            Ok(*self.0.borrow().keyed.last().unwrap_or(&false))
        }
        fn send_code(&mut self, code: u8) -> Result<()> {
            self.0.borrow_mut().codes.push(code);
            Ok(())
        }
        fn end_tx(&mut self) -> Result<()> {
            self.0.borrow_mut().ended += 1;
            Ok(())
        }
        fn toggle_reverse(&mut self) {}
    }

    fn engine() -> (Engine, Rc<RefCell<Recorder>>) {
        let rec = Rc::new(RefCell::new(Recorder::default()));
        let backend = RecordingBackend(Rc::clone(&rec));
        let mut settings = Settings::default();
        settings.macros = vec!["CQ CQ DE %c".to_string()];
        (Engine::new(settings, Box::new(backend)), rec)
    }

    #[test]
    fn shift_codes_are_inserted_once_per_page_change() {
        let (mut engine, rec) = engine();
        engine.send_string("A1B").unwrap();
        let codes = rec.borrow().codes.clone();
        // A, FIGS, 1, LTRS, B.
        assert_eq!(codes, vec![0x03, baudot::FIGS, 0x17, baudot::LTRS, 0x19]);
        assert_eq!(rec.borrow().keyed, vec![true, false]);
        assert_eq!(rec.borrow().ended, 1);
    }

    #[test]
    fn space_unshifts_the_transmit_page() {
        let (mut engine, rec) = engine();
        engine.send_string("1 1").unwrap();
        let codes = rec.borrow().codes.clone();
        // FIGS 1, space drops to LTRS, FIGS 1 again.
        assert_eq!(
            codes,
            vec![baudot::FIGS, 0x17, baudot::SPACE, baudot::FIGS, 0x17]
        );
    }

    #[test]
    fn carriage_return_sends_lf_then_cr() {
        let (mut engine, rec) = engine();
        engine.send_string("\r").unwrap();
        assert_eq!(rec.borrow().codes, vec![0x02, 0x08]);
    }

    #[test]
    fn unmapped_characters_diddle_as_ltrs() {
        let (mut engine, rec) = engine();
        engine.send_string("~").unwrap();
        assert_eq!(rec.borrow().codes, vec![baudot::LTRS]);
    }

    #[test]
    fn rx_shift_state_with_usos() {
        let (mut engine, _) = engine();
        // R, FIGS, 4, space (USOS), R again on the letters page.
        let mut text = String::new();
        for code in [0x0a, baudot::FIGS, 0x0a, baudot::SPACE, 0x0a] {
            if let Some(ch) = engine.decode_code(code) {
                text.push(ch as char);
            }
        }
        assert_eq!(text, "R4 R");
    }

    #[test]
    fn rx_log_tail_returns_recent_bytes() {
        let (mut engine, _) = engine();
        for code in [0x0a, 0x15, 0x0a, 0x15] {
            engine.decode_code(code);
        }
        assert_eq!(engine.rx_log_tail(2), b"RY");
        assert_eq!(engine.rx_log_tail(100), b"RYRY");
    }

    #[test]
    fn macro_expands_captured_callsign() {
        let (mut engine, rec) = engine();
        engine.captured_callsign("w8bsd");
        engine.do_macro(1).unwrap();
        // The expanded text ends with the callsign's Baudot codes.
        let codes = rec.borrow().codes.clone();
        assert!(!codes.is_empty());
        // W = 0x13, 8 (figs) = 0x06, B = 0x19, S = 0x05, D = 0x09.
        let tail = &codes[codes.len() - 7..];
        assert_eq!(
            tail,
            &[0x13, baudot::FIGS, 0x06, baudot::LTRS, 0x19, 0x05, 0x09]
        );
    }

    #[test]
    fn missing_macro_is_a_quiet_no_op() {
        let (mut engine, rec) = engine();
        engine.do_macro(7).unwrap();
        assert!(rec.borrow().codes.is_empty());
    }
}
