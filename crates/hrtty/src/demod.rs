// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Two-tone FSK demodulator.
//!
//! Every audio sample runs through the mark and space matched filters,
//! the results are squared and low-pass filtered into envelopes, and the
//! envelope difference `cv = emv - esv` is the instantaneous bit decision
//! (positive = mark, negative = space).
//!
//! Character extraction is a self-synchronizing state machine:
//!
//! ```text
//!            start seen                 5 bits + stop ok
//!   Idle ------------------> Bit(0..5) -----------------> Idle (emit)
//!    | 1.6 symbol timeout        | framing error              ^
//!    v                           v                            | valid frame
//!   HuntFill --- window full --> Hunt --- mark->space probe --+
//! ```
//!
//! In hunt mode a ring one full 7.5-unit frame long (7.1 symbol times)
//! is probed at fixed offsets for a start bit, five data bits and two
//! stop positions whenever a mark-to-space crossing leaves the window.
//! Bad frames are dropped silently; the hunt path recovers the next
//! valid one.

use crate::dsp::{Biquad, MatchedFilter};

/// Phase position probed for the start bit inside the hunt window.
const HUNT_START: f64 = 0.5;
/// Phase positions probed for the five data bits.
const HUNT_BITS: [f64; 5] = [1.5, 2.5, 3.5, 4.5, 5.5];
/// Phase position of the first stop probe (the second is the window end).
const HUNT_STOP: f64 = 6.5;
/// Hunt window length in symbol times.
const HUNT_WINDOW: f64 = 7.1;

/// Idle wait for a start bit before dropping to hunt, in symbol times.
const IDLE_TIMEOUT: f64 = 1.6;
/// A data bit is over once phase passes this point.
const BIT_END: f64 = 1.03;
/// Samples past this phase participate in the jitter check.
const BIT_LATE: f64 = 0.97;
/// Stop window length in symbol times.
const STOP_END: f64 = 1.42;
/// A space onset past this phase ends a valid stop bit early.
const STOP_EARLY_OUT: f64 = 1.39;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Post-stop: waiting for the next start-bit onset.
    Idle,
    /// Filling the hunt ring with one full frame of decision values.
    HuntFill,
    /// Sliding the hunt ring one sample at a time.
    Hunt,
    /// Sampling the start bit (index 0) or a data bit (1..=5).
    Bit,
    /// Verifying the stop bit.
    Stop,
}

/// Demodulator configuration, all rates in Hz.
#[derive(Debug, Clone, Copy)]
pub struct DemodConfig {
    pub sample_rate: u32,
    pub mark_freq: f64,
    pub space_freq: f64,
    /// Baud rate as an exact fraction (45.45 baud is 1000/22).
    pub baud_numerator: u32,
    pub baud_denominator: u32,
    /// Q of the envelope low-pass sections.
    pub lp_filter_q: f64,
}

impl DemodConfig {
    /// Baud rate as a float.
    #[must_use]
    pub fn baud(&self) -> f64 {
        f64::from(self.baud_numerator) / f64::from(self.baud_denominator)
    }
}

impl Default for DemodConfig {
    fn default() -> Self {
        DemodConfig {
            sample_rate: 48_000,
            mark_freq: 2_125.0,
            space_freq: 2_295.0,
            baud_numerator: 1_000,
            baud_denominator: 22,
            lp_filter_q: 1.0,
        }
    }
}

struct HuntWindow {
    buf: Vec<f64>,
    head: usize,
    tail: usize,
    /// start, b0..b4, stop1, stop2.
    probes: [usize; 8],
    fill: usize,
}

impl HuntWindow {
    fn new(samples_per_symbol: f64) -> Self {
        let buflen = (samples_per_symbol * HUNT_WINDOW) as usize + 1;
        HuntWindow {
            buf: vec![0.0; buflen],
            head: 0,
            tail: 0,
            probes: [0; 8],
            fill: 0,
        }
    }

    fn bufmax(&self) -> usize {
        self.buf.len() - 1
    }

    fn next(&self, val: usize) -> usize {
        if val + 1 > self.bufmax() {
            0
        } else {
            val + 1
        }
    }

    fn restart(&mut self) {
        self.fill = 0;
        self.tail = 0;
    }

    /// Returns true once the window is full and probing may begin.
    fn push_fill(&mut self, cv: f64, samples_per_symbol: f64) -> bool {
        self.buf[self.fill] = cv;
        self.fill += 1;
        if self.fill <= self.bufmax() {
            return false;
        }
        self.head = self.bufmax();
        self.tail = 0;
        self.probes[0] = (samples_per_symbol * HUNT_START) as usize;
        for (i, pos) in HUNT_BITS.iter().enumerate() {
            self.probes[i + 1] = (samples_per_symbol * pos) as usize;
        }
        self.probes[6] = (samples_per_symbol * HUNT_STOP) as usize;
        self.probes[7] = self.bufmax();
        true
    }

    /// Probe the current window: a mark-to-space crossing at the window
    /// start with a space start bit and mark stop positions yields the
    /// data bits LSB-first.
    fn probe(&self) -> Option<u8> {
        if !(self.buf[self.tail] >= 0.0 && self.buf[self.next(self.tail)] < 0.0) {
            return None;
        }
        if !(self.buf[self.probes[0]] < 0.0
            && self.buf[self.probes[6]] >= 0.0
            && self.buf[self.probes[7]] >= 0.0)
        {
            return None;
        }
        let mut code = 0u8;
        for bit in 0..5 {
            code |= u8::from(self.buf[self.probes[bit + 1]] > 0.0) << bit;
        }
        Some(code)
    }

    fn slide(&mut self, cv: f64) {
        self.buf[self.head] = cv;
        self.head = self.next(self.head);
        self.tail = self.next(self.tail);
        for p in &mut self.probes {
            *p = if *p + 1 > self.buf.len() - 1 { 0 } else { *p + 1 };
        }
    }
}

/// Push-model FSK demodulator: samples in, 5-bit Baudot codes out.
pub struct Demodulator {
    phase_rate: f64,
    phase: f64,
    state: State,

    mark_fir: MatchedFilter,
    space_fir: MatchedFilter,
    mark_lpf: Biquad,
    space_lpf: Biquad,
    // Phase correction for the tuning display only.
    mark_apf: Biquad,
    space_apf: Biquad,
    level_lpf: Biquad,

    hunt: HuntWindow,

    // Bit sampling state.
    bit_index: u8,
    first: Option<f64>,
    code: u8,
    stop_ok: bool,
    stop_nsamp: u8,

    reverse: bool,
    tuning: (f64, f64),
    level: f64,
}

impl Demodulator {
    /// Build a demodulator; the hunt window and matched filters are sized
    /// from the sample rate and baud fraction.
    #[must_use]
    pub fn new(cfg: &DemodConfig) -> Self {
        let rate = f64::from(cfg.sample_rate);
        let baud = cfg.baud();
        let samples_per_symbol = rate / baud;
        // The centre frequencies of the tuning-aid all-pass pair were
        // found by trial for 2125/2295 and scale from there.
        Demodulator {
            phase_rate: 1.0 / samples_per_symbol,
            phase: 0.0,
            state: State::HuntFill,
            mark_fir: MatchedFilter::new(cfg.mark_freq, cfg.sample_rate, baud),
            space_fir: MatchedFilter::new(cfg.space_freq, cfg.sample_rate, baud),
            mark_lpf: Biquad::lowpass(baud * 1.1, cfg.lp_filter_q, rate),
            space_lpf: Biquad::lowpass(baud * 1.1, cfg.lp_filter_q, rate),
            mark_apf: Biquad::allpass(cfg.mark_freq / 1.75, 1.0, rate),
            space_apf: Biquad::allpass(cfg.space_freq * 1.75, 1.0, rate),
            level_lpf: Biquad::lowpass(10.0, 0.5, rate),
            hunt: HuntWindow::new(samples_per_symbol),
            bit_index: 0,
            first: None,
            code: 0,
            stop_ok: false,
            stop_nsamp: 0,
            reverse: false,
            tuning: (0.0, 0.0),
            level: 0.0,
        }
    }

    /// Whether mark and space are currently swapped.
    #[must_use]
    pub fn reverse(&self) -> bool {
        self.reverse
    }

    /// Swap the mark/space filter pairs. No samples may be processed
    /// between the three swaps, which holding `&mut self` guarantees.
    pub fn toggle_reverse(&mut self) {
        self.reverse = !self.reverse;
        std::mem::swap(&mut self.mark_fir, &mut self.space_fir);
        std::mem::swap(&mut self.mark_lpf, &mut self.space_lpf);
        std::mem::swap(&mut self.mark_apf, &mut self.space_apf);
    }

    /// Phase-corrected (mark, space) pair for the crossed-bananas display.
    #[must_use]
    pub fn tuning(&self) -> (f64, f64) {
        self.tuning
    }

    /// RMS audio input level.
    #[must_use]
    pub fn level(&self) -> i16 {
        self.level.sqrt() as i16
    }

    /// Abandon any partial frame and resynchronize from scratch.
    pub fn reset(&mut self) {
        self.state = State::HuntFill;
        self.hunt.restart();
        self.phase = 0.0;
    }

    /// Process one audio sample. Returns a completed 5-bit code when a
    /// full character frame has been assembled.
    pub fn process(&mut self, sample: i16) -> Option<u8> {
        let mv = self.mark_fir.filter(sample);
        let sv = self.space_fir.filter(sample);
        let emv = self.mark_lpf.filter(mv * mv);
        let esv = self.space_lpf.filter(sv * sv);
        self.tuning = (self.mark_apf.filter(mv), self.space_apf.filter(sv));
        self.level = self
            .level_lpf
            .filter(f64::from(sample) * f64::from(sample));
        let cv = emv - esv;

        match self.state {
            State::Idle => {
                self.idle_step(cv);
                None
            }
            State::HuntFill => {
                if self.hunt.push_fill(cv, 1.0 / self.phase_rate) {
                    self.state = State::Hunt;
                }
                None
            }
            State::Hunt => {
                if let Some(code) = self.hunt.probe() {
                    // Frame recovered out of the window; the current
                    // sample belongs to whatever follows it.
                    self.state = State::Idle;
                    self.phase = 0.0;
                    self.idle_step(cv);
                    return Some(code);
                }
                self.hunt.slide(cv);
                None
            }
            State::Bit => {
                self.bit_step(cv);
                None
            }
            State::Stop => self.stop_step(cv),
        }
    }

    fn enter_hunt(&mut self) {
        log::debug!("frame rejected, hunting for start");
        self.state = State::HuntFill;
        self.hunt.restart();
    }

    fn enter_bit_sampling(&mut self) {
        // The onset sample is not part of the start bit measurement.
        self.state = State::Bit;
        self.phase = self.phase_rate;
        self.bit_index = 0;
        self.first = None;
        self.code = 0;
    }

    fn idle_step(&mut self, cv: f64) {
        if cv < 0.0 {
            self.enter_bit_sampling();
            return;
        }
        self.phase += self.phase_rate;
        if self.phase >= IDLE_TIMEOUT {
            self.enter_hunt();
        }
    }

    fn bit_step(&mut self, cv: f64) {
        if self.phase > 0.5 && self.first.is_none() {
            self.first = Some(cv);
        }
        if self.phase > BIT_LATE {
            let first = self.first.unwrap_or(cv);
            if (cv < 0.0) != (first <= 0.0) {
                // Sign change late in the symbol: treat it as the end of
                // this bit and recover timing for the next one.
                self.phase = 1.0 - self.phase;
                self.finish_bit(first > 0.0);
                return;
            }
        }
        self.phase += self.phase_rate;
        if self.phase >= BIT_END {
            // Over-read: carry the excess into the next bit's phase.
            self.phase -= 1.0;
            let first = self.first.unwrap_or(0.0);
            self.finish_bit(first > 0.0);
        }
    }

    fn finish_bit(&mut self, mark: bool) {
        if self.bit_index == 0 {
            // The start bit must be space.
            if mark {
                self.enter_hunt();
                return;
            }
        } else if mark {
            self.code |= 1 << (self.bit_index - 1);
        }
        self.bit_index += 1;
        self.first = None;
        if self.bit_index > 5 {
            self.state = State::Stop;
            self.stop_ok = false;
            self.stop_nsamp = 0;
        }
    }

    fn stop_step(&mut self, cv: f64) -> Option<u8> {
        if self.phase > 0.5 && self.stop_nsamp == 0 {
            self.stop_ok = cv >= 0.0;
            self.stop_nsamp = 1;
        } else if self.phase > 1.0 && self.stop_nsamp == 1 {
            if cv < 0.0 {
                self.stop_ok = false;
            }
            self.stop_nsamp = 2;
        }
        if self.phase > STOP_EARLY_OUT && self.stop_ok && cv < 0.0 {
            // The next start bit is already here.
            return self.emit();
        }
        self.phase += self.phase_rate;
        if self.phase >= STOP_END {
            if self.stop_ok {
                return self.emit();
            }
            self.enter_hunt();
        }
        None
    }

    fn emit(&mut self) -> Option<u8> {
        self.state = State::Idle;
        self.phase = 0.0;
        Some(self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::afsk::{AfskBit, AfskModulator, AudioSink};
    use crate::baudot::{ascii_to_baudot, Charset};
    use crate::Result;

    struct VecSink(Vec<i16>);

    impl AudioSink for VecSink {
        fn write_samples(&mut self, samples: &[i16]) -> Result<()> {
            self.0.extend_from_slice(samples);
            Ok(())
        }
        fn drain(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn render(text: &str, cfg: &DemodConfig) -> Vec<i16> {
        let mut modem = AfskModulator::new(
            cfg.mark_freq,
            cfg.space_freq,
            cfg.sample_rate,
            cfg.baud(),
        );
        let mut sink = VecSink(Vec::new());
        // Mark hold ahead of the text gives the envelope filters time to
        // settle, the way a real transmission leads with idle mark.
        for _ in 0..8 {
            modem.send_bit(AfskBit::Stop, &mut sink).unwrap();
        }
        for ch in text.bytes() {
            let code = ascii_to_baudot(Charset::Ita2, ch, false).unwrap() & 0x1f;
            modem.send_char(code, &mut sink).unwrap();
        }
        modem.end_tx(&mut sink).unwrap();
        sink.0
    }

    fn decode(samples: &[i16], cfg: &DemodConfig) -> Vec<u8> {
        let mut demod = Demodulator::new(cfg);
        let mut out = Vec::new();
        for &s in samples {
            if let Some(code) = demod.process(s) {
                out.push(code);
            }
        }
        out
    }

    #[test]
    fn decodes_clean_ry() {
        let cfg = DemodConfig::default();
        let samples = render("RY", &cfg);
        let codes = decode(&samples, &cfg);
        let text: Vec<u8> = codes
            .iter()
            .map(|&c| crate::baudot::baudot_to_ascii(Charset::Ita2, c, false))
            .collect();
        assert_eq!(text, b"RY", "decoded {:?}", codes);
    }

    #[test]
    fn decodes_longer_message() {
        let cfg = DemodConfig::default();
        let samples = render("RYRYRY CQ", &cfg);
        let codes = decode(&samples, &cfg);
        let mut text = String::new();
        let mut figs = false;
        for code in codes {
            match crate::baudot::baudot_to_ascii(Charset::Ita2, code, figs) {
                0x0e => figs = true,
                0x0f => figs = false,
                0 => {}
                ch => text.push(ch as char),
            }
        }
        assert_eq!(text, "RYRYRY CQ");
    }

    #[test]
    fn tolerates_slow_sender_clock() {
        // Sender runs 5% slow; the per-bit jitter retiming keeps lock.
        let mut cfg = DemodConfig::default();
        cfg.baud_denominator = 23; // ~43.5 baud signal
        let samples = render("RYRY", &cfg);
        let nominal = DemodConfig::default();
        let codes = decode(&samples, &nominal);
        let text: Vec<u8> = codes
            .iter()
            .map(|&c| crate::baudot::baudot_to_ascii(Charset::Ita2, c, false))
            .collect();
        assert_eq!(text, b"RYRY");
    }

    #[test]
    fn dropped_samples_recover_via_hunt() {
        let cfg = DemodConfig::default();
        let mut samples = render("RYR", &cfg);
        // Chop a chunk out of the middle character; later characters must
        // still be recovered.
        fastrand::seed(7);
        let cut = samples.len() / 2 + fastrand::usize(0..100);
        samples.drain(cut..cut + 200);
        let codes = decode(&samples, &cfg);
        let text: Vec<u8> = codes
            .iter()
            .map(|&c| crate::baudot::baudot_to_ascii(Charset::Ita2, c, false))
            .collect();
        assert!(
            text.ends_with(b"R"),
            "expected trailing R, decoded {:?}",
            text
        );
    }

    #[test]
    fn silence_produces_nothing() {
        let cfg = DemodConfig::default();
        let codes = decode(&vec![0i16; 48_000], &cfg);
        assert!(codes.is_empty());
    }

    #[test]
    fn reverse_toggle_swaps_decisions() {
        let cfg = DemodConfig::default();
        let samples = render("RY", &cfg);
        let mut demod = Demodulator::new(&cfg);
        demod.toggle_reverse();
        assert!(demod.reverse());
        // With mark and space swapped the clean signal must not decode
        // as the original text.
        let mut out = Vec::new();
        for &s in &samples {
            if let Some(code) = demod.process(s) {
                out.push(crate::baudot::baudot_to_ascii(Charset::Ita2, code, false));
            }
        }
        assert_ne!(out, b"RY");
    }
}
