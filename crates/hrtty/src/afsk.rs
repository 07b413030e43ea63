// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! AFSK modulator.
//!
//! Six half-bit PCM buffers are pre-rendered, one per tone transition
//! actually used:
//!
//! ```text
//!   zero -> mark    zero -> space     (raised half-cosine ramp up)
//!   mark -> zero    space -> zero     (raised half-cosine ramp down)
//!   mark -> mark    space -> space    (steady tone)
//! ```
//!
//! Each buffer ends on a positive-going zero crossing so that any legal
//! concatenation is phase continuous. Sending a bit emits two half-bit
//! buffers chosen by (previous bit, next bit); a stop bit is three
//! half-buffers (1.5 symbol times).

use crate::baudot;
use crate::{Error, Result};
use std::f64::consts::PI;

/// Logical transmit levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfskBit {
    /// No carrier yet (before ramp-up / after ramp-down).
    Unknown,
    Space,
    Mark,
    /// Mark held for 1.5 symbol times.
    Stop,
}

/// Destination for rendered PCM.
///
/// The OSS playback device implements this; tests collect into a vector.
pub trait AudioSink {
    /// Write every sample, blocking as needed.
    fn write_samples(&mut self, samples: &[i16]) -> Result<()>;
    /// Block until the device has played everything written so far.
    fn drain(&mut self) -> Result<()>;
}

/// AFSK modulator state: the six waveform buffers plus the last level sent.
pub struct AfskModulator {
    zero_to_mark: Vec<i16>,
    zero_to_space: Vec<i16>,
    mark_to_zero: Vec<i16>,
    space_to_zero: Vec<i16>,
    mark_to_mark: Vec<i16>,
    space_to_space: Vec<i16>,
    last_bit: AfskBit,
}

/// Render a half-symbol of sine at `freq`, extended to end on a
/// positive-going zero crossing.
fn generate_sine(freq: f64, sample_rate: u32, baud: f64) -> Vec<i16> {
    let wavelen = f64::from(sample_rate) / freq;
    let nsamp = (f64::from(sample_rate) / (baud * 2.0)) as usize + 2;
    let mut buf = vec![0i16; nsamp];
    for (i, s) in buf.iter_mut().enumerate() {
        *s = ((i as f64 / wavelen * (2.0 * PI)).sin() * f64::from(i16::MAX >> 1)) as i16;
    }

    // Find the last positive-going zero crossing near the end; fall back
    // to scanning the whole buffer if the tail has none.
    let mut i = nsamp - 4;
    while i < nsamp {
        if buf[i] >= 0 && buf[i - 1] <= 0 {
            break;
        }
        i += 1;
    }
    if i == nsamp {
        i -= 1;
        while i > 0 {
            if buf[i] >= 0 && buf[i - 1] <= 0 {
                break;
            }
            i -= 1;
        }
    }
    buf.truncate(i);
    buf
}

/// Apply a raised-half-cosine window starting at `start_phase`
/// (0 tapers unity to zero, PI tapers zero to unity).
fn adjust_wave(buf: &mut [i16], start_phase: f64) {
    let phase_step = PI / buf.len() as f64;
    let mut phase = start_phase;
    for s in buf {
        *s = (f64::from(*s) * (phase.cos() + 1.0) / 2.0) as i16;
        phase += phase_step;
    }
}

impl AfskModulator {
    /// Render the six transition buffers for the given tone pair.
    #[must_use]
    pub fn new(mark_freq: f64, space_freq: f64, sample_rate: u32, baud: f64) -> Self {
        let mut zero_to_mark = generate_sine(mark_freq, sample_rate, baud);
        let mut mark_to_zero = generate_sine(mark_freq, sample_rate, baud);
        let mark_to_mark = generate_sine(mark_freq, sample_rate, baud);
        let mut zero_to_space = generate_sine(space_freq, sample_rate, baud);
        let mut space_to_zero = generate_sine(space_freq, sample_rate, baud);
        let space_to_space = generate_sine(space_freq, sample_rate, baud);

        adjust_wave(&mut zero_to_mark, PI);
        adjust_wave(&mut mark_to_zero, 0.0);
        adjust_wave(&mut zero_to_space, PI);
        adjust_wave(&mut space_to_zero, 0.0);

        AfskModulator {
            zero_to_mark,
            zero_to_space,
            mark_to_zero,
            space_to_zero,
            mark_to_mark,
            space_to_space,
            last_bit: AfskBit::Unknown,
        }
    }

    /// The last level sent, for end-of-transmission framing decisions.
    #[must_use]
    pub fn last_bit(&self) -> AfskBit {
        self.last_bit
    }

    /// Swap the mark and space waveform triples in place.
    pub fn toggle_reverse(&mut self) {
        std::mem::swap(&mut self.zero_to_mark, &mut self.zero_to_space);
        std::mem::swap(&mut self.mark_to_zero, &mut self.space_to_zero);
        std::mem::swap(&mut self.mark_to_mark, &mut self.space_to_space);
    }

    /// Emit one bit as the transition from the previous level.
    ///
    /// Mark after `Unknown` or `Stop` has no legal waveform and is a
    /// programming error in the character encoder.
    pub fn send_bit(&mut self, bit: AfskBit, sink: &mut dyn AudioSink) -> Result<()> {
        match bit {
            AfskBit::Mark => match self.last_bit {
                AfskBit::Unknown => {
                    return Err(Error::Fatal("mark after unknown".into()));
                }
                AfskBit::Space => {
                    sink.write_samples(&self.space_to_zero)?;
                    sink.write_samples(&self.zero_to_mark)?;
                }
                AfskBit::Mark => {
                    sink.write_samples(&self.mark_to_mark)?;
                    sink.write_samples(&self.mark_to_mark)?;
                }
                AfskBit::Stop => {
                    return Err(Error::Fatal("mark after stop".into()));
                }
            },
            AfskBit::Space => match self.last_bit {
                AfskBit::Unknown => {
                    // Ramp-up: the very first half-bit of a transmission.
                    sink.write_samples(&self.zero_to_space)?;
                }
                AfskBit::Space => {
                    sink.write_samples(&self.space_to_space)?;
                    sink.write_samples(&self.space_to_space)?;
                }
                AfskBit::Mark | AfskBit::Stop => {
                    sink.write_samples(&self.mark_to_zero)?;
                    sink.write_samples(&self.zero_to_space)?;
                }
            },
            AfskBit::Stop => match self.last_bit {
                AfskBit::Unknown => {
                    sink.write_samples(&self.zero_to_mark)?;
                    sink.write_samples(&self.mark_to_mark)?;
                    sink.write_samples(&self.mark_to_mark)?;
                }
                AfskBit::Space => {
                    sink.write_samples(&self.space_to_zero)?;
                    sink.write_samples(&self.zero_to_mark)?;
                    sink.write_samples(&self.mark_to_mark)?;
                }
                AfskBit::Mark | AfskBit::Stop => {
                    sink.write_samples(&self.mark_to_mark)?;
                    sink.write_samples(&self.mark_to_mark)?;
                    sink.write_samples(&self.mark_to_mark)?;
                }
            },
            AfskBit::Unknown => {
                return Err(Error::Fatal("sending unknown bit".into()));
            }
        }
        self.last_bit = bit;
        Ok(())
    }

    /// Emit one character: start, five data bits LSB-first, stop.
    pub fn send_char(&mut self, code: u8, sink: &mut dyn AudioSink) -> Result<()> {
        self.send_bit(AfskBit::Space, sink)?;
        let mut ch = code;
        for _ in 0..5 {
            let bit = if ch & 1 != 0 {
                AfskBit::Mark
            } else {
                AfskBit::Space
            };
            self.send_bit(bit, sink)?;
            ch >>= 1;
        }
        self.send_bit(AfskBit::Stop, sink)
    }

    /// Convenience wrapper: send an ASCII character through the given
    /// charset without shift handling (characters that need FIGS must be
    /// shifted by the caller).
    pub fn send_ascii(
        &mut self,
        charset: baudot::Charset,
        ch: u8,
        figs: bool,
        sink: &mut dyn AudioSink,
    ) -> Result<()> {
        let code = baudot::ascii_to_baudot(charset, ch, figs).unwrap_or(baudot::LTRS);
        self.send_char(code & 0x1f, sink)
    }

    /// Ramp the carrier down and block until the sink has drained.
    ///
    /// Ending after a space (or before anything was sent) leaves the
    /// waveform discontinuous and is a programming error.
    pub fn end_tx(&mut self, sink: &mut dyn AudioSink) -> Result<()> {
        match self.last_bit {
            AfskBit::Unknown => return Err(Error::Fatal("ending after unknown bit".into())),
            AfskBit::Space => return Err(Error::Fatal("ending after space".into())),
            AfskBit::Stop | AfskBit::Mark => {
                sink.write_samples(&self.mark_to_zero)?;
            }
        }
        sink.drain()?;
        self.last_bit = AfskBit::Unknown;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 48_000;
    const BAUD: f64 = 1000.0 / 22.0;

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

    fn modem() -> AfskModulator {
        AfskModulator::new(2_125.0, 2_295.0, RATE, BAUD)
    }

    fn max_step(samples: &[i16]) -> i32 {
        samples
            .windows(2)
            .map(|w| (i32::from(w[1]) - i32::from(w[0])).abs())
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn buffers_are_roughly_half_a_symbol() {
        let m = modem();
        let nominal = (f64::from(RATE) / (BAUD * 2.0)) as usize;
        for buf in [
            &m.zero_to_mark,
            &m.zero_to_space,
            &m.mark_to_zero,
            &m.space_to_zero,
            &m.mark_to_mark,
            &m.space_to_space,
        ] {
            let len = buf.len();
            assert!(
                len >= nominal - 32 && len <= nominal + 2,
                "buffer length {} vs nominal {}",
                len,
                nominal
            );
        }
    }

    #[test]
    fn phase_continuity_over_legal_sequence() {
        // The largest step inside a single steady-tone buffer bounds what
        // any legal concatenation may produce.
        let m = modem();
        let intra = max_step(&m.mark_to_mark).max(max_step(&m.space_to_space));

        let mut m = modem();
        let mut sink = VecSink(Vec::new());
        // R (0x0a) and Y (0x15) exercise every transition kind.
        m.send_char(0x0a, &mut sink).unwrap();
        m.send_char(0x15, &mut sink).unwrap();
        m.end_tx(&mut sink).unwrap();
        assert!(
            max_step(&sink.0) <= intra,
            "stream step {} exceeds intra-buffer step {}",
            max_step(&sink.0),
            intra
        );
    }

    #[test]
    fn letter_a_has_expected_shape_and_length() {
        // A = 0x03: start space, data 1 1 0 0 0 (LSB first), stop.
        let mut m = modem();
        let mut sink = VecSink(Vec::new());
        m.send_char(0x03, &mut sink).unwrap();
        m.end_tx(&mut sink).unwrap();

        // 7.5 symbol times: half-bit start ramp, five full bits, 1.5-bit
        // stop, half-bit ramp-down.
        let nominal = (f64::from(RATE) / BAUD * 7.5) as usize;
        let len = sink.0.len();
        let tolerance = RATE as usize / 2_000 * 16; // crossing trim per buffer
        assert!(
            (len as i64 - nominal as i64).unsigned_abs() as usize <= tolerance,
            "length {} vs nominal {}",
            len,
            nominal
        );

        // The stream must start with the ramped space (low amplitude).
        assert!(sink.0[0].abs() < 1_000);
    }

    #[test]
    fn mark_after_ramp_down_is_rejected() {
        let mut m = modem();
        let mut sink = VecSink(Vec::new());
        assert!(m.send_bit(AfskBit::Mark, &mut sink).is_err());
        m.send_char(0x03, &mut sink).unwrap();
        m.end_tx(&mut sink).unwrap();
        assert!(m.send_bit(AfskBit::Mark, &mut sink).is_err());
    }

    #[test]
    fn end_after_space_is_rejected() {
        let mut m = modem();
        let mut sink = VecSink(Vec::new());
        m.send_bit(AfskBit::Space, &mut sink).unwrap();
        assert!(m.end_tx(&mut sink).is_err());
    }

    #[test]
    fn reverse_swaps_tone_buffers() {
        let mut m = modem();
        let mark = m.mark_to_mark.clone();
        let space = m.space_to_space.clone();
        m.toggle_reverse();
        assert_eq!(m.mark_to_mark, space);
        assert_eq!(m.space_to_space, mark);
    }

    #[test]
    fn character_encoder_postcondition() {
        let mut m = modem();
        let mut sink = VecSink(Vec::new());
        for code in [0x00u8, 0x0a, 0x15, 0x1f] {
            m.send_char(code, &mut sink).unwrap();
            assert!(
                matches!(m.last_bit(), AfskBit::Mark | AfskBit::Stop),
                "after {:#x}",
                code
            );
        }
    }
}
