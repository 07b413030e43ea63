// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OSS sound device access.
//!
//! The device is opened read-only for reception or write-only for AFSK
//! transmission, in signed 16-bit native-endian PCM. Every configuration
//! ioctl must come back with exactly the requested value; a device that
//! negotiates something else is unusable for the exact-baud math in the
//! demodulator and the open fails.
//!
//! Stereo devices are permitted on input; the left channel carries the
//! signal and the remaining channels are discarded.

use crate::afsk::AudioSink;
use crate::{Error, Result};
use std::ffi::CString;
use std::os::unix::io::RawFd;

// OSS ioctl numbers (_IOWR('P', n, int) / _IO('P', 1)).
const SNDCTL_DSP_SYNC: libc::c_ulong = 0x0000_5001;
const SNDCTL_DSP_SPEED: libc::c_ulong = 0xC004_5002;
const SNDCTL_DSP_SETFMT: libc::c_ulong = 0xC004_5005;
const SNDCTL_DSP_CHANNELS: libc::c_ulong = 0xC004_5006;

/// Signed 16-bit native-endian sample format.
#[cfg(target_endian = "little")]
const AFMT_S16_NE: libc::c_int = 0x0000_0010;
#[cfg(target_endian = "big")]
const AFMT_S16_NE: libc::c_int = 0x0000_0020;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Capture,
    Playback,
}

fn open_dsp(path: &str, dir: Direction, rate: u32, channels: u32) -> Result<(RawFd, u32)> {
    let cpath = CString::new(path)
        .map_err(|_| Error::Fatal(format!("bad sound device path {:?}", path)))?;
    let flags = match dir {
        Direction::Capture => libc::O_RDONLY,
        Direction::Playback => libc::O_WRONLY,
    };
    let fd = unsafe { libc::open(cpath.as_ptr(), flags) };
    if fd == -1 {
        return Err(Error::Fatal(format!(
            "unable to open sound device {}: {}",
            path,
            std::io::Error::last_os_error()
        )));
    }

    let close_err = |fd: RawFd, msg: String| -> Error {
        unsafe { libc::close(fd) };
        Error::Fatal(msg)
    };

    let mut fmt = AFMT_S16_NE;
    if unsafe { libc::ioctl(fd, SNDCTL_DSP_SETFMT, &mut fmt) } == -1 {
        return Err(close_err(fd, format!("{}: setting sample format failed", path)));
    }
    if fmt != AFMT_S16_NE {
        return Err(close_err(
            fd,
            format!("{}: 16-bit native endian audio not supported", path),
        ));
    }

    let mut ch = channels as libc::c_int;
    if unsafe { libc::ioctl(fd, SNDCTL_DSP_CHANNELS, &mut ch) } == -1 {
        return Err(close_err(fd, format!("{}: setting channels failed", path)));
    }
    // The device must accept exactly the requested channel count.
    if ch != channels as libc::c_int {
        return Err(close_err(
            fd,
            format!("{}: wanted {} channels, device gave {}", path, channels, ch),
        ));
    }

    let mut speed = rate as libc::c_int;
    if unsafe { libc::ioctl(fd, SNDCTL_DSP_SPEED, &mut speed) } == -1 {
        return Err(close_err(fd, format!("{}: setting sample rate failed", path)));
    }
    if speed != rate as libc::c_int {
        return Err(close_err(
            fd,
            format!("{}: wanted {} Hz, device gave {}", path, rate, speed),
        ));
    }

    Ok((fd, channels))
}

/// Capture side of the sound device.
pub struct AudioIn {
    fd: RawFd,
    channels: u32,
}

impl AudioIn {
    /// Open `path` for capture at `rate` with the given channel count
    /// (mono or stereo; only the left channel is kept).
    pub fn open(path: &str, rate: u32, channels: u32) -> Result<Self> {
        let (fd, channels) = open_dsp(path, Direction::Capture, rate, channels)?;
        log::info!("audio capture open on {} at {} Hz", path, rate);
        Ok(AudioIn { fd, channels })
    }

    /// Blocking read of up to `out.len()` left-channel samples.
    /// Returns the number of samples produced.
    pub fn read(&mut self, out: &mut [i16]) -> Result<usize> {
        let mut raw = vec![0i16; out.len() * self.channels as usize];
        let n = unsafe {
            libc::read(
                self.fd,
                raw.as_mut_ptr().cast::<libc::c_void>(),
                raw.len() * std::mem::size_of::<i16>(),
            )
        };
        if n == -1 {
            return Err(Error::NoDevice);
        }
        let frames = n as usize / std::mem::size_of::<i16>() / self.channels as usize;
        for (i, s) in out.iter_mut().take(frames).enumerate() {
            *s = raw[i * self.channels as usize];
        }
        Ok(frames)
    }
}

impl Drop for AudioIn {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

/// Playback side of the sound device.
pub struct AudioOut {
    fd: RawFd,
}

impl AudioOut {
    /// Open `path` for mono playback at `rate`.
    pub fn open(path: &str, rate: u32) -> Result<Self> {
        let (fd, _) = open_dsp(path, Direction::Playback, rate, 1)?;
        log::info!("audio playback open on {} at {} Hz", path, rate);
        Ok(AudioOut { fd })
    }
}

impl AudioSink for AudioOut {
    fn write_samples(&mut self, samples: &[i16]) -> Result<()> {
        let bytes = std::mem::size_of_val(samples);
        let mut sent = 0usize;
        while sent < bytes {
            let n = unsafe {
                libc::write(
                    self.fd,
                    samples.as_ptr().cast::<u8>().add(sent).cast::<libc::c_void>(),
                    bytes - sent,
                )
            };
            if n == -1 {
                return Err(Error::NoDevice);
            }
            sent += n as usize;
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        if unsafe { libc::ioctl(self.fd, SNDCTL_DSP_SYNC, std::ptr::null_mut::<libc::c_void>()) }
            == -1
        {
            return Err(Error::NoDevice);
        }
        Ok(())
    }
}

impl Drop for AudioOut {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

/// Circular buffer of signed 16-bit samples.
///
/// Empty when head equals tail, so one slot is always sacrificed.
/// Overrunning the reader is an unrecoverable internal error: the
/// demodulator's timing assumptions are gone once samples are lost.
#[derive(Debug)]
pub struct SampleRing {
    buf: Vec<i16>,
    head: usize,
    tail: usize,
}

impl SampleRing {
    /// A ring holding up to `capacity` samples.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        SampleRing {
            buf: vec![0; capacity + 1],
            head: 0,
            tail: 0,
        }
    }

    /// Free slots remaining.
    #[must_use]
    pub fn available(&self) -> usize {
        let max = self.buf.len();
        if self.head >= self.tail {
            max - 1 - (self.head - self.tail)
        } else {
            self.tail - self.head - 1
        }
    }

    /// Samples waiting to be consumed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len() - 1 - self.available()
    }

    /// True when no samples are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Append one sample.
    pub fn push(&mut self, sample: i16) -> Result<()> {
        let next = (self.head + 1) % self.buf.len();
        if next == self.tail {
            return Err(Error::Fatal("sample ring overrun".into()));
        }
        self.buf[self.head] = sample;
        self.head = next;
        Ok(())
    }

    /// Consume the oldest sample. The tail only ever advances.
    pub fn pop(&mut self) -> Option<i16> {
        if self.is_empty() {
            return None;
        }
        let s = self.buf[self.tail];
        self.tail = (self.tail + 1) % self.buf.len();
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_orders_and_counts() {
        let mut ring = SampleRing::new(4);
        assert!(ring.is_empty());
        assert_eq!(ring.available(), 4);
        for i in 0..4i16 {
            ring.push(i).unwrap();
        }
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.available(), 0);
        assert_eq!(ring.pop(), Some(0));
        assert_eq!(ring.pop(), Some(1));
        ring.push(4).unwrap();
        ring.push(5).unwrap();
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), Some(3));
        assert_eq!(ring.pop(), Some(4));
        assert_eq!(ring.pop(), Some(5));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn ring_overrun_is_fatal() {
        let mut ring = SampleRing::new(2);
        ring.push(1).unwrap();
        ring.push(2).unwrap();
        assert!(matches!(ring.push(3), Err(Error::Fatal(_))));
    }

    #[test]
    fn wraparound_keeps_order() {
        let mut ring = SampleRing::new(3);
        for round in 0..10i16 {
            ring.push(round).unwrap();
            assert_eq!(ring.pop(), Some(round));
        }
        assert!(ring.is_empty());
    }
}
