// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # HRTTY - Software-defined RTTY terminal core
//!
//! A pure Rust implementation of a Baudot radio-teletype terminal with
//! integrated amateur-radio transceiver control. The crate demodulates
//! two-tone FSK audio into characters, renders characters as
//! phase-continuous AFSK audio or keys them through a 45-baud UART, and
//! drives Kenwood-HF / Yaesu-binary-CAT transceivers over a serial line.
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                        Terminal Engine                              |
//! |   RX decode (shift/USOS) | TX encode | macros | rigctld client      |
//! +---------------------------------------------------------------------+
//! |                          Signal Layer                               |
//! |   Demodulator (matched FIR + envelope) | AFSK modulator | FSK UART  |
//! +---------------------------------------------------------------------+
//! |                           Rig Layer                                 |
//! |   Command tables | response router | IF cache | band-limit guard    |
//! +---------------------------------------------------------------------+
//! |                          Device Layer                               |
//! |   OSS sound device | termios serial port | reader thread            |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`terminal::Engine`] | Receive/transmit glue the UI drives |
//! | [`demod::Demodulator`] | Audio samples in, 5-bit Baudot codes out |
//! | [`afsk::AfskModulator`] | Baudot codes in, shaped two-tone PCM out |
//! | [`rig::Rig`] | One transceiver with its dialect driver |
//! | [`io::IoHandle`] | Serial reader thread with response correlation |
//!
//! The curses UI, the XML-RPC HTTP layer, and process wiring live outside
//! this crate; [`terminal::Engine`] exposes the operations they call.

/// AFSK modulator (pre-rendered half-bit waveforms, phase-continuous emission).
pub mod afsk;
/// OSS sound device access and the typed sample ring.
pub mod audio;
/// Baudot character tables (ITA2, USTTY, ITA2 strict).
pub mod baudot;
/// Flat INI configuration loader and the terminal settings.
pub mod config;
/// FSK demodulator (synchronization, bit sampling, frame assembly).
pub mod demod;
/// Filter primitives (biquad IIR, matched FIR).
pub mod dsp;
/// UART-FSK transmitter (fractional baud, PTT and drain discipline).
pub mod fsk;
/// Serial abstraction and the per-rig read thread / response router.
pub mod io;
/// Transceiver-control engine (Kenwood HF, Yaesu binary CAT, models).
pub mod rig;
/// Line-protocol client for an hrtty-rigctld daemon.
pub mod rigctl;
/// Terminal engine: RX/TX character flow, macros, remote-control surface.
pub mod terminal;

/// Errors surfaced by hrtty operations.
///
/// The demodulator never returns errors (bad frames are dropped); the
/// modulator treats encoder misuse as [`Error::Fatal`]; the rig engine
/// surfaces device and argument failures to its callers.
#[derive(Debug)]
pub enum Error {
    /// Bad user input: frequency outside the band-limit lists, unsupported mode.
    InvalidArgument(String),
    /// Operation absent from this rig's capability set.
    NotSupported,
    /// Serial/socket/audio device I/O failed or was lost.
    NoDevice,
    /// A bounded wait for bytes or readiness expired.
    Timeout,
    /// Parse failure on a rig response or a network command line.
    Protocol(String),
    /// Setup-time or invariant violation (undersized window, device mismatch).
    Fatal(String),
    /// Underlying I/O error.
    Io(std::io::Error),
}

impl Error {
    /// Conventional positive error number for the rig-control line protocol
    /// (`RPRT -<n>`).
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Error::InvalidArgument(_) => libc::EINVAL,
            Error::NotSupported => libc::ENOTSUP,
            Error::NoDevice => libc::ENODEV,
            Error::Timeout => libc::ETIMEDOUT,
            Error::Protocol(_) => libc::EPROTO,
            Error::Fatal(_) | Error::Io(_) => libc::EIO,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::NotSupported => write!(f, "Operation not supported by this rig"),
            Error::NoDevice => write!(f, "Device I/O failed or device lost"),
            Error::Timeout => write!(f, "Timed out waiting for device"),
            Error::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            Error::Fatal(msg) => write!(f, "Fatal: {}", msg),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Convenient alias for results using the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_is_stable() {
        let e = Error::InvalidArgument("14.250 MHz outside tx limits".into());
        assert!(e.to_string().contains("outside tx limits"));
        assert_eq!(Error::NotSupported.errno(), libc::ENOTSUP);
        assert_eq!(Error::NoDevice.errno(), libc::ENODEV);
    }

    #[test]
    fn io_error_source_is_preserved() {
        use std::error::Error as _;
        let e = Error::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"));
        assert!(e.source().is_some());
    }
}
