// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UART-FSK transmitter.
//!
//! When the radio does the frequency shifting itself, the 5-bit codes go
//! out a real UART at the symbol rate: 5 data bits, 1.5 stop bits, no
//! parity, with the exact baud fraction programmed where the driver
//! supports it. PTT rides the RTS modem line.
//!
//! The unkey sequence is ordered: end-of-frame code, drain the FIFO,
//! sleep 7.5 symbol times so the last start bit clears the wire, then
//! drop RTS. Skipping the sleep truncates the final character on the
//! air.

use crate::baudot::{self, Charset};
use crate::config::Settings;
use crate::io::{SerialConfig, SerialPort};
use crate::{Error, Result};
use std::time::Duration;

/// One character frame in symbol times: start + five data + 1.5 stop.
const FRAME_SYMBOLS: f64 = 7.5;

/// UART keyer for direct FSK.
pub struct FskKeyer {
    port: SerialPort,
    charset: Charset,
    symbol_seconds: f64,
    write_timeout: u32,
}

impl FskKeyer {
    /// Open and configure the keying UART. RTS and DTR are cleared
    /// immediately so a freshly opened port cannot key the transmitter.
    pub fn open(settings: &Settings) -> Result<Self> {
        let speed = settings.baud_numerator / settings.baud_denominator;
        let cfg = SerialConfig::fsk_keying(&settings.tty_name, speed);
        let port = SerialPort::open(&cfg)?;
        port.clear_modem_lines()?;
        port.set_fractional_baud(settings.baud_numerator, settings.baud_denominator)?;
        port.clear_modem_lines()?;
        let charset = Charset::from_index(settings.charset).ok_or_else(|| {
            Error::InvalidArgument(format!("charset index {} out of range", settings.charset))
        })?;
        Ok(FskKeyer {
            port,
            charset,
            symbol_seconds: settings.symbol_seconds(),
            write_timeout: 1_000,
        })
    }

    fn sleep_symbols(&self, symbols: f64) {
        std::thread::sleep(Duration::from_secs_f64(self.symbol_seconds * symbols));
    }

    /// Key the transmitter and send the LTRS/CR/LF preamble so the far
    /// end's shift state and carriage are known.
    pub fn ptt_on(&self) -> Result<()> {
        self.port.set_rts(true)?;
        let cr = baudot::ascii_to_baudot(self.charset, b'\r', false).unwrap_or(0x08) & 0x1f;
        let lf = baudot::ascii_to_baudot(self.charset, b'\n', false).unwrap_or(0x02) & 0x1f;
        self.port.write_all(
            &[baudot::LTRS, baudot::LTRS, baudot::LTRS, cr, lf],
            self.write_timeout,
        )
    }

    /// Unkey: end-of-frame code, drain, one full character of mark, RTS
    /// off.
    pub fn ptt_off(&self) -> Result<()> {
        let eof = baudot::ascii_to_baudot(self.charset, b' ', false).unwrap_or(baudot::SPACE);
        self.port.write_all(&[eof & 0x1f], self.write_timeout)?;
        self.port.drain()?;
        // The UART reports drained before the last start bit has fully
        // cleared the shift register.
        self.sleep_symbols(FRAME_SYMBOLS);
        self.port.set_rts(false)
    }

    /// Whether the transmitter is keyed.
    pub fn ptt(&self) -> Result<bool> {
        self.port.rts()
    }

    /// Hold mark for one character time (preamble between key-up and the
    /// first character).
    pub fn send_preamble(&self) {
        self.sleep_symbols(FRAME_SYMBOLS);
    }

    /// Send one 5-bit code.
    pub fn send_code(&self, code: u8) -> Result<()> {
        self.port.write_all(&[code & 0x1f], self.write_timeout)
    }

    /// Send the codes for a carriage return: the conventional newline
    /// first, then the return itself.
    pub fn send_cr(&self) -> Result<()> {
        let lf = baudot::ascii_to_baudot(self.charset, b'\n', false).unwrap_or(0x02) & 0x1f;
        let cr = baudot::ascii_to_baudot(self.charset, b'\r', false).unwrap_or(0x08) & 0x1f;
        self.port.write_all(&[lf, cr], self.write_timeout)
    }

    /// Discard anything not yet on the wire.
    pub fn flush(&self) -> Result<()> {
        self.port.flush_output()
    }
}
