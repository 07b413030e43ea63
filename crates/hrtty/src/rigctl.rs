// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Line-protocol client for an hrtty-rigctld daemon.
//!
//! The terminal uses this to follow the dial and to key PTT through the
//! rig instead of the RTS line. Exchanges are tiny ASCII commands with
//! newline-terminated replies over a keep-alive TCP connection.

use crate::{Error, Result};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Connected rigctld client.
pub struct RigctlClient {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl RigctlClient {
    /// Connect to `host:port`.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).map_err(|_| Error::NoDevice)?;
        stream.set_nodelay(true).ok();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .ok();
        let reader = BufReader::new(stream.try_clone().map_err(|_| Error::NoDevice)?);
        log::info!("rigctld connected at {}:{}", host, port);
        Ok(RigctlClient { stream, reader })
    }

    fn send_line(&mut self, line: &str) -> Result<()> {
        self.stream
            .write_all(line.as_bytes())
            .map_err(|_| Error::NoDevice)
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).map_err(|_| Error::NoDevice)?;
        if n == 0 {
            return Err(Error::NoDevice);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    /// Current frequency in Hz.
    pub fn get_frequency(&mut self) -> Result<u64> {
        self.send_line("f\n")?;
        let line = self.read_line()?;
        line.parse()
            .map_err(|_| Error::Protocol(format!("bad frequency reply {:?}", line)))
    }

    /// Current frequency and mode name (the bandwidth line is read and
    /// dropped).
    pub fn get_frequency_mode(&mut self) -> Result<(u64, String)> {
        self.send_line("fm\n")?;
        let freq_line = self.read_line()?;
        let mode = self.read_line()?;
        let _bandwidth = self.read_line()?;
        let freq = freq_line
            .parse()
            .map_err(|_| Error::Protocol(format!("bad frequency reply {:?}", freq_line)))?;
        Ok((freq, mode))
    }

    /// Whether the rig is transmitting.
    pub fn get_ptt(&mut self) -> Result<bool> {
        self.send_line("t\n")?;
        Ok(self.read_line()?.starts_with('1'))
    }

    /// Key or unkey, then poll until the rig reports the new state (some
    /// radios take a moment to switch over).
    pub fn set_ptt(&mut self, tx: bool) -> Result<bool> {
        self.send_line(&format!("T {}\n", i32::from(tx)))?;
        let reply = self.read_line()?;
        let ok = reply == "RPRT 0";
        if ok {
            for _ in 0..200 {
                if self.get_ptt()? == tx {
                    break;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
        }
        Ok(ok)
    }
}

/// Render a frequency for the status line: thousands groups separated by
/// dots, truncated with a metric prefix when it will not fit 11 digits.
#[must_use]
pub fn format_freq(freq: u64) -> String {
    const PREFIXES: &[u8] = b" kMGTPEZY";
    let mut text = if freq == 0 {
        String::new()
    } else {
        let digits = freq.to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }
        grouped
    };
    let mut prefix = 0usize;
    while text.len() > 11 {
        let dot = text.rfind('.').expect("grouped digits contain a dot");
        text.truncate(dot);
        prefix += 1;
    }
    text.push(PREFIXES[prefix] as char);
    text.push_str("Hz");
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_hf_frequency() {
        assert_eq!(format_freq(14_250_000), "14.250.000 Hz");
        assert_eq!(format_freq(7_050_500), "7.050.500 Hz");
    }

    #[test]
    fn formats_zero_as_bare_unit() {
        assert_eq!(format_freq(0), " Hz");
    }

    #[test]
    fn truncates_with_metric_prefix() {
        // Twelve digits of hertz will not fit; drop to kilohertz.
        assert_eq!(format_freq(123_456_789_012), "123.456.789kHz");
    }
}
