// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One accepted client: socket, buffers, and virtual dial state.

use super::protocol::{self, VfoState};
use hrtty::rig::Rig;
use mio::net::TcpStream;
use std::io::{Read, Write};
use std::sync::Arc;

/// Per-connection state. The receive buffer grows with partial lines;
/// the transmit buffer drains as the socket accepts bytes.
pub struct Connection {
    pub stream: TcpStream,
    rig: Arc<Rig>,
    rx_buf: Vec<u8>,
    tx_buf: Vec<u8>,
    tx_pos: usize,
    vfo: VfoState,
}

/// What the event loop should do with the connection afterwards.
#[derive(Debug, PartialEq, Eq)]
pub enum IoOutcome {
    Keep,
    Close,
}

impl Connection {
    /// Wrap an accepted socket and probe the rig so the virtual dial
    /// cache starts truthful.
    pub fn accept(stream: TcpStream, rig: Arc<Rig>) -> Self {
        let mut vfo = VfoState::default();
        vfo.seed(&rig);
        Connection {
            stream,
            rig,
            rx_buf: Vec::new(),
            tx_buf: Vec::new(),
            tx_pos: 0,
            vfo,
        }
    }

    /// Bytes queued and not yet written.
    #[must_use]
    pub fn wants_write(&self) -> bool {
        self.tx_pos < self.tx_buf.len()
    }

    /// Drain readable bytes, execute any complete lines, queue replies.
    pub fn read_ready(&mut self) -> IoOutcome {
        let mut chunk = [0u8; 1_024];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return IoOutcome::Close,
                Ok(n) => self.rx_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => return IoOutcome::Close,
            }
        }
        while let Some(nl) = self.rx_buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.rx_buf.drain(..=nl).collect();
            let line = &line[..line.len() - 1];
            log::debug!("rx: {}", String::from_utf8_lossy(line));
            let mut reply = Vec::new();
            protocol::execute_line(line, &mut self.vfo, &self.rig, &mut reply);
            log::debug!("tx: {}", String::from_utf8_lossy(&reply));
            self.tx_buf.extend_from_slice(&reply);
        }
        // Push what we can right away; the rest goes out on writability.
        self.write_ready()
    }

    /// Flush pending transmit bytes.
    pub fn write_ready(&mut self) -> IoOutcome {
        while self.tx_pos < self.tx_buf.len() {
            match self.stream.write(&self.tx_buf[self.tx_pos..]) {
                Ok(0) => return IoOutcome::Close,
                Ok(n) => self.tx_pos += n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return IoOutcome::Keep,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => return IoOutcome::Close,
            }
        }
        self.tx_buf.clear();
        self.tx_pos = 0;
        IoOutcome::Keep
    }
}
