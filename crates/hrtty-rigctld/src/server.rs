// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The readiness loop.
//!
//! One thread, one `mio::Poll`, every listener and connection behind a
//! token. Socket trouble closes only the connection it happened on; the
//! rigs and their reader threads live for the life of the process.

pub mod connection;
pub mod protocol;

use connection::{Connection, IoOutcome};
use hrtty::rig::Rig;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use std::collections::HashMap;
use std::io;
use std::net::ToSocketAddrs;
use std::sync::Arc;

const MAX_EVENTS: usize = 128;

struct Listener {
    socket: TcpListener,
    rig: Arc<Rig>,
}

/// Accept loop and connection registry.
pub struct Server {
    poll: Poll,
    listeners: HashMap<Token, Listener>,
    connections: HashMap<Token, Connection>,
    next_token: usize,
}

impl Server {
    pub fn new() -> io::Result<Self> {
        Ok(Server {
            poll: Poll::new()?,
            listeners: HashMap::new(),
            connections: HashMap::new(),
            next_token: 0,
        })
    }

    fn take_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    /// Bind every address `host:port` resolves to for `rig`. Returns how
    /// many listeners were set up.
    pub fn add_rig_listeners(&mut self, host: &str, port: &str, rig: Arc<Rig>) -> io::Result<usize> {
        let mut count = 0usize;
        let addrs = format!("{}:{}", host, port).to_socket_addrs()?;
        for addr in addrs {
            let mut socket = match TcpListener::bind(addr) {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("bind {} failed: {}", addr, e);
                    continue;
                }
            };
            let token = self.take_token();
            self.poll
                .registry()
                .register(&mut socket, token, Interest::READABLE)?;
            self.listeners.insert(
                token,
                Listener {
                    socket,
                    rig: Arc::clone(&rig),
                },
            );
            count += 1;
        }
        Ok(count)
    }

    fn accept_all(&mut self, token: Token) {
        loop {
            let (stream, peer) = {
                let Some(listener) = self.listeners.get(&token) else {
                    return;
                };
                match listener.socket.accept() {
                    Ok(pair) => pair,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                    Err(e) => {
                        log::warn!("accept failed: {}", e);
                        return;
                    }
                }
            };
            let rig = Arc::clone(&self.listeners[&token].rig);
            let _ = stream.set_nodelay(true);
            let conn_token = self.take_token();
            let mut conn = Connection::accept(stream, rig);
            if let Err(e) = self.poll.registry().register(
                &mut conn.stream,
                conn_token,
                Interest::READABLE | Interest::WRITABLE,
            ) {
                log::warn!("register {} failed: {}", peer, e);
                continue;
            }
            log::info!("accepted connection from {}", peer);
            self.connections.insert(conn_token, conn);
        }
    }

    fn close_connection(&mut self, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            let _ = self.poll.registry().deregister(&mut conn.stream);
            log::info!("closing connection");
        }
    }

    /// Serve until the process is killed.
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(MAX_EVENTS);
        loop {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e);
            }
            for event in events.iter() {
                let token = event.token();
                if self.listeners.contains_key(&token) {
                    self.accept_all(token);
                    continue;
                }
                let mut outcome = IoOutcome::Keep;
                if let Some(conn) = self.connections.get_mut(&token) {
                    if event.is_readable() {
                        outcome = conn.read_ready();
                    }
                    if outcome == IoOutcome::Keep && event.is_writable() && conn.wants_write() {
                        outcome = conn.write_ready();
                    }
                } else {
                    continue;
                }
                if outcome == IoOutcome::Close {
                    self.close_connection(token);
                }
            }
        }
    }
}
