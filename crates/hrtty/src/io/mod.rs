// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Serial abstraction and the per-rig read thread.
//!
//! One [`IoHandle`] owns one reader thread that frames bytes from the
//! port into responses and routes each frame to exactly one consumer:
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                       reader thread                          |
//! |   read_frame() --+--> pending waiter (prefix match)          |
//! |                  +--> async sink    (everything else)        |
//! +--------------------------------------------------------------+
//!          ^                               |
//!   transact(): install waiter,     unsolicited frames
//!   write command, block on reply   (e.g. Kenwood AI-mode IF)
//! ```
//!
//! Synchronous callers serialize on an outer lock held for the whole
//! request/response pair, so commands to one rig are totally ordered.
//! A read timeout while a waiter is pending fails that waiter; with no
//! waiter pending a timeout is simply an idle line.

pub mod serial;

use crate::{Error, Result};
use crossbeam::channel::{bounded, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

pub use serial::{DataBits, Flow, Parity, SerialConfig, SerialPort, StopBits};

/// One framed response from the device, owned by whoever it was routed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoResponse(pub Vec<u8>);

impl IoResponse {
    /// Response length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for a zero-length frame (never produced by the framers).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The response as text, for ASCII dialects.
    #[must_use]
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("")
    }
}

/// Byte-level access to the rig line. Implemented by [`SerialPort`];
/// tests script one in memory.
pub trait Port: Send + Sync {
    /// Wait until a byte may be read; `Ok(false)` on timeout.
    fn wait_read(&self, timeout_ms: u32) -> Result<bool>;
    /// Read one byte, bounded by `timeout_ms`.
    fn read_byte(&self, timeout_ms: u32) -> Result<u8>;
    /// Write all bytes, each chunk bounded by `timeout_ms`, then drain.
    fn write(&self, buf: &[u8], timeout_ms: u32) -> Result<()>;
}

impl Port for SerialPort {
    fn wait_read(&self, timeout_ms: u32) -> Result<bool> {
        SerialPort::wait_read(self, timeout_ms)
    }

    fn read_byte(&self, timeout_ms: u32) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b, timeout_ms)?;
        Ok(b[0])
    }

    fn write(&self, buf: &[u8], timeout_ms: u32) -> Result<()> {
        self.write_all(buf, timeout_ms)?;
        self.drain()
    }
}

/// How the dialect frames responses on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Variable length, ended by a terminator byte (Kenwood `;`).
    Terminated(u8),
    /// Fixed frame length (Yaesu binary CAT: five bytes).
    Fixed(usize),
}

/// Read one complete frame.
///
/// The wait for the first byte is bounded by `response_timeout`; each
/// subsequent byte by `char_timeout`.
pub fn read_frame(
    port: &dyn Port,
    framing: Framing,
    response_timeout: u32,
    char_timeout: u32,
) -> Result<IoResponse> {
    match framing {
        Framing::Terminated(term) => {
            if !port.wait_read(response_timeout)? {
                return Err(Error::Timeout);
            }
            let mut buf = Vec::with_capacity(64);
            loop {
                let b = port.read_byte(char_timeout)?;
                buf.push(b);
                if b == term {
                    return Ok(IoResponse(buf));
                }
            }
        }
        Framing::Fixed(len) => {
            let mut buf = Vec::with_capacity(len);
            while buf.len() < len {
                if !port.wait_read(response_timeout)? {
                    return Err(Error::Timeout);
                }
                buf.push(port.read_byte(char_timeout)?);
            }
            Ok(IoResponse(buf))
        }
    }
}

struct Pending {
    /// Expected response prefix; empty matches any frame.
    prefix: Vec<u8>,
    /// Offset into `prefix` where matching starts.
    offset: usize,
    reply: Sender<Option<IoResponse>>,
}

impl Pending {
    fn matches(&self, resp: &IoResponse) -> bool {
        let want = &self.prefix[self.offset.min(self.prefix.len())..];
        resp.0.len() >= want.len() && &resp.0[..want.len()] == want
    }
}

struct Shared {
    pending: Mutex<Option<Pending>>,
    terminate: AtomicBool,
}

/// Callback invoked for every frame no synchronous waiter claimed.
pub type AsyncSink = Box<dyn Fn(IoResponse) + Send + Sync>;

/// Owning handle for one rig line: the port, the reader thread, and the
/// response-correlation state.
pub struct IoHandle {
    port: Arc<dyn Port>,
    shared: Arc<Shared>,
    sync_lock: Mutex<()>,
    reader: Option<JoinHandle<()>>,
}

impl IoHandle {
    /// Spawn the reader thread for `port`.
    #[must_use]
    pub fn start(
        port: Arc<dyn Port>,
        framing: Framing,
        response_timeout: u32,
        char_timeout: u32,
        sink: AsyncSink,
    ) -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(None),
            terminate: AtomicBool::new(false),
        });
        let reader = {
            let port = Arc::clone(&port);
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("hrtty-rig-io".to_string())
                .spawn(move || {
                    read_loop(&*port, framing, response_timeout, char_timeout, &shared, &sink);
                })
                .expect("spawning rig reader thread")
        };
        IoHandle {
            port,
            shared,
            sync_lock: Mutex::new(()),
            reader: Some(reader),
        }
    }

    /// Write a command that expects no correlated response.
    pub fn write(&self, cmd: &[u8], timeout_ms: u32) -> Result<()> {
        let _order = self.sync_lock.lock();
        self.port.write(cmd, timeout_ms)
    }

    /// Write a command and block until the reader hands over a response
    /// whose first bytes match `prefix[offset..]`.
    ///
    /// Unsolicited frames observed while waiting are dispatched to the
    /// async sink by the reader before the matching response is returned.
    pub fn transact(
        &self,
        cmd: &[u8],
        prefix: &[u8],
        offset: usize,
        timeout_ms: u32,
    ) -> Result<IoResponse> {
        let _order = self.sync_lock.lock();
        let (tx, rx) = bounded(1);
        *self.shared.pending.lock() = Some(Pending {
            prefix: prefix.to_vec(),
            offset,
            reply: tx,
        });
        if let Err(e) = self.port.write(cmd, timeout_ms) {
            *self.shared.pending.lock() = None;
            return Err(e);
        }
        match rx.recv() {
            Ok(Some(resp)) => Ok(resp),
            Ok(None) | Err(_) => Err(Error::NoDevice),
        }
    }

    /// Ask the reader to stop and join it.
    pub fn stop(&mut self) {
        self.shared.terminate.store(true, Ordering::Relaxed);
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for IoHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_loop(
    port: &dyn Port,
    framing: Framing,
    response_timeout: u32,
    char_timeout: u32,
    shared: &Shared,
    sink: &AsyncSink,
) {
    while !shared.terminate.load(Ordering::Relaxed) {
        // Only a waiter that was already pending when this read began may
        // be failed by its timeout; one installed mid-read gets a full
        // window on the next pass.
        let had_waiter = shared.pending.lock().is_some();
        match read_frame(port, framing, response_timeout, char_timeout) {
            Ok(resp) => {
                let claimed = {
                    let mut pending = shared.pending.lock();
                    match pending.as_ref() {
                        Some(p) if p.matches(&resp) => pending.take(),
                        _ => None,
                    }
                };
                match claimed {
                    Some(p) => {
                        let _ = p.reply.send(Some(resp));
                    }
                    None => sink(resp),
                }
            }
            Err(Error::Timeout) => {
                if had_waiter {
                    if let Some(p) = shared.pending.lock().take() {
                        let _ = p.reply.send(None);
                    }
                }
            }
            Err(e) => {
                log::warn!("rig line read failed: {}", e);
                if let Some(p) = shared.pending.lock().take() {
                    let _ = p.reply.send(None);
                }
            }
        }
    }
}

/// Scripted in-memory [`Port`] for driver tests; no hardware involved.
#[doc(hidden)]
pub mod testutil {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted in-memory port. Reads pop bytes from a queue; writes are
    /// recorded and may trigger a canned reply keyed by command prefix.
    pub struct MockPort {
        inner: Mutex<MockInner>,
    }

    pub struct MockInner {
        pub rx: VecDeque<u8>,
        pub writes: Vec<Vec<u8>>,
        pub replies: Vec<(Vec<u8>, Vec<u8>)>,
    }

    impl MockPort {
        pub fn new() -> Arc<Self> {
            Arc::new(MockPort {
                inner: Mutex::new(MockInner {
                    rx: VecDeque::new(),
                    writes: Vec::new(),
                    replies: Vec::new(),
                }),
            })
        }

        /// Queue raw bytes as if the rig had sent them unprompted.
        pub fn push_unsolicited(&self, bytes: &[u8]) {
            self.inner.lock().rx.extend(bytes.iter().copied());
        }

        /// Arrange for any write starting with `cmd_prefix` to enqueue
        /// `reply` on the read side.
        pub fn on_write(&self, cmd_prefix: &[u8], reply: &[u8]) {
            self.inner
                .lock()
                .replies
                .push((cmd_prefix.to_vec(), reply.to_vec()));
        }

        pub fn writes(&self) -> Vec<Vec<u8>> {
            self.inner.lock().writes.clone()
        }

        pub fn write_count(&self) -> usize {
            self.inner.lock().writes.len()
        }
    }

    impl Port for MockPort {
        fn wait_read(&self, timeout_ms: u32) -> Result<bool> {
            // Poll the queue briefly rather than sleeping the full
            // timeout, so tests stay fast.
            let deadline = std::time::Instant::now()
                + std::time::Duration::from_millis(u64::from(timeout_ms.min(50)));
            loop {
                if !self.inner.lock().rx.is_empty() {
                    return Ok(true);
                }
                if std::time::Instant::now() >= deadline {
                    return Ok(false);
                }
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
        }

        fn read_byte(&self, timeout_ms: u32) -> Result<u8> {
            if !self.wait_read(timeout_ms)? {
                return Err(Error::Timeout);
            }
            Ok(self.inner.lock().rx.pop_front().expect("byte available"))
        }

        fn write(&self, buf: &[u8], _timeout_ms: u32) -> Result<()> {
            let mut inner = self.inner.lock();
            inner.writes.push(buf.to_vec());
            let reply = inner
                .replies
                .iter()
                .find(|(prefix, _)| buf.starts_with(prefix))
                .map(|(_, r)| r.clone());
            if let Some(r) = reply {
                inner.rx.extend(r.iter().copied());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::MockPort;
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn terminated_framing_splits_on_semicolon() {
        let port = MockPort::new();
        port.push_unsolicited(b"FA00014250000;IF123;");
        let f1 = read_frame(&*port, Framing::Terminated(b';'), 100, 50).unwrap();
        assert_eq!(f1.0, b"FA00014250000;");
        let f2 = read_frame(&*port, Framing::Terminated(b';'), 100, 50).unwrap();
        assert_eq!(f2.0, b"IF123;");
    }

    #[test]
    fn fixed_framing_reads_exact_length() {
        let port = MockPort::new();
        port.push_unsolicited(&[1, 2, 3, 4, 5, 6]);
        let f = read_frame(&*port, Framing::Fixed(5), 100, 50).unwrap();
        assert_eq!(f.0, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn frame_timeout_is_reported() {
        let port = MockPort::new();
        assert!(matches!(
            read_frame(&*port, Framing::Terminated(b';'), 10, 10),
            Err(Error::Timeout)
        ));
    }

    #[test]
    fn matching_response_goes_to_the_waiter_only() {
        let port = MockPort::new();
        port.on_write(b"FA;", b"FA00014250000;");
        let sink_hits = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&sink_hits);
        let handle = IoHandle::start(
            port.clone(),
            Framing::Terminated(b';'),
            200,
            50,
            Box::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let resp = handle.transact(b"FA;", b"FA", 0, 100).unwrap();
        assert_eq!(resp.0, b"FA00014250000;");
        assert_eq!(sink_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsolicited_frames_reach_the_sink_before_the_match() {
        let port = MockPort::new();
        let seen = Arc::new(Mutex::new(Vec::<Vec<u8>>::new()));
        let sink_seen = Arc::clone(&seen);
        let handle = IoHandle::start(
            port.clone(),
            Framing::Terminated(b';'),
            200,
            50,
            Box::new(move |resp| {
                sink_seen.lock().push(resp.0);
            }),
        );
        // The rig volunteers an IF frame, then answers the FB query.
        port.on_write(b"FB;", b"IF00014250000;FB00007100000;");
        let resp = handle.transact(b"FB;", b"FB", 0, 100).unwrap();
        assert_eq!(resp.0, b"FB00007100000;");
        assert_eq!(seen.lock().as_slice(), &[b"IF00014250000;".to_vec()]);
    }

    #[test]
    fn timeout_during_wait_fails_the_caller() {
        let port = MockPort::new();
        let handle = IoHandle::start(
            port.clone(),
            Framing::Terminated(b';'),
            20,
            10,
            Box::new(|_| {}),
        );
        assert!(matches!(
            handle.transact(b"ID;", b"ID", 0, 50),
            Err(Error::NoDevice)
        ));
    }

    #[test]
    fn every_frame_is_delivered_exactly_once() {
        let port = MockPort::new();
        let sink_count = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&sink_count);
        let handle = IoHandle::start(
            port.clone(),
            Framing::Terminated(b';'),
            200,
            50,
            Box::new(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            }),
        );
        port.on_write(b"FA;", b"XX1;XX2;FA1;");
        let resp = handle.transact(b"FA;", b"FA", 0, 100).unwrap();
        assert_eq!(resp.0, b"FA1;");
        // Give the reader a moment to notice the line is idle again.
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(sink_count.load(Ordering::SeqCst), 2);
        drop(handle);
    }
}
