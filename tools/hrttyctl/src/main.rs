// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Line-protocol probe for an hrtty-rigctld daemon.
//!
//! With command words on the command line it sends one request and
//! prints the reply; without any it reads commands from stdin, one per
//! line, until EOF.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

fn print_replies(stream: &TcpStream) {
    // The protocol does not frame reply counts; read until the line goes
    // quiet.
    let mut reader = BufReader::new(stream);
    let mut buf = [0u8; 4_096];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => print!("{}", String::from_utf8_lossy(&buf[..n])),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                return;
            }
            Err(e) => {
                eprintln!("read error: {}", e);
                return;
            }
        }
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut addr = "127.0.0.1:4532".to_string();
    let mut command_start = 1;
    if args.len() > 2 && args[1] == "-a" {
        addr = args[2].clone();
        command_start = 3;
    }

    let mut stream = match TcpStream::connect(&addr) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("unable to connect to {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    stream.set_nodelay(true).ok();
    stream
        .set_read_timeout(Some(Duration::from_millis(500)))
        .ok();

    if command_start < args.len() {
        let line = args[command_start..].join(" ");
        if stream.write_all(format!("{}\n", line).as_bytes()).is_err() {
            eprintln!("send failed");
            std::process::exit(1);
        }
        print_replies(&stream);
        return;
    }

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.is_empty() {
            continue;
        }
        if stream.write_all(format!("{}\n", line).as_bytes()).is_err() {
            eprintln!("send failed");
            std::process::exit(1);
        }
        print_replies(&stream);
    }
}
