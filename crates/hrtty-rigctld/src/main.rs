// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Rig-control network daemon.
//!
//! Each `[section]` of the configuration file that carries a
//! `rigctld_address` gets its rig brought up and one or more listening
//! sockets bound; a single poll loop then serves the line protocol to
//! every client. Exit status is 0 on clean shutdown, 1 when setup fails
//! (bad configuration, no rigs, nothing listening).

mod logging;
mod server;

use hrtty::config::Ini;
use hrtty::rig::models;
use std::process::ExitCode;
use std::sync::Arc;

fn usage(program: &str) {
    eprintln!("Usage:\n{} -c <config>\n\nWhere <config> is the path to the ini file", program);
}

fn run(config_path: &str) -> Result<(), String> {
    let mut ini = Ini::load(config_path).map_err(|e| e.to_string())?;

    let sections: Vec<String> = ini
        .section_names()
        .iter()
        .map(|s| (*s).to_string())
        .collect();
    if sections.is_empty() {
        return Err("no rigs found in configuration".to_string());
    }

    let mut server = server::Server::new().map_err(|e| e.to_string())?;
    let mut listener_count = 0usize;
    for section in &sections {
        let Some(addr) = ini.get(section, "rigctld_address").map(str::to_string) else {
            continue;
        };
        let port = ini.get_str(section, "rigctld_port", "4532").to_string();
        let rig = match models::build_rig(&mut ini, section) {
            Ok(rig) => Arc::new(rig),
            Err(e) => {
                log::error!("[{}] rig setup failed: {}", section, e);
                continue;
            }
        };
        match server.add_rig_listeners(&addr, &port, rig) {
            Ok(n) => {
                log::info!("[{}] listening on {}:{} ({} sockets)", section, addr, port, n);
                listener_count += n;
            }
            Err(e) => log::error!("[{}] cannot listen on {}:{}: {}", section, addr, port, e),
        }
    }

    if listener_count == 0 {
        return Err("unable to set up any sockets".to_string());
    }
    server.run().map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<&str> = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-c" => {
                i += 1;
                if i >= args.len() {
                    usage(&args[0]);
                    return ExitCode::from(1);
                }
                config_path = Some(&args[i]);
            }
            _ => {
                usage(&args[0]);
                return ExitCode::from(1);
            }
        }
        i += 1;
    }
    let Some(config_path) = config_path else {
        usage(&args[0]);
        return ExitCode::from(1);
    };

    match run(config_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(1)
        }
    }
}
