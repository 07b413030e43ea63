// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Rig model registry.
//!
//! A model entry is configuration: serial-line defaults, band-limit
//! defaults, the capability bitsets, per-command pacing, and the
//! bring-up sequence. The protocol work all lives in the dialect
//! drivers; adding a rig that speaks an existing dialect is a table
//! entry here.

use super::kenwood_hf::{KenwoodHf, KhfCmd, KhfTimeouts};
use super::yaesu_cat::{YaesuBinCat, YbcCmd, YbcTimeouts};
use super::{CommandSet, ModeSet, Rig, RigDriver, RigMode, Vfo, VfoSet};
use crate::config::Ini;
use crate::io::{Flow, Parity, Port, SerialConfig, SerialPort, StopBits};
use crate::{Error, Result};
use std::sync::Arc;

/// Model names accepted in a `rig =` configuration line.
pub const SUPPORTED_RIGS: &[&str] = &[
    "TS-140S", "TS-680S", "TS-711A", "TS-711E", "TS-811A", "TS-811B", "TS-811E", "FT-736R",
];

fn serial_defaults(ini: &mut Ini, section: &str) {
    ini.set_default(section, "speed", "4800");
    ini.set_default(section, "databits", "8");
    ini.set_default(section, "stopbits", "2");
    ini.set_default(section, "parity", "None");
    ini.set_default(section, "flow", "CTSRTS");
}

fn ts140s_defaults(ini: &mut Ini, section: &str, model: &str) {
    serial_defaults(ini, section);
    ini.set_default(section, "rx_bandlimit_low_hf", "500000");
    ini.set_default(section, "rx_bandlimit_high_hf", "30000000");
    for (band, low, high) in [
        ("160m", "1800000", "2000000"),
        ("80m", "3500000", "4000000"),
        ("40m", "7000000", "7300000"),
        ("30m", "10100000", "10150000"),
        ("20m", "14000000", "14350000"),
        ("17m", "18068000", "18168000"),
        ("15m", "21000000", "21450000"),
        ("12m", "24890000", "24990000"),
        ("10m", "28000000", "29700000"),
    ] {
        ini.set_default(section, &format!("tx_bandlimit_low_{}", band), low);
        ini.set_default(section, &format!("tx_bandlimit_high_{}", band), high);
    }
    if model == "TS-680S" {
        ini.set_default(section, "rx_bandlimit_low_6m", "50000000");
        ini.set_default(section, "rx_bandlimit_high_6m", "54000000");
        ini.set_default(section, "tx_bandlimit_low_6m", "50000000");
        ini.set_default(section, "tx_bandlimit_high_6m", "54000000");
    }
}

fn ts711a_defaults(ini: &mut Ini, section: &str, model: &str) {
    serial_defaults(ini, section);
    let (band, low, high) = match model {
        "TS-711A" => ("2m", "144000000", "148000000"),
        "TS-711E" => ("2m", "144000000", "146000000"),
        "TS-811A" => ("70cm", "430000000", "450000000"),
        _ => ("70cm", "430000000", "440000000"),
    };
    for dir in ["rx", "tx"] {
        ini.set_default(section, &format!("{}_bandlimit_low_{}", dir, band), low);
        ini.set_default(section, &format!("{}_bandlimit_high_{}", dir, band), high);
    }
}

fn ft736r_defaults(ini: &mut Ini, section: &str) {
    serial_defaults(ini, section);
    for dir in ["rx", "tx"] {
        ini.set_default(section, &format!("{}_bandlimit_low_2m", dir), "144000000");
        ini.set_default(section, &format!("{}_bandlimit_high_2m", dir), "147999990");
        ini.set_default(section, &format!("{}_bandlimit_low_70cm", dir), "430000000");
        ini.set_default(section, &format!("{}_bandlimit_high_70cm", dir), "449999990");
    }
}

fn open_port(ini: &Ini, section: &str) -> Result<Arc<dyn Port>> {
    let path = ini
        .get(section, "port")
        .ok_or_else(|| Error::InvalidArgument(format!("[{}] has no port", section)))?;
    let data_bits = match ini.get_int(section, "databits", 8) {
        5 => crate::io::DataBits::Five,
        6 => crate::io::DataBits::Six,
        7 => crate::io::DataBits::Seven,
        8 => crate::io::DataBits::Eight,
        other => {
            return Err(Error::InvalidArgument(format!(
                "[{}] databits {} unsupported",
                section, other
            )))
        }
    };
    let stop_bits = match ini.get_int(section, "stopbits", 2) {
        1 => StopBits::One,
        2 => StopBits::Two,
        other => {
            return Err(Error::InvalidArgument(format!(
                "[{}] stopbits {} unsupported",
                section, other
            )))
        }
    };
    let parity = match ini
        .get_str(section, "parity", "N")
        .chars()
        .next()
        .unwrap_or('N')
        .to_ascii_uppercase()
    {
        'N' => Parity::None,
        'O' => Parity::Odd,
        'E' => Parity::Even,
        other => {
            return Err(Error::InvalidArgument(format!(
                "[{}] parity {:?} unsupported",
                section, other
            )))
        }
    };
    let flow = match ini
        .get_str(section, "flow", "N")
        .chars()
        .next()
        .unwrap_or('N')
        .to_ascii_uppercase()
    {
        'N' => Flow::None,
        'C' => Flow::Cts,
        other => {
            return Err(Error::InvalidArgument(format!(
                "[{}] flow {:?} unsupported",
                section, other
            )))
        }
    };
    let cfg = SerialConfig {
        path: path.to_string(),
        speed: ini.get_int(section, "speed", 4_800) as u32,
        data_bits,
        stop_bits,
        parity,
        flow,
    };
    Ok(Arc::new(SerialPort::open(&cfg)?))
}

fn khf_timeouts(ini: &Ini, section: &str) -> KhfTimeouts {
    KhfTimeouts {
        response_timeout: ini.get_int(section, "response_timeout", 1_000) as u32,
        char_timeout: ini.get_int(section, "char_timeout", 50) as u32,
        send_timeout: ini.get_int(section, "send_timeout", 500) as u32,
        if_lifetime: ini.get_int(section, "cache_lifetime", 1_000) as u64,
        inter_cmd_delay: ini.get_int(section, "inter_cmd_delay", 0) as u64,
    }
}

fn ybc_timeouts(ini: &Ini, section: &str) -> YbcTimeouts {
    YbcTimeouts {
        response_timeout: ini.get_int(section, "response_timeout", 1_000) as u32,
        char_timeout: ini.get_int(section, "char_timeout", 50) as u32,
        send_timeout: ini.get_int(section, "send_timeout", 500) as u32,
        inter_cmd_delay: ini.get_int(section, "inter_cmd_delay", 0) as u64,
    }
}

fn build_ts140s(model: &str, ini: &Ini, section: &str, port: Arc<dyn Port>) -> Result<Rig> {
    let set_cmds = CommandSet::of(&[
        KhfCmd::Ai.id(),
        KhfCmd::Dn.id(),
        KhfCmd::Up.id(),
        KhfCmd::Fa.id(),
        KhfCmd::Fb.id(),
        KhfCmd::Fn.id(),
        KhfCmd::Lk.id(),
        KhfCmd::Mc.id(),
        KhfCmd::Md.id(),
        KhfCmd::Mw.id(),
        KhfCmd::Rc.id(),
        KhfCmd::Rd.id(),
        KhfCmd::Ru.id(),
        KhfCmd::Rt.id(),
        KhfCmd::Rx.id(),
        KhfCmd::Tx.id(),
        KhfCmd::Sc.id(),
        KhfCmd::Sp.id(),
    ]);
    let read_cmds = CommandSet::of(&[
        KhfCmd::Fa.id(),
        KhfCmd::Fb.id(),
        KhfCmd::Id.id(),
        KhfCmd::If.id(),
        KhfCmd::Lk.id(),
        KhfCmd::Mr.id(),
    ]);
    let mut khf = KenwoodHf::start(port, khf_timeouts(ini, section), set_cmds, read_cmds);
    for cmd in [KhfCmd::Fa, KhfCmd::Fb, KhfCmd::Sp] {
        khf.set_cmd_delay(cmd, 200);
    }
    khf.init()?;
    Ok(Rig {
        name: model.to_string(),
        supported_modes: ModeSet::of(&[
            RigMode::Cw,
            RigMode::Cwn,
            RigMode::Am,
            RigMode::Lsb,
            RigMode::Usb,
            RigMode::Fm,
        ]),
        supported_vfos: VfoSet::of(&[Vfo::A, Vfo::B, Vfo::Memory]),
        rx_limits: ini.band_limits(section, false),
        tx_limits: ini.band_limits(section, true),
        has_vfo_select: true,
        has_duplex: false,
        has_squelch: false,
        has_smeter: false,
        driver: RigDriver::KenwoodHf(khf),
    })
}

fn build_ts711a(model: &str, ini: &Ini, section: &str, port: Arc<dyn Port>) -> Result<Rig> {
    let mut set_list = vec![
        KhfCmd::Ai.id(),
        KhfCmd::Dn.id(),
        KhfCmd::Up.id(),
        KhfCmd::Ds.id(),
        KhfCmd::Fa.id(),
        KhfCmd::Fb.id(),
        KhfCmd::Fn.id(),
        KhfCmd::Lk.id(),
        KhfCmd::Mc.id(),
        KhfCmd::Md.id(),
        KhfCmd::Mw.id(),
        KhfCmd::Os.id(),
        KhfCmd::Rc.id(),
        KhfCmd::Rd.id(),
        KhfCmd::Ru.id(),
        KhfCmd::Rt.id(),
        KhfCmd::Rx.id(),
        KhfCmd::Tx.id(),
        KhfCmd::Sc.id(),
        KhfCmd::Sp.id(),
        KhfCmd::St.id(),
        KhfCmd::To.id(),
        KhfCmd::Vr.id(),
    ];
    // The A-suffix models carry a tone board.
    if matches!(model, "TS-711A" | "TS-811A" | "TS-811B") {
        set_list.push(KhfCmd::Tn.id());
    }
    let set_cmds = CommandSet::of(&set_list);
    let read_cmds = CommandSet::of(&[
        KhfCmd::Di.id(),
        KhfCmd::Ds.id(),
        KhfCmd::Fa.id(),
        KhfCmd::Fb.id(),
        KhfCmd::Id.id(),
        KhfCmd::If.id(),
        KhfCmd::Lk.id(),
        KhfCmd::Mr.id(),
    ]);
    let mut khf = KenwoodHf::start(port, khf_timeouts(ini, section), set_cmds, read_cmds);
    for cmd in [KhfCmd::Fa, KhfCmd::Fb, KhfCmd::Sp] {
        khf.set_cmd_delay(cmd, 200);
    }
    khf.init()?;
    Ok(Rig {
        name: model.to_string(),
        supported_modes: ModeSet::of(&[RigMode::Cw, RigMode::Lsb, RigMode::Usb, RigMode::Fm]),
        supported_vfos: VfoSet::of(&[Vfo::A, Vfo::B, Vfo::Memory, Vfo::Com]),
        rx_limits: ini.band_limits(section, false),
        tx_limits: ini.band_limits(section, true),
        has_vfo_select: true,
        has_duplex: false,
        has_squelch: false,
        has_smeter: false,
        driver: RigDriver::KenwoodHf(khf),
    })
}

fn build_ft736r(ini: &Ini, section: &str, port: Arc<dyn Port>) -> Result<Rig> {
    let set_cmds = CommandSet::of(&[
        YbcCmd::CatOn.id(),
        YbcCmd::CatOff.id(),
        YbcCmd::Frequency.id(),
        YbcCmd::Mode.id(),
        YbcCmd::Tx.id(),
        YbcCmd::Rx.id(),
        YbcCmd::SplitPlus.id(),
        YbcCmd::SplitMinus.id(),
        YbcCmd::SplitOff.id(),
        YbcCmd::SplitOffset.id(),
        YbcCmd::CtcssEncDec.id(),
        YbcCmd::CtcssEnc.id(),
        YbcCmd::CtcssOff.id(),
        YbcCmd::CtcssToneCode.id(),
        YbcCmd::FullDuplexOn.id(),
        YbcCmd::FullDuplexOff.id(),
        YbcCmd::FullDuplexRxMode.id(),
        YbcCmd::FullDuplexTxMode.id(),
        YbcCmd::FullDuplexRxFreq.id(),
        YbcCmd::FullDuplexTxFreq.id(),
        YbcCmd::AqsOn.id(),
        YbcCmd::AqsOff.id(),
        YbcCmd::IdCallsignSet.id(),
        YbcCmd::GroupCodeSet.id(),
        YbcCmd::CallsignMemSet.id(),
        YbcCmd::CacOn.id(),
        YbcCmd::ControlFreqSet.id(),
        YbcCmd::CommFreqSet.id(),
        YbcCmd::AqsReset.id(),
        YbcCmd::DigitalSquelchOn.id(),
        YbcCmd::DigitalSquelchOff.id(),
    ]);
    let read_cmds = CommandSet::of(&[YbcCmd::TestSquelch.id(), YbcCmd::TestSMeter.id()]);
    let ybc = YaesuBinCat::start(port, ybc_timeouts(ini, section), set_cmds, read_cmds);
    ybc.init()?;
    // The rig powers up in an unknown split/duplex state; claim both are
    // active so the first frequency set clears them on the wire.
    ybc.force_known_state()?;
    ybc.set_frequency(None, 144_000_000)?;
    ybc.set_mode(RigMode::Fm)?;
    ybc.set_ptt(false)?;
    Ok(Rig {
        name: "FT-736R".to_string(),
        supported_modes: ModeSet::of(&[
            RigMode::Cw,
            RigMode::Cwn,
            RigMode::Lsb,
            RigMode::Usb,
            RigMode::Fm,
            RigMode::Fmn,
        ]),
        supported_vfos: VfoSet::of(&[Vfo::A, Vfo::Main, Vfo::Sub]),
        rx_limits: ini.band_limits(section, false),
        tx_limits: ini.band_limits(section, true),
        has_vfo_select: false,
        has_duplex: true,
        has_squelch: true,
        has_smeter: true,
        driver: RigDriver::YaesuCat(ybc),
    })
}

/// Apply a model's defaults to its section, then assemble the rig over
/// an already-open port. Split out from [`build_rig`] so tests can
/// substitute a scripted port.
pub fn assemble(ini: &mut Ini, section: &str, port: Arc<dyn Port>) -> Result<Rig> {
    let model = ini
        .get(section, "rig")
        .ok_or_else(|| Error::InvalidArgument(format!("[{}] has no rig model", section)))?
        .to_string();
    match model.as_str() {
        "TS-140S" | "TS-680S" => {
            ts140s_defaults(ini, section, &model);
            build_ts140s(&model, ini, section, port)
        }
        "TS-711A" | "TS-711E" | "TS-811A" | "TS-811B" | "TS-811E" => {
            ts711a_defaults(ini, section, &model);
            build_ts711a(&model, ini, section, port)
        }
        "FT-736R" => {
            ft736r_defaults(ini, section);
            build_ft736r(ini, section, port)
        }
        other => Err(Error::InvalidArgument(format!(
            "unsupported rig model {:?}",
            other
        ))),
    }
}

/// Build the rig described by an INI section: apply model defaults, open
/// the serial port, bring the rig up.
pub fn build_rig(ini: &mut Ini, section: &str) -> Result<Rig> {
    let model = ini
        .get(section, "rig")
        .ok_or_else(|| Error::InvalidArgument(format!("[{}] has no rig model", section)))?
        .to_string();
    match model.as_str() {
        "TS-140S" | "TS-680S" => ts140s_defaults(ini, section, &model),
        "TS-711A" | "TS-711E" | "TS-811A" | "TS-811B" | "TS-811E" => {
            ts711a_defaults(ini, section, &model);
        }
        "FT-736R" => ft736r_defaults(ini, section),
        other => {
            return Err(Error::InvalidArgument(format!(
                "unsupported rig model {:?}",
                other
            )))
        }
    }
    let port = open_port(ini, section)?;
    assemble(ini, section, port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::testutil::MockPort;

    const IF_IDLE: &[u8] = b"IF00014250000     +00000000000000000000;";

    fn kenwood_ini() -> Ini {
        Ini::parse("[hf]\nrig = TS-140S\nport = /dev/null\n").unwrap()
    }

    #[test]
    fn ts140s_assembles_with_default_limits() {
        let port = MockPort::new();
        port.on_write(b"IF;", IF_IDLE);
        let mut ini = kenwood_ini();
        let rig = assemble(&mut ini, "hf", port.clone()).unwrap();
        assert_eq!(rig.name, "TS-140S");
        assert!(rig.has_vfo_select);
        assert!(!rig.has_duplex);
        // HF receive coverage, per-band transmit coverage.
        assert!(super::super::within_limits(&rig.rx_limits, 14_250_000));
        assert!(super::super::within_limits(&rig.tx_limits, 14_250_000));
        assert!(!super::super::within_limits(&rig.tx_limits, 14_500_000));
        // Bring-up locked the panel and enabled AI mode.
        let writes = port.writes();
        assert!(writes.contains(&b"LK0;".to_vec()));
        assert!(writes.contains(&b"AI1;".to_vec()));
    }

    #[test]
    fn ts140s_honors_band_guard_through_rig() {
        let port = MockPort::new();
        port.on_write(b"IF;", IF_IDLE);
        let mut ini = kenwood_ini();
        let rig = assemble(&mut ini, "hf", port).unwrap();
        assert!(rig.set_frequency(None, 14_250_000).is_ok());
        assert!(matches!(
            rig.set_frequency(None, 146_000_000),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn ft736r_bring_up_sequence() {
        let port = MockPort::new();
        let mut ini = Ini::parse("[vhf]\nrig = FT-736R\nport = /dev/null\n").unwrap();
        let rig = assemble(&mut ini, "vhf", port.clone()).unwrap();
        assert!(!rig.has_vfo_select);
        assert!(rig.has_duplex);
        let opcodes: Vec<u8> = port.writes().iter().map(|w| w[4]).collect();
        // CAT on, duplex off, split off, 144 MHz, FM, RX.
        assert_eq!(opcodes, vec![0x00, 0x8E, 0x89, 0x01, 0x07, 0x88]);
    }

    #[test]
    fn unknown_model_is_rejected() {
        let port = MockPort::new();
        let mut ini = Ini::parse("[x]\nrig = IC-9999\nport = /dev/null\n").unwrap();
        assert!(assemble(&mut ini, "x", port).is_err());
    }

    #[test]
    fn config_overrides_survive_defaulting() {
        let port = MockPort::new();
        port.on_write(b"IF;", IF_IDLE);
        let mut ini = Ini::parse(
            "[hf]\nrig = TS-140S\nport = /dev/null\n\
             tx_bandlimit_low_20m = 14100000\n",
        )
        .unwrap();
        let rig = assemble(&mut ini, "hf", port).unwrap();
        let limit = rig.tx_limits.iter().find(|l| l.name == "20m").unwrap();
        assert_eq!(limit.low, 14_100_000);
        assert_eq!(limit.high, 14_350_000);
    }
}
