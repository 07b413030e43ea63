// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transceiver-control engine.
//!
//! Two command dialects are supported behind one surface: the Kenwood HF
//! ASCII protocol (semicolon-terminated verbs with fixed-width typed
//! fields) and the Yaesu binary CAT protocol (five-byte frames, opcode
//! last). A [`Rig`] pairs one dialect driver with the model's capability
//! sets and band limits; dispatch is on the driver variant, and every
//! frequency-setting operation passes the band-limit guard first.

pub mod kenwood_hf;
pub mod models;
pub mod yaesu_cat;

use crate::{Error, Result};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

pub use kenwood_hf::{IfSnapshot, KenwoodHf};
pub use yaesu_cat::YaesuBinCat;

/// Operating modes a rig may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RigMode {
    Unknown,
    Cw,
    Cwn,
    Cwr,
    Cwrn,
    Am,
    Lsb,
    Usb,
    Fm,
    Fmn,
    Fsk,
}

impl RigMode {
    fn bit(self) -> u32 {
        match self {
            RigMode::Unknown => 0,
            RigMode::Cw => 0x001,
            RigMode::Cwn => 0x002,
            RigMode::Cwr => 0x004,
            RigMode::Cwrn => 0x008,
            RigMode::Am => 0x010,
            RigMode::Lsb => 0x020,
            RigMode::Usb => 0x040,
            RigMode::Fm => 0x080,
            RigMode::Fmn => 0x100,
            RigMode::Fsk => 0x200,
        }
    }

    /// Mode name in the rig-control line protocol vocabulary.
    #[must_use]
    pub fn protocol_name(self) -> Option<&'static str> {
        match self {
            RigMode::Usb => Some("USB"),
            RigMode::Lsb => Some("LSB"),
            RigMode::Cw => Some("CW"),
            RigMode::Cwr => Some("CWR"),
            RigMode::Fsk => Some("RTTY"),
            RigMode::Am => Some("AM"),
            RigMode::Fm => Some("FM"),
            _ => None,
        }
    }

    /// Parse a mode name from the rig-control line protocol.
    #[must_use]
    pub fn from_protocol_name(name: &str) -> RigMode {
        match name {
            "USB" => RigMode::Usb,
            "LSB" => RigMode::Lsb,
            "CW" => RigMode::Cw,
            "CWR" => RigMode::Cwr,
            "RTTY" => RigMode::Fsk,
            "AM" => RigMode::Am,
            "FM" => RigMode::Fm,
            _ => RigMode::Unknown,
        }
    }
}

/// Logical dials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vfo {
    A,
    B,
    Memory,
    /// TS-711/811 COM channel.
    Com,
    /// Duplex-capable rigs only.
    Main,
    /// Duplex-capable rigs only.
    Sub,
}

impl Vfo {
    fn bit(self) -> u32 {
        match self {
            Vfo::A => 0x01,
            Vfo::B => 0x02,
            Vfo::Memory => 0x04,
            Vfo::Com => 0x08,
            Vfo::Main => 0x10,
            Vfo::Sub => 0x20,
        }
    }

    /// The dial paired with this one for split and duplex work.
    #[must_use]
    pub fn paired(self) -> Vfo {
        match self {
            Vfo::A => Vfo::B,
            Vfo::B => Vfo::A,
            Vfo::Main => Vfo::Sub,
            Vfo::Sub => Vfo::Main,
            other => other,
        }
    }
}

/// Set of supported modes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeSet(u32);

impl ModeSet {
    #[must_use]
    pub fn of(modes: &[RigMode]) -> Self {
        ModeSet(modes.iter().fold(0, |acc, m| acc | m.bit()))
    }

    #[must_use]
    pub fn contains(self, mode: RigMode) -> bool {
        mode != RigMode::Unknown && self.0 & mode.bit() != 0
    }
}

/// Set of supported dials.
#[derive(Debug, Clone, Copy, Default)]
pub struct VfoSet(u32);

impl VfoSet {
    #[must_use]
    pub fn of(vfos: &[Vfo]) -> Self {
        VfoSet(vfos.iter().fold(0, |acc, v| acc | v.bit()))
    }

    #[must_use]
    pub fn contains(self, vfo: Vfo) -> bool {
        self.0 & vfo.bit() != 0
    }
}

/// Capability bitset over a dialect's command IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandSet(u64);

impl CommandSet {
    /// Build from an explicit list of command indices.
    #[must_use]
    pub fn of(ids: &[u8]) -> Self {
        CommandSet(ids.iter().fold(0, |acc, &id| acc | (1 << id)))
    }

    #[must_use]
    pub fn contains(self, id: u8) -> bool {
        self.0 & (1 << id) != 0
    }

    /// Add one command to the set.
    #[must_use]
    pub fn with(self, id: u8) -> Self {
        CommandSet(self.0 | (1 << id))
    }
}

/// One named frequency range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandLimit {
    pub name: String,
    pub low: u64,
    pub high: u64,
}

/// Whether any limit in the list contains `freq`.
#[must_use]
pub fn within_limits(limits: &[BandLimit], freq: u64) -> bool {
    limits.iter().any(|l| freq >= l.low && freq <= l.high)
}

/// Inter-command pacing: a rig-wide minimum gap plus an optional one-shot
/// additional delay consumed by the next send. Protects radios with slow
/// UART processors from input overflow.
#[derive(Debug)]
pub struct Pacing {
    inter_cmd_delay: Duration,
    state: Mutex<PacingState>,
}

#[derive(Debug)]
struct PacingState {
    last_cmd: Option<Instant>,
    additional: Duration,
}

impl Pacing {
    #[must_use]
    pub fn new(inter_cmd_delay_ms: u64) -> Self {
        Pacing {
            inter_cmd_delay: Duration::from_millis(inter_cmd_delay_ms),
            state: Mutex::new(PacingState {
                last_cmd: None,
                additional: Duration::ZERO,
            }),
        }
    }

    /// Sleep out any remaining gap, then mark a send as having happened.
    /// Must not be called with the cache mutex held.
    pub fn before_send(&self) {
        let wait = {
            let mut st = self.state.lock();
            let gap = self.inter_cmd_delay + st.additional;
            st.additional = Duration::ZERO;
            let wait = st
                .last_cmd
                .and_then(|last| (last + gap).checked_duration_since(Instant::now()))
                .unwrap_or(Duration::ZERO);
            st.last_cmd = Some(Instant::now() + wait);
            wait
        };
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
    }

    /// Queue a one-shot extra delay ahead of the next send.
    pub fn add_delay(&self, delay_ms: u64) {
        self.state.lock().additional = Duration::from_millis(delay_ms);
    }
}

/// Dialect driver variants.
pub enum RigDriver {
    KenwoodHf(KenwoodHf),
    YaesuCat(YaesuBinCat),
}

/// One transceiver: model capabilities, band limits, and its driver.
pub struct Rig {
    pub name: String,
    pub supported_modes: ModeSet,
    pub supported_vfos: VfoSet,
    pub rx_limits: Vec<BandLimit>,
    pub tx_limits: Vec<BandLimit>,
    /// Whether the rig can select a VFO (otherwise the network server
    /// simulates one per connection).
    pub has_vfo_select: bool,
    /// Whether [`Rig::set_duplex`] is usable.
    pub has_duplex: bool,
    pub has_squelch: bool,
    pub has_smeter: bool,
    pub driver: RigDriver,
}

impl Rig {
    fn guard_rx(&self, freq: u64) -> Result<()> {
        if within_limits(&self.rx_limits, freq) {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "{} Hz outside rx band limits",
                freq
            )))
        }
    }

    fn guard_tx(&self, freq: u64) -> Result<()> {
        if within_limits(&self.tx_limits, freq) {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "{} Hz outside tx band limits",
                freq
            )))
        }
    }

    /// Set the frequency of `vfo` (or the currently selected dial when
    /// `None`), dropping split and RIT/XIT as a side effect on rigs where
    /// they would bias the result.
    pub fn set_frequency(&self, vfo: Option<Vfo>, freq: u64) -> Result<()> {
        self.guard_rx(freq)?;
        match &self.driver {
            RigDriver::KenwoodHf(k) => k.set_frequency(vfo, freq),
            RigDriver::YaesuCat(y) => y.set_frequency(vfo, freq),
        }
    }

    /// Program rx on the current dial and tx on its pair, then assert
    /// split.
    pub fn set_split_frequency(&self, freq_rx: u64, freq_tx: u64) -> Result<()> {
        self.guard_rx(freq_rx)?;
        self.guard_tx(freq_tx)?;
        match &self.driver {
            RigDriver::KenwoodHf(k) => k.set_split_frequency(freq_rx, freq_tx),
            RigDriver::YaesuCat(y) => y.set_split_frequency(freq_rx, freq_tx),
        }
    }

    /// Full-duplex programming (satellite work).
    pub fn set_duplex(
        &self,
        freq_rx: u64,
        mode_rx: RigMode,
        freq_tx: u64,
        mode_tx: RigMode,
    ) -> Result<()> {
        if !self.has_duplex {
            return Err(Error::NotSupported);
        }
        self.guard_rx(freq_rx)?;
        self.guard_tx(freq_tx)?;
        match &self.driver {
            RigDriver::KenwoodHf(_) => Err(Error::NotSupported),
            RigDriver::YaesuCat(y) => y.set_duplex(freq_rx, mode_rx, freq_tx, mode_tx),
        }
    }

    /// Currently displayed frequency of `vfo` (or the current dial).
    pub fn get_frequency(&self, vfo: Option<Vfo>) -> Result<u64> {
        match &self.driver {
            RigDriver::KenwoodHf(k) => k.get_frequency(vfo),
            RigDriver::YaesuCat(y) => y.get_frequency(vfo),
        }
    }

    /// Current (rx, tx) pair; fails when the rig is not operating split.
    pub fn get_split_frequency(&self) -> Result<(u64, u64)> {
        match &self.driver {
            RigDriver::KenwoodHf(k) => k.get_split_frequency(),
            RigDriver::YaesuCat(y) => y.get_split_frequency(),
        }
    }

    /// Current duplex programming; fails when not operating duplex.
    pub fn get_duplex(&self) -> Result<(u64, RigMode, u64, RigMode)> {
        match &self.driver {
            RigDriver::KenwoodHf(_) => Err(Error::NotSupported),
            RigDriver::YaesuCat(y) => y.get_duplex(),
        }
    }

    pub fn set_mode(&self, mode: RigMode) -> Result<()> {
        if !self.supported_modes.contains(mode) {
            return Err(Error::NotSupported);
        }
        match &self.driver {
            RigDriver::KenwoodHf(k) => k.set_mode(mode),
            RigDriver::YaesuCat(y) => y.set_mode(mode),
        }
    }

    pub fn get_mode(&self) -> RigMode {
        match &self.driver {
            RigDriver::KenwoodHf(k) => k.get_mode(),
            RigDriver::YaesuCat(y) => y.get_mode(),
        }
    }

    pub fn set_vfo(&self, vfo: Vfo) -> Result<()> {
        if !self.has_vfo_select {
            return Err(Error::NotSupported);
        }
        if !self.supported_vfos.contains(vfo) {
            return Err(Error::NotSupported);
        }
        match &self.driver {
            RigDriver::KenwoodHf(k) => k.set_vfo(vfo),
            RigDriver::YaesuCat(_) => Err(Error::NotSupported),
        }
    }

    pub fn get_vfo(&self) -> Result<Vfo> {
        match &self.driver {
            RigDriver::KenwoodHf(k) => k.get_vfo(),
            RigDriver::YaesuCat(_) => Err(Error::NotSupported),
        }
    }

    pub fn set_ptt(&self, tx: bool) -> Result<()> {
        match &self.driver {
            RigDriver::KenwoodHf(k) => k.set_ptt(tx),
            RigDriver::YaesuCat(y) => y.set_ptt(tx),
        }
    }

    pub fn get_ptt(&self) -> Result<bool> {
        match &self.driver {
            RigDriver::KenwoodHf(k) => k.get_ptt(),
            RigDriver::YaesuCat(y) => Ok(y.get_ptt()),
        }
    }

    /// Squelch state, open = true.
    pub fn get_squelch(&self) -> Result<bool> {
        if !self.has_squelch {
            return Err(Error::NotSupported);
        }
        match &self.driver {
            RigDriver::KenwoodHf(_) => Err(Error::NotSupported),
            RigDriver::YaesuCat(y) => y.get_squelch(),
        }
    }

    /// Signal strength in dB over S0.
    pub fn get_smeter(&self) -> Result<i32> {
        if !self.has_smeter {
            return Err(Error::NotSupported);
        }
        match &self.driver {
            RigDriver::KenwoodHf(_) => Err(Error::NotSupported),
            RigDriver::YaesuCat(y) => y.get_smeter(),
        }
    }

    /// Release the rig: restore front-panel control and stop the reader.
    pub fn close(mut self) -> Result<()> {
        match &mut self.driver {
            RigDriver::KenwoodHf(k) => k.close(),
            RigDriver::YaesuCat(y) => y.close(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_limit_guard() {
        let limits = vec![
            BandLimit {
                name: "20m".into(),
                low: 14_000_000,
                high: 14_350_000,
            },
            BandLimit {
                name: "40m".into(),
                low: 7_000_000,
                high: 7_300_000,
            },
        ];
        assert!(within_limits(&limits, 14_250_000));
        assert!(within_limits(&limits, 7_000_000));
        assert!(within_limits(&limits, 14_350_000));
        assert!(!within_limits(&limits, 14_350_001));
        assert!(!within_limits(&limits, 1_000_000));
    }

    #[test]
    fn paired_vfos() {
        assert_eq!(Vfo::A.paired(), Vfo::B);
        assert_eq!(Vfo::B.paired(), Vfo::A);
        assert_eq!(Vfo::Main.paired(), Vfo::Sub);
        assert_eq!(Vfo::Memory.paired(), Vfo::Memory);
    }

    #[test]
    fn mode_protocol_names_round_trip() {
        for mode in [
            RigMode::Usb,
            RigMode::Lsb,
            RigMode::Cw,
            RigMode::Cwr,
            RigMode::Fsk,
            RigMode::Am,
            RigMode::Fm,
        ] {
            let name = mode.protocol_name().unwrap();
            assert_eq!(RigMode::from_protocol_name(name), mode);
        }
        assert_eq!(RigMode::from_protocol_name("PKTFM"), RigMode::Unknown);
        assert!(RigMode::Cwn.protocol_name().is_none());
    }

    #[test]
    fn command_set_membership() {
        let set = CommandSet::of(&[1, 5, 63]);
        assert!(set.contains(1));
        assert!(set.contains(5));
        assert!(set.contains(63));
        assert!(!set.contains(2));
        assert!(set.with(2).contains(2));
    }

    #[test]
    fn mode_set_membership() {
        let set = ModeSet::of(&[RigMode::Usb, RigMode::Fsk]);
        assert!(set.contains(RigMode::Usb));
        assert!(!set.contains(RigMode::Am));
        assert!(!set.contains(RigMode::Unknown));
    }

    #[test]
    fn pacing_enforces_minimum_gap() {
        let pacing = Pacing::new(30);
        let start = Instant::now();
        pacing.before_send();
        pacing.before_send();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn one_shot_delay_is_consumed() {
        let pacing = Pacing::new(0);
        pacing.before_send();
        pacing.add_delay(25);
        let start = Instant::now();
        pacing.before_send();
        // The gap runs from the previous send, so a little under the
        // nominal 25 ms may remain by the time we start measuring.
        assert!(start.elapsed() >= Duration::from_millis(20));
        let start = Instant::now();
        pacing.before_send();
        assert!(start.elapsed() < Duration::from_millis(20));
    }
}
