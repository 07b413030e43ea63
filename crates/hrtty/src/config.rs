// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Flat INI configuration.
//!
//! `[section]` headers group `key = value` pairs; `#` and `;` start
//! comments; keys are case-insensitive. Rig sections carry dynamic keys
//! (`rx_bandlimit_low_<name>` and friends), so the loader keeps raw
//! pairs and models pull what they understand, defaulting the rest.

use crate::rig::BandLimit;
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Parsed INI content: section name to ordered key/value pairs.
#[derive(Debug, Default, Clone)]
pub struct Ini {
    sections: Vec<(String, Vec<(String, String)>)>,
}

impl Ini {
    /// Parse INI text. Keys before any `[section]` land in the unnamed
    /// section `""`.
    pub fn parse(text: &str) -> Result<Ini> {
        let mut ini = Ini::default();
        let mut current = String::new();
        ini.sections.push((String::new(), Vec::new()));
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[') {
                let name = name.strip_suffix(']').ok_or_else(|| {
                    Error::InvalidArgument(format!("line {}: unterminated section", lineno + 1))
                })?;
                current = name.trim().to_ascii_lowercase();
                if !ini.sections.iter().any(|(s, _)| *s == current) {
                    ini.sections.push((current.clone(), Vec::new()));
                }
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                Error::InvalidArgument(format!("line {}: expected key = value", lineno + 1))
            })?;
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim().to_string();
            let section = ini
                .sections
                .iter_mut()
                .find(|(s, _)| *s == current)
                .expect("current section exists");
            section.1.push((key, value));
        }
        Ok(ini)
    }

    /// Load and parse a file.
    pub fn load(path: &str) -> Result<Ini> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidArgument(format!("cannot read {}: {}", path, e)))?;
        Ini::parse(&text)
    }

    /// Names of all named sections, in file order.
    #[must_use]
    pub fn section_names(&self) -> Vec<&str> {
        self.sections
            .iter()
            .filter(|(name, _)| !name.is_empty())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Raw string value.
    #[must_use]
    pub fn get<'a>(&'a self, section: &str, key: &str) -> Option<&'a str> {
        let section = section.to_ascii_lowercase();
        let key = key.to_ascii_lowercase();
        self.sections
            .iter()
            .find(|(s, _)| *s == section)?
            .1
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// String value with a default.
    #[must_use]
    pub fn get_str<'a>(&'a self, section: &str, key: &str, default: &'a str) -> &'a str {
        self.get(section, key).unwrap_or(default)
    }

    /// Integer value with a default; unparsable values fall back too.
    #[must_use]
    pub fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.get(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Unsigned 64-bit value with a default.
    #[must_use]
    pub fn get_u64(&self, section: &str, key: &str, default: u64) -> u64 {
        self.get(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Float value with a default.
    #[must_use]
    pub fn get_f64(&self, section: &str, key: &str, default: f64) -> f64 {
        self.get(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Set `key` in `section` only when absent, so model defaults never
    /// override what the operator wrote.
    pub fn set_default(&mut self, section: &str, key: &str, value: &str) {
        let section_name = section.to_ascii_lowercase();
        let key = key.to_ascii_lowercase();
        if self.get(&section_name, &key).is_some() {
            return;
        }
        if let Some(entry) = self.sections.iter_mut().find(|(s, _)| *s == section_name) {
            entry.1.push((key, value.to_string()));
        } else {
            self.sections
                .push((section_name, vec![(key, value.to_string())]));
        }
    }

    /// Collect the `{rx,tx}_bandlimit_{low,high}_<name>` keys of a
    /// section into named limits.
    #[must_use]
    pub fn band_limits(&self, section: &str, tx: bool) -> Vec<BandLimit> {
        let low_prefix = if tx { "tx_bandlimit_low_" } else { "rx_bandlimit_low_" };
        let high_prefix = if tx { "tx_bandlimit_high_" } else { "rx_bandlimit_high_" };
        let section_name = section.to_ascii_lowercase();
        let Some((_, pairs)) = self.sections.iter().find(|(s, _)| *s == section_name) else {
            return Vec::new();
        };
        let mut limits: BTreeMap<String, BandLimit> = BTreeMap::new();
        for (key, value) in pairs {
            if let Some(name) = key.strip_prefix(low_prefix) {
                let entry = limits.entry(name.to_string()).or_insert_with(|| BandLimit {
                    name: name.to_string(),
                    low: 0,
                    high: u64::MAX,
                });
                entry.low = value.parse().unwrap_or(0);
            } else if let Some(name) = key.strip_prefix(high_prefix) {
                let entry = limits.entry(name.to_string()).or_insert_with(|| BandLimit {
                    name: name.to_string(),
                    low: 0,
                    high: u64::MAX,
                });
                entry.high = value.parse().unwrap_or(u64::MAX);
            }
        }
        limits.into_values().collect()
    }
}

/// Terminal-side settings with the historical defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub tty_name: String,
    pub dsp_name: String,
    pub dsp_rate: u32,
    pub baud_numerator: u32,
    pub baud_denominator: u32,
    pub mark_freq: f64,
    pub space_freq: f64,
    pub bp_filter_q: f64,
    pub lp_filter_q: f64,
    /// Index into the charset table.
    pub charset: usize,
    pub rigctld_host: String,
    pub rigctld_port: u16,
    /// Key PTT through the rigctld connection instead of RTS.
    pub ctl_ptt: bool,
    /// Function-key macros, `macro_1` .. `macro_10`.
    pub macros: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            tty_name: "/dev/ttyu9".to_string(),
            dsp_name: "/dev/dsp8".to_string(),
            dsp_rate: 48_000,
            baud_numerator: 1_000,
            baud_denominator: 22,
            mark_freq: 2_125.0,
            space_freq: 2_295.0,
            bp_filter_q: 10.0,
            lp_filter_q: 1.0,
            charset: 0,
            rigctld_host: String::new(),
            rigctld_port: 4_532,
            ctl_ptt: false,
            macros: Vec::new(),
        }
    }
}

impl Settings {
    /// Build settings from the unnamed or `[terminal]` section.
    #[must_use]
    pub fn from_ini(ini: &Ini) -> Settings {
        let section = if ini.get("terminal", "dsp_name").is_some()
            || ini.get("terminal", "tty_name").is_some()
        {
            "terminal"
        } else {
            ""
        };
        let d = Settings::default();
        let mut macros = Vec::new();
        for i in 1..=10 {
            let key = format!("macro_{}", i);
            match ini.get(section, &key) {
                Some(text) => macros.push(text.to_string()),
                None => macros.push(String::new()),
            }
        }
        Settings {
            tty_name: ini.get_str(section, "tty_name", &d.tty_name).to_string(),
            dsp_name: ini.get_str(section, "dsp_name", &d.dsp_name).to_string(),
            dsp_rate: ini.get_int(section, "dsp_rate", i64::from(d.dsp_rate)) as u32,
            baud_numerator: ini.get_int(section, "baud_numerator", i64::from(d.baud_numerator))
                as u32,
            baud_denominator: ini.get_int(
                section,
                "baud_denominator",
                i64::from(d.baud_denominator),
            ) as u32,
            mark_freq: ini.get_f64(section, "mark_freq", d.mark_freq),
            space_freq: ini.get_f64(section, "space_freq", d.space_freq),
            bp_filter_q: ini.get_f64(section, "bp_filter_q", d.bp_filter_q),
            lp_filter_q: ini.get_f64(section, "lp_filter_q", d.lp_filter_q),
            charset: ini.get_int(section, "charset", 0).max(0) as usize,
            rigctld_host: ini.get_str(section, "rigctld_host", "").to_string(),
            rigctld_port: ini.get_int(section, "rigctld_port", i64::from(d.rigctld_port)) as u16,
            ctl_ptt: ini.get_int(section, "ctl_ptt", 0) != 0,
            macros,
        }
    }

    /// Baud rate as a float.
    #[must_use]
    pub fn baud(&self) -> f64 {
        f64::from(self.baud_numerator) / f64::from(self.baud_denominator)
    }

    /// Symbol time in seconds.
    #[must_use]
    pub fn symbol_seconds(&self) -> f64 {
        1.0 / self.baud()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_sections_and_pairs() {
        let ini = Ini::parse(
            "# global\n\
             dsp_rate = 8000\n\
             [TS-140S]\n\
             rig = TS-140S\n\
             port = /dev/ttyU0\n\
             speed = 4800\n\
             ; comment\n\
             [ft736]\n\
             rig = FT-736R\n",
        )
        .unwrap();
        assert_eq!(ini.get_int("", "dsp_rate", 0), 8_000);
        assert_eq!(ini.get_str("ts-140s", "rig", ""), "TS-140S");
        assert_eq!(ini.get_str("TS-140S", "port", ""), "/dev/ttyU0");
        assert_eq!(ini.section_names(), vec!["ts-140s", "ft736"]);
    }

    #[test]
    fn defaults_do_not_override() {
        let mut ini = Ini::parse("[r]\nspeed = 9600\n").unwrap();
        ini.set_default("r", "speed", "4800");
        ini.set_default("r", "parity", "N");
        assert_eq!(ini.get_int("r", "speed", 0), 9_600);
        assert_eq!(ini.get_str("r", "parity", ""), "N");
    }

    #[test]
    fn later_values_win() {
        let ini = Ini::parse("[r]\nspeed = 4800\nspeed = 19200\n").unwrap();
        assert_eq!(ini.get_int("r", "speed", 0), 19_200);
    }

    #[test]
    fn band_limits_are_paired_by_name() {
        let ini = Ini::parse(
            "[r]\n\
             rx_bandlimit_low_hf = 500000\n\
             rx_bandlimit_high_hf = 30000000\n\
             tx_bandlimit_low_20m = 14000000\n\
             tx_bandlimit_high_20m = 14350000\n\
             tx_bandlimit_low_40m = 7000000\n\
             tx_bandlimit_high_40m = 7300000\n",
        )
        .unwrap();
        let rx = ini.band_limits("r", false);
        assert_eq!(rx.len(), 1);
        assert_eq!(rx[0].name, "hf");
        assert_eq!(rx[0].low, 500_000);
        assert_eq!(rx[0].high, 30_000_000);
        let tx = ini.band_limits("r", true);
        assert_eq!(tx.len(), 2);
        assert!(tx.iter().any(|l| l.name == "20m" && l.low == 14_000_000));
    }

    #[test]
    fn settings_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "mark_freq = 1275\nspace_freq = 1445\nbaud_numerator = 500\n\
             baud_denominator = 11\ncharset = 1\nrigctld_host = localhost\nctl_ptt = 1\n"
        )
        .unwrap();
        let ini = Ini::load(file.path().to_str().unwrap()).unwrap();
        let s = Settings::from_ini(&ini);
        assert_eq!(s.mark_freq, 1_275.0);
        assert_eq!(s.space_freq, 1_445.0);
        assert!((s.baud() - 45.4545).abs() < 0.01);
        assert_eq!(s.charset, 1);
        assert_eq!(s.rigctld_host, "localhost");
        assert!(s.ctl_ptt);
        assert_eq!(s.dsp_rate, 48_000);
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!(Ini::parse("[open\n").is_err());
        assert!(Ini::parse("no equals sign\n").is_err());
    }
}
