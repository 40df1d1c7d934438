//! Parsers for the text reports produced by the controller and the station manager.
//!
//! Anchors and field order follow the device output verbatim; a field that does not appear
//! is reported as `None` rather than an error.

use anyhow::{anyhow, Result};
use regex::Regex;
use serde::Serialize;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ControllerReport {
    pub bssid: String,
    pub channel: String,
    /// Power level as "<n> of <m>"; a slash would be read as a date by spreadsheets.
    pub power: String,
    pub dbm: String,
}

impl ControllerReport {
    pub fn dbm(&self) -> Result<i32> {
        parse_dbm("controller dBm", &self.dbm)
    }
}

/// Finds the target AP in `show advanced 802.11x summary` output.
///
/// Only rows after the dashed table rule are considered; the first matching row wins.
pub fn parse_advanced_status(text: &str, ap: &str) -> Result<Option<ControllerReport>> {
    let pattern = Regex::new(&format!(
        r"{}\s+(\S+)\s+\S+\s+\S+\s+\S+\s+(\S+)\s+(\S+)\s+\(\s*(\S+)\s+dBm",
        regex::escape(ap)
    ))?;

    let mut past_rule = false;
    for line in text.lines() {
        if line.starts_with("---------") {
            past_rule = true;
            continue;
        }
        if !past_rule {
            continue;
        }
        if let Some(caps) = pattern.captures(line) {
            return Ok(Some(ControllerReport {
                bssid: caps[1].to_string(),
                channel: caps[2].to_string(),
                power: caps[3].replacen('/', " of ", 1),
                dbm: caps[4].to_string(),
            }));
        }
    }
    Ok(None)
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StationReport {
    pub ap: Option<String>,
    pub bandwidth: Option<String>,
    pub channel: Option<String>,
    pub mode: Option<String>,
    pub nss: Option<String>,
    pub noise: Option<String>,
    pub rx_rate: Option<String>,
    pub status: Option<String>,
    pub ip: Option<String>,
    pub parent: Option<String>,
}

pub const STATUS_AUTHORIZED: &str = "Authorized";
pub const UNASSIGNED_IP: &str = "0.0.0.0";

impl StationReport {
    pub fn is_authorized(&self) -> bool {
        self.status.as_deref() == Some(STATUS_AUTHORIZED)
    }

    pub fn has_address(&self) -> bool {
        self.ip.as_deref().is_some_and(|ip| ip != UNASSIGNED_IP)
    }

    pub fn is_ready(&self) -> bool {
        self.is_authorized() && self.has_address()
    }

    /// Operating stream count reported by the station.
    pub fn nss(&self) -> Result<u32> {
        let raw = self
            .nss
            .as_deref()
            .ok_or_else(|| anyhow!("station did not report NSS"))?;
        raw.trim()
            .parse::<u32>()
            .map_err(|_| anyhow!("station NSS `{raw}` is not a number"))
    }
}

#[derive(Clone, Copy)]
enum PortField {
    Status,
    Ip,
    Ap,
    Bandwidth,
    Channel,
    Mode,
    Nss,
    Noise,
    RxRate,
    Parent,
}

const PORT_FIELDS: &[(PortField, &str)] = &[
    (PortField::Status, r"Status:\s+(.*)"),
    (PortField::Ip, r"IP:\s+(.*)"),
    (PortField::Ap, r"AP:\s+(.*)"),
    (PortField::Bandwidth, r"Bandwidth:\s+(.*)Mhz"),
    (PortField::Channel, r"Channel:\s+(.*)"),
    (PortField::Mode, r"Mode:\s+(.*)"),
    (PortField::Nss, r"NSS:\s+(.*)"),
    (PortField::Noise, r"Noise:\s+(.*)"),
    (PortField::RxRate, r"RX-Rate:\s+(.*)"),
    (PortField::Parent, r"Parent/Peer:\s+(.*)"),
];

impl StationReport {
    fn slot(&mut self, field: PortField) -> &mut Option<String> {
        match field {
            PortField::Status => &mut self.status,
            PortField::Ip => &mut self.ip,
            PortField::Ap => &mut self.ap,
            PortField::Bandwidth => &mut self.bandwidth,
            PortField::Channel => &mut self.channel,
            PortField::Mode => &mut self.mode,
            PortField::Nss => &mut self.nss,
            PortField::Noise => &mut self.noise,
            PortField::RxRate => &mut self.rx_rate,
            PortField::Parent => &mut self.parent,
        }
    }
}

/// Parses `--show_port` output. A later line overrides an earlier one for the same field.
pub fn parse_port_status(text: &str) -> Result<StationReport> {
    let fields = PORT_FIELDS
        .iter()
        .map(|&(field, pattern)| Ok((field, Regex::new(pattern)?)))
        .collect::<Result<Vec<_>>>()?;

    let mut report = StationReport::default();
    for line in text.lines() {
        for (field, pattern) in &fields {
            if let Some(caps) = pattern.captures(line) {
                *report.slot(*field) = Some(caps[1].to_string());
            }
        }
    }
    Ok(report)
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SignalSample {
    pub combined: String,
    /// Per-chain values in reported order; a padded slot holds an empty string.
    pub antennas: Vec<String>,
}

impl SignalSample {
    pub fn combined_dbm(&self) -> Result<i32> {
        parse_dbm("combined signal", &self.combined)
    }

    pub fn antenna_dbm(&self, index: usize) -> Option<Result<i32>> {
        self.antennas
            .get(index)
            .map(|raw| parse_dbm(&format!("antenna {index} signal"), raw))
    }

    /// Pads with empty slots or drops extra chains so exactly `count` antennas remain.
    pub fn fit_to(&mut self, count: usize) {
        self.antennas.resize(count, String::new());
    }
}

/// Every `signal avg:` line of a probe result, in order of appearance.
pub fn parse_probe(text: &str) -> Result<Vec<SignalSample>> {
    let pattern = Regex::new(r"signal avg:\s+(\S+)\s+\[(.*)\]\s+dBm")?;
    Ok(text
        .lines()
        .filter_map(|line| pattern.captures(line))
        .map(|caps| SignalSample {
            combined: caps[1].to_string(),
            antennas: caps[2]
                .split_whitespace()
                .map(|ant| ant.replacen(',', "", 1))
                .collect(),
        })
        .collect())
}

fn parse_dbm(label: &str, raw: &str) -> Result<i32> {
    if raw.trim().is_empty() {
        return Err(anyhow!("{label} missing"));
    }
    raw.trim()
        .parse::<i32>()
        .map_err(|_| anyhow!("{label} `{raw}` is not an integer"))
}
