use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::parsers::{ControllerReport, SignalSample, StationReport};

pub const MAX_ANTENNAS: usize = 4;

/// Combining gain (dB) subtracted from the controller's figure before comparing a single
/// chain against it. Indexed by operating stream count.
pub fn combining_gain_db(nss: u32) -> Option<i32> {
    match nss {
        1 => Some(0),
        2 => Some(3),
        3 => Some(5),
        4 => Some(6),
        _ => None,
    }
}

/// AP-side projections of the station's measurements and their distance from what the
/// controller claims to transmit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Correlation {
    pub calc_combined: Option<i32>,
    pub diff_combined: Option<i32>,
    pub calc_antennas: [Option<i32>; MAX_ANTENNAS],
    pub diff_antennas: [Option<i32>; MAX_ANTENNAS],
    pub warnings: Vec<String>,
}

pub fn correlate(
    path_loss_db: i32,
    signal: &SignalSample,
    station: &StationReport,
    controller: Option<&ControllerReport>,
) -> Correlation {
    let mut out = Correlation::default();

    let path_loss = i64::from(path_loss_db);
    out.calc_combined = out.keep(
        signal
            .combined_dbm()
            .and_then(|dbm| offset("combined signal", dbm, path_loss)),
    );
    for slot in 0..MAX_ANTENNAS {
        if let Some(measured) = signal.antenna_dbm(slot) {
            let label = format!("antenna {slot} signal");
            out.calc_antennas[slot] =
                out.keep(measured.and_then(|dbm| offset(&label, dbm, path_loss)));
        }
    }

    let controller_dbm = match controller {
        Some(report) => out.keep(report.dbm()),
        None => {
            out.warnings
                .push("controller dBm unavailable: AP not found in advanced status".to_string());
            None
        }
    };
    let Some(controller_dbm) = controller_dbm else {
        return out;
    };

    if let Some(calc) = out.calc_combined {
        out.diff_combined = out.keep(offset("combined diff", calc, -i64::from(controller_dbm)));
    }

    // Uses the stream count the station actually runs at, not the requested one.
    let Some(nss) = out.keep(station.nss()) else {
        return out;
    };
    let Some(gain) = combining_gain_db(nss) else {
        out.warnings.push(format!(
            "no combining-gain correction for station NSS {nss}; per-antenna diffs left blank"
        ));
        return out;
    };
    let reference = offset("controller reference", controller_dbm, -i64::from(gain));
    let Some(reference) = out.keep(reference) else {
        return out;
    };
    for slot in 0..(nss as usize).min(MAX_ANTENNAS) {
        if let Some(calc) = out.calc_antennas[slot] {
            let diff = offset(&format!("antenna {slot} diff"), calc, -i64::from(reference));
            out.diff_antennas[slot] = out.keep(diff);
        }
    }
    out
}

/// `value + by` in dB, rejecting results that do not fit a row field.
fn offset(label: &str, value: i32, by: i64) -> Result<i32> {
    i64::from(value)
        .checked_add(by)
        .and_then(|sum| i32::try_from(sum).ok())
        .ok_or_else(|| anyhow!("{label} {value} dB offset by {by} dB is out of range"))
}

impl Correlation {
    fn keep<T>(&mut self, value: Result<T>) -> Option<T> {
        match value {
            Ok(value) => Some(value),
            Err(err) => {
                self.warnings.push(err.to_string());
                None
            }
        }
    }
}
