use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};

use crate::{
    correlate::{Correlation, MAX_ANTENNAS},
    logging::ensure_parent_dir,
    parsers::{ControllerReport, SignalSample, StationReport},
    sweep::SweepPoint,
};

pub const COLUMNS: &[&str] = &[
    "Cfg-Pathloss",
    "Cfg-Channel",
    "Cfg-NSS",
    "Cfg-BW",
    "Cfg-Power",
    "Combined-Signal",
    "Ant-0",
    "Ant-1",
    "Ant-2",
    "Ant-3",
    "AP-BSSID",
    "Rpt-BW",
    "Rpt-Channel",
    "Rpt-Mode",
    "Rpt-NSS",
    "Rpt-Noise",
    "Rpt-Rxrate",
    "Ctrl-AP-MAC",
    "Ctrl-Channel",
    "Ctrl-Power",
    "Ctrl-dBm",
    "Calc-dBm-Combined",
    "Diff-dBm-Combined",
    "Calc-Ant-1",
    "Calc-Ant-2",
    "Calc-Ant-3",
    "Calc-Ant-4",
    "Diff-Ant-1",
    "Diff-Ant-2",
    "Diff-Ant-3",
    "Diff-Ant-4",
    "Warnings-and-Errors",
];

/// One finished sweep point.
#[derive(Clone, Debug)]
pub struct ResultRow {
    pub path_loss_db: i32,
    pub point: SweepPoint,
    pub signal: SignalSample,
    pub station: StationReport,
    pub controller: Option<ControllerReport>,
    pub correlation: Correlation,
    pub warnings: Vec<String>,
}

impl ResultRow {
    /// Mismatches between what was configured and what the station reports.
    pub fn schema_warnings(point: &SweepPoint, station: &StationReport) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(bandwidth) = point.bandwidth.value() {
            let reported = station.bandwidth.as_deref().map(str::trim);
            if reported != Some(bandwidth.to_string().as_str()) {
                out.push(format!(
                    "Requested bandwidth: {bandwidth} != station's reported bandwidth: {}.",
                    reported.unwrap_or("none")
                ));
            }
        }
        if let Some(nss) = point.nss.value() {
            let reported = station.nss.as_deref().map(str::trim);
            if reported != Some(nss.to_string().as_str()) {
                out.push(format!(
                    "Station NSS: {} != configured: {nss}.",
                    reported.unwrap_or("none")
                ));
            }
        }
        out
    }

    /// Antenna columns shown for this row: the configured NSS, or what was sampled when the
    /// NSS axis was left unchanged.
    fn antenna_columns(&self) -> usize {
        let count = match self.point.nss.value() {
            Some(nss) => nss as usize,
            None => self.signal.antennas.len(),
        };
        count.min(MAX_ANTENNAS)
    }

    pub fn fields(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(COLUMNS.len());
        out.push(self.path_loss_db.to_string());
        out.push(self.point.channel.to_string());
        out.push(self.point.nss.to_string());
        out.push(self.point.bandwidth.to_string());
        out.push(self.point.txpower.to_string());
        out.push(self.signal.combined.clone());

        let shown = self.antenna_columns();
        for slot in 0..MAX_ANTENNAS {
            let value = if slot < shown {
                self.signal.antennas.get(slot).cloned().unwrap_or_default()
            } else {
                String::new()
            };
            out.push(value);
        }

        for value in [
            &self.station.ap,
            &self.station.bandwidth,
            &self.station.channel,
            &self.station.mode,
            &self.station.nss,
            &self.station.noise,
            &self.station.rx_rate,
        ] {
            out.push(value.clone().unwrap_or_default());
        }

        match &self.controller {
            Some(ctrl) => {
                out.push(ctrl.bssid.clone());
                out.push(ctrl.channel.clone());
                out.push(ctrl.power.clone());
                out.push(ctrl.dbm.clone());
            }
            None => out.extend(std::iter::repeat_n(String::new(), 4)),
        }

        out.push(number(self.correlation.calc_combined));
        out.push(number(self.correlation.diff_combined));
        out.extend(self.correlation.calc_antennas.iter().map(|v| number(*v)));
        out.extend(self.correlation.diff_antennas.iter().map(|v| number(*v)));

        out.push(self.warning_text());
        out.into_iter().map(|field| sanitize(&field)).collect()
    }

    pub fn warning_text(&self) -> String {
        self.warnings
            .iter()
            .chain(self.correlation.warnings.iter())
            .map(|w| w.trim())
            .filter(|w| !w.is_empty())
            .collect::<Vec<_>>()
            .join("  ")
    }

    pub fn has_warnings(&self) -> bool {
        !self.warning_text().is_empty()
    }
}

fn number(value: Option<i32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

// Tabs and line breaks would shift columns.
fn sanitize(field: &str) -> String {
    field.replace(['\t', '\r', '\n'], " ")
}

/// Tab-separated result file. The header goes out on creation and every row is flushed as
/// soon as it is appended.
pub struct ReportSink<W: Write> {
    out: W,
    rows: usize,
}

impl ReportSink<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        ensure_parent_dir(path)?;
        let file = File::create(path)
            .with_context(|| format!("failed to create results file {}", path.display()))?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> ReportSink<W> {
    pub fn new(mut out: W) -> Result<Self> {
        writeln!(out, "{}", COLUMNS.join("\t")).context("failed writing results header")?;
        out.flush().context("failed flushing results header")?;
        Ok(Self { out, rows: 0 })
    }

    pub fn append(&mut self, row: &ResultRow) -> Result<()> {
        writeln!(self.out, "{}", row.fields().join("\t")).context("failed writing result row")?;
        self.out.flush().context("failed flushing result row")?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}
