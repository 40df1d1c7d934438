//! Per-point choreography between the AP controller and the test station.
//!
//! Every wait is a bounded poll paced through [`Pacer`]. A failing collaborator call is
//! logged and carried into the row as a warning; it never aborts the point.

use std::{thread, time::Duration};

use anyhow::Result;

use crate::{
    config::RunConfig,
    controller::{ApAttribute, ApControl, Band},
    logging::Logger,
    parsers::{self, ControllerReport, SignalSample, StationReport},
    station::{IfState, StationControl, PARENT_FIELDS, STATUS_FIELDS},
    sweep::{ChainMask, Setting, SweepPoint},
};

#[derive(Clone, Copy, Debug)]
pub struct SyncTiming {
    /// Pause between re-enabling the AP and reading its advanced status.
    pub settle: Duration,
    pub poll_interval: Duration,
    pub max_association_polls: u32,
    pub traffic_settle: Duration,
    pub max_probes: u32,
}

impl Default for SyncTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
            max_association_polls: 60,
            traffic_settle: Duration::from_secs(10),
            max_probes: 10,
        }
    }
}

impl SyncTiming {
    fn association_window_secs(&self) -> u64 {
        self.poll_interval.as_secs() * u64::from(self.max_association_polls)
    }
}

pub trait Pacer {
    fn pause(&mut self, duration: Duration);
}

pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// What was observed for one sweep point.
#[derive(Clone, Debug, Default)]
pub struct SyncOutcome {
    pub controller: Option<ControllerReport>,
    pub signal: SignalSample,
    pub station: StationReport,
    pub warnings: Vec<String>,
    pub associated: bool,
    pub signal_stable: bool,
}

pub struct DeviceSync {
    ap: Box<dyn ApControl>,
    station: Box<dyn StationControl>,
    pacer: Box<dyn Pacer>,
    timing: SyncTiming,
}

impl DeviceSync {
    pub fn new(
        ap: Box<dyn ApControl>,
        station: Box<dyn StationControl>,
        pacer: Box<dyn Pacer>,
        timing: SyncTiming,
    ) -> Self {
        Self {
            ap,
            station,
            pacer,
            timing,
        }
    }

    /// Radio hosting the station, from the station manager's `Parent/Peer` field.
    pub fn resolve_parent_radio(&mut self, logger: &mut Logger, station: &str) -> Option<String> {
        let parent = self
            .station
            .query_station_status(station, PARENT_FIELDS)
            .and_then(|text| parsers::parse_port_status(&text))
            .map(|report| report.parent.map(|p| p.trim().to_string()));
        match parent {
            Ok(Some(radio)) if !radio.is_empty() => Some(radio),
            Ok(_) => None,
            Err(err) => {
                logger.warn(format!("parent radio query for {station} failed: {err:#}"));
                None
            }
        }
    }

    pub fn apply_chain_mask(&mut self, radio: &str, mask: ChainMask) -> Result<()> {
        self.station.set_radio_chain_mask(radio, mask)
    }

    pub fn synchronize(
        &mut self,
        logger: &mut Logger,
        config: &RunConfig,
        point: &SweepPoint,
    ) -> SyncOutcome {
        let mut out = SyncOutcome::default();
        let station = config.station.station.as_str();
        let band = config.controller.band;

        let result = self.station.set_interface_state(station, IfState::Down);
        note(logger, &mut out.warnings, "station down", result);

        self.reconfigure_ap(logger, &mut out.warnings, band, point);

        self.pacer.pause(self.timing.settle);
        out.controller = self.read_controller(logger, &mut out.warnings, &config.controller.ap);

        let result = self.station.set_interface_state(station, IfState::Up);
        note(logger, &mut out.warnings, "station up", result);

        let last_poll = self.wait_for_association(logger, &mut out, station);

        logger.info(format!(
            "Waiting {} seconds to let traffic run for a bit, {point}",
            self.timing.traffic_settle.as_secs()
        ));
        self.pacer.pause(self.timing.traffic_settle);

        out.signal = self.sample_signal(logger, &mut out, station, point.nss);

        let result = self
            .station
            .query_station_status(station, STATUS_FIELDS)
            .and_then(|text| parsers::parse_port_status(&text));
        out.station = note(logger, &mut out.warnings, "station status", result)
            .or(last_poll)
            .unwrap_or_default();
        out
    }

    fn reconfigure_ap(
        &mut self,
        logger: &mut Logger,
        warnings: &mut Vec<String>,
        band: Band,
        point: &SweepPoint,
    ) {
        let result = self.ap.disable();
        note(logger, warnings, "AP disable", result);
        for network in Band::ALL {
            let result = self.ap.run_raw_command(&network.network_command(false));
            note(logger, warnings, "network disable", result);
        }

        for (attribute, setting) in [
            (ApAttribute::TxPower, point.txpower),
            (ApAttribute::Bandwidth, point.bandwidth),
            (ApAttribute::Channel, point.channel),
        ] {
            let Some(value) = setting.value() else {
                continue;
            };
            let result = self.ap.set_attribute(band, attribute, &value.to_string());
            note(logger, warnings, &format!("AP {attribute} {value}"), result);
        }

        for network in Band::ALL {
            let result = self.ap.run_raw_command(&network.network_command(true));
            note(logger, warnings, "network enable", result);
        }
        let result = self.ap.enable();
        note(logger, warnings, "AP enable", result);
    }

    fn read_controller(
        &mut self,
        logger: &mut Logger,
        warnings: &mut Vec<String>,
        ap: &str,
    ) -> Option<ControllerReport> {
        let text = note(
            logger,
            warnings,
            "advanced status",
            self.ap.query_advanced_status(),
        )?;
        logger.info(text.trim_end());
        let report = note(
            logger,
            warnings,
            "advanced status parse",
            parsers::parse_advanced_status(&text, ap),
        )?;
        if report.is_none() {
            logger.warn(format!("AP {ap} not found in advanced status"));
        }
        report
    }

    /// Returns the last status seen, ready or not.
    fn wait_for_association(
        &mut self,
        logger: &mut Logger,
        out: &mut SyncOutcome,
        station: &str,
    ) -> Option<StationReport> {
        let mut waiting_for_ip_shown = false;
        let mut waiting_for_assoc_shown = false;
        let mut last = None;

        for attempt in 1..=self.timing.max_association_polls {
            let result = self
                .station
                .query_station_status(station, STATUS_FIELDS)
                .and_then(|text| parsers::parse_port_status(&text));
            if let Some(report) = note(logger, &mut out.warnings, "station status", result) {
                if report.is_ready() {
                    logger.info("Station is associated with IP address.");
                    out.associated = true;
                    return Some(report);
                }
                if report.is_authorized() {
                    if !waiting_for_ip_shown {
                        logger.info("Waiting for station to get IP Address.");
                        waiting_for_ip_shown = true;
                    }
                } else if !waiting_for_assoc_shown {
                    logger.info("Waiting for station to associate.");
                    waiting_for_assoc_shown = true;
                }
                last = Some(report);
            }
            if attempt < self.timing.max_association_polls {
                self.pacer.pause(self.timing.poll_interval);
            }
        }

        let message = format!(
            "Station did not connect within {} seconds.",
            self.timing.association_window_secs()
        );
        logger.error(&message);
        out.warnings.push(message);
        last
    }

    fn sample_signal(
        &mut self,
        logger: &mut Logger,
        out: &mut SyncOutcome,
        station: &str,
        nss: Setting,
    ) -> SignalSample {
        let wanted = nss.value().map(|n| n as usize);
        let mut latest = None;

        for _ in 0..self.timing.max_probes {
            self.pacer.pause(self.timing.poll_interval);
            let result = self
                .station
                .run_probe_query(station)
                .and_then(|text| parsers::parse_probe(&text));
            let Some(samples) = note(logger, &mut out.warnings, "probe", result) else {
                continue;
            };
            for sample in samples {
                let complete = match wanted {
                    Some(n) => sample.antennas.len() == n,
                    None => !sample.antennas.is_empty(),
                };
                if complete {
                    out.signal_stable = true;
                    return sample;
                }
                logger.info(format!(
                    "Looking for {nss} spatial streams, signal avg reported fewer: {}",
                    sample.combined
                ));
                latest = Some(sample);
            }
        }

        let message = format!(
            "Tried and failed {} times to find correct spatial streams, continuing.",
            self.timing.max_probes
        );
        logger.warn(&message);
        out.warnings.push(message);
        let mut sample = latest.unwrap_or_default();
        if let Some(n) = wanted {
            sample.fit_to(n);
        }
        sample
    }
}

/// Logs a failed collaborator call and records it once as a row warning.
fn note<T>(
    logger: &mut Logger,
    warnings: &mut Vec<String>,
    what: &str,
    result: Result<T>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            let message = format!("{what} failed: {err:#}");
            logger.warn(&message);
            if !warnings.contains(&message) {
                warnings.push(message);
            }
            None
        }
    }
}
