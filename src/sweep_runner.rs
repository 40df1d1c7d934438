use std::io::Write;

use anyhow::Result;
use serde::Serialize;

use crate::{
    config::RunConfig,
    correlate::correlate,
    device_sync::DeviceSync,
    logging::Logger,
    report::{ReportSink, ResultRow},
    sweep::{radio_plan, RadioPlan, Setting, WIDEST_BANDWIDTH_MHZ},
};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub points_generated: usize,
    pub rows_written: usize,
    pub points_skipped: usize,
    pub association_timeouts: usize,
    pub signal_timeouts: usize,
    pub rows_with_warnings: usize,
}

/// Walks the whole plan and appends one row per measured point.
///
/// Only a failure to write the results file stops the sweep.
pub fn run_sweep<W: Write>(
    logger: &mut Logger,
    config: &RunConfig,
    devices: &mut DeviceSync,
    sink: &mut ReportSink<W>,
) -> Result<SweepSummary> {
    let mut summary = SweepSummary::default();
    let station = config.station.station.as_str();

    let parent_radio = devices.resolve_parent_radio(logger, station);
    match &parent_radio {
        Some(radio) => logger.info(format!("Station {station} is on radio {radio}")),
        None => logger.warn(format!(
            "NOTE: Could not find parent radio of {station}, spatial stream configuration will be skipped."
        )),
    }

    let mut current_key = None;
    let mut skip_combination = false;
    for point in config.plan.points() {
        summary.points_generated += 1;

        if current_key != Some(point.radio_key()) {
            current_key = Some(point.radio_key());
            skip_combination = !configure_station_radio(
                logger,
                devices,
                parent_radio.as_deref(),
                point.nss,
                point.bandwidth,
            );
        }
        if skip_combination {
            summary.points_skipped += 1;
            continue;
        }

        logger.info(format!("Measuring {point}"));
        let outcome = devices.synchronize(logger, config, &point);
        if !outcome.associated {
            summary.association_timeouts += 1;
        }
        if !outcome.signal_stable {
            summary.signal_timeouts += 1;
        }

        let correlation = correlate(
            config.path_loss_db,
            &outcome.signal,
            &outcome.station,
            outcome.controller.as_ref(),
        );
        for warning in &correlation.warnings {
            logger.warn(warning);
        }
        let mut warnings = outcome.warnings;
        for warning in ResultRow::schema_warnings(&point, &outcome.station) {
            logger.warn(&warning);
            warnings.push(warning);
        }

        let row = ResultRow {
            path_loss_db: config.path_loss_db,
            point,
            signal: outcome.signal,
            station: outcome.station,
            controller: outcome.controller,
            correlation,
            warnings,
        };
        sink.append(&row)?;
        logger.record("row", &row.fields());
        summary.rows_written += 1;
        if row.has_warnings() {
            summary.rows_with_warnings += 1;
        }
    }

    logger.record("summary", &summary);
    Ok(summary)
}

/// Applies the chain mask for a new (channel, NSS, bandwidth) combination.
/// Returns `false` when the combination cannot be measured at all.
fn configure_station_radio(
    logger: &mut Logger,
    devices: &mut DeviceSync,
    parent_radio: Option<&str>,
    nss: Setting,
    bandwidth: Setting,
) -> bool {
    match radio_plan(nss, bandwidth) {
        RadioPlan::Unchanged => true,
        RadioPlan::Unsupported { requested } => {
            logger.info(format!(
                "NOTE: Skipping NSS {requested} for {WIDEST_BANDWIDTH_MHZ}Mhz, station radios do not support more than 2NSS at {WIDEST_BANDWIDTH_MHZ}Mhz currently."
            ));
            false
        }
        RadioPlan::Configure { chains, mask } => {
            let Some(radio) = parent_radio else {
                logger.warn(format!(
                    "NOTE: Parent radio unknown, not configuring {chains} chains for NSS {nss}."
                ));
                return true;
            };
            logger.info(format!(
                "Setting {radio} to {chains} chains (antenna set {})",
                mask.code()
            ));
            if let Err(err) = devices.apply_chain_mask(radio, mask) {
                logger.warn(format!("chain mask on {radio} failed: {err:#}"));
            }
            true
        }
    }
}
