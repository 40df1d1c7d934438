mod config;
mod controller;
mod correlate;
mod device_sync;
mod env_utils;
mod logging;
mod parsers;
mod port_detect;
mod report;
mod serial_console;
mod station;
mod sweep;
mod sweep_runner;

use anyhow::Result;
use clap::Parser;

use config::{Cli, RunConfig};
use device_sync::{DeviceSync, SyncTiming, ThreadPacer};
use logging::Logger;
use report::ReportSink;
use station::PortmodStation;

fn run(cli: Cli) -> Result<()> {
    let mut logger = Logger::from_env(cli.log.as_deref())?;
    let config = RunConfig::from_cli(&cli)?;
    logger.record("config", &config);
    logger.info(format!(
        "Sweeping {} points on AP {} (band {}, path loss {} dB)",
        config.plan.len(),
        config.controller.ap,
        config.controller.band.letter(),
        config.path_loss_db
    ));

    let mut sink = ReportSink::create(&config.outfile)?;
    let ap = controller::open_controller(&config.controller)?;
    let station = Box::new(PortmodStation::new(&config.station));
    let mut devices = DeviceSync::new(ap, station, Box::new(ThreadPacer), SyncTiming::default());

    let summary = sweep_runner::run_sweep(&mut logger, &config, &mut devices, &mut sink)?;
    logger.info(format!(
        "Sweep done: {} rows written, {} points skipped, {} association timeouts, {} signal timeouts, {} rows with warnings",
        sink.rows(),
        summary.points_skipped,
        summary.association_timeouts,
        summary.signal_timeouts,
        summary.rows_with_warnings
    ));
    logger.info(format!("Results stored in {}", config.outfile.display()));
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}
