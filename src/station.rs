use std::{fmt, path::PathBuf, process::Command};

use anyhow::{anyhow, Context, Result};

use crate::{config::StationConfig, sweep::ChainMask};

/// Fields requested for association polling and the final per-row snapshot.
pub const STATUS_FIELDS: &[&str] = &[
    "AP",
    "IP",
    "Mode",
    "NSS",
    "Bandwidth",
    "Channel",
    "Signal",
    "Noise",
    "Status",
    "RX-Rate",
];

pub const PARENT_FIELDS: &[&str] = &["Parent/Peer"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IfState {
    Up,
    Down,
}

impl fmt::Display for IfState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IfState::Up => "up",
            IfState::Down => "down",
        })
    }
}

pub trait StationControl {
    fn set_interface_state(&mut self, station: &str, state: IfState) -> Result<()>;
    fn set_radio_chain_mask(&mut self, radio: &str, mask: ChainMask) -> Result<()>;
    fn query_station_status(&mut self, station: &str, fields: &[&str]) -> Result<String>;
    fn run_probe_query(&mut self, station: &str) -> Result<String>;
}

/// Station manager reached through the `lf_portmod.pl` helper:
/// `<helper> --manager MGR --card RESOURCE --port_name PORT <request>`.
pub struct PortmodStation {
    program: PathBuf,
    manager: String,
    resource: String,
}

impl PortmodStation {
    pub fn new(config: &StationConfig) -> Self {
        Self {
            program: config.portmod.clone(),
            manager: config.manager.clone(),
            resource: config.resource.clone(),
        }
    }

    pub fn args_for(&self, port: &str, request: &[&str]) -> Vec<String> {
        let mut args = vec![
            "--manager".to_string(),
            self.manager.clone(),
            "--card".to_string(),
            self.resource.clone(),
            "--port_name".to_string(),
            port.to_string(),
        ];
        args.extend(request.iter().map(|arg| arg.to_string()));
        args
    }

    pub fn radio_command(&self, radio: &str, mask: ChainMask) -> String {
        format!(
            "set_wifi_radio 1 {} {radio} NA NA NA NA NA NA NA NA NA {}",
            self.resource,
            mask.code()
        )
    }

    pub fn probe_command(&self, station: &str) -> String {
        format!("probe_port 1 {} {station}", self.resource)
    }

    fn run(&self, port: &str, request: &[&str]) -> Result<String> {
        let output = Command::new(&self.program)
            .args(self.args_for(port, request))
            .output()
            .with_context(|| format!("failed to execute {}", self.program.display()))?;
        if !output.status.success() {
            return Err(anyhow!(
                "{} {} exited with status {}: {}",
                self.program.display(),
                request.first().copied().unwrap_or_default(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl StationControl for PortmodStation {
    fn set_interface_state(&mut self, station: &str, state: IfState) -> Result<()> {
        let state = state.to_string();
        self.run(station, &["--set_ifstate", &state]).map(drop)
    }

    fn set_radio_chain_mask(&mut self, radio: &str, mask: ChainMask) -> Result<()> {
        let command = self.radio_command(radio, mask);
        self.run(radio, &["--cli_cmd", &command]).map(drop)
    }

    fn query_station_status(&mut self, station: &str, fields: &[&str]) -> Result<String> {
        let fields = fields.join(",");
        self.run(station, &["--show_port", &fields])
    }

    fn run_probe_query(&mut self, station: &str) -> Result<String> {
        let command = self.probe_command(station);
        self.run(station, &["--cli_cmd", &command])
    }
}
