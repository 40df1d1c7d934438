//! Access-point control channel.
//!
//! Two backends speak the wireless controller's CLI: SSH and Telnet sessions are delegated
//! to the controller helper program one action at a time, while `serial` drives the
//! controller console directly.

use std::{fmt, path::PathBuf, process::Command, time::Duration};

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use regex::Regex;
use serde::Serialize;

use crate::{config::ControllerConfig, env_utils, serial_console::SerialConsole};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    /// 5 GHz
    A,
    /// 2.4 GHz
    B,
}

impl Band {
    pub const ALL: [Band; 2] = [Band::A, Band::B];

    pub fn letter(self) -> &'static str {
        match self {
            Band::A => "a",
            Band::B => "b",
        }
    }

    /// Raw command toggling the whole network element for this band.
    pub fn network_command(self, enable: bool) -> String {
        format!(
            "config 802.11{} {} network",
            self.letter(),
            if enable { "enable" } else { "disable" }
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Serial,
    Ssh,
    Telnet,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Serial => "serial",
            Scheme::Ssh => "ssh",
            Scheme::Telnet => "telnet",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApAttribute {
    TxPower,
    Bandwidth,
    Channel,
}

impl ApAttribute {
    fn helper_action(self) -> &'static str {
        match self {
            ApAttribute::TxPower => "txPower",
            ApAttribute::Bandwidth => "bandwidth",
            ApAttribute::Channel => "channel",
        }
    }

    pub fn cli_command(self, band: Band, ap: &str, value: &str) -> String {
        let band = band.letter();
        match self {
            ApAttribute::TxPower => format!("config 802.11{band} txPower ap {ap} {value}"),
            ApAttribute::Bandwidth => format!("config 802.11{band} chan_width {ap} {value}"),
            ApAttribute::Channel => format!("config 802.11{band} channel ap {ap} {value}"),
        }
    }
}

impl fmt::Display for ApAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.helper_action())
    }
}

pub trait ApControl {
    /// Takes the AP radio on the configured band out of service.
    fn disable(&mut self) -> Result<()>;
    fn enable(&mut self) -> Result<()>;
    fn set_attribute(&mut self, band: Band, attribute: ApAttribute, value: &str) -> Result<()>;
    fn run_raw_command(&mut self, command: &str) -> Result<()>;
    fn query_advanced_status(&mut self) -> Result<String>;
}

pub fn open_controller(config: &ControllerConfig) -> Result<Box<dyn ApControl>> {
    match config.scheme {
        Scheme::Serial => {
            let tty = env_utils::require_tty(config.tty.as_deref())?;
            let baud = env_utils::baud_from_env(9600)?;
            Ok(Box::new(SerialController::open(config, &tty, baud)?))
        }
        _ => Ok(Box::new(HelperController::new(config))),
    }
}

/// Runs the controller helper once per action, as
/// `<helper> -d HOST -u USER -p PASS -a AP -s SCHEME [--port N] --band B --action A [--value V]`.
pub struct HelperController {
    program: PathBuf,
    common_args: Vec<String>,
    band: Band,
}

impl HelperController {
    pub fn new(config: &ControllerConfig) -> Self {
        let mut common_args = Vec::new();
        if let Some(host) = &config.host {
            common_args.extend(["-d".to_string(), host.clone()]);
        }
        common_args.extend([
            "-u".to_string(),
            config.user.clone(),
            "-p".to_string(),
            config.password.clone(),
            "-a".to_string(),
            config.ap.clone(),
            "-s".to_string(),
            config.scheme.as_str().to_string(),
        ]);
        if let Some(port) = config.port {
            common_args.extend(["--port".to_string(), port.to_string()]);
        }
        Self {
            program: config.helper.clone(),
            common_args,
            band: config.band,
        }
    }

    pub fn args_for(&self, band: Band, action: &str, value: Option<&str>) -> Vec<String> {
        let mut args = self.common_args.clone();
        args.extend(["--band".to_string(), band.letter().to_string()]);
        args.extend(["--action".to_string(), action.to_string()]);
        if let Some(value) = value {
            args.extend(["--value".to_string(), value.to_string()]);
        }
        args
    }

    fn run_action(&self, band: Band, action: &str, value: Option<&str>) -> Result<String> {
        let output = Command::new(&self.program)
            .args(self.args_for(band, action, value))
            .output()
            .with_context(|| format!("failed to execute {}", self.program.display()))?;
        if !output.status.success() {
            return Err(anyhow!(
                "{} --action {action} exited with status {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl ApControl for HelperController {
    fn disable(&mut self) -> Result<()> {
        self.run_action(self.band, "disable", None).map(drop)
    }

    fn enable(&mut self) -> Result<()> {
        self.run_action(self.band, "enable", None).map(drop)
    }

    fn set_attribute(&mut self, band: Band, attribute: ApAttribute, value: &str) -> Result<()> {
        self.run_action(band, attribute.helper_action(), Some(value)).map(drop)
    }

    fn run_raw_command(&mut self, command: &str) -> Result<()> {
        self.run_action(self.band, "cmd", Some(command)).map(drop)
    }

    fn query_advanced_status(&mut self) -> Result<String> {
        self.run_action(self.band, "advanced", None)
    }
}

const PROMPT_TIMEOUT: Duration = Duration::from_secs(15);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Controller console session on a serial line. Logs in lazily and keeps the session open.
pub struct SerialController {
    console: SerialConsole,
    user: String,
    password: String,
    ap: String,
    band: Band,
    logged_in: bool,
    prompt: Regex,
    user_prompt: Regex,
    password_prompt: Regex,
    confirm_prompt: Regex,
}

impl SerialController {
    pub fn open(config: &ControllerConfig, tty: &str, baud: u32) -> Result<Self> {
        Ok(Self {
            console: SerialConsole::open(tty, baud)?,
            user: config.user.clone(),
            password: config.password.clone(),
            ap: config.ap.clone(),
            band: config.band,
            logged_in: false,
            prompt: Regex::new(r"^\(.*\)\s*>$")?,
            user_prompt: Regex::new(r"User:$")?,
            password_prompt: Regex::new(r"Password:$")?,
            confirm_prompt: Regex::new(r"\(y/n\)\s*$")?,
        })
    }

    fn ensure_session(&mut self) -> Result<()> {
        if self.logged_in {
            return Ok(());
        }
        self.console.send_line("")?;
        let prompts = [&self.prompt, &self.user_prompt];
        let found = self
            .console
            .wait_for_prompt(&prompts, PROMPT_TIMEOUT)?
            .ok_or_else(|| anyhow!("controller console: no login or command prompt"))?;

        if found == 1 {
            self.console.send_line(&self.user)?;
            self.console
                .wait_for_prompt(&[&self.password_prompt], PROMPT_TIMEOUT)?
                .ok_or_else(|| anyhow!("controller console: no password prompt"))?;
            self.console.send_line(&self.password)?;
            self.console
                .wait_for_prompt(&[&self.prompt], PROMPT_TIMEOUT)?
                .ok_or_else(|| anyhow!("controller console: login rejected"))?;
        }
        self.logged_in = true;

        self.command("config paging disable").map(drop)
    }

    fn command(&mut self, command: &str) -> Result<String> {
        let mark = self.console.mark();
        self.console.send_line(command)?;
        loop {
            let prompts = [&self.prompt, &self.confirm_prompt];
            match self.console.wait_for_prompt(&prompts, COMMAND_TIMEOUT)? {
                Some(0) => break,
                Some(_) => self.console.send_line("y")?,
                None => {
                    self.logged_in = false;
                    return Err(anyhow!("controller console: `{command}` did not complete"));
                }
            }
        }
        Ok(strip_echo(self.console.lines_since(mark), command))
    }

    fn run(&mut self, command: &str) -> Result<String> {
        self.ensure_session()?;
        self.command(command)
    }
}

fn strip_echo(lines: Vec<String>, command: &str) -> String {
    lines
        .into_iter()
        .skip_while(|line| line.ends_with(command))
        .collect::<Vec<_>>()
        .join("\n")
}

impl ApControl for SerialController {
    fn disable(&mut self) -> Result<()> {
        let command = format!("config 802.11{} disable {}", self.band.letter(), self.ap);
        self.run(&command).map(drop)
    }

    fn enable(&mut self) -> Result<()> {
        let command = format!("config 802.11{} enable {}", self.band.letter(), self.ap);
        self.run(&command).map(drop)
    }

    fn set_attribute(&mut self, band: Band, attribute: ApAttribute, value: &str) -> Result<()> {
        let command = attribute.cli_command(band, &self.ap, value);
        self.run(&command).map(drop)
    }

    fn run_raw_command(&mut self, command: &str) -> Result<()> {
        self.run(command).map(drop)
    }

    fn query_advanced_status(&mut self) -> Result<String> {
        let command = format!("show advanced 802.11{} summary", self.band.letter());
        self.run(&command)
    }
}
