use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;
use serde::Serialize;

use crate::{
    controller::{Band, Scheme},
    env_utils,
    sweep::{parse_axis, SweepPlan},
};

pub const DEFAULT_AP_HELPER: &str = "./cisco_wifi_ctl.py";
pub const DEFAULT_PORTMOD_HELPER: &str = "./lf_portmod.pl";

#[derive(Debug, Parser)]
#[command(name = "txpower-sweep")]
#[command(about = "Sweep AP transmit power and record what a test station receives")]
pub struct Cli {
    /// Controller address.
    #[arg(short = 'd', long)]
    pub dest: Option<String>,
    /// Controller control port.
    #[arg(short = 'o', long)]
    pub port: Option<u16>,
    #[arg(short = 'u', long)]
    pub user: Option<String>,
    #[arg(short = 'p', long)]
    pub passwd: Option<String>,
    #[arg(short = 's', long, value_enum, default_value_t = Scheme::Ssh)]
    pub scheme: Scheme,
    /// Serial device for `--scheme serial`.
    #[arg(short = 't', long)]
    pub tty: Option<String>,
    /// Log file, or `stdout` for console only.
    #[arg(short = 'l', long)]
    pub log: Option<String>,
    #[arg(short = 'a', long)]
    pub ap: Option<String>,
    /// Space-separated bandwidths in MHz, or NA.
    #[arg(short = 'b', long)]
    pub bandwidth: Option<String>,
    #[arg(short = 'c', long)]
    pub channel: Option<String>,
    #[arg(short = 'n', long)]
    pub nss: Option<String>,
    #[arg(short = 'T', long)]
    pub txpower: Option<String>,
    #[arg(long, default_value = "sta00000")]
    pub station: String,
    #[arg(long, default_value = "127.0.0.1")]
    pub lfmgr: String,
    #[arg(long, default_value = "1")]
    pub lfresource: String,
    #[arg(long, default_value = "cisco_power_results.txt")]
    pub outfile: PathBuf,
    /// Calibrated attenuation between AP and station, in dB.
    #[arg(long)]
    pub pathloss: Option<String>,
    #[arg(long, value_enum, default_value_t = Band::A)]
    pub band: Band,
}

#[derive(Clone, Debug, Serialize)]
pub struct ControllerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: String,
    #[serde(skip)]
    pub password: String,
    pub scheme: Scheme,
    pub tty: Option<String>,
    pub ap: String,
    pub band: Band,
    pub helper: PathBuf,
}

#[derive(Clone, Debug, Serialize)]
pub struct StationConfig {
    pub manager: String,
    pub resource: String,
    pub station: String,
    pub portmod: PathBuf,
}

/// Everything a run needs, validated before any device is touched.
#[derive(Clone, Debug, Serialize)]
pub struct RunConfig {
    pub controller: ControllerConfig,
    pub station: StationConfig,
    pub plan: SweepPlan,
    pub path_loss_db: i32,
    pub outfile: PathBuf,
}

impl RunConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let plan = SweepPlan::new(
            parse_axis("channels", cli.channel.as_deref())?,
            parse_axis("NSS", cli.nss.as_deref())?,
            parse_axis("bandwidths", cli.bandwidth.as_deref())?,
            parse_axis("txpower", cli.txpower.as_deref())?,
        )?;
        let path_loss_db = parse_path_loss(cli.pathloss.as_deref())?;

        let user = required("user", cli.user.as_deref())?;
        let password = required("passwd", cli.passwd.as_deref())?;
        let ap = required("ap", cli.ap.as_deref())?;
        let host = cli.dest.clone().filter(|host| !host.trim().is_empty());
        if host.is_none() && cli.scheme != Scheme::Serial {
            return Err(anyhow!(
                "Must specify dest for scheme {}",
                cli.scheme.as_str()
            ));
        }

        Ok(Self {
            controller: ControllerConfig {
                host,
                port: cli.port,
                user,
                password,
                scheme: cli.scheme,
                tty: cli.tty.clone(),
                ap,
                band: cli.band,
                helper: env_utils::parse_env_path("TXSWEEP_AP_CTL", DEFAULT_AP_HELPER)?,
            },
            station: StationConfig {
                manager: cli.lfmgr.clone(),
                resource: cli.lfresource.clone(),
                station: cli.station.clone(),
                portmod: env_utils::parse_env_path("TXSWEEP_PORTMOD", DEFAULT_PORTMOD_HELPER)?,
            },
            plan,
            path_loss_db,
            outfile: cli.outfile.clone(),
        })
    }
}

fn required(name: &str, raw: Option<&str>) -> Result<String> {
    raw.filter(|value| !value.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Must specify {name}"))
}

fn parse_path_loss(raw: Option<&str>) -> Result<i32> {
    let raw = raw.ok_or_else(|| anyhow!("Must specify pathloss"))?;
    raw.trim()
        .parse::<i32>()
        .map_err(|_| anyhow!("pathloss `{raw}` is not an integer"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<&'static str> {
        vec![
            "txpower-sweep",
            "-d",
            "192.168.100.112",
            "-u",
            "admin",
            "-p",
            "secret",
            "-a",
            "APA453.0E7B.CF9C",
            "-b",
            "20 40 80",
            "-c",
            "36",
            "-n",
            "1 2",
            "-T",
            "1 2 3",
            "--pathloss",
            "54",
        ]
    }

    #[test]
    fn complete_command_line_builds_plan() -> Result<()> {
        let cli = Cli::try_parse_from(base_args())?;
        let config = RunConfig::from_cli(&cli)?;
        assert_eq!(config.plan.len(), 18);
        assert_eq!(config.path_loss_db, 54);
        assert_eq!(config.controller.scheme, Scheme::Ssh);
        assert_eq!(config.controller.band, Band::A);
        assert_eq!(config.station.station, "sta00000");
        assert_eq!(config.station.manager, "127.0.0.1");
        assert_eq!(config.outfile, PathBuf::from("cisco_power_results.txt"));
        Ok(())
    }

    #[test]
    fn password_is_not_serialized() -> Result<()> {
        let cli = Cli::try_parse_from(base_args())?;
        let config = RunConfig::from_cli(&cli)?;
        let text = serde_json::to_string(&config)?;
        assert!(!text.contains("secret"));
        assert!(text.contains("APA453.0E7B.CF9C"));
        Ok(())
    }

    #[test]
    fn missing_or_bad_inputs_are_rejected() -> Result<()> {
        for (flag, axis) in [
            ("-b", "bandwidths"),
            ("-c", "channels"),
            ("-n", "NSS"),
            ("-T", "txpower"),
            ("--pathloss", "pathloss"),
        ] {
            let mut args = base_args();
            let pos = args.iter().position(|a| *a == flag).expect("flag present");
            args.drain(pos..pos + 2);
            let cli = Cli::try_parse_from(args)?;
            let err = RunConfig::from_cli(&cli).expect_err("axis missing");
            assert!(err.to_string().contains(&format!("Must specify {axis}")), "{err}");
        }

        let mut args = base_args();
        let pos = args.iter().position(|a| *a == "--pathloss").expect("flag present");
        args[pos + 1] = "fifty";
        let cli = Cli::try_parse_from(args)?;
        assert!(RunConfig::from_cli(&cli).is_err());

        let mut args = base_args();
        args.drain(1..3);
        let cli = Cli::try_parse_from(args)?;
        let err = RunConfig::from_cli(&cli).expect_err("dest missing");
        assert!(err.to_string().contains("Must specify dest"));
        Ok(())
    }

    #[test]
    fn serial_scheme_does_not_need_dest() -> Result<()> {
        let mut args = base_args();
        args.drain(1..3);
        args.extend(["-s", "serial", "-t", "/dev/ttyUSB0", "--band", "b"]);
        let cli = Cli::try_parse_from(args)?;
        let config = RunConfig::from_cli(&cli)?;
        assert_eq!(config.controller.scheme, Scheme::Serial);
        assert_eq!(config.controller.host, None);
        assert_eq!(config.controller.band, Band::B);
        Ok(())
    }
}
