use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use crate::port_detect;

pub fn parse_env_u32(name: &str, default: u32) -> Result<u32> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u32>()
            .with_context(|| format!("{name} must be an unsigned integer")),
        Err(std::env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(anyhow!("{name} invalid: {err}")),
    }
}

pub fn parse_env_path(name: &str, default: &str) -> Result<PathBuf> {
    match std::env::var(name) {
        Ok(raw) if raw.trim().is_empty() => Err(anyhow!("{name} must not be empty")),
        Ok(raw) => Ok(PathBuf::from(raw)),
        Err(std::env::VarError::NotPresent) => Ok(PathBuf::from(default)),
        Err(err) => Err(anyhow!("{name} invalid: {err}")),
    }
}

pub fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// Serial device for the controller console: explicit `--tty` first, then autodetection.
pub fn require_tty(explicit: Option<&str>) -> Result<String> {
    if let Some(tty) = explicit.filter(|tty| !tty.trim().is_empty()) {
        return Ok(tty.to_string());
    }

    if let Some(tty) = port_detect::detect_port() {
        return Ok(tty);
    }

    let candidates = port_detect::list_candidates();
    let mut message = String::from(
        "--tty is not set and serial autodetection was not conclusive. Pass --tty explicitly.",
    );
    if !candidates.is_empty() {
        message.push_str(" Candidates:\n");
        for candidate in candidates {
            message.push_str("  - ");
            message.push_str(&candidate);
            message.push('\n');
        }
    }
    Err(anyhow!(message))
}

pub fn baud_from_env(default: u32) -> Result<u32> {
    parse_env_u32("TXSWEEP_SERIAL_BAUD", default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helper_path_falls_back_to_default() -> Result<()> {
        let path = parse_env_path("TXSWEEP_TEST_UNSET_HELPER", "./lf_portmod.pl")?;
        assert_eq!(path, PathBuf::from("./lf_portmod.pl"));
        Ok(())
    }

    #[test]
    fn explicit_tty_skips_autodetection() -> Result<()> {
        assert_eq!(require_tty(Some("/dev/ttyUSB3"))?, "/dev/ttyUSB3");
        Ok(())
    }

    #[test]
    fn unset_numbers_use_default() -> Result<()> {
        assert_eq!(parse_env_u32("TXSWEEP_TEST_UNSET_BAUD", 9600)?, 9600);
        assert_eq!(env_opt("TXSWEEP_TEST_UNSET_VALUE"), None);
        Ok(())
    }
}
