use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use serde_json::{json, Value};

const LOGGER_NAME: &str = "txpower_sweep";

/// Operator-facing log.
///
/// Every message goes to the console. `--log <path>` additionally mirrors messages as
/// timestamped text lines, and `TXSWEEP_LOG_JSON_PATH` appends one JSON object per event.
pub struct Logger {
    text_file: Option<File>,
    json_file: Option<File>,
}

impl Logger {
    pub fn from_env(log_destination: Option<&str>) -> Result<Self> {
        let text_path = match log_destination {
            None | Some("stdout") => None,
            Some(path) => Some(PathBuf::from(path)),
        };
        let json_path = crate::env_utils::env_opt("TXSWEEP_LOG_JSON_PATH").map(PathBuf::from);
        Self::new(text_path, json_path)
    }

    pub fn new(text_path: Option<PathBuf>, json_path: Option<PathBuf>) -> Result<Self> {
        let text_file = match text_path {
            Some(path) => {
                ensure_parent_dir(&path)?;
                Some(
                    File::create(&path)
                        .with_context(|| format!("failed to create log file {}", path.display()))?,
                )
            }
            None => None,
        };
        let json_file = match json_path {
            Some(path) => {
                ensure_parent_dir(&path)?;
                Some(
                    OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&path)
                        .with_context(|| format!("failed to open {}", path.display()))?,
                )
            }
            None => None,
        };
        Ok(Self {
            text_file,
            json_file,
        })
    }

    pub fn info(&mut self, message: impl AsRef<str>) {
        println!("{}", message.as_ref());
        self.event("info", message.as_ref());
    }

    pub fn warn(&mut self, message: impl AsRef<str>) {
        eprintln!("{}", message.as_ref());
        self.event("warn", message.as_ref());
    }

    pub fn error(&mut self, message: impl AsRef<str>) {
        eprintln!("{}", message.as_ref());
        self.event("error", message.as_ref());
    }

    /// Structured record that only lands in the JSON event file.
    pub fn record<T: Serialize>(&mut self, kind: &str, payload: &T) {
        let Some(file) = &mut self.json_file else {
            return;
        };
        let entry = json!({
            "ts_ms": Local::now().timestamp_millis(),
            "level": "info",
            "kind": kind,
            "data": serde_json::to_value(payload).unwrap_or(Value::Null),
        });
        let _ = writeln!(file, "{}", entry);
        let _ = file.flush();
    }

    pub fn event(&mut self, level: &str, message: &str) {
        let now = Local::now();

        if let Some(file) = &mut self.text_file {
            let _ = writeln!(
                file,
                "{} {} {}: {}",
                now.format("%Y-%m-%d %H:%M:%S,%3f"),
                LOGGER_NAME,
                level.to_ascii_uppercase(),
                message
            );
            let _ = file.flush();
        }

        let Some(file) = &mut self.json_file else {
            return;
        };
        let entry = json!({
            "ts_ms": now.timestamp_millis(),
            "level": level,
            "msg": message,
        });
        let _ = writeln!(file, "{}", entry);
        let _ = file.flush();
    }
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_log_lines_carry_level_and_name() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let text = dir.path().join("logs/run.log");
        let events = dir.path().join("logs/events.jsonl");
        let mut logger = Logger::new(Some(text.clone()), Some(events.clone()))?;

        logger.warn("Station did not connect within 60 seconds.");
        logger.record("summary", &json!({ "rows_written": 3 }));

        let text_raw = fs::read_to_string(&text)?;
        assert!(text_raw.contains("txpower_sweep WARN: Station did not connect within 60 seconds."));

        let lines = fs::read_to_string(&events)?;
        let parsed: Vec<Value> = lines
            .lines()
            .map(serde_json::from_str)
            .collect::<std::result::Result<_, _>>()?;
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["level"], "warn");
        assert_eq!(parsed[1]["kind"], "summary");
        assert_eq!(parsed[1]["data"]["rows_written"], 3);
        Ok(())
    }

    #[test]
    fn stdout_destination_keeps_console_only() -> Result<()> {
        let logger = Logger::from_env(Some("stdout"))?;
        assert!(logger.text_file.is_none());
        Ok(())
    }
}
