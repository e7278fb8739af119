use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only JSONL log of what happened during one run
pub struct ActivityLog {
    pub path: PathBuf,
    run_id: String,
    file: Option<File>,
}

#[derive(Serialize)]
struct Event<'a> {
    ts: DateTime<Utc>,
    run_id: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
    #[serde(flatten)]
    data: serde_json::Value,
}

impl ActivityLog {
    pub fn new(path: &Path, run_id: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            run_id: run_id.to_string(),
            file: Some(file),
        })
    }

    /// A log that records nothing
    pub fn disabled(run_id: &str) -> Self {
        Self {
            path: PathBuf::new(),
            run_id: run_id.to_string(),
            file: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    pub fn log(&mut self, event_type: &str, data: serde_json::Value) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        let event = Event {
            ts: Utc::now(),
            run_id: &self.run_id,
            event_type,
            data,
        };
        let line = serde_json::to_string(&event)?;
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }

    pub fn directory_loaded(&mut self, departments: usize) -> Result<()> {
        self.log(
            "directory_loaded",
            serde_json::json!({ "departments": departments }),
        )
    }

    pub fn login(&mut self, roll_no: &str, ok: bool, error: Option<&str>) -> Result<()> {
        self.log(
            "login",
            serde_json::json!({ "roll_no": roll_no, "ok": ok, "error": error }),
        )
    }

    pub fn logout(&mut self, roll_no: &str) -> Result<()> {
        self.log("logout", serde_json::json!({ "roll_no": roll_no }))
    }

    /// Log a pass being issued
    pub fn pass_generated(&mut self, roll_no: &str, timestamp: i64) -> Result<()> {
        self.log(
            "pass_generated",
            serde_json::json!({ "roll_no": roll_no, "timestamp": timestamp }),
        )
    }

    /// Log a simulated gate decision
    pub fn gate_event(&mut self, status: &str, roll_no: Option<&str>) -> Result<()> {
        self.log(
            "gate_event",
            serde_json::json!({ "status": status, "roll_no": roll_no }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_writes_jsonl_events() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("activity").join("run.jsonl");
        let mut log = ActivityLog::new(&path, "run-1").unwrap();
        log.login("R1", true, None).unwrap();
        log.pass_generated("R1", 42).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "login");
        assert_eq!(lines[0]["run_id"], "run-1");
        assert_eq!(lines[0]["ok"], true);
        assert_eq!(lines[1]["timestamp"], 42);
    }

    #[test]
    fn test_disabled_log_is_silent() {
        let mut log = ActivityLog::disabled("run-2");
        assert!(!log.is_enabled());
        log.logout("R1").unwrap();
    }
}
