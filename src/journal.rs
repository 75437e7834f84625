//! Append-only JSONL record of the commands run against the backend.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const JOURNAL_FILE: &str = "journal.jsonl";

pub struct Journal {
    pub path: PathBuf,
    run_id: String,
    file: File,
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

impl Journal {
    /// Open `<dir>/journal.jsonl` for appending, creating the directory if needed.
    /// Every run shares the file; events carry `run_id` to tell runs apart.
    pub fn open(dir: &Path, run_id: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(JOURNAL_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            run_id: run_id.to_string(),
            file,
        })
    }

    pub fn log(&mut self, event_type: &str, data: serde_json::Value) -> Result<()> {
        let event = Event {
            ts: Utc::now(),
            run_id: &self.run_id,
            event_type,
            data,
        };
        let line = serde_json::to_string(&event)?;
        writeln!(self.file, "{}", line)?;
        self.file.flush()?;
        Ok(())
    }

    pub fn command(&mut self, name: &str) -> Result<()> {
        self.log("command", serde_json::json!({ "name": name }))
    }

    /// Outcome of a command; `error` is the displayed failure, if any
    pub fn outcome(&mut self, name: &str, ok: bool, error: Option<&str>) -> Result<()> {
        self.log(
            "outcome",
            serde_json::json!({ "name": name, "ok": ok, "error": error }),
        )
    }

    pub fn session_state(&mut self, state: &str) -> Result<()> {
        self.log("session_state", serde_json::json!({ "state": state }))
    }
}
