//! JSONL (JSON Lines) history of stack outcomes
//!
//! Provides append-only logging of stack outcomes to `.stackrun/history.jsonl`

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

/// Final state of a stack in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Command exited with status 0
    Complete,
    /// Command failed or could not be started
    Failed,
    /// Never started because a requirement did not complete
    Skipped,
}

/// Represents the outcome of a single stack in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOutcome {
    /// Name of the stack
    pub stack: String,
    /// ISO 8601 timestamp of when the outcome was recorded
    pub timestamp: DateTime<Utc>,
    /// How the stack ended
    pub status: OutcomeStatus,
    /// Process exit code (None if killed by signal or never started)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Duration of the stack's command in seconds
    pub duration_secs: u64,
    /// Failure or skip detail, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// JSONL logger for stack outcome history
///
/// Each line of `history.jsonl` is a JSON object for one stack outcome.
pub struct JsonlLogger {
    log_path: PathBuf,
}

impl JsonlLogger {
    /// Create a new JSONL logger
    ///
    /// # Arguments
    /// * `log_dir` - Directory where history.jsonl will be stored (typically `.stackrun`)
    ///
    /// # Errors
    /// Returns an error if the log directory cannot be created
    pub fn new<P: AsRef<Path>>(log_dir: P) -> Result<Self> {
        let log_dir = log_dir.as_ref();

        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

        Ok(Self {
            log_path: log_dir.join("history.jsonl"),
        })
    }

    /// Append a stack outcome to the history
    ///
    /// # Errors
    /// Returns an error if:
    /// - The log file cannot be opened or created
    /// - The outcome cannot be serialized to JSON
    /// - Writing to the file fails
    pub fn append(&self, outcome: &StackOutcome) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("Failed to open log file: {}", self.log_path.display()))?;

        let json =
            serde_json::to_string(outcome).context("Failed to serialize stack outcome to JSON")?;

        writeln!(file, "{json}").context("Failed to write to log file")?;

        Ok(())
    }

    /// Read all stack outcomes from the history, in the order they were written
    ///
    /// # Errors
    /// Returns an error if:
    /// - The log file cannot be read
    /// - Any line cannot be parsed as valid JSON
    pub fn read_all(&self) -> Result<Vec<StackOutcome>> {
        if !self.log_path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.log_path)
            .with_context(|| format!("Failed to read log file: {}", self.log_path.display()))?;

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(line_num, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("Failed to parse line {} as JSON", line_num + 1))
            })
            .collect()
    }

    /// Get the path to the log file
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}
