//! Per-stack status and the status table rendered as a loop frame

use std::fmt;
use std::time::Instant;

use crate::plan::config::PlanConfig;

/// Where a stack is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackStatus {
    /// Waiting for requirements or a free slot
    Pending,
    /// Command is running
    Running {
        /// When the command was launched
        started: Instant,
    },
    /// Command exited with status 0
    Complete,
    /// Command failed or could not be started
    Failed {
        /// Exit code, if the process exited normally
        exit_code: Option<i32>,
    },
    /// Will not run
    Skipped {
        /// Why the stack was skipped
        reason: String,
    },
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running { started } => write!(f, "running ({}s)", started.elapsed().as_secs()),
            Self::Complete => write!(f, "complete"),
            Self::Failed {
                exit_code: Some(code),
            } => write!(f, "failed (exit {code})"),
            Self::Failed { exit_code: None } => write!(f, "failed (signal)"),
            Self::Skipped { reason } => write!(f, "skipped ({reason})"),
        }
    }
}

/// Status of every stack in plan order
#[derive(Debug, Clone)]
pub struct StatusBoard {
    entries: Vec<(String, StackStatus)>,
}

impl StatusBoard {
    /// Board with every stack of `plan` pending
    #[must_use]
    pub fn new(plan: &PlanConfig) -> Self {
        Self {
            entries: plan
                .stacks
                .iter()
                .map(|s| (s.name.clone(), StackStatus::Pending))
                .collect(),
        }
    }

    /// Status of a stack, if it is on the board
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StackStatus> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, status)| status)
    }

    /// Update a stack's status. Unknown names are ignored.
    pub fn set(&mut self, name: &str, status: StackStatus) {
        if let Some((_, current)) = self.entries.iter_mut().find(|(n, _)| n == name) {
            *current = status;
        }
    }

    /// Number of stacks currently running
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, s)| matches!(s, StackStatus::Running { .. }))
            .count()
    }

    /// Names of stacks still pending, in plan order
    #[must_use]
    pub fn pending(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, s)| *s == StackStatus::Pending)
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Iterate over `(name, status)` in plan order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &StackStatus)> {
        self.entries.iter().map(|(n, s)| (n.as_str(), s))
    }

    /// One line per stack, names padded so statuses line up
    #[must_use]
    pub fn frame_lines(&self) -> Vec<String> {
        let width = self.entries.iter().map(|(n, _)| n.len()).max().unwrap_or(0);
        self.entries
            .iter()
            .map(|(name, status)| format!("{name:<width$}  {status}"))
            .collect()
    }
}
