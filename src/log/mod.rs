//! Logging and observability
//!
//! Console output goes through the loop-aware renderer so that the status
//! table redraws in place. Stack outcomes are also kept as JSONL history.

pub mod handler;
pub mod jsonl;
pub mod layer;
pub mod record;

use std::io::IsTerminal;

use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub use handler::{LoopRenderHandler, RenderState};
pub use jsonl::{JsonlLogger, OutcomeStatus, StackOutcome};
pub use layer::{LoopRenderLayer, RenderMode};
pub use record::{LogRecord, LoopId};

/// Error type for logging initialization failures.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// Filter directive could not be parsed
    #[error("Invalid log filter: {0}")]
    InvalidFilter(#[from] ParseError),

    /// Tracing subscriber already initialized
    #[error("Tracing subscriber already initialized")]
    SubscriberAlreadySet,
}

/// Settings for the console subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Whether frames are redrawn or scrolled
    pub mode: RenderMode,
    /// Filter used when `RUST_LOG` is not set
    pub default_filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            mode: RenderMode::Redraw,
            default_filter: "info".to_string(),
        }
    }
}

impl RenderMode {
    /// Pick a mode for stderr: redraw only on a terminal, and only if the
    /// user did not ask for plain output.
    #[must_use]
    pub fn detect(no_redraw: bool) -> Self {
        if no_redraw || !std::io::stderr().is_terminal() {
            Self::Scroll
        } else {
            Self::Redraw
        }
    }
}

/// Build the filter: `RUST_LOG` if set, otherwise `default_filter`.
fn build_filter(default_filter: &str) -> Result<EnvFilter, LoggingError> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => Ok(EnvFilter::try_new(directives)?),
        _ => Ok(EnvFilter::try_new(default_filter)?),
    }
}

/// Initialize the tracing subscriber with the loop render layer on stderr.
///
/// Respects the `RUST_LOG` environment variable, falling back to
/// `settings.default_filter`.
pub fn init(settings: &LogSettings) -> Result<(), LoggingError> {
    let filter = build_filter(&settings.default_filter)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(LoopRenderLayer::new(std::io::stderr(), settings.mode))
        .try_init()
        .map_err(|_| LoggingError::SubscriberAlreadySet)
}
