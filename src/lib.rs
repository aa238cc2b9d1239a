//! stackrun - Dependency-ordered stack runner
//!
//! Runs one shell command per stack, concurrently and in dependency order,
//! while a live status table is redrawn in place on the terminal.

// Allow multiple crate versions from dependencies (can't easily control)
#![allow(clippy::multiple_crate_versions)]

pub mod cli;
pub mod log;
pub mod plan;

#[cfg(test)]
mod testutil;

// Re-export commonly used types
pub use log::{LogRecord, LoopId, LoopRenderHandler, LoopRenderLayer, RenderMode};
pub use plan::config::{GlobalConfig, PlanConfig, StackConfig};
pub use plan::executor::{PlanExecutor, RunSummary, StackResult};
