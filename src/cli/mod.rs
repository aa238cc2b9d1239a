//! CLI output formatting
//!
//! Provides the colored summaries printed after a run and for `--history`.

pub mod display;

pub use display::format_outcome_line;
pub use display::render_history;
pub use display::render_run_summary;
