//! `tracing` integration for the loop render handler
//!
//! Events become [`LogRecord`]s. An event carrying a `loop_id` field (and
//! usually an `index` field) is rendered as a frame line; anything else is
//! a plain line.
//!
//! ```no_run
//! use stackrun::log::layer::{LoopRenderLayer, RenderMode};
//! use tracing_subscriber::prelude::*;
//!
//! let layer = LoopRenderLayer::new(std::io::stderr(), RenderMode::Redraw);
//! tracing_subscriber::registry().with(layer).init();
//!
//! tracing::info!(loop_id = 1_u64, index = 0_u64, "vpc: pending");
//! ```

use std::fmt::{self, Write as FmtWrite};
use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::log::handler::LoopRenderHandler;
use crate::log::record::{LogRecord, LoopId};

/// Event field naming the frame family
pub const LOOP_FIELD: &str = "loop_id";
/// Event field giving the line's position within its frame
pub const INDEX_FIELD: &str = "index";

/// How frame lines reach the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Redraw frames in place
    Redraw,
    /// Print every line as ordinary scrolling output
    Scroll,
}

/// Pulls the message and loop metadata out of an event.
#[derive(Default)]
struct RecordVisitor {
    message: Option<String>,
    loop_id: Option<LoopId>,
    index: Option<usize>,
    fields: Vec<(String, String)>,
}

impl RecordVisitor {
    fn into_record(self, level: Level) -> LogRecord {
        let message = self.message.unwrap_or_default();
        if self.loop_id.is_some() {
            // Frame rows carry only their text so every redraw has the same shape
            return LogRecord::from_parts(message, self.loop_id, self.index);
        }

        let mut line = match level {
            Level::ERROR => format!("ERROR: {message}"),
            Level::WARN => format!("WARN: {message}"),
            _ => message,
        };
        for (key, value) in &self.fields {
            let _ = write!(line, " {key}={value}");
        }
        LogRecord::plain(line)
    }
}

impl Visit for RecordVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(rendered);
        } else {
            self.fields
                .push((field.name().to_string(), strip_debug_quotes(&rendered)));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields
                .push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        match field.name() {
            LOOP_FIELD => self.loop_id = Some(LoopId::from_raw(value)),
            INDEX_FIELD => self.index = usize::try_from(value).ok(),
            name => self.fields.push((name.to_string(), value.to_string())),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        match field.name() {
            LOOP_FIELD => self.loop_id = u64::try_from(value).ok().map(LoopId::from_raw),
            // Negative indices are dropped, which makes the line start a frame
            INDEX_FIELD => self.index = usize::try_from(value).ok(),
            name => self.fields.push((name.to_string(), value.to_string())),
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .push((field.name().to_string(), value.to_string()));
    }
}

/// Remove surrounding quotes from Debug-formatted strings.
fn strip_debug_quotes(s: &str) -> String {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

/// A `tracing_subscriber::Layer` that renders events through a
/// [`LoopRenderHandler`].
///
/// If the stream ever fails, the layer falls back to [`RenderMode::Scroll`]
/// for the rest of its life: cursor movement against a stream that lost
/// output would overwrite the wrong lines.
pub struct LoopRenderLayer<W: Write> {
    handler: LoopRenderHandler<W>,
    scroll: Mutex<bool>,
}

impl<W: Write> LoopRenderLayer<W> {
    /// Create a layer writing to `stream`
    pub const fn new(stream: W, mode: RenderMode) -> Self {
        Self {
            handler: LoopRenderHandler::new(stream),
            scroll: Mutex::new(matches!(mode, RenderMode::Scroll)),
        }
    }

    /// Current rendering mode
    pub fn mode(&self) -> RenderMode {
        if *self.lock_scroll() {
            RenderMode::Scroll
        } else {
            RenderMode::Redraw
        }
    }

    fn write_event(&self, event: &Event<'_>) {
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let mut record = visitor.into_record(*event.metadata().level());

        // Held across the emit: a failure must be seen by every later event
        let mut scroll = self.lock_scroll();
        if *scroll {
            record = record.into_plain();
        }

        // A layer cannot report errors; degrade instead of losing the display
        if self.handler.emit(&record).is_err() {
            *scroll = true;
        }
    }

    fn lock_scroll(&self) -> MutexGuard<'_, bool> {
        self.scroll.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S, W> Layer<S> for LoopRenderLayer<W>
where
    S: Subscriber,
    W: Write + Send + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.write_event(event);
    }
}
