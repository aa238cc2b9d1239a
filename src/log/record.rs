//! Log records consumed by the loop render handler
//!
//! A record is either a plain scrolling line or one line of a redrawable
//! frame. Frames are grouped by an opaque [`LoopId`].

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LOOP_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier grouping records into redrawable frames.
///
/// Only equality matters; the numeric value carries no ordering meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopId(u64);

impl LoopId {
    /// Allocate an id that no other call in this process has returned.
    #[must_use]
    pub fn fresh() -> Self {
        Self(NEXT_LOOP_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Rebuild an id from its raw value (e.g. a structured log field).
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value, suitable for passing through a structured log field.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// A single, already formatted line of output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// Ordinary scrolling line
    Plain {
        /// Line text, without trailing newline
        message: String,
    },
    /// One line of a frame that is redrawn in place
    LoopLine {
        /// Line text, without trailing newline
        message: String,
        /// Frame family this line belongs to
        loop_id: LoopId,
        /// Zero-based position of the line within its frame
        index: usize,
    },
}

impl LogRecord {
    /// Create a plain record
    #[must_use]
    pub fn plain(message: impl Into<String>) -> Self {
        Self::Plain {
            message: single_line(message.into()),
        }
    }

    /// Create a frame line record
    #[must_use]
    pub fn loop_line(message: impl Into<String>, loop_id: LoopId, index: usize) -> Self {
        Self::LoopLine {
            message: single_line(message.into()),
            loop_id,
            index,
        }
    }

    /// Build a record from loosely-typed attributes.
    ///
    /// An index without a loop id is ignored. A loop id without an index is
    /// treated as index 0, i.e. the start of a frame.
    #[must_use]
    pub fn from_parts(
        message: impl Into<String>,
        loop_id: Option<LoopId>,
        index: Option<usize>,
    ) -> Self {
        match loop_id {
            Some(loop_id) => Self::loop_line(message, loop_id, index.unwrap_or(0)),
            None => Self::plain(message),
        }
    }

    /// Line text
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Plain { message } | Self::LoopLine { message, .. } => message,
        }
    }

    /// Drop loop metadata, turning any record into a plain one.
    #[must_use]
    pub fn into_plain(self) -> Self {
        match self {
            Self::Plain { .. } => self,
            Self::LoopLine { message, .. } => Self::Plain { message },
        }
    }
}

/// Trailing line breaks are dropped; interior ones become spaces, since a
/// record must occupy exactly one terminal row.
fn single_line(mut message: String) -> String {
    let trimmed = message.trim_end_matches(['\r', '\n']).len();
    message.truncate(trimmed);
    if message.contains(['\r', '\n']) {
        message = message.replace(['\r', '\n'], " ");
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_loop_ids_are_distinct() {
        let a = LoopId::fresh();
        let b = LoopId::fresh();
        assert_ne!(a, b);
    }

    #[test]
    fn test_loop_id_raw_round_trip() {
        let id = LoopId::fresh();
        assert_eq!(LoopId::from_raw(id.as_u64()), id);
    }

    #[test]
    fn test_from_parts_without_metadata_is_plain() {
        let record = LogRecord::from_parts("hello", None, None);
        assert_eq!(record, LogRecord::plain("hello"));
    }

    #[test]
    fn test_from_parts_index_without_loop_is_plain() {
        let record = LogRecord::from_parts("hello", None, Some(3));
        assert_eq!(record, LogRecord::plain("hello"));
    }

    #[test]
    fn test_from_parts_loop_with_index() {
        let id = LoopId::from_raw(7);
        let record = LogRecord::from_parts("row", Some(id), Some(2));
        assert_eq!(record, LogRecord::loop_line("row", id, 2));
    }

    #[test]
    fn test_from_parts_loop_without_index_starts_frame() {
        let id = LoopId::from_raw(7);
        let record = LogRecord::from_parts("row", Some(id), None);
        assert_eq!(record, LogRecord::loop_line("row", id, 0));
    }

    #[test]
    fn test_trailing_newlines_are_trimmed() {
        assert_eq!(LogRecord::plain("done\r\n").message(), "done");
        assert_eq!(
            LogRecord::loop_line("vpc: pending\n", LoopId::from_raw(1), 0).message(),
            "vpc: pending"
        );
    }

    #[test]
    fn test_interior_line_breaks_become_spaces() {
        assert_eq!(LogRecord::plain("a\nb\r\n").message(), "a b");
        assert_eq!(
            LogRecord::loop_line("a\nb  pending", LoopId::from_raw(1), 0).message(),
            "a b  pending"
        );
        assert_eq!(
            LogRecord::from_parts("x\ry", None, None).message(),
            "x y"
        );
    }

    #[test]
    fn test_into_plain_drops_loop_metadata() {
        let record = LogRecord::loop_line("row", LoopId::from_raw(1), 4);
        assert_eq!(record.into_plain(), LogRecord::plain("row"));
    }
}
