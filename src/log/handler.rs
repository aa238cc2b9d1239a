//! Loop-aware console renderer
//!
//! Writes log records to a terminal stream. Plain records scroll as usual.
//! Records that share a [`LoopId`] form frames: when a loop starts a new
//! frame (index 0 again), the cursor is moved back over the previous frame
//! so the new one overwrites it in place.
//!
//! The terminal is never queried. All cursor math comes from the records
//! themselves, so nothing else may write to the stream while a frame is
//! being redrawn.

use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossterm::cursor::MoveUp;
use crossterm::terminal::{Clear, ClearType};
use crossterm::Command;

use crate::log::record::{LogRecord, LoopId};

/// Control sequence moving the cursor up `lines` lines.
#[must_use]
pub fn cursor_up(lines: usize) -> String {
    let mut seq = String::new();
    // Writing into a String cannot fail
    let _ = MoveUp(u16::try_from(lines).unwrap_or(u16::MAX)).write_ansi(&mut seq);
    seq
}

/// Control sequence erasing the current line.
#[must_use]
pub fn clear_line() -> String {
    let mut seq = String::new();
    let _ = Clear(ClearType::CurrentLine).write_ansi(&mut seq);
    seq
}

/// Frame tracking state of a [`LoopRenderHandler`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderState {
    /// Loop whose frames are currently on screen
    pub active_loop: Option<LoopId>,
    /// Lines written by the last completed frame of `active_loop`
    pub last_frame_line_count: usize,
    /// Highest index seen in the frame being written
    pub current_frame_max_index: usize,
}

impl RenderState {
    fn reset(&mut self) {
        *self = Self::default();
    }

    /// Account for one frame line. Returns the cursor-up distance to issue
    /// before writing it, if the line starts a redraw.
    fn advance(&mut self, loop_id: LoopId, index: usize) -> Option<usize> {
        if self.active_loop == Some(loop_id) {
            if index == 0 {
                self.last_frame_line_count = self.current_frame_max_index + 1;
                self.current_frame_max_index = 0;
                // The cursor rests one line below the previous frame
                return Some(self.last_frame_line_count + 1);
            }
            if index > self.current_frame_max_index {
                self.current_frame_max_index = index;
                return None;
            }
        }

        // New loop, or indices went backwards: start tracking from scratch
        *self = Self {
            active_loop: Some(loop_id),
            last_frame_line_count: 0,
            current_frame_max_index: index,
        };
        None
    }
}

struct Inner<W> {
    stream: W,
    state: RenderState,
}

impl<W: Write> Inner<W> {
    fn write_record(&mut self, record: &LogRecord) -> io::Result<()> {
        match record {
            LogRecord::Plain { message } => {
                self.state.reset();
                self.stream.write_all(format!("{message}\n").as_bytes())?;
            }
            LogRecord::LoopLine {
                message,
                loop_id,
                index,
            } => {
                if let Some(distance) = self.state.advance(*loop_id, *index) {
                    self.stream.write_all(cursor_up(distance).as_bytes())?;
                }
                let mut line = clear_line();
                line.push_str(message);
                line.push('\n');
                self.stream.write_all(line.as_bytes())?;
            }
        }
        self.stream.flush()
    }
}

/// Log sink that redraws loop frames in place
///
/// All emits are serialized through one lock that guards both the stream
/// and the frame state, so the handler can be shared across threads.
pub struct LoopRenderHandler<W: Write> {
    inner: Mutex<Inner<W>>,
}

impl<W: Write> LoopRenderHandler<W> {
    /// Create a handler writing to `stream`
    pub const fn new(stream: W) -> Self {
        Self {
            inner: Mutex::new(Inner {
                stream,
                state: RenderState {
                    active_loop: None,
                    last_frame_line_count: 0,
                    current_frame_max_index: 0,
                },
            }),
        }
    }

    /// Render one record.
    ///
    /// Issues one write, or two when the record starts a redraw of its
    /// loop's frame. A stream error is returned as-is, after the frame
    /// state has been reset so later frames never reposition over lines
    /// that may not have been written.
    pub fn emit(&self, record: &LogRecord) -> io::Result<()> {
        let mut inner = self.lock();
        let result = inner.write_record(record);
        if result.is_err() {
            inner.state.reset();
        }
        result
    }

    /// Snapshot of the current frame state
    pub fn state(&self) -> RenderState {
        self.lock().state
    }

    /// Consume the handler and return the stream
    pub fn into_inner(self) -> W {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .stream
    }

    fn lock(&self) -> MutexGuard<'_, Inner<W>> {
        // State is only ever replaced wholesale, so a poisoned lock is still usable
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
