//! In-place playback of a converted frame set.
//!
//! Each frame is written, held for the frame delay, then the cursor is moved
//! back up over it so the next frame overwrites it.

use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::convert::FrameSet;
use crate::frame::RenderedFrame;

/// About 30 frames per second.
pub const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(33);

/// Move the cursor up `rows` lines and back to column 0.
pub fn cursor_up(rows: usize) -> String {
    format!("\x1b[{}A\r", rows)
}

/// Move the cursor down `rows` lines, past art left by a bounded playback.
pub fn cursor_down(rows: usize) -> String {
    format!("\x1b[{}B", rows)
}

/// Timing and repetition for a [`Player`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackOptions {
    pub frame_delay: Duration,
    /// Full passes over the frame set; `None` loops until the process is killed.
    pub cycles: Option<usize>,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            frame_delay: DEFAULT_FRAME_DELAY,
            cycles: None,
        }
    }
}

/// Replays a [`FrameSet`] in place.
#[derive(Debug, Clone, Default)]
pub struct Player {
    options: PlaybackOptions,
}

impl Player {
    pub fn new(options: PlaybackOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PlaybackOptions {
        &self.options
    }

    /// A single frame is printed once. Multiple frames are cycled, each one
    /// followed by the delay and a cursor reposition so the next frame
    /// overwrites it.
    pub fn play<W: Write>(&self, frames: &FrameSet, out: &mut W) -> io::Result<()> {
        if frames.is_empty() {
            return Ok(());
        }
        if frames.len() == 1 {
            if let Some(frame) = frames.get(0) {
                out.write_all(frame.text().as_bytes())?;
                out.flush()?;
            }
            return Ok(());
        }

        debug!(frames = frames.len(), cycles = ?self.options.cycles, "starting playback");
        let mut cycle = 0usize;
        loop {
            if let Some(limit) = self.options.cycles {
                if cycle >= limit {
                    return Ok(());
                }
            }
            for frame in frames {
                self.show(frame, out)?;
            }
            cycle = cycle.saturating_add(1);
        }
    }

    fn show<W: Write>(&self, frame: &RenderedFrame, out: &mut W) -> io::Result<()> {
        out.write_all(frame.text().as_bytes())?;
        out.flush()?;
        if !self.options.frame_delay.is_zero() {
            thread::sleep(self.options.frame_delay);
        }
        if frame.row_count() > 0 {
            out.write_all(cursor_up(frame.row_count()).as_bytes())?;
        }
        Ok(())
    }
}
