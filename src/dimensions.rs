//! Fitting a source image onto the terminal's character grid.
//!
//! Terminal cells are roughly twice as tall as they are wide, so the source
//! aspect ratio is corrected by the font cell aspect (width:height) before it
//! is clamped to the terminal. Dimensions are truncated, never rounded.

use crate::error::{CineError, CineResult};

/// Width:height ratio of one character cell.
pub const DEFAULT_FONT_RATIO: f64 = 0.5;

/// Size of the terminal window in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub columns: u32,
    pub rows: u32,
}

impl TerminalSize {
    pub fn new(columns: u32, rows: u32) -> Self {
        Self { columns, rows }
    }

    /// Restrict the usable rows to `fraction` of the window (at least one row).
    pub fn with_height_usage(self, fraction: f64) -> Self {
        let rows = ((self.rows as f64) * fraction) as u32;
        Self {
            columns: self.columns,
            rows: rows.max(1).min(self.rows.max(1)),
        }
    }
}

/// Character grid the art is rendered into. Both sides are at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetDimensions {
    pub columns: u32,
    pub rows: u32,
}

/// Resolve the character grid for a `source_width` x `source_height` pixel source.
///
/// When the source is wider than the terminal the columns are pinned to the
/// terminal width, otherwise the rows are pinned to the terminal height.
///
/// The branch compares the raw ratios before font correction, so a source only
/// slightly wider than the terminal keeps the rows pinned and can come back with
/// up to `1 / font_ratio` times the terminal width (80x24 and a 3:1 source
/// give 144 columns). The result is not clamped; callers that must not wrap
/// should check `columns` against the terminal themselves.
pub fn resolve_dimensions(
    terminal: TerminalSize,
    source_width: u32,
    source_height: u32,
    font_ratio: f64,
) -> CineResult<TargetDimensions> {
    if terminal.columns == 0 || terminal.rows == 0 {
        return Err(CineError::configuration(format!(
            "terminal size {}x{} has a zero dimension",
            terminal.columns, terminal.rows
        )));
    }
    if source_width == 0 || source_height == 0 {
        return Err(CineError::configuration(format!(
            "source size {}x{} has a zero dimension",
            source_width, source_height
        )));
    }
    if !font_ratio.is_finite() || font_ratio <= 0.0 {
        return Err(CineError::configuration(format!(
            "font ratio must be a positive number, got {}",
            font_ratio
        )));
    }

    let term_ratio = terminal.columns as f64 / terminal.rows as f64;
    let img_ratio = source_width as f64 / source_height as f64;

    let (columns, rows) = if img_ratio > term_ratio {
        let columns = terminal.columns;
        let rows = (columns as f64 * (1.0 / img_ratio) * font_ratio) as u32;
        (columns, rows)
    } else {
        let rows = terminal.rows;
        let columns = (rows as f64 * img_ratio * (1.0 / font_ratio)) as u32;
        (columns, rows)
    };

    Ok(TargetDimensions {
        columns: columns.max(1),
        rows: rows.max(1),
    })
}
