//! Mapping one pixel to one terminal cell.
//!
//! Glyph mode picks a character from a [`Ramp`] by the pixel's mean-channel
//! intensity and optionally colours it with a 24-bit foreground escape. Block
//! mode emits a space painted with a 24-bit background escape.

use std::fmt;

use crate::error::{CineError, CineResult};

/// Resets every SGR attribute.
pub const RESET: &str = "\x1b[0m";

/// 8-bit colour of one pixel after normalisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Integer mean of the three channels.
    pub fn mean(self) -> u8 {
        ((self.r as u16 + self.g as u16 + self.b as u16) / 3) as u8
    }

    /// Mean channel value normalised to `[0, 1]`.
    pub fn intensity(self) -> f64 {
        let sum = self.r as f64 + self.g as f64 + self.b as f64;
        (sum / (3.0 * 255.0)).clamp(0.0, 1.0)
    }

    /// The channel mean repeated on all three channels.
    pub fn gray(self) -> Self {
        let m = self.mean();
        Self::new(m, m, m)
    }
}

impl From<image::Rgb<u8>> for Rgb {
    fn from(px: image::Rgb<u8>) -> Self {
        Self::new(px[0], px[1], px[2])
    }
}

/// `ESC[38;2;r;g;bm`
pub fn foreground(rgb: Rgb) -> String {
    format!("\x1b[38;2;{};{};{}m", rgb.r, rgb.g, rgb.b)
}

/// `ESC[48;2;r;g;bm`
pub fn background(rgb: Rgb) -> String {
    format!("\x1b[48;2;{};{};{}m", rgb.r, rgb.g, rgb.b)
}

/// Ordered character ramp indexed by intensity. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ramp {
    chars: Vec<char>,
}

impl Ramp {
    /// Build a ramp from `chars`, dark to bright. Empty input is a configuration error.
    pub fn new(chars: &str) -> CineResult<Self> {
        let chars: Vec<char> = chars.chars().collect();
        if chars.is_empty() {
            return Err(CineError::configuration("character ramp must not be empty"));
        }
        Ok(Self { chars })
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// `floor(intensity * (len - 1))`, with the intensity clamped to `[0, 1]` first.
    pub fn index_for(&self, intensity: f64) -> usize {
        let last = self.chars.len() - 1;
        let intensity = if intensity.is_nan() {
            0.0
        } else {
            intensity.clamp(0.0, 1.0)
        };
        ((intensity * last as f64) as usize).min(last)
    }

    /// Character for an intensity in `[0, 1]`.
    pub fn char_for(&self, intensity: f64) -> char {
        self.chars[self.index_for(intensity)]
    }
}

impl fmt::Display for Ramp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.chars.iter().try_for_each(|c| write!(f, "{}", c))
    }
}

/// How pixels become cells. Chosen once per run.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderMode {
    Glyph { ramp: Ramp, color: bool },
    /// "no-font": coloured background blocks only.
    Block { grayscale: bool },
}

/// One computed terminal cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlyphCell {
    Glyph { ch: char, fg: Option<Rgb> },
    Block { bg: Rgb },
}

impl GlyphCell {
    /// Append the escape-encoded cell to `out`.
    pub fn write_to(&self, out: &mut String) {
        match *self {
            GlyphCell::Glyph { ch, fg: Some(fg) } => {
                out.push_str(&foreground(fg));
                out.push(ch);
            }
            GlyphCell::Glyph { ch, fg: None } => out.push(ch),
            GlyphCell::Block { bg } => {
                out.push_str(&background(bg));
                out.push(' ');
            }
        }
    }
}

impl fmt::Display for GlyphCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = String::new();
        self.write_to(&mut s);
        f.write_str(&s)
    }
}

/// Map one pixel to its cell under `mode`.
///
/// Glyph mode indexes the ramp by intensity and attaches the pixel colour when
/// `color` is set. Block mode paints the background, averaged to gray on request.
///
/// ```
/// use cine::{map_pixel, GlyphCell, RenderMode, Rgb};
///
/// let cell = map_pixel(Rgb::new(30, 60, 90), &RenderMode::Block { grayscale: true });
/// assert_eq!(cell, GlyphCell::Block { bg: Rgb::new(60, 60, 60) });
/// assert_eq!(cell.to_string(), "\x1b[48;2;60;60;60m ");
/// ```
pub fn map_pixel(px: Rgb, mode: &RenderMode) -> GlyphCell {
    match mode {
        RenderMode::Glyph { ramp, color } => GlyphCell::Glyph {
            ch: ramp.char_for(px.intensity()),
            fg: color.then_some(px),
        },
        RenderMode::Block { grayscale: true } => GlyphCell::Block { bg: px.gray() },
        RenderMode::Block { grayscale: false } => GlyphCell::Block { bg: px },
    }
}
