//! # cine - images and videos as terminal art
//!
//! `cine` renders a still image or a video as true-colour ANSI art sized to
//! the current terminal window.
//!
//! ## Features
//!
//! - Aspect-ratio-preserving fit onto the character grid, corrected for
//!   non-square character cells
//! - Glyph mode (character ramp, optional 24-bit foreground colour) and block
//!   mode (24-bit background colour only)
//! - Parallel frame conversion on a bounded worker pool with order-stable output
//! - In-place looping playback for videos
//!
//! ## Example
//!
//! ```no_run
//! use cine::{Converter, RenderSettings, TerminalSize};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let converter = Converter::new();
//! let mode = converter.render_mode(&RenderSettings::default())?;
//! let frames = converter.render(
//!     Path::new("input.png"),
//!     Path::new("./cine-out"),
//!     TerminalSize::new(120, 40),
//!     &mode,
//!     false,
//!     |_, _| {},
//! )?;
//! converter.player(Some(1)).play(&frames, &mut std::io::stdout())?;
//! # Ok(())
//! # }
//! ```

pub mod convert;
pub mod dimensions;
pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod pixel;
pub mod playback;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

pub use convert::{convert_frames, convert_with, ConvertOptions, FailureLatch, FrameSet};
pub use dimensions::{resolve_dimensions, TargetDimensions, TerminalSize, DEFAULT_FONT_RATIO};
pub use error::{CineError, CineResult};
pub use ffmpeg::FfmpegConfig;
pub use frame::{load_raster, render_frame, RenderedFrame};
pub use pixel::{map_pixel, GlyphCell, Ramp, RenderMode, Rgb, RESET};
pub use playback::{PlaybackOptions, Player};

fn default_color_chars() -> String {
    "*".to_string()
}

fn default_grayscale_chars() -> String {
    "@#%*+=-;:. ".to_string()
}

/// Tunables loaded from `cine.json`. Every field may be omitted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Width:height of one character cell.
    pub font_ratio: f64,
    pub frame_delay_ms: u64,
    /// Fraction of the terminal rows the art may use, in `(0, 1]`.
    pub height_usage: f64,
    pub color_chars: String,
    pub grayscale_chars: String,
    pub save_dir: PathBuf,
    pub workers: Option<usize>,
    #[serde(flatten)]
    pub ffmpeg: FfmpegConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            font_ratio: DEFAULT_FONT_RATIO,
            frame_delay_ms: playback::DEFAULT_FRAME_DELAY.as_millis() as u64,
            height_usage: 1.0,
            color_chars: default_color_chars(),
            grayscale_chars: default_grayscale_chars(),
            save_dir: PathBuf::from("./cine-out"),
            workers: None,
            ffmpeg: FfmpegConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_json(text: &str) -> CineResult<Self> {
        let config: AppConfig = serde_json::from_str(text)
            .map_err(|e| CineError::configuration(format!("parsing config json: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> CineResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| CineError::resource(path, e))?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> CineResult<()> {
        if !self.font_ratio.is_finite() || self.font_ratio <= 0.0 {
            return Err(CineError::configuration(format!(
                "font_ratio must be a positive number, got {}",
                self.font_ratio
            )));
        }
        if !(self.height_usage > 0.0 && self.height_usage <= 1.0) {
            return Err(CineError::configuration(format!(
                "height_usage must be in (0, 1], got {}",
                self.height_usage
            )));
        }
        if self.workers == Some(0) {
            return Err(CineError::configuration("workers must be at least 1"));
        }
        Ok(())
    }

    pub fn frame_delay(&self) -> Duration {
        Duration::from_millis(self.frame_delay_ms)
    }
}

/// Per-run rendering choices, usually straight from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderSettings {
    pub grayscale: bool,
    /// Block mode: coloured backgrounds, no characters.
    pub no_font: bool,
    /// Ramp override; empty means the configured default.
    pub charset: Option<String>,
}

/// Drives a full run: measure, scale, convert, and hand back the frames.
pub struct Converter {
    config: AppConfig,
}

impl Converter {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn with_config(config: AppConfig) -> CineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn from_config_file(path: &Path) -> CineResult<Self> {
        Ok(Self {
            config: AppConfig::from_file(path)?,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Pick the pixel mapping for this run. The ramp is validated even in block mode.
    pub fn render_mode(&self, settings: &RenderSettings) -> CineResult<RenderMode> {
        let chars = match settings.charset.as_deref() {
            Some(c) if !c.is_empty() => c,
            _ if settings.grayscale => self.config.grayscale_chars.as_str(),
            _ => self.config.color_chars.as_str(),
        };
        let ramp = Ramp::new(chars)?;
        if settings.no_font {
            Ok(RenderMode::Block {
                grayscale: settings.grayscale,
            })
        } else {
            Ok(RenderMode::Glyph {
                ramp,
                color: !settings.grayscale,
            })
        }
    }

    /// Fit `input` onto the usable part of `terminal`.
    pub fn target_dimensions(&self, input: &Path, terminal: TerminalSize) -> CineResult<TargetDimensions> {
        let (w, h) = ffmpeg::source_dimensions(input, &self.config.ffmpeg)?;
        let usable = terminal.with_height_usage(self.config.height_usage);
        let dims = resolve_dimensions(usable, w, h, self.config.font_ratio)?;
        info!(
            source = %format!("{}x{}", w, h),
            terminal = %format!("{}x{}", terminal.columns, terminal.rows),
            target = %format!("{}x{}", dims.columns, dims.rows),
            "resolved dimensions"
        );
        Ok(dims)
    }

    /// Render a still image or a video, choosing by the input's extension.
    pub fn render<F>(
        &self,
        input: &Path,
        work_dir: &Path,
        terminal: TerminalSize,
        mode: &RenderMode,
        keep_frames: bool,
        progress: F,
    ) -> CineResult<FrameSet>
    where
        F: Fn(usize, usize) + Send + Sync,
    {
        if ffmpeg::is_still_image(input) {
            self.render_image(input, work_dir, terminal, mode, keep_frames)
        } else {
            self.render_video(input, work_dir, terminal, mode, keep_frames, progress)
        }
    }

    pub fn render_image(
        &self,
        input: &Path,
        work_dir: &Path,
        terminal: TerminalSize,
        mode: &RenderMode,
        keep_frames: bool,
    ) -> CineResult<FrameSet> {
        prepare_work_dir(work_dir)?;
        let dims = self.target_dimensions(input, terminal)?;
        let scaled = ffmpeg::scale_image(input, work_dir, dims, &self.config.ffmpeg)?;
        let frames = convert::convert_single(&scaled, &self.convert_options(dims, mode))?;
        if !keep_frames {
            ffmpeg::remove_files([scaled.as_path()])?;
        }
        Ok(frames)
    }

    pub fn render_video<F>(
        &self,
        input: &Path,
        work_dir: &Path,
        terminal: TerminalSize,
        mode: &RenderMode,
        keep_frames: bool,
        progress: F,
    ) -> CineResult<FrameSet>
    where
        F: Fn(usize, usize) + Send + Sync,
    {
        prepare_work_dir(work_dir)?;
        let dims = self.target_dimensions(input, terminal)?;
        ffmpeg::clear_frames(work_dir)?;
        ffmpeg::extract_frames(input, work_dir, dims, &self.config.ffmpeg)?;
        let paths = ffmpeg::discover_frames(work_dir)?;
        info!(frames = paths.len(), "converting frames");

        let frames = convert_frames(&paths, &self.convert_options(dims, mode), progress)?;
        if !keep_frames {
            ffmpeg::remove_files(paths.iter().map(PathBuf::as_path))?;
        }
        Ok(frames)
    }

    pub fn player(&self, cycles: Option<usize>) -> Player {
        Player::new(PlaybackOptions {
            frame_delay: self.config.frame_delay(),
            cycles,
        })
    }

    fn convert_options(&self, dims: TargetDimensions, mode: &RenderMode) -> ConvertOptions {
        ConvertOptions {
            dims,
            mode: mode.clone(),
            workers: self.config.workers,
        }
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the working directory; an existing one is fine.
pub fn prepare_work_dir(dir: &Path) -> CineResult<()> {
    fs::create_dir_all(dir).map_err(|e| CineError::resource(dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.font_ratio, 0.5);
        assert_eq!(config.grayscale_chars, "@#%*+=-;:. ");
        assert_eq!(config.ffmpeg.ffmpeg_cmd(), "ffmpeg");
    }

    #[test]
    fn config_fields_override_defaults() {
        let config = AppConfig::from_json(
            r#"{"font_ratio": 0.45, "frame_delay_ms": 0, "workers": 2, "ffmpeg": "/opt/ffmpeg"}"#,
        )
        .unwrap();
        assert_eq!(config.font_ratio, 0.45);
        assert_eq!(config.frame_delay(), Duration::ZERO);
        assert_eq!(config.workers, Some(2));
        assert_eq!(config.ffmpeg.ffmpeg_cmd(), "/opt/ffmpeg");
        assert_eq!(config.ffmpeg.ffprobe_cmd(), "ffprobe");
    }

    #[test]
    fn invalid_configs_are_rejected() {
        for json in [
            r#"{"font_ratio": 0}"#,
            r#"{"height_usage": 1.5}"#,
            r#"{"height_usage": 0}"#,
            r#"{"workers": 0}"#,
            r#"{"font_ratio": "wide"}"#,
        ] {
            let err = AppConfig::from_json(json).unwrap_err();
            assert!(matches!(err, CineError::Configuration(_)), "{json}: {err}");
        }
    }

    #[test]
    fn ramp_selection_follows_flags() {
        let converter = Converter::new();

        let color = converter.render_mode(&RenderSettings::default()).unwrap();
        assert_eq!(
            color,
            RenderMode::Glyph {
                ramp: Ramp::new("*").unwrap(),
                color: true
            }
        );

        let gray = converter
            .render_mode(&RenderSettings {
                grayscale: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            gray,
            RenderMode::Glyph {
                ramp: Ramp::new("@#%*+=-;:. ").unwrap(),
                color: false
            }
        );

        let custom = converter
            .render_mode(&RenderSettings {
                charset: Some("ab".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            custom,
            RenderMode::Glyph {
                ramp: Ramp::new("ab").unwrap(),
                color: true
            }
        );

        let blocks = converter
            .render_mode(&RenderSettings {
                grayscale: true,
                no_font: true,
                charset: None,
            })
            .unwrap();
        assert_eq!(blocks, RenderMode::Block { grayscale: true });
    }

    #[test]
    fn empty_configured_ramp_is_rejected() {
        let config = AppConfig {
            color_chars: String::new(),
            ..AppConfig::default()
        };
        let converter = Converter::with_config(config).unwrap();
        let err = converter.render_mode(&RenderSettings::default()).unwrap_err();
        assert!(matches!(err, CineError::Configuration(_)));
    }

    #[test]
    fn existing_work_dir_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        prepare_work_dir(dir.path()).unwrap();
        prepare_work_dir(&dir.path().join("nested/out")).unwrap();
        assert!(dir.path().join("nested/out").is_dir());
    }

    #[test]
    fn work_dir_under_a_file_is_a_resource_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, b"x").unwrap();
        let err = prepare_work_dir(&file.join("out")).unwrap_err();
        assert!(matches!(err, CineError::Resource { .. }));
    }
}
