//! ffmpeg and ffprobe as subprocesses, plus the numbered frame files they leave behind.
//!
//! Videos are decoded into `frame_0001.png`, `frame_0002.png`, ... in the work
//! directory, already scaled to one pixel per character cell.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command as ProcCommand, Output};
use std::time::Instant;

use serde::Deserialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::dimensions::TargetDimensions;
use crate::error::{CineError, CineResult};

/// File the single-image path scales into.
pub const SCALED_IMAGE_NAME: &str = "scaled-out.png";

const FRAME_PREFIX: &str = "frame_";
const FRAME_EXTENSION: &str = "png";
const STILL_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

/// Commands used to reach ffmpeg and ffprobe.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    pub ffmpeg: String,
    pub ffprobe: String,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

impl FfmpegConfig {
    pub fn ffmpeg_cmd(&self) -> &str {
        &self.ffmpeg
    }

    pub fn ffprobe_cmd(&self) -> &str {
        &self.ffprobe
    }
}

/// Inputs with a still-image extension skip frame extraction.
pub fn is_still_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| STILL_IMAGE_EXTENSIONS.iter().any(|s| s.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// `scale=W:H`, one pixel per character cell.
pub fn scale_filter(dims: TargetDimensions) -> String {
    format!("scale={}:{}", dims.columns, dims.rows)
}

/// Pixel size of the input: decoded header for still images, ffprobe otherwise.
pub fn source_dimensions(input: &Path, config: &FfmpegConfig) -> CineResult<(u32, u32)> {
    if !input.exists() {
        return Err(CineError::resource(
            input,
            std::io::Error::new(std::io::ErrorKind::NotFound, "input file does not exist"),
        ));
    }
    if is_still_image(input) {
        return image::image_dimensions(input).map_err(|err| CineError::from_image(input, err));
    }
    probe_dimensions(input, config)
}

/// Ask ffprobe for the first video stream's `WIDTHxHEIGHT`.
pub fn probe_dimensions(input: &Path, config: &FfmpegConfig) -> CineResult<(u32, u32)> {
    let output = run(
        ProcCommand::new(config.ffprobe_cmd())
            .arg("-v")
            .arg("error")
            .arg("-select_streams")
            .arg("v:0")
            .arg("-show_entries")
            .arg("stream=width,height")
            .arg("-of")
            .arg("csv=s=x:p=0")
            .arg(input),
        "ffprobe",
    )?;
    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
}

/// Parse ffprobe's `WIDTHxHEIGHT` line.
pub fn parse_probe_output(text: &str) -> CineResult<(u32, u32)> {
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| CineError::external_tool("ffprobe reported no video stream"))?;

    let mut parts = line.split('x').filter(|p| !p.is_empty());
    let parse = |p: Option<&str>| p.and_then(|v| v.trim().parse::<u32>().ok());
    match (parse(parts.next()), parse(parts.next())) {
        (Some(w), Some(h)) => Ok((w, h)),
        _ => Err(CineError::external_tool(format!(
            "unparsable ffprobe output: {:?}",
            line
        ))),
    }
}

/// Scale a still image to `dims` and write it into `out_dir`.
pub fn scale_image(input: &Path, out_dir: &Path, dims: TargetDimensions, config: &FfmpegConfig) -> CineResult<PathBuf> {
    let out_path = out_dir.join(SCALED_IMAGE_NAME);
    let started = Instant::now();
    run(
        ProcCommand::new(config.ffmpeg_cmd())
            .arg("-loglevel")
            .arg("error")
            .arg("-y")
            .arg("-i")
            .arg(input)
            .arg("-vf")
            .arg(scale_filter(dims))
            .arg("-frames:v")
            .arg("1")
            .arg(&out_path),
        "ffmpeg",
    )?;
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        output = %out_path.display(),
        "scaled image"
    );
    Ok(out_path)
}

/// Decode a video into `out_dir/frame_0001.png`, `frame_0002.png`, ... scaled to `dims`.
pub fn extract_frames(input: &Path, out_dir: &Path, dims: TargetDimensions, config: &FfmpegConfig) -> CineResult<()> {
    let pattern = out_dir.join(format!("{}%04d.{}", FRAME_PREFIX, FRAME_EXTENSION));
    let started = Instant::now();
    run(
        ProcCommand::new(config.ffmpeg_cmd())
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(input)
            .arg("-vf")
            .arg(scale_filter(dims))
            .arg(&pattern),
        "ffmpeg",
    )?;
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        dir = %out_dir.display(),
        "extracted video frames"
    );
    Ok(())
}

/// `frame_0042.png` -> `Some(42)`.
pub fn frame_number(path: &Path) -> Option<usize> {
    if path.extension().and_then(|e| e.to_str()) != Some(FRAME_EXTENSION) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let digits = stem.strip_prefix(FRAME_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn frame_files(dir: &Path) -> CineResult<Vec<(usize, PathBuf)>> {
    let mut frames = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            let io = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
            CineError::resource(dir, io)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if let Some(n) = frame_number(&path) {
            frames.push((n, path));
        }
    }
    frames.sort_by_key(|(n, _)| *n);
    Ok(frames)
}

/// List the extracted frames in order. They must be numbered `1..=N` with no gaps.
pub fn discover_frames(dir: &Path) -> CineResult<Vec<PathBuf>> {
    let frames = frame_files(dir)?;
    if frames.is_empty() {
        return Err(CineError::external_tool(format!(
            "no {}*.{} files were produced in {}",
            FRAME_PREFIX,
            FRAME_EXTENSION,
            dir.display()
        )));
    }
    for (expected, (n, path)) in (1..).zip(&frames) {
        if *n != expected {
            return Err(CineError::external_tool(format!(
                "frame sequence is not contiguous: expected frame {} but found {}",
                expected,
                path.display()
            )));
        }
    }
    debug!(count = frames.len(), dir = %dir.display(), "discovered frames");
    Ok(frames.into_iter().map(|(_, p)| p).collect())
}

/// Remove frame files left behind by an earlier run.
pub fn clear_frames(dir: &Path) -> CineResult<usize> {
    let frames = frame_files(dir)?;
    let count = frames.len();
    remove_files(frames.iter().map(|(_, p)| p.as_path()))?;
    if count > 0 {
        debug!(count, dir = %dir.display(), "removed stale frames");
    }
    Ok(count)
}

/// Delete intermediate files, failing on the first one that cannot be removed.
pub fn remove_files<'a>(paths: impl IntoIterator<Item = &'a Path>) -> CineResult<()> {
    for path in paths {
        fs::remove_file(path).map_err(|e| CineError::resource(path, e))?;
    }
    Ok(())
}

fn run(cmd: &mut ProcCommand, tool: &str) -> CineResult<Output> {
    debug!(command = ?cmd, "running {}", tool);
    let output = cmd
        .output()
        .map_err(|e| CineError::external_tool(format!("failed to run {}: {}", tool, e)))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CineError::external_tool(format!(
            "{} exited with {}: {}",
            tool,
            output.status,
            stderr.trim()
        )));
    }
    Ok(output)
}
