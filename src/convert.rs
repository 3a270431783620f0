//! Fork-join conversion of a frame sequence into a [`FrameSet`].
//!
//! The output arena is allocated up front with one slot per discovered frame.
//! Each rayon task receives an exclusive `&mut` to its own slot, so slot order
//! is discovery order no matter which task finishes first. Fan-out is bounded
//! by a dedicated thread pool, and the first task to fail trips a
//! [`FailureLatch`]: its error is the one reported and tasks that have not
//! started yet skip their work.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use image::RgbImage;
use rayon::prelude::*;
use tracing::{debug, error, info};

use crate::dimensions::TargetDimensions;
use crate::error::{CineError, CineResult};
use crate::frame::{load_raster, render_file, render_frame, RenderedFrame};
use crate::pixel::RenderMode;

/// Rendered frames in discovery order. Never resized after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSet {
    frames: Vec<RenderedFrame>,
}

impl FrameSet {
    /// Number of frames, fixed at construction.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame at discovery position `index`.
    pub fn get(&self, index: usize) -> Option<&RenderedFrame> {
        self.frames.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RenderedFrame> {
        self.frames.iter()
    }

    /// Last frame in discovery order; its row count is where playback leaves the cursor.
    pub fn last(&self) -> Option<&RenderedFrame> {
        self.frames.last()
    }
}

impl From<RenderedFrame> for FrameSet {
    fn from(frame: RenderedFrame) -> Self {
        Self {
            frames: vec![frame],
        }
    }
}

/// Collects frames in iteration order; callers supply them already ordered.
impl FromIterator<RenderedFrame> for FrameSet {
    fn from_iter<I: IntoIterator<Item = RenderedFrame>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a FrameSet {
    type Item = &'a RenderedFrame;
    type IntoIter = std::slice::Iter<'a, RenderedFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

/// Records the first error raised by any task and signals the rest to stop.
#[derive(Debug, Default)]
pub struct FailureLatch {
    tripped: AtomicBool,
    first: OnceLock<(usize, CineError)>,
}

impl FailureLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    /// Returns `true` when this call won the race and its error was kept.
    pub fn trip(&self, index: usize, err: CineError) -> bool {
        let mut won = false;
        self.first.get_or_init(|| {
            won = true;
            (index, err)
        });
        self.tripped.store(true, Ordering::Release);
        won
    }

    /// The winning `(index, error)`, if any task failed.
    pub fn into_error(self) -> Option<(usize, CineError)> {
        self.first.into_inner()
    }
}

/// Settings shared by every conversion task.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub dims: TargetDimensions,
    pub mode: RenderMode,
    /// Worker threads; `None` uses the available parallelism.
    pub workers: Option<usize>,
}

/// Convert the raster files at `paths` (already in discovery order).
pub fn convert_frames<F>(paths: &[PathBuf], options: &ConvertOptions, progress: F) -> CineResult<FrameSet>
where
    F: Fn(usize, usize) + Send + Sync,
{
    convert_with(paths.len(), options, |index| load_raster(&paths[index]), progress)
}

/// Convert a single raster file into a one-frame set.
pub fn convert_single(path: &Path, options: &ConvertOptions) -> CineResult<FrameSet> {
    Ok(render_file(0, path, options.dims, &options.mode)?.into())
}

/// Core of the converter: `load(i)` supplies the raster for slot `i`.
///
/// At most `options.workers` loads run at once. On failure the first error is
/// returned as-is, so callers can still match on its kind.
pub fn convert_with<L, F>(count: usize, options: &ConvertOptions, load: L, progress: F) -> CineResult<FrameSet>
where
    L: Fn(usize) -> CineResult<RgbImage> + Send + Sync,
    F: Fn(usize, usize) + Send + Sync,
{
    if count == 0 {
        return Err(CineError::configuration("no frames to convert"));
    }

    let workers = match options.workers {
        Some(0) => return Err(CineError::configuration("worker count must be at least 1")),
        Some(n) => n,
        None => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
    };
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("cine-convert-{}", i))
        .build()
        .map_err(|e| CineError::Other(anyhow::Error::new(e).context("building conversion pool")))?;

    let started = Instant::now();
    let latch = FailureLatch::new();
    let completed = AtomicUsize::new(0);
    let mut slots: Vec<Option<RenderedFrame>> = (0..count).map(|_| None).collect();

    pool.install(|| {
        slots.par_iter_mut().enumerate().for_each(|(index, slot)| {
            if latch.is_tripped() {
                return;
            }
            match load(index) {
                Ok(img) => {
                    *slot = Some(render_frame(index, &img, options.dims, &options.mode));
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!(frame = index, done, total = count, "frame converted");
                    progress(done, count);
                }
                Err(err) => {
                    if !latch.trip(index, err) {
                        debug!(frame = index, "conversion failed after an earlier failure");
                    }
                }
            }
        });
    });

    if let Some((index, err)) = latch.into_error() {
        error!(frame = index + 1, total = count, error = %err, "frame conversion failed");
        return Err(err);
    }

    let frames = slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| CineError::Other(anyhow::anyhow!("frame {} was never converted", index + 1)))
        })
        .collect::<CineResult<Vec<_>>>()?;

    info!(
        frames = count,
        workers,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "frame conversion finished"
    );
    Ok(FrameSet { frames })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::Ramp;
    use std::time::Duration;

    fn options(workers: usize) -> ConvertOptions {
        ConvertOptions {
            dims: TargetDimensions { columns: 1, rows: 1 },
            mode: RenderMode::Glyph {
                ramp: Ramp::new("#").unwrap(),
                color: true,
            },
            workers: Some(workers),
        }
    }

    fn shade(index: usize) -> RgbImage {
        let v = index as u8;
        RgbImage::from_pixel(1, 1, image::Rgb([v, v, v]))
    }

    #[test]
    fn slots_follow_discovery_order_not_completion_order() {
        let count = 10;
        let set = convert_with(
            count,
            &options(count),
            |i| {
                // Earlier frames finish last.
                std::thread::sleep(Duration::from_millis(((count - i) * 5) as u64));
                Ok(shade(i))
            },
            |_, _| {},
        )
        .unwrap();

        assert_eq!(set.len(), count);
        for (i, frame) in set.iter().enumerate() {
            assert_eq!(frame.index(), i);
            assert_eq!(frame.text(), format!("\x1b[38;2;{i};{i};{i}m#\n"));
        }
    }

    #[test]
    fn single_failure_is_fatal() {
        let err = convert_with(
            5,
            &options(2),
            |i| {
                if i == 3 {
                    Err(CineError::external_tool("frame_0004.png missing"))
                } else {
                    Ok(shade(i))
                }
            },
            |_, _| {},
        )
        .unwrap_err();
        assert!(
            matches!(err, CineError::ExternalTool(ref m) if m == "frame_0004.png missing"),
            "{err}"
        );
    }

    #[test]
    fn concurrent_failures_report_exactly_one() {
        let err = convert_with(
            64,
            &options(8),
            |i| Err(CineError::external_tool(format!("broken {}", i))),
            |_, _| {},
        )
        .unwrap_err();
        assert!(matches!(err, CineError::ExternalTool(ref m) if m.starts_with("broken ")), "{err}");
    }

    #[test]
    fn later_tasks_are_skipped_after_a_failure() {
        let attempted = AtomicUsize::new(0);
        let result = convert_with(
            200,
            &options(1),
            |i| {
                attempted.fetch_add(1, Ordering::SeqCst);
                if i == 0 {
                    Err(CineError::external_tool("first frame broken"))
                } else {
                    Ok(shade(i))
                }
            },
            |_, _| {},
        );
        assert!(result.is_err());
        assert!(attempted.load(Ordering::SeqCst) < 200);
    }

    #[test]
    fn in_flight_loads_never_exceed_workers() {
        let workers = 2;
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let set = convert_with(
            16,
            &options(workers),
            |i| {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(10));
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(shade(i))
            },
            |_, _| {},
        )
        .unwrap();

        assert_eq!(set.len(), 16);
        let peak = peak.load(Ordering::SeqCst);
        assert!((1..=workers).contains(&peak), "peak {peak}");
    }

    #[test]
    fn progress_reaches_total() {
        let seen = AtomicUsize::new(0);
        convert_with(
            6,
            &options(3),
            |i| Ok(shade(i)),
            |done, total| {
                assert_eq!(total, 6);
                seen.fetch_max(done, Ordering::SeqCst);
            },
        )
        .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn empty_input_and_zero_workers_are_rejected() {
        assert!(matches!(
            convert_with(0, &options(1), |i| Ok(shade(i)), |_, _| {}),
            Err(CineError::Configuration(_))
        ));
        assert!(matches!(
            convert_with(1, &options(0), |i| Ok(shade(i)), |_, _| {}),
            Err(CineError::Configuration(_))
        ));
    }

    #[test]
    fn latch_keeps_the_first_error() {
        let latch = FailureLatch::new();
        assert!(!latch.is_tripped());
        assert!(latch.trip(2, CineError::configuration("first")));
        assert!(!latch.trip(5, CineError::configuration("second")));
        assert!(latch.is_tripped());
        let (index, err) = latch.into_error().unwrap();
        assert_eq!(index, 2);
        assert!(err.to_string().contains("first"));
    }
}
