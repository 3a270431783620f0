//! Rasters in, [`RenderedFrame`]s out.

use std::path::Path;

use image::RgbImage;
use tracing::warn;

use crate::dimensions::TargetDimensions;
use crate::error::{CineError, CineResult};
use crate::pixel::{map_pixel, GlyphCell, RenderMode, Rgb};

/// One raster frame converted to terminal cells, plus its escape-encoded text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFrame {
    index: usize,
    rows: Vec<Vec<GlyphCell>>,
    text: String,
}

impl RenderedFrame {
    pub fn new(index: usize, rows: Vec<Vec<GlyphCell>>) -> Self {
        let cells: usize = rows.iter().map(Vec::len).sum();
        // Longest cell is a background escape plus one char.
        let mut text = String::with_capacity(cells * 20 + rows.len());
        for row in &rows {
            for cell in row {
                cell.write_to(&mut text);
            }
            text.push('\n');
        }
        Self { index, rows, text }
    }

    /// Position of this frame in discovery order (0-based).
    pub fn index(&self) -> usize {
        self.index
    }

    /// Cells row by row, top to bottom.
    pub fn rows(&self) -> &[Vec<GlyphCell>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn cells(&self) -> impl Iterator<Item = &GlyphCell> {
        self.rows.iter().flatten()
    }

    /// Rows joined with `\n`, each row terminated by one.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Decode a raster file into 8-bit RGB. 16-bit sources are scaled down by the decoder.
pub fn load_raster(path: &Path) -> CineResult<RgbImage> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|err| CineError::from_image(path, err))
}

/// Map every cell of the target grid from the matching pixel of `img`.
///
/// The grid is clipped to the raster when the scaler produced a smaller image.
pub fn render_frame(
    index: usize,
    img: &RgbImage,
    dims: TargetDimensions,
    mode: &RenderMode,
) -> RenderedFrame {
    let (w, h) = img.dimensions();
    if w != dims.columns || h != dims.rows {
        warn!(
            frame = index,
            raster = %format!("{}x{}", w, h),
            target = %format!("{}x{}", dims.columns, dims.rows),
            "raster size differs from target grid"
        );
    }
    let columns = dims.columns.min(w);
    let height = dims.rows.min(h);

    let rows = (0..height)
        .map(|y| {
            (0..columns)
                .map(|x| map_pixel(Rgb::from(*img.get_pixel(x, y)), mode))
                .collect()
        })
        .collect();

    RenderedFrame::new(index, rows)
}

/// Load `path` and render it as frame `index`.
pub fn render_file(
    index: usize,
    path: &Path,
    dims: TargetDimensions,
    mode: &RenderMode,
) -> CineResult<RenderedFrame> {
    let img = load_raster(path)?;
    Ok(render_frame(index, &img, dims, mode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::Ramp;

    fn checker() -> RgbImage {
        RgbImage::from_fn(3, 2, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgb([255, 255, 255])
            } else {
                image::Rgb([0, 0, 0])
            }
        })
    }

    #[test]
    fn plain_glyphs_form_rows() {
        let mode = RenderMode::Glyph {
            ramp: Ramp::new("@ ").unwrap(),
            color: false,
        };
        let frame = render_frame(4, &checker(), TargetDimensions { columns: 3, rows: 2 }, &mode);
        assert_eq!(frame.index(), 4);
        assert_eq!(frame.row_count(), 2);
        assert_eq!(frame.text(), " @ \n@ @\n");
    }

    #[test]
    fn rendering_is_idempotent() {
        let mode = RenderMode::Block { grayscale: false };
        let dims = TargetDimensions { columns: 3, rows: 2 };
        let a = render_frame(0, &checker(), dims, &mode);
        let b = render_frame(0, &checker(), dims, &mode);
        assert_eq!(a.text().as_bytes(), b.text().as_bytes());
        assert_eq!(a, b);
    }

    #[test]
    fn grid_is_clipped_to_raster() {
        let mode = RenderMode::Block { grayscale: true };
        let frame = render_frame(0, &checker(), TargetDimensions { columns: 10, rows: 10 }, &mode);
        assert_eq!(frame.row_count(), 2);
        assert!(frame.rows().iter().all(|r| r.len() == 3));
    }

    #[test]
    fn missing_file_is_a_resource_error() {
        let err = load_raster(Path::new("/nonexistent/frame_0001.png")).unwrap_err();
        assert!(matches!(err, CineError::Resource { .. }), "{err}");
    }

    #[test]
    fn garbage_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame_0001.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        let err = load_raster(&path).unwrap_err();
        assert!(matches!(err, CineError::Decode { .. }), "{err}");
    }

    #[test]
    fn sixteen_bit_rasters_are_normalised() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep.png");
        let img = image::ImageBuffer::<image::Rgb<u16>, _>::from_pixel(1, 1, image::Rgb([65535, 0, 32896]));
        img.save(&path).unwrap();
        let px = *load_raster(&path).unwrap().get_pixel(0, 0);
        assert_eq!(px, image::Rgb([255, 0, 128]));
    }
}
