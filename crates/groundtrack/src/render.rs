//! PNG rendering of a [`SpatialHistogram`].

use std::path::Path;

use groundtrack_heatmap::SpatialHistogram;
use image::{ImageFormat, Rgb, RgbImage};

use crate::error::GroundtrackError;

/// Black → red → yellow → white ramp over `t` in `[0, 1]`.
pub fn hot_colormap(t: f64) -> Rgb<u8> {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let r = (t * 8.0 / 3.0).min(1.0);
    let g = (t * 8.0 / 3.0 - 1.0).clamp(0.0, 1.0);
    let b = (t * 4.0 - 3.0).clamp(0.0, 1.0);
    let to_u8 = |v: f64| (v * 255.0).round() as u8;
    Rgb([to_u8(r), to_u8(g), to_u8(b)])
}

/// Largest accepted image side, in pixels.
pub const MAX_IMAGE_SIDE: u32 = 16_384;

/// Draw each bin as a `cell_px` square, x to the right and y upwards.
///
/// Colors are scaled by the largest bin weight. Fails if the image side would
/// exceed [`MAX_IMAGE_SIDE`].
pub fn render_heatmap(hist: &SpatialHistogram, cell_px: u32) -> Result<RgbImage, GroundtrackError> {
    let cell = cell_px.max(1);
    let too_large = || GroundtrackError::ImageTooLarge {
        bins: hist.bins(),
        cell_px: cell,
        max: MAX_IMAGE_SIDE,
    };
    let n = u32::try_from(hist.bins()).map_err(|_| too_large())?;
    let side = n
        .checked_mul(cell)
        .filter(|&s| s <= MAX_IMAGE_SIDE)
        .ok_or_else(too_large)?;
    let max = hist.max_weight();
    let mut img = RgbImage::new(side, side);
    for bin in hist.iter_bins() {
        let t = if max > 0.0 { bin.weight_sum / max } else { 0.0 };
        let color = hot_colormap(t);
        let x0 = bin.ix as u32 * cell;
        let y0 = (n - 1 - bin.iy as u32) * cell;
        for dy in 0..cell {
            for dx in 0..cell {
                img.put_pixel(x0 + dx, y0 + dy, color);
            }
        }
    }
    Ok(img)
}

/// Render and save as PNG.
pub fn render_heatmap_png(
    hist: &SpatialHistogram,
    cell_px: u32,
    path: impl AsRef<Path>,
) -> Result<(), GroundtrackError> {
    render_heatmap(hist, cell_px)?.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}
