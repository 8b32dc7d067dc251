/// Geometry of a watermark tile: text block measurement, rotated bounds
/// and the padded raster surface.

use super::text::{LineMetrics, TextEngine};
use super::paint::FontSpec;

/// Axis-aligned box in logical pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Size { width, height }
    }
}

/// Measured text block: unrotated extent, per-line metrics and the
/// integer bounding box of the block after rotation.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub origin: Size,
    pub rotated: Size,
    pub lines: Vec<LineMetrics>,
}

/// Bounding box of a `w`x`h` rectangle rotated by `degrees`, rounded up
/// to whole pixels.
pub fn rotated_bounds(width: f64, height: f64, degrees: f64) -> Size {
    let angle = degrees.to_radians();
    let (sin, cos) = (angle.sin().abs(), angle.cos().abs());
    Size {
        width: ceil_px(sin * height + cos * width),
        height: ceil_px(sin * width + cos * height),
    }
}

/// Round up to a whole pixel, ignoring float noise such as `cos(90°)`
/// not being exactly zero.
fn ceil_px(v: f64) -> f64 {
    ((v * 1e6).round() / 1e6).ceil()
}

/// Measure every line and the block they form when stacked.
pub fn measure_block(
    engine: &mut dyn TextEngine,
    lines: &[String],
    font: &FontSpec,
    rotate: f64,
) -> TextBlock {
    let mut width = 0.0f64;
    let mut height = 0.0f64;
    let mut metrics = Vec::with_capacity(lines.len());

    for line in lines {
        let m = engine.measure(line, font);
        width = width.max(m.width);
        height += m.height;
        metrics.push(m);
    }

    TextBlock {
        origin: Size::new(width, height),
        rotated: rotated_bounds(width, height, rotate),
        lines: metrics,
    }
}

/// Largest pixmap, in pixels, the rasterizer allocates (the usual browser
/// canvas area limit of 16384 x 16384).
pub const MAX_SURFACE_AREA: u64 = 16_384 * 16_384;

/// Whether a `width x height` pixmap stays within [`MAX_SURFACE_AREA`].
pub fn fits_surface(width: u32, height: u32) -> bool {
    u64::from(width) * u64::from(height) <= MAX_SURFACE_AREA
}

/// Physical pixel size of the raster surface holding one tile plus its gap.
///
/// Truncates like a canvas `width` attribute would and never returns an
/// empty surface.
pub fn surface_pixels(tile: Size, gap: [f64; 2], ratio: f32) -> (u32, u32) {
    let ratio = f64::from(ratio);
    let px = |logical: f64| -> u32 {
        let v = (logical * ratio).floor();
        if v.is_finite() && v >= 1.0 {
            v.min(f64::from(u16::MAX)) as u32
        } else {
            1
        }
    };
    (px(gap[0] + tile.width), px(gap[1] + tile.height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::text::BoxGlyphs;

    #[test]
    fn zero_rotation_keeps_size() {
        assert_eq!(rotated_bounds(120.0, 30.0, 0.0), Size::new(120.0, 30.0));
    }

    #[test]
    fn quarter_turn_swaps_axes() {
        let s = rotated_bounds(120.0, 30.0, 90.0);
        assert_eq!(s, Size::new(30.0, 120.0));
        let s = rotated_bounds(120.0, 30.0, -90.0);
        assert_eq!(s, Size::new(30.0, 120.0));
    }

    #[test]
    fn default_rotation_matches_formula() {
        let a = (-20.0f64).to_radians();
        let s = rotated_bounds(100.0, 20.0, -20.0);
        let w = a.sin().abs() * 20.0 + a.cos().abs() * 100.0;
        let h = a.sin().abs() * 100.0 + a.cos().abs() * 20.0;
        assert_eq!(s.width, w.ceil());
        assert_eq!(s.height, h.ceil());
    }

    #[test]
    fn block_stacks_lines() {
        let mut engine = BoxGlyphs::default();
        let font = FontSpec { size: 10.0, ..FontSpec::default() };
        let lines = vec!["abcd".to_string(), "ab".to_string()];
        let block = measure_block(&mut engine, &lines, &font, 0.0);
        assert_eq!(block.lines.len(), 2);
        assert_eq!(block.origin.width, block.lines[0].width);
        assert_eq!(block.origin.height, block.lines[0].height + block.lines[1].height);
        assert_eq!(block.rotated.width, block.origin.width.ceil());
    }

    #[test]
    fn empty_content_measures_zero() {
        let mut engine = BoxGlyphs::default();
        let block = measure_block(&mut engine, &[], &FontSpec::default(), -20.0);
        assert_eq!(block.origin, Size::new(0.0, 0.0));
        assert_eq!(block.rotated, Size::new(0.0, 0.0));
    }

    #[test]
    fn surface_includes_gap_and_ratio() {
        assert_eq!(surface_pixels(Size::new(50.0, 20.0), [100.0, 100.0], 2.0), (300, 240));
        assert_eq!(surface_pixels(Size::new(0.0, 0.0), [0.0, 0.0], 1.0), (1, 1));
        assert_eq!(surface_pixels(Size::new(10.5, 10.5), [0.0, 0.0], 1.0), (10, 10));
    }

    #[test]
    fn surface_area_limit() {
        assert!(fits_surface(16_384, 16_384));
        assert!(!fits_surface(16_385, 16_384));
        let (w, h) = surface_pixels(Size::new(60_000.0, 60_000.0), [100.0, 100.0], 1.0);
        assert!(!fits_surface(w, h));
    }
}
