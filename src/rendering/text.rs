//! Text engines: measure and rasterize single lines.
//!
//! Two engines are provided. [`CosmicText`] shapes against the system's
//! fonts and is what hosts normally want. [`BoxGlyphs`] needs no fonts at
//! all and draws each character as a filled box with a fixed advance; it
//! is fully deterministic, which makes it the engine of choice for
//! font-less headless hosts and for tests.

use super::layout::fits_surface;
use super::paint::FontSpec;
use tiny_skia::{Color, Paint, Pixmap, PremultipliedColorU8, Rect, Transform};

/// Line height as a multiple of the font size (font bounding box)
pub const LINE_HEIGHT_FACTOR: f32 = 1.2;

/// Extent of one rendered line in the unit of the font it was measured
/// with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineMetrics {
    pub width: f64,
    pub height: f64,
}

pub trait TextEngine: Send {
    /// Natural size of `text` set in `font`.
    fn measure(&mut self, text: &str, font: &FontSpec) -> LineMetrics;

    /// Rasterize `text` with its top edge at y = 0 into a pixmap sized to
    /// its measured extent. `None` when there is nothing to draw.
    fn render_line(&mut self, text: &str, font: &FontSpec, color: Color) -> Option<Pixmap>;
}

/// Which text engine a watermark should use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextBackend {
    /// System fonts via cosmic-text when compiled in, boxes otherwise
    #[default]
    System,
    Boxes,
}

impl TextBackend {
    pub fn build(self) -> Box<dyn TextEngine> {
        match self {
            #[cfg(feature = "system-fonts")]
            TextBackend::System => Box::new(CosmicText::new()),
            #[cfg(not(feature = "system-fonts"))]
            TextBackend::System => Box::new(BoxGlyphs::default()),
            TextBackend::Boxes => Box::new(BoxGlyphs::default()),
        }
    }
}

fn pixmap_for(metrics: LineMetrics) -> Option<Pixmap> {
    let w = metrics.width.ceil();
    let h = metrics.height.ceil();
    if !(w >= 1.0 && h >= 1.0) {
        return None;
    }
    // `as` saturates, so infinite extents fail the check too
    let (w, h) = (w as u32, h as u32);
    if !fits_surface(w, h) {
        log::warn!("skipping {}x{} text line: too large to rasterize", w, h);
        return None;
    }
    Pixmap::new(w, h)
}

/// Font-free engine: every character advances by `0.6em` and every
/// non-whitespace character is painted as a box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxGlyphs {
    /// Horizontal advance per character, in em
    pub advance: f32,
}

impl Default for BoxGlyphs {
    fn default() -> Self {
        BoxGlyphs { advance: 0.6 }
    }
}

impl TextEngine for BoxGlyphs {
    fn measure(&mut self, text: &str, font: &FontSpec) -> LineMetrics {
        LineMetrics {
            width: f64::from(self.advance * font.size) * text.chars().count() as f64,
            height: f64::from(LINE_HEIGHT_FACTOR * font.size),
        }
    }

    fn render_line(&mut self, text: &str, font: &FontSpec, color: Color) -> Option<Pixmap> {
        let mut pixmap = pixmap_for(self.measure(text, font))?;
        let mut paint = Paint::default();
        paint.set_color(color);
        paint.anti_alias = true;

        let adv = self.advance * font.size;
        // box spans cap height; heavier weights get fatter boxes
        let inset = (if font.weight >= 600 { 0.05 } else { 0.12 }) * adv;
        let top = font.size * 0.2;
        for (i, c) in text.chars().enumerate() {
            if c.is_whitespace() {
                continue;
            }
            let x = i as f32 * adv + inset;
            if let Some(rect) = Rect::from_xywh(x, top, adv - 2.0 * inset, font.size * 0.8) {
                pixmap.fill_rect(rect, &paint, Transform::identity(), None);
            }
        }
        Some(pixmap)
    }
}

/// Composite an 8-bit coverage mask onto a premultiplied pixmap.
fn blend_mask(
    pixmap: &mut Pixmap,
    mask: &[u8],
    mask_width: u32,
    mask_height: u32,
    dest_x: i32,
    dest_y: i32,
    color: PremultipliedColorU8,
) {
    let pw = pixmap.width() as i32;
    let ph = pixmap.height() as i32;
    let stride = pixmap.width() as usize;
    let data = pixmap.data_mut();

    for my in 0..mask_height as i32 {
        let py = dest_y + my;
        if py < 0 || py >= ph {
            continue;
        }
        for mx in 0..mask_width as i32 {
            let px = dest_x + mx;
            if px < 0 || px >= pw {
                continue;
            }
            let Some(&coverage) = mask.get(my as usize * mask_width as usize + mx as usize) else {
                continue;
            };
            if coverage == 0 {
                continue;
            }
            let idx = (py as usize * stride + px as usize) * 4;
            let cov = u32::from(coverage);
            let src = [
                u32::from(color.red()) * cov / 255,
                u32::from(color.green()) * cov / 255,
                u32::from(color.blue()) * cov / 255,
                u32::from(color.alpha()) * cov / 255,
            ];
            let inv = 255 - src[3];
            for (ch, s) in src.iter().enumerate() {
                let d = u32::from(data[idx + ch]);
                data[idx + ch] = (s + d * inv / 255).min(255) as u8;
            }
        }
    }
}

#[cfg(feature = "system-fonts")]
pub use self::cosmic::CosmicText;

#[cfg(feature = "system-fonts")]
mod cosmic {
    use super::{blend_mask, pixmap_for, LineMetrics, TextEngine, LINE_HEIGHT_FACTOR};
    use crate::rendering::paint::{FontFamily, FontSpec};
    use cosmic_text::{
        Attrs, Buffer, Family, FontSystem, Metrics, Shaping, SwashCache, SwashContent, Weight,
    };
    use tiny_skia::{Color, Pixmap};

    /// Shapes text with cosmic-text against the system font database.
    pub struct CosmicText {
        font_system: FontSystem,
        swash_cache: SwashCache,
    }

    impl std::fmt::Debug for CosmicText {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("CosmicText").finish_non_exhaustive()
        }
    }

    impl Default for CosmicText {
        fn default() -> Self {
            Self::new()
        }
    }

    impl CosmicText {
        /// Load the system fonts. This scans font directories and is slow;
        /// build one engine and reuse it.
        pub fn new() -> Self {
            Self::with_font_system(FontSystem::new())
        }

        pub fn with_font_system(font_system: FontSystem) -> Self {
            Self {
                font_system,
                swash_cache: SwashCache::new(),
            }
        }

        fn shape(&mut self, text: &str, font: &FontSpec) -> Buffer {
            let metrics = Metrics::new(font.size, font.size * LINE_HEIGHT_FACTOR);
            let mut buffer = Buffer::new(&mut self.font_system, metrics);
            let family = match &font.family {
                FontFamily::SansSerif => Family::SansSerif,
                FontFamily::Serif => Family::Serif,
                FontFamily::Monospace => Family::Monospace,
                FontFamily::Cursive => Family::Cursive,
                FontFamily::Fantasy => Family::Fantasy,
                FontFamily::Named(name) => Family::Name(name),
            };
            let attrs = Attrs::new().family(family).weight(Weight(font.weight));
            buffer.set_text(&mut self.font_system, text, &attrs, Shaping::Advanced, None);
            buffer.shape_until_scroll(&mut self.font_system, false);
            buffer
        }
    }

    impl TextEngine for CosmicText {
        fn measure(&mut self, text: &str, font: &FontSpec) -> LineMetrics {
            let buffer = self.shape(text, font);
            let mut width = 0.0f32;
            let mut height = 0.0f32;
            for run in buffer.layout_runs() {
                width = width.max(run.line_w);
                height += run.line_height;
            }
            if height == 0.0 {
                height = font.size * LINE_HEIGHT_FACTOR;
            }
            LineMetrics {
                width: f64::from(width),
                height: f64::from(height),
            }
        }

        fn render_line(&mut self, text: &str, font: &FontSpec, color: Color) -> Option<Pixmap> {
            let metrics = self.measure(text, font);
            let mut pixmap = pixmap_for(metrics)?;
            let buffer = self.shape(text, font);
            let color = color.premultiply().to_color_u8();

            for run in buffer.layout_runs() {
                for glyph in run.glyphs.iter() {
                    let physical = glyph.physical((0.0, run.line_y), 1.0);
                    let Some(image) = self
                        .swash_cache
                        .get_image(&mut self.font_system, physical.cache_key)
                    else {
                        continue;
                    };
                    let x = physical.x + image.placement.left;
                    let y = physical.y - image.placement.top;
                    let (w, h) = (image.placement.width, image.placement.height);
                    match image.content {
                        SwashContent::Mask => {
                            blend_mask(&mut pixmap, &image.data, w, h, x, y, color);
                        }
                        SwashContent::Color => {
                            // colour glyphs (emoji) are tinted through their alpha
                            let alpha: Vec<u8> =
                                image.data.chunks_exact(4).map(|px| px[3]).collect();
                            blend_mask(&mut pixmap, &alpha, w, h, x, y, color);
                        }
                        SwashContent::SubpixelMask => {}
                    }
                }
            }
            Some(pixmap)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn font(size: f32) -> FontSpec {
        FontSpec {
            size,
            ..FontSpec::default()
        }
    }

    #[test]
    fn box_glyphs_measure_by_char_count() {
        let mut e = BoxGlyphs::default();
        let m = e.measure("héllo", &font(10.0));
        assert!((m.width - 30.0).abs() < 1e-9);
        assert!((m.height - 12.0).abs() < 1e-6);
        let empty = e.measure("", &font(10.0));
        assert_eq!(empty.width, 0.0);
        assert!(empty.height > 0.0);
    }

    #[test]
    fn box_glyphs_paint_only_non_whitespace() {
        let mut e = BoxGlyphs::default();
        let pm = e
            .render_line("a b", &font(20.0), Color::BLACK)
            .expect("pixmap");
        assert_eq!(pm.width(), 36);
        assert_eq!(pm.height(), 24);
        let alpha_at = |x: u32, y: u32| pm.pixel(x, y).map(|p| p.alpha()).unwrap_or(0);
        // middle of first glyph is painted, middle of the space is not
        assert!(alpha_at(6, 12) > 0);
        assert_eq!(alpha_at(18, 12), 0);
        assert!(alpha_at(30, 12) > 0);
    }

    #[test]
    fn empty_line_renders_nothing() {
        let mut e = BoxGlyphs::default();
        assert!(e.render_line("", &font(16.0), Color::BLACK).is_none());
    }

    #[test]
    fn blend_mask_clips_to_pixmap() {
        let mut pm = Pixmap::new(2, 2).unwrap();
        let color = Color::BLACK.premultiply().to_color_u8();
        blend_mask(&mut pm, &[255; 9], 3, 3, 1, 1, color);
        assert_eq!(pm.pixel(0, 0).unwrap().alpha(), 0);
        assert_eq!(pm.pixel(1, 1).unwrap().alpha(), 255);
    }
}
