/// Rasterizer: turns a resolved configuration into one encoded tile.
///
/// The surface is sized to `(gap + tile) * dpr`, its origin moved to the
/// centre, scaled by the device pixel ratio and rotated, so the repeating
/// background carries the gap and the content sits centred in each cell.

use super::image_source::ImageLoader;
use super::layout::{fits_surface, measure_block, surface_pixels, Size, MAX_SURFACE_AREA};
use super::paint::{text_color, FontSpec};
use super::text::TextEngine;
use super::Tile;
use crate::options::ResolvedConfig;
use crate::platform::PixelRatio;
use crate::{Error, Result};
use base64::Engine as _;
use std::sync::Arc;
use tiny_skia::{FilterQuality, Pixmap, PixmapPaint, Transform};

pub struct Rasterizer {
    text: Box<dyn TextEngine>,
    images: Arc<dyn ImageLoader>,
    display: Arc<dyn PixelRatio>,
}

impl std::fmt::Debug for Rasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rasterizer")
            .field("device_pixel_ratio", &self.display.device_pixel_ratio())
            .finish_non_exhaustive()
    }
}

/// A configured raster surface and the transform that maps tile-centred
/// logical coordinates onto it.
struct Canvas {
    pixmap: Pixmap,
    base: Transform,
}

impl Canvas {
    fn configure(tile: Size, gap: [f64; 2], rotate: f64, ratio: f32) -> Result<Self> {
        let (pw, ph) = surface_pixels(tile, gap, ratio);
        if !fits_surface(pw, ph) {
            return Err(Error::RenderError(format!(
                "{}x{} watermark surface exceeds the {} pixel limit",
                pw, ph, MAX_SURFACE_AREA
            )));
        }
        let pixmap = Pixmap::new(pw, ph)
            .ok_or_else(|| Error::RenderError(format!("cannot allocate {}x{} surface", pw, ph)))?;

        let ratio64 = f64::from(ratio);
        let cx = (gap[0] + tile.width) * ratio64 / 2.0;
        let cy = (gap[1] + tile.height) * ratio64 / 2.0;
        let mut base = Transform::from_translate(cx as f32, cy as f32).pre_scale(ratio, ratio);
        if rotate != 0.0 {
            base = base.pre_concat(Transform::from_rotate(rotate as f32));
        }
        Ok(Canvas { pixmap, base })
    }

    fn encode(self, width: f64, height: f64) -> Result<Tile> {
        let png = self
            .pixmap
            .encode_png()
            .map_err(|e| Error::RenderError(format!("PNG encoding failed: {}", e)))?;
        Ok(Tile {
            image_data: format!(
                "data:image/png;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(png)
            ),
            width,
            height,
            pixel_width: self.pixmap.width(),
            pixel_height: self.pixmap.height(),
        })
    }
}

impl Rasterizer {
    pub fn new(
        text: Box<dyn TextEngine>,
        images: Arc<dyn ImageLoader>,
        display: Arc<dyn PixelRatio>,
    ) -> Self {
        Self {
            text,
            images,
            display,
        }
    }

    /// Render one tile. Image configurations that fail to load fall back
    /// to the text rendering of the same configuration.
    pub async fn rasterize(&mut self, config: &ResolvedConfig) -> Result<Tile> {
        let ratio = self.display.device_pixel_ratio();
        let Some(source) = config.image.as_deref() else {
            return self.draw_text(config, ratio);
        };

        let images = self.images.clone();
        match images.load(source).await {
            Ok(img) => self.draw_image(config, &img, ratio),
            Err(e) => {
                log::warn!(
                    "watermark image {:?} failed to load ({}), falling back to text",
                    source,
                    e
                );
                self.draw_text(&config.without_image(), ratio)
            }
        }
    }

    /// Text path; usable without an async context.
    pub fn draw_text(&mut self, config: &ResolvedConfig, ratio: f32) -> Result<Tile> {
        let font = FontSpec::from_style(&config.font_style);
        let color = text_color(&config.font_style);
        let block = measure_block(self.text.as_mut(), &config.content, &font, config.rotate);

        let tile = Size::new(
            config.width.unwrap_or(block.rotated.width),
            config.height.unwrap_or(block.rotated.height),
        );
        log::debug!(
            "text tile {}x{} for {} line(s), rotate {}",
            tile.width,
            tile.height,
            config.content.len(),
            config.rotate
        );
        let mut canvas = Canvas::configure(tile, config.gap, config.rotate, ratio)?;

        let block_height = config.height.unwrap_or(block.origin.height);
        let max_width = config.width.unwrap_or(block.origin.width);
        let physical_font = font.scaled(ratio);
        let inv = 1.0 / ratio;

        let mut y = -block_height / 2.0;
        for (line, m) in config.content.iter().zip(&block.lines) {
            if let Some(line_px) = self.text.render_line(line, &physical_font, color) {
                // over-long lines are squeezed to the available width
                let squeeze = if m.width > max_width && m.width > 0.0 {
                    max_width / m.width
                } else {
                    1.0
                };
                let t = canvas
                    .base
                    .pre_translate((-m.width / 2.0) as f32, y as f32)
                    .pre_scale(squeeze as f32 * inv, inv);
                canvas
                    .pixmap
                    .draw_pixmap(0, 0, line_px.as_ref(), &PixmapPaint::default(), t, None);
            }
            y += m.height;
        }

        canvas.encode(tile.width, tile.height)
    }

    /// Image path. A single given dimension derives the other from the
    /// image's aspect ratio; with neither, the natural size is used.
    pub fn draw_image(&mut self, config: &ResolvedConfig, img: &Pixmap, ratio: f32) -> Result<Tile> {
        let (iw, ih) = (f64::from(img.width()), f64::from(img.height()));
        let (w, h) = match (config.width, config.height) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, w * ih / iw),
            (None, Some(h)) => (h * iw / ih, h),
            (None, None) => (iw, ih),
        };
        log::debug!("image tile {}x{} from {}x{} source", w, h, iw, ih);

        let mut canvas = Canvas::configure(Size::new(w, h), config.gap, config.rotate, ratio)?;
        let t = canvas
            .base
            .pre_translate((-w / 2.0) as f32, (-h / 2.0) as f32)
            .pre_scale((w / iw) as f32, (h / ih) as f32);
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        canvas.pixmap.draw_pixmap(0, 0, img.as_ref(), &paint, t, None);

        canvas.encode(w, h)
    }
}
