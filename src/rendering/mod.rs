//! Tile rendering: text/image rasterization into a repeatable bitmap.

pub mod image_source;
pub mod layout;
pub mod paint;
pub mod raster;
pub mod text;

pub use image_source::{CachedImageLoader, ImageLoader, ResourceLoader};
pub use raster::Rasterizer;
pub use text::{BoxGlyphs, TextBackend, TextEngine};

#[cfg(feature = "system-fonts")]
pub use text::CosmicText;

/// One rasterized unit of the watermark pattern.
///
/// `width`/`height` are the logical, pre-rotation tile size used for
/// background tiling; the encoded bitmap itself also contains the gap and
/// is `pixel_width`x`pixel_height` physical pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    /// `data:image/png;base64,...` URL
    pub image_data: String,
    pub width: f64,
    pub height: f64,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

impl Tile {
    /// Raw PNG bytes of the encoded tile
    pub fn png_bytes(&self) -> crate::Result<Vec<u8>> {
        image_source::decode_data_url(&self.image_data)
    }
}
