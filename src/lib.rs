//! RFox Watermark Engine
//!
//! A self-healing watermark overlay for headless documents. Text or an
//! image is rasterized into a rotated, tileable bitmap, composited as a
//! non-interactive overlay on a container element, and regenerated
//! whenever the overlay is removed or altered.
//!
//! # Features
//!
//! - **system-fonts** (default): shape text with the system's fonts via
//!   cosmic-text. Without it, text is drawn with the font-free box engine.
//! - **http** (default): load image watermarks over HTTP(S).
//!
//! # Example
//!
//! ```no_run
//! use rfwatermark::{Document, EngineConfig, Watermark, WatermarkConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let doc = Document::parse_html("<html><body><main id=app></main></body></html>");
//! let app = doc.select_first("#app")?.expect("container");
//! let doc = doc.into_document();
//!
//! let config: WatermarkConfig = serde_json::from_str(
//!     r#"{"content": ["Confidential", "jane@example.com"], "gap": [80, 60]}"#,
//! )?;
//! let wm = Watermark::mount(&doc, app, config, EngineConfig::default()).await?;
//!
//! // someone removes the overlay...
//! doc.remove(wm.surface().expect("mounted"))?;
//! doc.flush_mutations();
//! wm.settle().await;
//! assert!(wm.surface().is_some());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

pub mod error;
pub use error::{Error, Result};

pub mod dom;
pub mod guard;
pub mod options;
pub mod overlay;
pub mod platform;
pub mod rendering;
pub mod watermark;

pub use dom::{Document, NodeId};
pub use guard::GuardState;
pub use options::{ResolvedConfig, WatermarkConfig};
pub use platform::{FixedPixelRatio, PixelRatio};
pub use rendering::{
    CachedImageLoader, ImageLoader, Rasterizer, ResourceLoader, TextBackend, Tile,
};
pub use watermark::{Stats, Watermark};

/// Engine-level settings that are not part of a watermark's configuration
///
/// The defaults are conservative: a pixel ratio of 1, system fonts when
/// compiled in, images resolved relative to the working directory and a
/// 30 second image timeout.
///
/// # Examples
///
/// ```
/// let cfg = rfwatermark::EngineConfig::default();
/// assert_eq!(cfg.image_timeout_ms, 30000);
/// assert!(cfg.user_agent.starts_with("rfwatermark/"));
/// ```
#[derive(Clone)]
pub struct EngineConfig {
    /// Source of the device pixel ratio, queried on every rasterization
    pub pixel_ratio: Arc<dyn PixelRatio>,
    /// Text engine to measure and draw with
    pub text_backend: TextBackend,
    /// Base URL relative image references are resolved against
    pub image_base_url: Option<url::Url>,
    /// Image load timeout in milliseconds
    pub image_timeout_ms: u64,
    /// User agent sent when fetching images
    pub user_agent: String,
    /// Replaces the built-in [`ResourceLoader`] when set
    pub image_loader: Option<Arc<dyn ImageLoader>>,
    /// Decoded images kept per engine; 0 disables the cache
    pub image_cache_entries: u64,
    /// How long a cached image stays valid, in seconds
    pub image_cache_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pixel_ratio: Arc::new(FixedPixelRatio::default()),
            text_backend: TextBackend::default(),
            image_base_url: None,
            image_timeout_ms: 30000,
            user_agent: format!("rfwatermark/{}", env!("CARGO_PKG_VERSION")),
            image_loader: None,
            image_cache_entries: 16,
            image_cache_ttl_secs: 3600,
        }
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("device_pixel_ratio", &self.pixel_ratio.device_pixel_ratio())
            .field("text_backend", &self.text_backend)
            .field("image_base_url", &self.image_base_url)
            .field("image_timeout_ms", &self.image_timeout_ms)
            .field("user_agent", &self.user_agent)
            .field("custom_image_loader", &self.image_loader.is_some())
            .field("image_cache_entries", &self.image_cache_entries)
            .field("image_cache_ttl_secs", &self.image_cache_ttl_secs)
            .finish()
    }
}

impl EngineConfig {
    /// Build the rasterizer these settings describe.
    pub fn rasterizer(&self) -> Rasterizer {
        let mut images = self.image_loader.clone().unwrap_or_else(|| {
            Arc::new(ResourceLoader::new(
                self.image_base_url.clone(),
                Duration::from_millis(self.image_timeout_ms),
                Some(&self.user_agent),
            ))
        });
        if self.image_cache_entries > 0 {
            images = Arc::new(CachedImageLoader::new(
                images,
                self.image_cache_entries,
                Duration::from_secs(self.image_cache_ttl_secs),
            ));
        }
        Rasterizer::new(self.text_backend.build(), images, self.pixel_ratio.clone())
    }
}

/// Rasterize a single tile without mounting anything.
///
/// # Examples
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> rfwatermark::Result<()> {
/// let engine = rfwatermark::EngineConfig {
///     text_backend: rfwatermark::TextBackend::Boxes,
///     ..Default::default()
/// };
/// let tile = rfwatermark::render_tile(&rfwatermark::WatermarkConfig::text(["Draft"]), &engine).await?;
/// assert!(tile.width > 0.0 && tile.height > 0.0);
/// assert_eq!(&tile.png_bytes()?[1..4], b"PNG");
/// # Ok(())
/// # }
/// ```
pub async fn render_tile(config: &WatermarkConfig, engine: &EngineConfig) -> Result<Tile> {
    engine
        .rasterizer()
        .rasterize(&options::resolve(config))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_engine_config_is_conservative() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.pixel_ratio.device_pixel_ratio(), 1.0);
        assert_eq!(cfg.text_backend, TextBackend::System);
        assert!(cfg.image_base_url.is_none());
        assert!(cfg.image_loader.is_none());
        assert!(format!("{:?}", cfg).contains("image_timeout_ms: 30000"));
    }

    #[tokio::test]
    async fn render_tile_honors_pixel_ratio() {
        let engine = EngineConfig {
            pixel_ratio: Arc::new(FixedPixelRatio(3.0)),
            text_backend: TextBackend::Boxes,
            ..Default::default()
        };
        let mut config = WatermarkConfig::text(["x"]);
        config.gap = Some(vec![0.into()]);
        config.width = Some(10.into());
        config.height = Some(10.into());
        let tile = render_tile(&config, &engine).await.unwrap();
        assert_eq!((tile.pixel_width, tile.pixel_height), (30, 30));
    }
}
