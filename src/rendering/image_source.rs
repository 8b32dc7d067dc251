//! Loading image watermarks.
//!
//! A reference may be a `data:` URL, a `file:` URL, a filesystem path or
//! (with the `http` feature) an `http(s)` URL. Whatever goes wrong here is
//! reported as an error and the rasterizer falls back to text.

use crate::{Error, Result};
use base64::Engine as _;
use futures::future::BoxFuture;
use moka::future::Cache;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tiny_skia::{IntSize, Pixmap};
use url::Url;

/// Asynchronously resolves an image reference to decoded pixels.
pub trait ImageLoader: Send + Sync {
    fn load<'a>(&'a self, source: &'a str) -> BoxFuture<'a, Result<Pixmap>>;
}

/// Where a reference points once resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Data(String),
    File(PathBuf),
    Remote(Url),
}

/// Default loader for data URLs, local files and HTTP resources.
#[derive(Debug, Clone)]
pub struct ResourceLoader {
    base: Option<Url>,
    timeout: Duration,
    #[cfg(feature = "http")]
    client: reqwest::Client,
}

impl Default for ResourceLoader {
    fn default() -> Self {
        Self::new(None, Duration::from_millis(30000), None)
    }
}

impl ResourceLoader {
    pub fn new(base: Option<Url>, timeout: Duration, user_agent: Option<&str>) -> Self {
        #[cfg(feature = "http")]
        let client = {
            // anonymous, no-referrer fetch: no cookies, no Referer header
            let mut builder = reqwest::Client::builder()
                .timeout(timeout)
                .referer(false);
            if let Some(ua) = user_agent {
                builder = builder.user_agent(ua.to_string());
            }
            builder.build().unwrap_or_else(|e| {
                log::warn!("failed to build HTTP client ({}), using defaults", e);
                reqwest::Client::new()
            })
        };
        #[cfg(not(feature = "http"))]
        let _ = user_agent;

        Self {
            base,
            timeout,
            #[cfg(feature = "http")]
            client,
        }
    }

    /// Classify `reference`, resolving relative references against the
    /// base URL when one is configured.
    pub fn resolve(&self, reference: &str) -> Result<ImageSource> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(Error::LoadError("empty image reference".into()));
        }
        if is_data_url(reference) {
            return Ok(ImageSource::Data(reference.to_string()));
        }

        let url = match Url::parse(reference) {
            // one-letter schemes are Windows drive letters
            Ok(u) if u.scheme().len() > 1 => Some(u),
            Ok(_) => None,
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base {
                Some(base) => Some(base.join(reference).map_err(|e| {
                    Error::LoadError(format!("cannot resolve {} against {}: {}", reference, base, e))
                })?),
                None => None,
            },
            Err(e) => return Err(Error::LoadError(format!("invalid image URL {}: {}", reference, e))),
        };

        match url {
            None => Ok(ImageSource::File(PathBuf::from(reference))),
            Some(u) => match u.scheme() {
                "file" => u
                    .to_file_path()
                    .map(ImageSource::File)
                    .map_err(|_| Error::LoadError(format!("invalid file URL {}", u))),
                "http" | "https" => Ok(ImageSource::Remote(u)),
                other => Err(Error::LoadError(format!("unsupported scheme {:?}", other))),
            },
        }
    }

    async fn fetch(&self, source: ImageSource) -> Result<Vec<u8>> {
        match source {
            ImageSource::Data(url) => decode_data_url(&url),
            ImageSource::File(path) => tokio::time::timeout(self.timeout, tokio::fs::read(&path))
                .await
                .map_err(|_| Error::LoadError(format!("timed out reading {}", path.display())))?
                .map_err(|e| Error::LoadError(format!("{}: {}", path.display(), e))),
            #[cfg(feature = "http")]
            ImageSource::Remote(url) => {
                let resp = self.client.get(url.clone()).send().await?;
                if !resp.status().is_success() {
                    return Err(Error::LoadError(format!("{} returned {}", url, resp.status())));
                }
                Ok(resp.bytes().await?.to_vec())
            }
            #[cfg(not(feature = "http"))]
            ImageSource::Remote(url) => Err(Error::LoadError(format!(
                "cannot fetch {}: built without the `http` feature",
                url
            ))),
        }
    }
}

impl ImageLoader for ResourceLoader {
    fn load<'a>(&'a self, source: &'a str) -> BoxFuture<'a, Result<Pixmap>> {
        Box::pin(async move {
            let resolved = self.resolve(source)?;
            log::debug!("loading watermark image from {:?}", resolved);
            let bytes = self.fetch(resolved).await?;
            decode_image(&bytes)
        })
    }
}

/// Keeps decoded images of another loader in memory, so redraws after an
/// update or a tamper reaction do not wait on the network again.
///
/// Entries expire after a TTL and the least recently used ones are evicted
/// past `max_entries`. Failed loads are not cached.
pub struct CachedImageLoader {
    inner: Arc<dyn ImageLoader>,
    cache: Cache<String, Arc<Pixmap>>,
}

impl std::fmt::Debug for CachedImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedImageLoader")
            .field("entries", &self.cache.entry_count())
            .finish_non_exhaustive()
    }
}

impl CachedImageLoader {
    pub fn new(inner: Arc<dyn ImageLoader>, max_entries: u64, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Whether `source` is currently served from memory
    pub async fn is_cached(&self, source: &str) -> bool {
        self.cache.get(source.trim()).await.is_some()
    }

    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}

impl ImageLoader for CachedImageLoader {
    fn load<'a>(&'a self, source: &'a str) -> BoxFuture<'a, Result<Pixmap>> {
        Box::pin(async move {
            let key = source.trim().to_string();
            if let Some(hit) = self.cache.get(&key).await {
                log::debug!("watermark image {:?} served from cache", key);
                return Ok((*hit).clone());
            }
            let pixmap = self.inner.load(source).await?;
            self.cache.insert(key, Arc::new(pixmap.clone())).await;
            Ok(pixmap)
        })
    }
}

fn is_data_url(s: &str) -> bool {
    s.get(..5).map_or(false, |p| p.eq_ignore_ascii_case("data:"))
}

/// Payload of a `data:` URL. Only base64 payloads carry binary images;
/// anything else is taken as percent-free raw text.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>> {
    let rest = url
        .get(5..)
        .filter(|_| is_data_url(url))
        .ok_or_else(|| Error::LoadError("not a data URL".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::LoadError("data URL without payload".into()))?;
    if meta
        .split(';')
        .any(|p| p.trim().eq_ignore_ascii_case("base64"))
    {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| Error::DecodeError(format!("bad base64 in data URL: {}", e)))
    } else {
        Ok(payload.as_bytes().to_vec())
    }
}

/// Decode PNG/JPEG bytes into a premultiplied pixmap.
pub fn decode_image(bytes: &[u8]) -> Result<Pixmap> {
    let rgba = image::load_from_memory(bytes)?.to_rgba8();
    let (w, h) = rgba.dimensions();
    let size = IntSize::from_wh(w, h)
        .ok_or_else(|| Error::DecodeError(format!("image has empty size {}x{}", w, h)))?;

    let mut data = rgba.into_raw();
    for px in data.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        for c in &mut px[..3] {
            *c = ((u16::from(*c) * a + 127) / 255) as u8;
        }
    }
    Pixmap::from_vec(data, size)
        .ok_or_else(|| Error::DecodeError("pixel buffer does not match image size".into()))
}
