use futures::future::join_all;
use image::{DynamicImage, Rgb, RgbImage, imageops::FilterType};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::providers::SynopsisProvider;
use crate::ratelimit::RateLimiter;
use crate::types::ResultRecord;

pub const THUMBNAIL_SIZE: (u32, u32) = (160, 225);
pub const DEFAULT_SYNOPSIS: &str = "No description available.";
const PLACEHOLDER_RGB: [u8; 3] = [50, 50, 50];

#[derive(Debug, Clone)]
pub struct Thumbnail {
    image: Arc<DynamicImage>,
    placeholder: bool,
}

impl Thumbnail {
    pub fn placeholder() -> Self {
        let (w, h) = THUMBNAIL_SIZE;
        let image = RgbImage::from_pixel(w, h, Rgb(PLACEHOLDER_RGB));
        Self {
            image: Arc::new(DynamicImage::ImageRgb8(image)),
            placeholder: true,
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let (w, h) = THUMBNAIL_SIZE;
        let image = image::load_from_memory(bytes)?.resize_exact(w, h, FilterType::Triangle);
        Ok(Self {
            image: Arc::new(image),
            placeholder: false,
        })
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }
}

/// Thumbnails for the current result page, keyed by show id.
#[derive(Debug, Default)]
pub struct ImageCache {
    entries: Mutex<HashMap<String, Thumbnail>>,
}

impl ImageCache {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Thumbnail>> {
        // A poisoned map only ever holds complete inserts.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, id: &str, thumb: Thumbnail) {
        self.lock().insert(id.to_string(), thumb);
    }

    pub fn get(&self, id: &str) -> Option<Thumbnail> {
        self.lock().get(id).cloned()
    }

    /// Falls back to the placeholder for ids that were never enriched.
    pub fn get_or_placeholder(&self, id: &str) -> Thumbnail {
        self.get(id).unwrap_or_else(Thumbnail::placeholder)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedMeta {
    #[serde(default)]
    synopsis: Option<String>,
}

#[derive(Debug, Clone)]
struct EntryPaths {
    image: PathBuf,
    meta: PathBuf,
}

pub fn cache_key(title: &str) -> String {
    format!("{:x}", md5::compute(title.as_bytes()))
}

/// Attaches synopsis and thumbnail to result records, serving repeats from
/// `<key>.jpg` + `<key>.json` pairs under `dir`.
pub struct EnrichmentCache<S> {
    dir: PathBuf,
    source: S,
    limiter: Arc<RateLimiter>,
    images: Arc<ImageCache>,
}

impl<S: SynopsisProvider> EnrichmentCache<S> {
    pub fn new(
        dir: impl Into<PathBuf>,
        source: S,
        limiter: Arc<RateLimiter>,
        images: Arc<ImageCache>,
    ) -> Self {
        let dir = dir.into();
        // Entries are still fetched without a usable directory, just not kept.
        if let Err(err) = fs::create_dir_all(&dir) {
            warn!(path = %dir.display(), %err, "thumbnail cache directory unavailable");
        }
        Self {
            dir,
            source,
            limiter,
            images,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn images(&self) -> &Arc<ImageCache> {
        &self.images
    }

    /// Never fails: anything that goes wrong leaves the default synopsis and
    /// the placeholder thumbnail in place.
    pub async fn enrich(&self, record: &mut ResultRecord) {
        let (synopsis, thumb) = match self.resolve(&record.title).await {
            Ok(found) => found,
            Err(err) => {
                warn!(title = %record.title, %err, "could not fetch details");
                (DEFAULT_SYNOPSIS.to_string(), Thumbnail::placeholder())
            }
        };
        record.synopsis = Some(synopsis);
        self.images.insert(&record.id, thumb);
    }

    /// Enriches every record concurrently; returns once the slowest is done.
    pub async fn enrich_all(&self, records: &mut [ResultRecord]) {
        join_all(records.iter_mut().map(|record| self.enrich(record))).await;
    }

    async fn resolve(&self, title: &str) -> Result<(String, Thumbnail)> {
        let paths = self.entry_paths(title);
        match read_entry(&paths) {
            Ok(Some(hit)) => {
                debug!(title, "thumbnail cache hit");
                return Ok(hit);
            }
            Ok(None) => {}
            Err(err) => warn!(title, %err, "cache entry unreadable, refetching"),
        }
        self.fetch_fresh(title, &paths).await
    }

    async fn fetch_fresh(&self, title: &str, paths: &EntryPaths) -> Result<(String, Thumbnail)> {
        self.limiter.acquire().await;
        let candidate = self
            .source
            .lookup(title)
            .await?
            .ok_or_else(|| Error::Remote(format!("no synopsis match for {title:?}")))?;
        let image_url = candidate
            .image_url
            .ok_or_else(|| Error::Remote(format!("no artwork for {title:?}")))?;
        let synopsis = candidate
            .synopsis
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SYNOPSIS.to_string());

        let bytes = self.source.fetch_image(&image_url).await?;
        let thumb = Thumbnail::decode(&bytes)
            .map_err(|err| Error::Remote(format!("undecodable artwork {image_url}: {err}")))?;

        if let Err(err) = write_entry(paths, &synopsis, &bytes) {
            warn!(title, %err, "could not persist cache entry");
        }
        Ok((synopsis, thumb))
    }

    fn entry_paths(&self, title: &str) -> EntryPaths {
        let base = cache_key(title);
        EntryPaths {
            image: self.dir.join(format!("{base}.jpg")),
            meta: self.dir.join(format!("{base}.json")),
        }
    }
}

/// `Ok(None)` when either half of the pair is missing.
fn read_entry(paths: &EntryPaths) -> Result<Option<(String, Thumbnail)>> {
    if !(paths.image.exists() && paths.meta.exists()) {
        return Ok(None);
    }
    let read_err = |path: &Path, reason: String| Error::CacheRead {
        path: path.to_path_buf(),
        reason,
    };

    let raw = fs::read_to_string(&paths.meta).map_err(|e| read_err(&paths.meta, e.to_string()))?;
    let meta: CachedMeta =
        serde_json::from_str(&raw).map_err(|e| read_err(&paths.meta, e.to_string()))?;
    let bytes = fs::read(&paths.image).map_err(|e| read_err(&paths.image, e.to_string()))?;
    let thumb = Thumbnail::decode(&bytes).map_err(|e| read_err(&paths.image, e.to_string()))?;

    let synopsis = meta
        .synopsis
        .unwrap_or_else(|| DEFAULT_SYNOPSIS.to_string());
    Ok(Some((synopsis, thumb)))
}

fn write_entry(paths: &EntryPaths, synopsis: &str, bytes: &[u8]) -> Result<()> {
    let write_err = |path: &Path, reason: String| Error::CacheWrite {
        path: path.to_path_buf(),
        reason,
    };
    let meta = serde_json::to_string(&CachedMeta {
        synopsis: Some(synopsis.to_string()),
    })
    .map_err(|e| write_err(&paths.meta, e.to_string()))?;
    fs::write(&paths.meta, meta).map_err(|e| write_err(&paths.meta, e.to_string()))?;
    fs::write(&paths.image, bytes).map_err(|e| write_err(&paths.image, e.to_string()))?;
    Ok(())
}
