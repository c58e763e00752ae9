use crate::collector::SourceEvent;
use crate::color::ImageHandle;
use crate::config::{FilesystemSource, HttpSource, OrderKind, Source};
use crate::error::MosaicError;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use glob::glob;
use image::imageops::FilterType;
use rand::rng;
use rand::seq::SliceRandom;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Default per-request timeout for remote images.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_millis(500);

/// Pixel size every decoded source image is resized to before it enters the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGeometry {
    pub width: u32,
    pub height: u32,
}

/// Decode raw bytes and fit them to `tile` (nearest-neighbour, aspect not preserved).
pub fn decode_tile(
    id: &str,
    bytes: &[u8],
    tile: TileGeometry,
) -> std::result::Result<ImageHandle, MosaicError> {
    let img = image::load_from_memory(bytes).map_err(|e| MosaicError::decode_failure(id, e))?;
    if img.width() == 0 || img.height() == 0 {
        return Err(MosaicError::decode_failure(id, "image has no pixels"));
    }
    let resized = img.resize_exact(tile.width, tile.height, FilterType::Nearest);
    Ok(ImageHandle::from(resized))
}

async fn decode_off_thread(id: String, bytes: Vec<u8>, tile: TileGeometry) -> SourceEvent {
    let task_id = id.clone();
    match tokio::task::spawn_blocking(move || decode_tile(&task_id, &bytes, tile)).await {
        Ok(Ok(image)) => SourceEvent::Decoded { id, image },
        Ok(Err(e)) => SourceEvent::Failed(e),
        Err(e) => SourceEvent::Failed(MosaicError::decode_failure(id, e)),
    }
}

/// Anything that can produce a known number of source images.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Number of events this source will emit (the expected count it contributes).
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start delivering exactly [`Self::len`] events into `tx`. Returns once all retrievals are
    /// dispatched; delivery continues in background tasks holding clones of `tx`.
    async fn feed(&self, tx: mpsc::Sender<SourceEvent>, tile: TileGeometry);
}

/// Local files matched by a glob, expanded once at construction.
pub struct FilesystemImageSource {
    pub entries: Vec<PathBuf>,
}

impl FilesystemImageSource {
    pub fn new(cfg: &FilesystemSource) -> Result<Self> {
        let glob_pat = cfg
            .glob
            .clone()
            .ok_or_else(|| anyhow::anyhow!("filesystem source missing glob"))?;
        tracing::info!(pattern = %glob_pat, "evaluating glob for filesystem source");
        let mut entries: Vec<PathBuf> = glob(&glob_pat)
            .with_context(|| format!("evaluating glob {glob_pat}"))?
            .flatten()
            .filter(|p| p.is_file())
            .collect();
        if entries.is_empty() {
            tracing::warn!(pattern = %glob_pat, "no images matched filesystem source glob");
        }
        match cfg.order.unwrap_or_default() {
            OrderKind::Random => entries.shuffle(&mut rng()),
            OrderKind::Sequential => entries.sort(),
        }
        tracing::info!(pattern = %glob_pat, total = entries.len(), "filesystem source loaded");
        Ok(Self { entries })
    }
}

#[async_trait]
impl ImageSource for FilesystemImageSource {
    fn len(&self) -> usize {
        self.entries.len()
    }

    async fn feed(&self, tx: mpsc::Sender<SourceEvent>, tile: TileGeometry) {
        for path in self.entries.iter().cloned() {
            let tx = tx.clone();
            tokio::spawn(async move {
                let id = path.display().to_string();
                let event = match tokio::fs::read(&path).await {
                    Ok(bytes) => decode_off_thread(id, bytes, tile).await,
                    Err(e) => SourceEvent::Failed(MosaicError::decode_failure(id, e)),
                };
                // Collector may already be done.
                let _ = tx.send(event).await;
            });
        }
    }
}

/// Remote images fetched concurrently, one request per URL.
pub struct HttpImageSource {
    pub urls: Vec<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpImageSource {
    pub fn new(cfg: &HttpSource) -> Result<Self> {
        let timeout = cfg
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building http client")?;
        if cfg.urls.is_empty() {
            tracing::warn!("http source has no urls configured");
        }
        Ok(Self {
            urls: cfg.urls.clone(),
            timeout,
            client,
        })
    }

    /// Per-request timeout applied to every fetch.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch(client: &reqwest::Client, url: &str) -> std::result::Result<Vec<u8>, MosaicError> {
        let resp = client
            .get(url)
            .send()
            .await
            .map_err(|e| MosaicError::decode_failure(url, e))?;
        if !resp.status().is_success() {
            return Err(MosaicError::decode_failure(
                url,
                format!("status {}", resp.status()),
            ));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| MosaicError::decode_failure(url, e))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    fn len(&self) -> usize {
        self.urls.len()
    }

    async fn feed(&self, tx: mpsc::Sender<SourceEvent>, tile: TileGeometry) {
        for url in self.urls.iter().cloned() {
            let tx = tx.clone();
            let client = self.client.clone();
            tokio::spawn(async move {
                let event = match HttpImageSource::fetch(&client, &url).await {
                    Ok(bytes) => decode_off_thread(url, bytes, tile).await,
                    Err(e) => SourceEvent::Failed(e),
                };
                let _ = tx.send(event).await;
            });
        }
    }
}

/// Factory creating a concrete boxed `ImageSource` from a typed config enum value.
pub fn build_source(src: &Source) -> Result<Box<dyn ImageSource>> {
    match src {
        Source::Filesystem { filesystem } => {
            let cfg = filesystem.clone().unwrap_or_default();
            Ok(Box::new(FilesystemImageSource::new(&cfg)?))
        }
        Source::Http { http } => {
            let cfg = http.clone().unwrap_or_default();
            Ok(Box::new(HttpImageSource::new(&cfg)?))
        }
        Source::Unknown => bail!("unknown source kind"),
    }
}
