use crate::collector::{CollectOutcome, Collector, Finish};
use crate::color::ImageHandle;
use crate::config::{Config, MosaicSettings};
use crate::distance::DistanceModel;
use crate::error::{MosaicError, Result};
use crate::index::{IndexStats, NearestColorIndex, WorkingSet};
use crate::region::{grid_dims, reduce_regions};
use crate::sources::{self, ImageSource, TileGeometry};
use anyhow::Context;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba, RgbaImage};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const FEED_CAPACITY: usize = 64;

/// Geometry of one mosaic render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MosaicParams {
    /// Region width in target pixels.
    pub tile_width: u32,
    /// Region height in target pixels.
    pub tile_height: u32,
    /// Output pixels per target pixel.
    pub tile_scale: u32,
}

impl MosaicParams {
    /// Size each placed source image is drawn at.
    pub fn output_tile(&self) -> Result<TileGeometry> {
        match (
            self.tile_width.checked_mul(self.tile_scale),
            self.tile_height.checked_mul(self.tile_scale),
        ) {
            (Some(width), Some(height)) => Ok(TileGeometry { width, height }),
            _ => Err(MosaicError::invalid_input(format!(
                "scaled tile {}x{} * {} overflows",
                self.tile_width, self.tile_height, self.tile_scale
            ))),
        }
    }

    /// Output canvas size for a `width` x `height` target.
    pub fn canvas_size(&self, width: u32, height: u32) -> Result<(u32, u32)> {
        match (
            width.checked_mul(self.tile_scale),
            height.checked_mul(self.tile_scale),
        ) {
            (Some(w), Some(h)) => Ok((w, h)),
            _ => Err(MosaicError::invalid_input(format!(
                "canvas {width}x{height} * {} overflows",
                self.tile_scale
            ))),
        }
    }
}

impl From<&MosaicSettings> for MosaicParams {
    fn from(s: &MosaicSettings) -> Self {
        Self {
            tile_width: s.tile_width,
            tile_height: s.tile_height,
            tile_scale: s.tile_scale,
        }
    }
}

/// Replace every region of `target` with the source image whose color matches it best.
///
/// The canvas is `(W * scale, H * scale)`; tiles on the right and bottom edges are clipped.
pub fn assemble(
    target: &ImageHandle,
    params: MosaicParams,
    index: &NearestColorIndex,
) -> Result<RgbaImage> {
    if params.tile_scale == 0 {
        return Err(MosaicError::invalid_input("tile scale must be at least 1"));
    }
    if index.working_set().is_empty() {
        return Err(MosaicError::NotFound);
    }
    let regions = reduce_regions(target, params.tile_width, params.tile_height)?;
    let out_tile = params.output_tile()?;
    let (canvas_w, canvas_h) = params.canvas_size(target.width(), target.height())?;
    let mut canvas: RgbaImage =
        ImageBuffer::from_pixel(canvas_w, canvas_h, Rgba([255, 255, 255, 255]));

    let (cols, rows) = grid_dims(
        target.width(),
        target.height(),
        params.tile_width,
        params.tile_height,
    );
    tracing::debug!(cols, rows, tile_w = out_tile.width, tile_h = out_tile.height, "assembling mosaic");

    let mut ordered: Vec<_> = regions.into_iter().collect();
    ordered.sort_unstable_by_key(|(idx, _)| (idx.ry, idx.rx));
    for (idx, color) in ordered {
        let src = index.best_image(color)?;
        let x = i64::from(idx.rx) * i64::from(out_tile.width);
        let y = i64::from(idx.ry) * i64::from(out_tile.height);
        if (src.width(), src.height()) == (out_tile.width, out_tile.height) {
            imageops::overlay(&mut canvas, src.as_rgba(), x, y);
        } else {
            let resized =
                imageops::resize(src.as_rgba(), out_tile.width, out_tile.height, FilterType::Triangle);
            imageops::overlay(&mut canvas, &resized, x, y);
        }
    }
    Ok(canvas)
}

/// Build every configured source, skipping (and logging) the ones that fail.
pub fn build_sources(cfg: &Config) -> Vec<(String, Box<dyn ImageSource>)> {
    let mut built = Vec::new();
    for (id, src_cfg) in cfg.sources.iter() {
        match sources::build_source(src_cfg) {
            Ok(src) => {
                tracing::debug!(source = %id, images = src.len(), "source ready");
                built.push((id.clone(), src));
            }
            Err(e) => {
                tracing::warn!(source = %id, error = %e, "failed to build source");
            }
        }
    }
    built
}

/// Fan the sources into one feed and collect their representative colors.
pub async fn collect_sources(
    sources: &[(String, Box<dyn ImageSource>)],
    tile: TileGeometry,
    deadline: Duration,
) -> CollectOutcome {
    let expected: usize = sources.iter().map(|(_, s)| s.len()).sum();
    let (tx, rx) = mpsc::channel(FEED_CAPACITY);
    let collector = tokio::spawn(Collector::new(expected, deadline).run(rx));
    for (id, src) in sources {
        tracing::debug!(source = %id, "feeding source");
        src.feed(tx.clone(), tile).await;
    }
    drop(tx);
    match collector.await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(error = %e, "collector task failed");
            CollectOutcome {
                working_set: WorkingSet::new(),
                expected,
                received: 0,
                failures: 0,
                finish: Finish::FeedExhausted,
                elapsed: Duration::ZERO,
            }
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub expected: usize,
    pub colors: usize,
    pub finish: Finish,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub index: IndexStats,
}

/// Full pass: sources -> collector -> index -> assembled mosaic on disk.
pub async fn run(cfg: &Config) -> anyhow::Result<RunSummary> {
    let settings = &cfg.mosaic;
    settings.validate()?;
    let params = MosaicParams::from(settings);

    let sources = build_sources(cfg);
    let outcome = collect_sources(&sources, params.output_tile()?, settings.deadline()).await;
    if outcome.is_partial() {
        tracing::warn!(
            received = outcome.received,
            expected = outcome.expected,
            finish = ?outcome.finish,
            "working set may be truncated"
        );
    }
    if outcome.working_set.is_empty() {
        return Err(MosaicError::NotFound).context("no source image produced a color");
    }

    let target_path = settings.target.clone();
    let bytes = tokio::fs::read(&target_path)
        .await
        .with_context(|| format!("reading target {}", target_path.display()))?;
    let target = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
        .await?
        .with_context(|| format!("decoding target {}", target_path.display()))?;
    let target = ImageHandle::from(target);

    let colors = outcome.working_set.len();
    let index = Arc::new(NearestColorIndex::new(
        outcome.working_set,
        DistanceModel::new(settings.weights),
    ));
    let render_index = Arc::clone(&index);
    let canvas = tokio::task::spawn_blocking(move || assemble(&target, params, &render_index))
        .await??;

    let output = settings.output.clone();
    let (width, height) = canvas.dimensions();
    let save_path = output.clone();
    tokio::task::spawn_blocking(move || canvas.save(&save_path))
        .await?
        .with_context(|| format!("saving mosaic {}", output.display()))?;

    let stats = index.stats();
    tracing::info!(
        output = %output.display(),
        width,
        height,
        colors,
        scans = stats.scans,
        cache_hits = stats.cache_hits,
        exact_hits = stats.exact_hits,
        "mosaic written"
    );
    Ok(RunSummary {
        expected: outcome.expected,
        colors,
        finish: outcome.finish,
        output,
        width,
        height,
        index: stats,
    })
}
