use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use toml_edit::{DocumentMut, Item, value};

use crate::distance::DistanceWeights;

/// Default on-disk config filename
pub const DEFAULT_CONFIG_PATH: &str = "mosaic.toml";

/// Strongly typed representation of the configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub logging: Option<Logging>,
    pub mosaic: MosaicSettings,
    #[serde(default)]
    pub sources: HashMap<String, Source>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Logging {
    pub filter: Option<String>,
}

fn default_tile() -> u32 {
    16
}

fn default_scale() -> u32 {
    1
}

fn default_deadline_ms() -> u64 {
    1000
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MosaicSettings {
    /// Image to reconstruct.
    pub target: PathBuf,
    /// Where the composed mosaic is written (PNG).
    pub output: PathBuf,
    #[serde(default = "default_tile")]
    pub tile_width: u32,
    #[serde(default = "default_tile")]
    pub tile_height: u32,
    /// Output pixels per target pixel.
    #[serde(default = "default_scale")]
    pub tile_scale: u32,
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    #[serde(default)]
    pub weights: DistanceWeights,
}

impl MosaicSettings {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tile_width == 0 || self.tile_height == 0 {
            bail!(
                "tile dimensions must be positive (got {}x{})",
                self.tile_width,
                self.tile_height
            );
        }
        if self.tile_scale == 0 {
            bail!("tile_scale must be at least 1");
        }
        if self.tile_width.checked_mul(self.tile_scale).is_none()
            || self.tile_height.checked_mul(self.tile_scale).is_none()
        {
            bail!(
                "tile {}x{} scaled by {} does not fit in u32",
                self.tile_width,
                self.tile_height,
                self.tile_scale
            );
        }
        self.weights.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    #[default]
    Random,
    Sequential,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "kind")]
pub enum Source {
    #[serde(rename = "filesystem")]
    Filesystem {
        filesystem: Option<FilesystemSource>,
    },
    #[serde(rename = "http")]
    Http { http: Option<HttpSource> },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct FilesystemSource {
    pub glob: Option<String>,
    pub order: Option<OrderKind>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct HttpSource {
    #[serde(default)]
    pub urls: Vec<String>,
    pub timeout_ms: Option<u64>,
}

/// Internal manager state kept behind an `Arc<RwLock<_>>`.
///
/// The binary only loads and reads. The setters and [`ConfigManager::save`] are for library
/// callers that tune a run and want the change persisted.
#[derive(Debug)]
pub struct ConfigManager {
    path: PathBuf,
    doc: DocumentMut,
}

pub type SharedConfig = Arc<RwLock<ConfigManager>>;

impl ConfigManager {
    /// Load an existing config file.
    pub async fn load(path: Option<PathBuf>) -> Result<SharedConfig> {
        let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        if !path.exists() {
            bail!("config file {} not found", path.display());
        }
        let text = fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading config file {}", path.display()))?;
        let doc = text
            .parse::<DocumentMut>()
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(Arc::new(RwLock::new(Self { path, doc })))
    }

    /// Convert current document to strongly typed struct.
    pub async fn to_struct(cfg: &SharedConfig) -> Result<Config> {
        let guard = cfg.read().await;
        let typed: Config = toml_edit::de::from_document(guard.doc.clone())?;
        Ok(typed)
    }

    fn mosaic_table(doc: &mut DocumentMut) -> Result<&mut toml_edit::Table> {
        doc["mosaic"]
            .as_table_mut()
            .ok_or_else(|| anyhow::anyhow!("mosaic table missing"))
    }

    /// Update the collection deadline.
    pub async fn set_deadline_ms(cfg: &SharedConfig, deadline_ms: u64) -> Result<()> {
        let mut guard = cfg.write().await;
        let tbl = Self::mosaic_table(&mut guard.doc)?;
        tbl["deadline_ms"] = value(deadline_ms as i64);
        Ok(())
    }

    /// Replace the perceptual distance weights.
    pub async fn set_weights(cfg: &SharedConfig, weights: DistanceWeights) -> Result<()> {
        weights.validate()?;
        let mut guard = cfg.write().await;
        let tbl = Self::mosaic_table(&mut guard.doc)?;
        let w = tbl["weights"].or_insert(Item::Table(toml_edit::Table::new()));
        if let Item::Table(wt) = w {
            wt["hue"] = value(weights.hue);
            wt["saturation"] = value(weights.saturation);
            wt["value"] = value(weights.value);
        } else {
            bail!("mosaic.weights is not a table");
        }
        Ok(())
    }

    /// Atomic write of current document to disk (best-effort durability via rename).
    pub async fn save(cfg: &SharedConfig) -> Result<()> {
        let (path, contents) = {
            let guard = cfg.read().await;
            (guard.path.clone(), guard.doc.to_string())
        };
        let tmp = path.with_extension("toml.tmp");
        fs::write(&tmp, contents)
            .await
            .with_context(|| format!("writing tmp config {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("renaming tmp config to {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[logging]
filter = "debug"

[mosaic]
target = "target.jpg"
output = "out.png"
tile_width = 8

[sources.local]
kind = "filesystem"
filesystem = { glob = "tiles/*.png", order = "sequential" }

[sources.remote]
kind = "http"
http = { urls = ["https://example.org/a.jpg"], timeout_ms = 250 }

[sources.weird]
kind = "ftp"
"#;

    async fn write_sample(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{name}-{}.toml", std::process::id()));
        fs::write(&path, SAMPLE).await.unwrap();
        path
    }

    #[tokio::test]
    async fn parses_sample_with_defaults() {
        let path = write_sample("mosaic-cfg-parse").await;
        let shared = ConfigManager::load(Some(path.clone())).await.unwrap();
        let cfg = ConfigManager::to_struct(&shared).await.unwrap();

        assert_eq!(cfg.logging.unwrap().filter.as_deref(), Some("debug"));
        assert_eq!(cfg.mosaic.tile_width, 8);
        assert_eq!(cfg.mosaic.tile_height, 16);
        assert_eq!(cfg.mosaic.tile_scale, 1);
        assert_eq!(cfg.mosaic.deadline(), Duration::from_secs(1));
        assert_eq!(cfg.mosaic.weights, DistanceWeights::default());
        assert!(cfg.mosaic.validate().is_ok());

        match &cfg.sources["local"] {
            Source::Filesystem { filesystem: Some(f) } => {
                assert_eq!(f.order, Some(OrderKind::Sequential));
            }
            other => panic!("unexpected source {other:?}"),
        }
        match &cfg.sources["remote"] {
            Source::Http { http: Some(h) } => {
                assert_eq!(h.urls.len(), 1);
                assert_eq!(h.timeout_ms, Some(250));
            }
            other => panic!("unexpected source {other:?}"),
        }
        assert!(matches!(cfg.sources["weird"], Source::Unknown));
        fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn edits_round_trip_through_save() {
        let path = write_sample("mosaic-cfg-edit").await;
        let shared = ConfigManager::load(Some(path.clone())).await.unwrap();
        ConfigManager::set_deadline_ms(&shared, 2500).await.unwrap();
        let weights = DistanceWeights {
            hue: 0.5,
            saturation: 0.25,
            value: 0.25,
        };
        ConfigManager::set_weights(&shared, weights).await.unwrap();
        ConfigManager::save(&shared).await.unwrap();

        let reloaded = ConfigManager::load(Some(path.clone())).await.unwrap();
        let cfg = ConfigManager::to_struct(&reloaded).await.unwrap();
        assert_eq!(cfg.mosaic.deadline_ms, 2500);
        assert_eq!(cfg.mosaic.weights, weights);
        fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let path = std::env::temp_dir().join("definitely-not-here-mosaic.toml");
        assert!(ConfigManager::load(Some(path)).await.is_err());
    }

    fn settings(tile_width: u32, tile_height: u32, tile_scale: u32) -> MosaicSettings {
        MosaicSettings {
            target: "t.png".into(),
            output: "o.png".into(),
            tile_width,
            tile_height,
            tile_scale,
            deadline_ms: 10,
            weights: DistanceWeights::default(),
        }
    }

    #[test]
    fn zero_tile_rejected() {
        assert!(settings(0, 4, 1).validate().is_err());
        assert!(settings(4, 4, 0).validate().is_err());
    }

    #[test]
    fn overflowing_scaled_tile_rejected() {
        assert!(settings(70_000, 4, 70_000).validate().is_err());
        assert!(settings(4, 70_000, 70_000).validate().is_err());
        assert!(settings(65_535, 65_535, 65_537).validate().is_ok());
    }
}
