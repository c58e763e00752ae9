use mosaic_server::{config, mosaic};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1).map(PathBuf::from);
    // Load config first so we can honor logging.filter directive.
    let shared = config::ConfigManager::load(path).await?;
    let cfg = config::ConfigManager::to_struct(&shared).await?;
    let filter_directive = cfg
        .logging
        .as_ref()
        .and_then(|l| l.filter.clone())
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info,mosaic_server=debug".to_string());
    fmt()
        .with_env_filter(EnvFilter::new(filter_directive))
        .init();
    let summary = mosaic::run(&cfg).await?;
    tracing::info!(
        output = %summary.output.display(),
        colors = summary.colors,
        expected = summary.expected,
        finish = ?summary.finish,
        "done"
    );
    Ok(())
}
