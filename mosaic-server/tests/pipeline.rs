use image::{ImageBuffer, Rgba, RgbaImage};
use mosaic_server::config::{Config, FilesystemSource, MosaicSettings, OrderKind, Source};
use mosaic_server::distance::DistanceWeights;
use mosaic_server::mosaic::{self, build_sources, collect_sources};
use mosaic_server::sources::TileGeometry;
use mosaic_server::{Finish, PixelColor};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const TILE_COLORS: [[u8; 3]; 4] = [[255, 0, 0], [0, 200, 0], [0, 0, 255], [240, 240, 240]];

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("mosaic-it-{name}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_tiles(dir: &Path) {
    for (i, c) in TILE_COLORS.iter().enumerate() {
        let img: RgbaImage = ImageBuffer::from_pixel(12, 12, Rgba([c[0], c[1], c[2], 255]));
        img.save(dir.join(format!("tile{i}.png"))).unwrap();
    }
}

fn config_for(dir: &Path, deadline_ms: u64) -> Config {
    let mut sources = HashMap::new();
    sources.insert(
        "local".to_string(),
        Source::Filesystem {
            filesystem: Some(FilesystemSource {
                glob: Some(format!("{}/tile*.png", dir.display())),
                order: Some(OrderKind::Sequential),
            }),
        },
    );
    Config {
        logging: None,
        mosaic: MosaicSettings {
            target: dir.join("target.png"),
            output: dir.join("out.png"),
            tile_width: 4,
            tile_height: 4,
            tile_scale: 2,
            deadline_ms,
            weights: DistanceWeights::default(),
        },
        sources,
    }
}

#[tokio::test]
async fn four_sources_all_collected_before_deadline() {
    let dir = scratch_dir("collect");
    write_tiles(&dir);
    let cfg = config_for(&dir, 5_000);
    let sources = build_sources(&cfg);
    let deadline = Duration::from_secs(5);
    let outcome = collect_sources(
        &sources,
        TileGeometry {
            width: 8,
            height: 8,
        },
        deadline,
    )
    .await;
    assert_eq!(outcome.expected, 4);
    assert_eq!(outcome.finish, Finish::Complete);
    assert_eq!(outcome.working_set.len(), 4);
    assert!(outcome.elapsed < deadline);
    for c in TILE_COLORS {
        assert!(outcome.working_set.contains(&PixelColor::rgb(c[0], c[1], c[2])));
    }
    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn end_to_end_writes_scaled_mosaic() {
    let dir = scratch_dir("run");
    write_tiles(&dir);
    // Four quadrants, each close to one tile color.
    let target: RgbaImage = ImageBuffer::from_fn(8, 8, |x, y| match (x < 4, y < 4) {
        (true, true) => Rgba([230, 20, 20, 255]),
        (false, true) => Rgba([20, 180, 20, 255]),
        (true, false) => Rgba([20, 20, 230, 255]),
        (false, false) => Rgba([250, 250, 250, 255]),
    });
    target.save(dir.join("target.png")).unwrap();

    let cfg = config_for(&dir, 5_000);
    let summary = mosaic::run(&cfg).await.unwrap();
    assert_eq!(summary.colors, 4);
    assert_eq!(summary.finish, Finish::Complete);
    assert_eq!((summary.width, summary.height), (16, 16));
    assert_eq!(summary.index.scans, 4);

    let out = image::open(&summary.output).unwrap().to_rgba8();
    assert_eq!(out.get_pixel(2, 2).0[..3], [255, 0, 0]);
    assert_eq!(out.get_pixel(12, 2).0[..3], [0, 200, 0]);
    assert_eq!(out.get_pixel(2, 12).0[..3], [0, 0, 255]);
    assert_eq!(out.get_pixel(12, 12).0[..3], [240, 240, 240]);
    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn run_without_sources_fails() {
    let dir = scratch_dir("empty");
    let mut cfg = config_for(&dir, 100);
    cfg.sources.clear();
    assert!(mosaic::run(&cfg).await.is_err());
    std::fs::remove_dir_all(&dir).ok();
}
