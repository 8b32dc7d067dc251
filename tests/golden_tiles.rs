//! Tile digests: rendering is deterministic with the box glyph engine, and
//! optionally pinned against recorded goldens (`UPDATE_GOLDENS=1`).

mod common;

use rfwatermark::{render_tile, FixedPixelRatio, WatermarkConfig};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

fn golden_path(name: &str) -> PathBuf {
    let mut p = PathBuf::from("tests/goldens/expected");
    p.push(name);
    p
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn cases() -> Vec<(&'static str, WatermarkConfig)> {
    let two_lines: WatermarkConfig = serde_json::from_str(
        r##"{"content": ["Confidential", "do not share"], "fontStyle": {"fontSize": "18px", "color": "#c00a"}}"##,
    )
    .unwrap();
    let flat: WatermarkConfig =
        serde_json::from_str(r#"{"content": "FLAT", "rotate": 0, "gap": [8, 4]}"#).unwrap();
    vec![("two_lines.sha256", two_lines), ("flat.sha256", flat)]
}

#[tokio::test]
async fn identical_configs_render_identical_tiles() {
    for (_, config) in cases() {
        let a = render_tile(&config, &common::engine()).await.unwrap();
        let b = render_tile(&config, &common::engine()).await.unwrap();
        assert_eq!(digest(&a.png_bytes().unwrap()), digest(&b.png_bytes().unwrap()));
    }
}

#[tokio::test]
async fn flat_tile_paints_each_glyph_box_and_leaves_the_gap_clear() {
    let (_, flat) = cases().remove(1);
    let tile = render_tile(&flat, &common::engine()).await.unwrap();
    let pm = tiny_skia::Pixmap::decode_png(&tile.png_bytes().unwrap()).unwrap();
    assert_eq!((pm.width(), pm.height()), (tile.pixel_width, tile.pixel_height));

    // four 9.6px cells centred on the surface, one box per letter
    let cx = f64::from(pm.width()) / 2.0;
    let cy = (f64::from(pm.height()) / 2.0) as u32;
    for i in 0..4 {
        let x = (cx - 19.2 + (f64::from(i) + 0.5) * 9.6) as u32;
        let px = pm.pixel(x, cy).unwrap();
        // rgba(0,0,0,0.15)
        assert!(px.alpha() > 25 && px.alpha() < 50, "glyph {} alpha {}", i, px.alpha());
        assert_eq!(px.red(), 0);
    }
    for (x, y) in [(0, 0), (pm.width() - 1, 0), (0, pm.height() - 1)] {
        assert_eq!(pm.pixel(x, y).unwrap().alpha(), 0, "gap pixel {},{}", x, y);
    }
}

#[tokio::test]
async fn pixel_ratio_changes_the_bitmap() {
    let config = WatermarkConfig::text(["ratio"]);
    let one = render_tile(&config, &common::engine()).await.unwrap();
    let engine = rfwatermark::EngineConfig {
        pixel_ratio: Arc::new(FixedPixelRatio(2.0)),
        ..common::engine()
    };
    let two = render_tile(&config, &engine).await.unwrap();
    assert_ne!(digest(&one.png_bytes().unwrap()), digest(&two.png_bytes().unwrap()));
}

#[tokio::test]
async fn tiles_match_recorded_goldens() {
    for (name, config) in cases() {
        let tile = render_tile(&config, &common::engine()).await.unwrap();
        let actual = digest(&tile.png_bytes().unwrap());
        let expected_path = golden_path(name);

        if std::env::var("UPDATE_GOLDENS").is_ok() {
            fs::create_dir_all("tests/goldens/expected").ok();
            fs::write(&expected_path, &actual).expect("write golden");
            println!("Updated golden: {:?}", expected_path);
            continue;
        }
        if !expected_path.exists() {
            println!(
                "No golden at {:?}; run with UPDATE_GOLDENS=1 to create it. Skipping.",
                expected_path
            );
            continue;
        }
        let exp = fs::read_to_string(&expected_path).expect("unable to read golden");
        assert_eq!(actual, exp.trim(), "{} drifted", name);
    }
}
