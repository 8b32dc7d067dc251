//! Watermarking imported HTML, through the library and through the CLI

mod common;

use rfwatermark::{Document, Watermark, WatermarkConfig};
use std::process::Command;

const PAGE: &str = r#"<html><head><title>Report</title></head><body><main id="app" style="margin: 0"><h1>Q3</h1></main></body></html>"#;

#[tokio::test]
async fn mounted_overlay_survives_serialization() {
    let import = Document::parse_html(PAGE);
    let app = import.select_first("#app").unwrap().expect("#app");
    let doc = import.into_document();

    let _wm = Watermark::mount(&doc, app, WatermarkConfig::text(["Internal"]), common::engine())
        .await
        .unwrap();
    let html = doc.to_html();
    assert!(html.starts_with("<!DOCTYPE html><html><head><title>Report</title>"));

    let reparsed = Document::parse_html(&html);
    let main = reparsed.select_first("main").unwrap().unwrap();
    let overlay = reparsed
        .select_first("#app > div")
        .unwrap()
        .expect("overlay survives the round trip");
    let doc2 = reparsed.document();
    assert_eq!(doc2.style_property(main, "margin").as_deref(), Some("0"));
    assert_eq!(doc2.style_property(main, "position").as_deref(), Some("relative"));
    assert_eq!(doc2.style_property(overlay, "pointer-events").as_deref(), Some("none"));
    assert!(doc2
        .style_property(overlay, "background-image")
        .unwrap()
        .contains("data:image/png;base64,"));
    // overlay goes last, after the existing content
    assert_eq!(doc2.children(main).last(), Some(&overlay));
}

#[test]
fn cli_apply_writes_watermarked_html() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("page.html");
    let output = dir.path().join("out.html");
    std::fs::write(&input, PAGE).unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_rfwatermark"))
        .arg("--boxes")
        .arg("apply")
        .arg(&input)
        .args(["--selector", "#app", "-t", "Internal", "-t", "Copy 7", "--gap", "40"])
        .arg("-o")
        .arg(&output)
        .status()
        .expect("run rfwatermark");
    assert!(status.success());

    let html = std::fs::read_to_string(&output).unwrap();
    let import = Document::parse_html(&html);
    let overlay = import.select_first("#app > div").unwrap().expect("overlay");
    let size = import
        .document()
        .style_property(overlay, "background-size")
        .unwrap();
    let period: f64 = size.split("px").next().unwrap().parse().unwrap();
    assert!(period > 40.0, "tile period {} must include the gap", size);
}

#[test]
fn cli_tile_writes_png() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("wm.json");
    let output = dir.path().join("tile.png");
    std::fs::write(&config, r#"{"content": ["From", "config"], "rotate": 0}"#).unwrap();

    let out = Command::new(env!("CARGO_BIN_EXE_rfwatermark"))
        .args(["--boxes", "--dpr", "2", "tile", "-c"])
        .arg(&config)
        .arg("-o")
        .arg(&output)
        .output()
        .expect("run rfwatermark");
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let png = std::fs::read(&output).unwrap();
    let pm = tiny_skia::Pixmap::decode_png(&png).unwrap();
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains(&format!("surface {}x{} px", pm.width(), pm.height())));
}

#[test]
fn cli_reports_missing_container() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("page.html");
    std::fs::write(&input, PAGE).unwrap();
    let out = Command::new(env!("CARGO_BIN_EXE_rfwatermark"))
        .args(["--boxes", "apply"])
        .arg(&input)
        .args(["--selector", "#nope"])
        .output()
        .expect("run rfwatermark");
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("no element matches"));
}
