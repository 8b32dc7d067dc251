//! Shared helpers for integration tests

#![allow(dead_code)]

use rfwatermark::{Document, EngineConfig, NodeId, TextBackend};

/// Deterministic engine settings: box glyphs at a pixel ratio of 1.
pub fn engine() -> EngineConfig {
    EngineConfig {
        text_backend: TextBackend::Boxes,
        ..Default::default()
    }
}

/// A document with one `<div id="app">` under the body.
pub fn document_with_container() -> (Document, NodeId) {
    let doc = Document::new();
    let app = doc.create_element("div");
    doc.set_attribute(app, "id", "app").unwrap();
    doc.append_child(doc.body(), app).unwrap();
    doc.flush_mutations();
    (doc, app)
}

/// Overlay surfaces currently attached to `container`.
pub fn overlays(doc: &Document, container: NodeId) -> Vec<NodeId> {
    doc.children(container)
        .into_iter()
        .filter(|c| doc.style_property(*c, "pointer-events").as_deref() == Some("none"))
        .collect()
}
