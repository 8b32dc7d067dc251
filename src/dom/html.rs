//! HTML import (via `scraper`) and serialization of a [`Document`].

use super::{Document, NodeId, NodeKind, Tree, ROOT};
use crate::{Error, Result};
use scraper::{Html, Selector};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// A document built from HTML markup, still able to answer CSS selector
/// queries against the source.
pub struct HtmlImport {
    document: Document,
    source: Html,
    /// Imported elements in document order, parallel to the source's
    /// element pre-order.
    elements: Vec<NodeId>,
}

impl std::fmt::Debug for HtmlImport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HtmlImport")
            .field("document", &self.document)
            .field("elements", &self.elements.len())
            .finish()
    }
}

impl HtmlImport {
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    /// Nodes matching `selector`, in document order.
    pub fn select(&self, selector: &str) -> Result<Vec<NodeId>> {
        let sel = Selector::parse(selector)
            .map_err(|e| Error::ConfigError(format!("invalid selector {:?}: {:?}", selector, e)))?;
        let matched: Vec<_> = self.source.select(&sel).map(|e| e.id()).collect();
        Ok(self
            .source
            .tree
            .root()
            .descendants()
            .filter(|n| n.value().is_element())
            .zip(self.elements.iter())
            .filter(|(n, _)| matched.contains(&n.id()))
            .map(|(_, id)| *id)
            .collect())
    }

    /// First node matching `selector`
    pub fn select_first(&self, selector: &str) -> Result<Option<NodeId>> {
        Ok(self.select(selector)?.into_iter().next())
    }
}

impl Document {
    /// Build a document from HTML markup.
    pub fn parse_html(markup: &str) -> HtmlImport {
        let source = Html::parse_document(markup);
        let mut tree = Tree::empty();
        let mut elements = Vec::new();

        let mut stack = vec![(source.tree.root(), ROOT)];
        while let Some((node, parent)) = stack.pop() {
            let kind = match node.value() {
                scraper::Node::Document | scraper::Node::Fragment => None,
                scraper::Node::Element(el) => Some(NodeKind::Element {
                    tag: el.name().to_ascii_lowercase(),
                    attrs: el
                        .attrs()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                }),
                scraper::Node::Text(t) => Some(NodeKind::Text((&**t).to_string())),
                _ => continue,
            };
            let id = match kind {
                Some(kind) => {
                    let is_element = matches!(kind, NodeKind::Element { .. });
                    let id = tree.push(kind);
                    tree.nodes[id.0].parent = Some(parent);
                    tree.nodes[parent.0].children.push(id);
                    if is_element {
                        elements.push(id);
                    }
                    id
                }
                None => parent,
            };
            // reversed so the leftmost child is visited first (pre-order)
            let children: Vec<_> = node.children().collect();
            for child in children.into_iter().rev() {
                stack.push((child, id));
            }
        }

        tree.body = find_tag(&tree, "body").unwrap_or(ROOT);
        HtmlImport {
            document: Document::from_tree(tree),
            source,
            elements,
        }
    }

    /// Serialize the whole document as HTML.
    pub fn to_html(&self) -> String {
        let tree = self.tree();
        let mut out = String::from("<!DOCTYPE html>");
        for child in &tree.nodes[ROOT.0].children {
            write_node(&tree, *child, &mut out);
        }
        out
    }

    /// Serialize one node and its subtree.
    pub fn outer_html(&self, node: NodeId) -> String {
        let tree = self.tree();
        let mut out = String::new();
        if tree.node(node).is_ok() {
            write_node(&tree, node, &mut out);
        }
        out
    }
}

fn find_tag(tree: &Tree, name: &str) -> Option<NodeId> {
    let mut stack = vec![ROOT];
    while let Some(id) = stack.pop() {
        let node = &tree.nodes[id.0];
        if let NodeKind::Element { tag, .. } = &node.kind {
            if tag == name {
                return Some(id);
            }
        }
        stack.extend(node.children.iter().rev().copied());
    }
    None
}

fn write_node(tree: &Tree, id: NodeId, out: &mut String) {
    let node = &tree.nodes[id.0];
    match &node.kind {
        NodeKind::Document => {
            for c in &node.children {
                write_node(tree, *c, out);
            }
        }
        NodeKind::Text(t) => {
            let raw = node
                .parent
                .and_then(|p| match &tree.nodes[p.0].kind {
                    NodeKind::Element { tag, .. } => Some(tag.as_str()),
                    _ => None,
                })
                .map_or(false, |tag| tag == "script" || tag == "style");
            if raw {
                out.push_str(t);
            } else {
                escape_into(t, false, out);
            }
        }
        NodeKind::Element { tag, attrs } => {
            out.push('<');
            out.push_str(tag);
            for (k, v) in attrs {
                out.push(' ');
                out.push_str(k);
                out.push_str("=\"");
                escape_into(v, true, out);
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&tag.as_str()) {
                return;
            }
            for c in &node.children {
                write_node(tree, *c, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}

fn escape_into(s: &str, attribute: bool, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' if attribute => out.push_str("&quot;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}
