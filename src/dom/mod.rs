//! A small arena-backed document tree for the engine to attach overlays to.
//!
//! `Document` is a cheap, thread-safe handle; clones share the same tree.
//! Every structural or attribute change is reported to registered
//! [`MutationObserver`]s, batched until [`Document::flush_mutations`].

pub mod html;
pub mod mutation;

pub use html::HtmlImport;
pub use mutation::{MutationKind, MutationObserver, MutationRecord, ObserveOptions, ObserverId};

use crate::{Error, Result};
use mutation::MutationCallback;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Upper bound on delivery rounds in one flush; callbacks that keep
/// mutating observed nodes would otherwise spin forever.
const MAX_DELIVERY_ROUNDS: usize = 32;

/// Handle to a node of a [`Document`]
///
/// Slots of released nodes are reused; the generation tells a stale handle
/// apart from the node that took its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize, u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Document,
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    generation: u32,
    live: bool,
}

struct Registration {
    observer: ObserverId,
    target: NodeId,
    options: ObserveOptions,
}

struct Pending {
    callback: MutationCallback,
    records: Vec<MutationRecord>,
}

pub(crate) struct Tree {
    nodes: Vec<Node>,
    body: NodeId,
    registrations: Vec<Registration>,
    pending: BTreeMap<ObserverId, Pending>,
    next_observer: u64,
    /// Slots of released nodes, reused by `push`
    free: Vec<usize>,
}

const ROOT: NodeId = NodeId(0, 0);

impl Tree {
    fn empty() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
                generation: 0,
                live: true,
            }],
            body: ROOT,
            registrations: Vec::new(),
            pending: BTreeMap::new(),
            next_observer: 1,
            free: Vec::new(),
        }
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        if let Some(index) = self.free.pop() {
            let node = &mut self.nodes[index];
            node.kind = kind;
            node.live = true;
            return NodeId(index, node.generation);
        }
        let id = NodeId(self.nodes.len(), 0);
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
            generation: 0,
            live: true,
        });
        id
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.0)
            .filter(|n| n.live && n.generation == id.1)
            .ok_or_else(|| Error::DomError(format!("unknown node {}", id.0)))
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut Vec<(String, String)>> {
        self.node(id)?;
        match self.nodes.get_mut(id.0).map(|n| &mut n.kind) {
            Some(NodeKind::Element { attrs, .. }) => Ok(attrs),
            Some(_) => Err(Error::DomError(format!("node {} is not an element", id.0))),
            None => Err(Error::DomError(format!("unknown node {}", id.0))),
        }
    }

    /// True when `ancestor` is `node` or one of its ancestors.
    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(id) = cur {
            if id == ancestor {
                return true;
            }
            cur = self.node(id).ok().and_then(|n| n.parent);
        }
        false
    }

    fn detach(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.nodes[child.0].parent.take()?;
        self.nodes[parent.0].children.retain(|c| *c != child);
        Some(parent)
    }

    /// Free `id` and its descendants. The node must already be detached.
    fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let node = &mut self.nodes[id.0];
            stack.append(&mut node.children);
            node.kind = NodeKind::Text(String::new());
            node.parent = None;
            node.live = false;
            node.generation = node.generation.wrapping_add(1);
            self.free.push(id.0);
            self.registrations.retain(|r| r.target != id);
        }
    }

    fn queue(&mut self, record: MutationRecord) {
        let mut interested: Vec<ObserverId> = Vec::new();
        for reg in &self.registrations {
            if interested.contains(&reg.observer) || !reg.options.wants(&record.kind) {
                continue;
            }
            let in_scope = if reg.options.subtree {
                self.is_inclusive_ancestor(reg.target, record.target)
            } else {
                reg.target == record.target
            };
            if in_scope {
                interested.push(reg.observer);
            }
        }
        for id in interested {
            if let Some(p) = self.pending.get_mut(&id) {
                p.records.push(record.clone());
            }
        }
    }

    pub(crate) fn allocate_observer(&mut self) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        id
    }

    pub(crate) fn register_observer(
        &mut self,
        observer: ObserverId,
        target: NodeId,
        options: ObserveOptions,
        callback: MutationCallback,
    ) {
        self.registrations
            .retain(|r| !(r.observer == observer && r.target == target));
        self.registrations.push(Registration {
            observer,
            target,
            options,
        });
        self.pending.entry(observer).or_insert_with(|| Pending {
            callback,
            records: Vec::new(),
        });
    }

    pub(crate) fn unregister_observer(&mut self, observer: ObserverId) {
        self.registrations.retain(|r| r.observer != observer);
        self.pending.remove(&observer);
    }

    pub(crate) fn is_registered(&self, observer: ObserverId) -> bool {
        self.registrations.iter().any(|r| r.observer == observer)
    }

    pub(crate) fn take_records(&mut self, observer: ObserverId) -> Vec<MutationRecord> {
        self.pending
            .get_mut(&observer)
            .map(|p| std::mem::take(&mut p.records))
            .unwrap_or_default()
    }
}

/// Shared handle to a document tree.
#[derive(Clone)]
pub struct Document {
    inner: Arc<Mutex<Tree>>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.node_count())
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// A blank document: `<html><head></head><body></body></html>`.
    pub fn new() -> Self {
        let mut tree = Tree::empty();
        let html = tree.push(NodeKind::Element {
            tag: "html".into(),
            attrs: Vec::new(),
        });
        let head = tree.push(NodeKind::Element {
            tag: "head".into(),
            attrs: Vec::new(),
        });
        let body = tree.push(NodeKind::Element {
            tag: "body".into(),
            attrs: Vec::new(),
        });
        for (parent, child) in [(ROOT, html), (html, head), (html, body)] {
            tree.nodes[child.0].parent = Some(parent);
            tree.nodes[parent.0].children.push(child);
        }
        tree.body = body;
        Self::from_tree(tree)
    }

    fn from_tree(tree: Tree) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tree)),
        }
    }

    pub(crate) fn tree(&self) -> MutexGuard<'_, Tree> {
        // A panicking observer callback must not wedge the document.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The document node itself
    pub fn root(&self) -> NodeId {
        ROOT
    }

    /// The `<body>` element, or the document node if there is none
    pub fn body(&self) -> NodeId {
        self.tree().body
    }

    pub fn create_element(&self, tag: &str) -> NodeId {
        self.tree().push(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        })
    }

    pub fn create_text(&self, text: &str) -> NodeId {
        self.tree().push(NodeKind::Text(text.to_string()))
    }

    /// Append `child` as the last child of `parent`, moving it out of its
    /// current parent first.
    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<()> {
        let mut tree = self.tree();
        match tree.node(parent)?.kind {
            NodeKind::Text(_) => {
                return Err(Error::DomError(format!(
                    "text node {} cannot have children",
                    parent.0
                )))
            }
            NodeKind::Document | NodeKind::Element { .. } => {}
        }
        if let NodeKind::Document = tree.node(child)?.kind {
            return Err(Error::DomError("the document node cannot be appended".into()));
        }
        if tree.is_inclusive_ancestor(child, parent) {
            return Err(Error::DomError(format!(
                "node {} is an ancestor of {}",
                child.0, parent.0
            )));
        }

        if let Some(old_parent) = tree.detach(child) {
            tree.queue(MutationRecord {
                target: old_parent,
                kind: MutationKind::ChildList {
                    added: Vec::new(),
                    removed: vec![child],
                },
            });
        }
        tree.nodes[child.0].parent = Some(parent);
        tree.nodes[parent.0].children.push(child);
        tree.queue(MutationRecord {
            target: parent,
            kind: MutationKind::ChildList {
                added: vec![child],
                removed: Vec::new(),
            },
        });
        Ok(())
    }

    /// Detach `node` from its parent. Detached nodes are left as they are.
    pub fn remove(&self, node: NodeId) -> Result<()> {
        let mut tree = self.tree();
        tree.node(node)?;
        if let Some(parent) = tree.detach(node) {
            tree.queue(MutationRecord {
                target: parent,
                kind: MutationKind::ChildList {
                    added: Vec::new(),
                    removed: vec![node],
                },
            });
        }
        Ok(())
    }

    /// Detach `node` and free it together with its subtree. Handles to the
    /// freed nodes stop resolving, so this is for nodes nobody else holds.
    pub fn release(&self, node: NodeId) -> Result<()> {
        let mut tree = self.tree();
        tree.node(node)?;
        let body = tree.body;
        if tree.is_inclusive_ancestor(node, body) {
            return Err(Error::DomError(format!(
                "node {} holds the document body and cannot be released",
                node.0
            )));
        }
        if let Some(parent) = tree.detach(node) {
            tree.queue(MutationRecord {
                target: parent,
                kind: MutationKind::ChildList {
                    added: Vec::new(),
                    removed: vec![node],
                },
            });
        }
        tree.free_subtree(node);
        Ok(())
    }

    /// Number of live nodes, the document node included
    pub fn node_count(&self) -> usize {
        let tree = self.tree();
        tree.nodes.len() - tree.free.len()
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<()> {
        let mut tree = self.tree();
        let name = name.to_ascii_lowercase();
        let attrs = tree.element_mut(node)?;
        let old_value = match attrs.iter_mut().find(|(k, _)| *k == name) {
            Some((_, v)) => Some(std::mem::replace(v, value.to_string())),
            None => {
                attrs.push((name.clone(), value.to_string()));
                None
            }
        };
        tree.queue(MutationRecord {
            target: node,
            kind: MutationKind::Attributes { name, old_value },
        });
        Ok(())
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) -> Result<()> {
        let mut tree = self.tree();
        let name = name.to_ascii_lowercase();
        let attrs = tree.element_mut(node)?;
        let Some(pos) = attrs.iter().position(|(k, _)| *k == name) else {
            return Ok(());
        };
        let (_, old) = attrs.remove(pos);
        tree.queue(MutationRecord {
            target: node,
            kind: MutationKind::Attributes {
                name,
                old_value: Some(old),
            },
        });
        Ok(())
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        let tree = self.tree();
        match &tree.node(node).ok()?.kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone()),
            _ => None,
        }
    }

    /// Value of one declaration of the inline `style` attribute
    pub fn style_property(&self, node: NodeId, property: &str) -> Option<String> {
        let style = self.attribute(node, "style")?;
        parse_declarations(&style)
            .into_iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(property))
            .map(|(_, v)| v)
    }

    /// Set one declaration of the inline `style` attribute, keeping the rest.
    pub fn set_style_property(&self, node: NodeId, property: &str, value: &str) -> Result<()> {
        let mut decls = self
            .attribute(node, "style")
            .map(|s| parse_declarations(&s))
            .unwrap_or_default();
        match decls.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(property)) {
            Some((_, v)) => *v = value.to_string(),
            None => decls.push((property.to_ascii_lowercase(), value.to_string())),
        }
        let style = decls
            .iter()
            .map(|(k, v)| format!("{}: {};", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        self.set_attribute(node, "style", &style)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.tree().node(node).ok()?.parent
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.tree()
            .node(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn exists(&self, node: NodeId) -> bool {
        self.tree().node(node).is_ok()
    }

    /// Whether `node` is reachable from the document root
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.tree().is_inclusive_ancestor(ROOT, node)
    }

    /// Whether `node` is `ancestor` or lies under it
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.tree().is_inclusive_ancestor(ancestor, node)
    }

    /// Lowercase tag name, or `None` for text and document nodes
    pub fn tag_name(&self, node: NodeId) -> Option<String> {
        match &self.tree().node(node).ok()?.kind {
            NodeKind::Element { tag, .. } => Some(tag.clone()),
            _ => None,
        }
    }

    pub fn text_content(&self, node: NodeId) -> String {
        let tree = self.tree();
        let mut out = String::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            let Ok(n) = tree.node(id) else { continue };
            if let NodeKind::Text(t) = &n.kind {
                out.push_str(t);
            }
            stack.extend(n.children.iter().rev().copied());
        }
        out
    }

    /// Deliver all queued mutation records, one callback per observer per
    /// round. Returns the number of callbacks invoked.
    pub fn flush_mutations(&self) -> usize {
        let mut delivered = 0;
        for _ in 0..MAX_DELIVERY_ROUNDS {
            let batches: Vec<(MutationCallback, Vec<MutationRecord>)> = {
                let mut tree = self.tree();
                tree.pending
                    .values_mut()
                    .filter(|p| !p.records.is_empty())
                    .map(|p| (p.callback.clone(), std::mem::take(&mut p.records)))
                    .collect()
            };
            if batches.is_empty() {
                return delivered;
            }
            // Lock released: callbacks are free to touch the document.
            for (callback, records) in batches {
                callback(&records);
                delivered += 1;
            }
        }
        log::warn!(
            "mutation delivery did not settle after {} rounds",
            MAX_DELIVERY_ROUNDS
        );
        delivered
    }
}

/// Split an inline style into `(property, value)` pairs. Semicolons inside
/// parentheses or quotes (e.g. `url(data:image/png;base64,...)`) do not
/// end a declaration.
pub fn parse_declarations(style: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    let mut push = |decl: &str| {
        if let Some((k, v)) = decl.split_once(':') {
            let k = k.trim();
            if !k.is_empty() {
                out.push((k.to_ascii_lowercase(), v.trim().to_string()));
            }
        }
    };

    for (i, c) in style.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ';') if depth == 0 => {
                push(&style[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    push(&style[start..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_document_has_body_under_html() {
        let doc = Document::new();
        let body = doc.body();
        assert_eq!(doc.tag_name(body).as_deref(), Some("body"));
        assert!(doc.is_connected(body));
        let html = doc.parent(body).unwrap();
        assert_eq!(doc.tag_name(html).as_deref(), Some("html"));
        assert_eq!(doc.parent(html), Some(doc.root()));
    }

    #[test]
    fn append_moves_and_remove_detaches() {
        let doc = Document::new();
        let a = doc.create_element("div");
        let b = doc.create_element("span");
        doc.append_child(doc.body(), a).unwrap();
        doc.append_child(a, b).unwrap();
        assert!(doc.contains(a, b));

        doc.append_child(doc.body(), b).unwrap();
        assert_eq!(doc.children(doc.body()), vec![a, b]);
        assert!(doc.children(a).is_empty());

        doc.remove(a).unwrap();
        assert!(!doc.is_connected(a));
        assert_eq!(doc.parent(a), None);
    }

    #[test]
    fn append_rejects_cycles_and_text_parents() {
        let doc = Document::new();
        let a = doc.create_element("div");
        let b = doc.create_element("div");
        doc.append_child(a, b).unwrap();
        assert!(doc.append_child(b, a).is_err());

        let t = doc.create_text("hi");
        assert!(doc.append_child(t, a).is_err());
        assert!(doc.set_attribute(t, "id", "x").is_err());
    }

    #[test]
    fn style_properties_survive_data_urls() {
        let doc = Document::new();
        let div = doc.create_element("div");
        doc.set_attribute(
            div,
            "style",
            "background-image:url(data:image/png;base64,AAAA); z-index: 3",
        )
        .unwrap();
        assert_eq!(
            doc.style_property(div, "background-image").as_deref(),
            Some("url(data:image/png;base64,AAAA)")
        );
        doc.set_style_property(div, "position", "relative").unwrap();
        assert_eq!(doc.style_property(div, "z-index").as_deref(), Some("3"));
        assert_eq!(doc.style_property(div, "position").as_deref(), Some("relative"));
    }

    #[test]
    fn released_slots_are_reused_under_a_new_handle() {
        let doc = Document::new();
        let div = doc.create_element("div");
        let span = doc.create_element("span");
        doc.append_child(doc.body(), div).unwrap();
        doc.append_child(div, span).unwrap();
        doc.set_attribute(div, "style", "color: red").unwrap();
        let before = doc.node_count();

        doc.release(div).unwrap();
        assert_eq!(doc.node_count(), before - 2);
        assert!(!doc.exists(div) && !doc.exists(span));
        assert!(doc.children(doc.body()).is_empty());
        assert!(doc.set_attribute(div, "id", "x").is_err());

        let p = doc.create_element("p");
        assert_ne!(p, div);
        assert_ne!(p, span);
        assert!(p.index() == div.index() || p.index() == span.index());
        assert_eq!(doc.attribute(p, "style"), None);
        assert_eq!(doc.node_count(), before - 1);
    }

    #[test]
    fn body_and_its_ancestors_cannot_be_released() {
        let doc = Document::new();
        let body = doc.body();
        assert!(doc.release(body).is_err());
        assert!(doc.release(doc.root()).is_err());
        assert!(doc.release(doc.parent(body).unwrap()).is_err());
        assert!(doc.is_connected(body));
    }

    #[test]
    fn text_content_concatenates_in_order() {
        let doc = Document::new();
        let p = doc.create_element("p");
        let em = doc.create_element("em");
        doc.append_child(p, doc.create_text("a")).unwrap();
        doc.append_child(p, em).unwrap();
        doc.append_child(em, doc.create_text("b")).unwrap();
        doc.append_child(p, doc.create_text("c")).unwrap();
        assert_eq!(doc.text_content(p), "abc");
    }
}
