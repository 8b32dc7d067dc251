//! Mutation observers with batched delivery.
//!
//! Records are queued per observer while the document is mutated and are
//! handed to callbacks only when the host calls
//! [`Document::flush_mutations`](super::Document::flush_mutations), one
//! callback per observer with the whole batch.

use super::{Document, NodeId};
use std::sync::Arc;

/// Callback invoked with one batch of records
pub type MutationCallback = Arc<dyn Fn(&[MutationRecord]) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub(crate) u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    ChildList {
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
    },
    Attributes {
        name: String,
        old_value: Option<String>,
    },
}

/// A single change to the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    /// Node whose child list or attributes changed
    pub target: NodeId,
    pub kind: MutationKind,
}

impl MutationRecord {
    pub fn removed_nodes(&self) -> &[NodeId] {
        match &self.kind {
            MutationKind::ChildList { removed, .. } => removed,
            MutationKind::Attributes { .. } => &[],
        }
    }

    pub fn added_nodes(&self) -> &[NodeId] {
        match &self.kind {
            MutationKind::ChildList { added, .. } => added,
            MutationKind::Attributes { .. } => &[],
        }
    }

    pub fn is_attribute_change(&self) -> bool {
        matches!(self.kind, MutationKind::Attributes { .. })
    }
}

/// Which mutations an observer is interested in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObserveOptions {
    pub child_list: bool,
    pub attributes: bool,
    /// Also watch every descendant of the target
    pub subtree: bool,
}

impl ObserveOptions {
    /// Child list and attribute changes anywhere under the target.
    pub fn everything() -> Self {
        Self {
            child_list: true,
            attributes: true,
            subtree: true,
        }
    }

    pub(crate) fn wants(&self, kind: &MutationKind) -> bool {
        match kind {
            MutationKind::ChildList { .. } => self.child_list,
            MutationKind::Attributes { .. } => self.attributes,
        }
    }
}

/// Observes a subtree of a [`Document`].
///
/// Dropping the observer disconnects it.
pub struct MutationObserver {
    document: Document,
    id: ObserverId,
    callback: MutationCallback,
}

impl std::fmt::Debug for MutationObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationObserver").field("id", &self.id).finish()
    }
}

impl MutationObserver {
    pub fn new<F>(document: &Document, callback: F) -> Self
    where
        F: Fn(&[MutationRecord]) + Send + Sync + 'static,
    {
        let id = document.tree().allocate_observer();
        Self {
            document: document.clone(),
            id,
            callback: Arc::new(callback),
        }
    }

    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Start observing `target`. Observing the same target again replaces
    /// its options.
    pub fn observe(&self, target: NodeId, options: ObserveOptions) {
        self.document
            .tree()
            .register_observer(self.id, target, options, self.callback.clone());
    }

    /// Stop observing everything and drop any records not yet delivered.
    pub fn disconnect(&self) {
        self.document.tree().unregister_observer(self.id);
    }

    /// Remove and return records queued for this observer.
    pub fn take_records(&self) -> Vec<MutationRecord> {
        self.document.tree().take_records(self.id)
    }

    pub fn is_observing(&self) -> bool {
        self.document.tree().is_registered(self.id)
    }
}

impl Drop for MutationObserver {
    fn drop(&mut self) {
        self.disconnect();
    }
}
