//! Integrity guard: watches the container for tampering with the overlay
//! surface and asks for a regeneration when it happens.
//!
//! The guard reacts at most once until it is rearmed, so a batch holding
//! several related mutations yields a single tamper reaction. Writes the
//! engine makes itself go through [`IntegrityGuard::unobserved`], which
//! disconnects the observer for the duration of the write.

use crate::dom::{Document, MutationObserver, MutationRecord, NodeId, ObserveOptions};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// Not attached to any container
    Idle,
    /// Attached and ready to react
    Observing,
    /// A tamper reaction is pending; further matches are ignored
    Reacting,
}

#[derive(Debug)]
struct Shared {
    state: GuardState,
    surface: Option<NodeId>,
}

/// True if `record` removes `surface` or changes one of its attributes.
pub fn is_tamper(record: &MutationRecord, surface: NodeId) -> bool {
    record.removed_nodes().contains(&surface)
        || (record.is_attribute_change() && record.target == surface)
}

pub struct IntegrityGuard {
    document: Document,
    shared: Arc<Mutex<Shared>>,
    observer: Option<(MutationObserver, NodeId)>,
}

impl std::fmt::Debug for IntegrityGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityGuard")
            .field("state", &self.state())
            .field("surface", &self.surface())
            .finish()
    }
}

impl IntegrityGuard {
    pub fn new(document: &Document) -> Self {
        Self {
            document: document.clone(),
            shared: Arc::new(Mutex::new(Shared {
                state: GuardState::Idle,
                surface: None,
            })),
            observer: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> GuardState {
        self.lock().state
    }

    /// The surface being protected
    pub fn surface(&self) -> Option<NodeId> {
        self.lock().surface
    }

    /// Protect `surface` inside `container`, calling `on_tamper` once per
    /// tamper reaction.
    ///
    /// Protecting the same container again only swaps the tracked surface
    /// and keeps a pending reaction pending. A different container gets a
    /// fresh observer.
    pub fn protect<F>(&mut self, container: NodeId, surface: NodeId, on_tamper: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if !self.document.is_connected(container) {
            log::warn!(
                "watermark container {:?} is detached; tampering will go unnoticed",
                container
            );
        }

        {
            let mut shared = self.lock();
            shared.surface = Some(surface);
            if shared.state == GuardState::Idle {
                shared.state = GuardState::Observing;
            }
        }
        if matches!(&self.observer, Some((_, c)) if *c == container) {
            return;
        }

        let shared = self.shared.clone();
        let observer = MutationObserver::new(&self.document, move |records| {
            let mut s = shared.lock().unwrap_or_else(|e| e.into_inner());
            if s.state != GuardState::Observing {
                return;
            }
            let Some(surface) = s.surface else { return };
            if !records.iter().any(|r| is_tamper(r, surface)) {
                return;
            }
            s.state = GuardState::Reacting;
            drop(s);
            log::debug!(
                "overlay surface {:?} tampered with ({} record(s))",
                surface,
                records.len()
            );
            on_tamper();
        });
        observer.observe(container, ObserveOptions::everything());
        self.observer = Some((observer, container));
    }

    /// Run `write` with the observer disconnected so the guard never sees
    /// the engine's own mutations. Records queued but not yet delivered
    /// when the bracket opens are dropped.
    pub fn unobserved<T>(&mut self, write: impl FnOnce() -> T) -> T {
        let Some((observer, container)) = &self.observer else {
            return write();
        };
        observer.disconnect();
        let out = write();
        observer.observe(*container, ObserveOptions::everything());
        out
    }

    /// Leave the reacting state once a regeneration has been handled.
    pub fn rearm(&self) {
        let mut s = self.lock();
        if s.state == GuardState::Reacting {
            s.state = GuardState::Observing;
        }
    }

    /// Disconnect for good. No reaction happens after this returns.
    pub fn dispose(&mut self) {
        if let Some((observer, _)) = self.observer.take() {
            observer.disconnect();
        }
        let mut s = self.lock();
        s.state = GuardState::Idle;
        s.surface = None;
    }
}

impl Drop for IntegrityGuard {
    fn drop(&mut self) {
        self.dispose();
    }
}
