//! The watermark engine facade.
//!
//! [`Watermark`] is a cheap handle to a driver task that owns the
//! rasterizer, the compositor and the integrity guard. Every operation is a
//! command processed in FIFO order by that task, so concurrent updates land
//! last-write-wins on the single overlay surface.

use crate::dom::{Document, NodeId};
use crate::guard::{GuardState, IntegrityGuard};
use crate::options::{resolve, ResolvedConfig, WatermarkConfig};
use crate::overlay::Compositor;
use crate::rendering::Rasterizer;
use crate::{EngineConfig, Error, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};

enum Command {
    Update(WatermarkConfig, oneshot::Sender<Result<()>>),
    /// Sent by the guard after tampering
    Regenerate,
    Settle(oneshot::Sender<()>),
    Destroy(oneshot::Sender<Result<()>>),
}

/// Counters describing the work an engine has done
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Completed draw passes, including the initial one
    pub draws: u64,
    /// Draw passes caused by tampering
    pub regenerations: u64,
}

#[derive(Debug)]
struct Status {
    alive: bool,
    surface: Option<NodeId>,
    resolved: ResolvedConfig,
    guard: GuardState,
    stats: Stats,
}

/// A watermark mounted on a container of a [`Document`].
///
/// Cloning yields another handle to the same engine. Dropping every handle
/// tears the watermark down as [`Watermark::destroy`] would.
///
/// # Examples
///
/// ```
/// use rfwatermark::{Document, EngineConfig, TextBackend, Watermark, WatermarkConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> rfwatermark::Result<()> {
/// let doc = Document::new();
/// let engine = EngineConfig {
///     text_backend: TextBackend::Boxes,
///     ..Default::default()
/// };
/// let wm = Watermark::mount_on_body(&doc, WatermarkConfig::text(["Internal"]), engine).await?;
///
/// let surface = wm.surface().expect("mounted");
/// assert_eq!(doc.parent(surface), Some(doc.body()));
///
/// wm.destroy().await?;
/// assert!(!doc.is_connected(surface));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Watermark {
    cmd_tx: mpsc::UnboundedSender<Command>,
    status: Arc<Mutex<Status>>,
}

impl std::fmt::Debug for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status();
        f.debug_struct("Watermark")
            .field("alive", &status.alive)
            .field("surface", &status.surface)
            .field("stats", &status.stats)
            .finish()
    }
}

impl Watermark {
    /// Mount a watermark on `container` and draw it once.
    ///
    /// A container that is not an element is replaced by the document body.
    /// Must be called from within a tokio runtime.
    pub async fn mount(
        document: &Document,
        container: NodeId,
        config: WatermarkConfig,
        engine: EngineConfig,
    ) -> Result<Self> {
        let container = if document.tag_name(container).is_some() {
            container
        } else {
            log::warn!(
                "watermark container {:?} is not an element, using the document body",
                container
            );
            let body = document.body();
            if document.tag_name(body).is_none() {
                return Err(Error::ConfigError(
                    "document has no element to attach a watermark to".into(),
                ));
            }
            body
        };

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        let status = Arc::new(Mutex::new(Status {
            alive: true,
            surface: None,
            resolved: resolve(&config),
            guard: GuardState::Idle,
            stats: Stats::default(),
        }));

        let driver = Driver {
            document: document.clone(),
            container,
            config,
            rasterizer: engine.rasterizer(),
            compositor: Compositor::new(document, container),
            guard: IntegrityGuard::new(document),
            status: status.clone(),
            regenerate_tx: cmd_tx.downgrade(),
            alive: true,
        };

        let (init_tx, init_rx) = oneshot::channel();
        tokio::spawn(driver.run(cmd_rx, init_tx));

        // Wait for the driver to report the outcome of the initial draw
        init_rx
            .await
            .map_err(|e| Error::Other(format!("watermark driver stopped during mount: {}", e)))??;

        Ok(Self { cmd_tx, status })
    }

    /// Mount on the document body.
    pub async fn mount_on_body(
        document: &Document,
        config: WatermarkConfig,
        engine: EngineConfig,
    ) -> Result<Self> {
        Self::mount(document, document.body(), config, engine).await
    }

    fn status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Merge `patch` over the current configuration and redraw.
    ///
    /// `fontStyle` merges field by field; `content`, `gap` and `offset`
    /// are replaced wholesale. A no-op once the engine is destroyed.
    pub async fn update(&self, patch: WatermarkConfig) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Update(patch, tx)).is_err() {
            return Ok(());
        }
        rx.await.unwrap_or(Ok(()))
    }

    /// Same as [`Watermark::update`].
    pub async fn generate_watermark(&self, patch: WatermarkConfig) -> Result<()> {
        self.update(patch).await
    }

    /// Remove the overlay and stop guarding it. Safe to call repeatedly.
    pub async fn destroy(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Destroy(tx)).is_err() {
            return Ok(());
        }
        rx.await.unwrap_or(Ok(()))
    }

    /// Same as [`Watermark::destroy`].
    pub async fn destory(&self) -> Result<()> {
        self.destroy().await
    }

    /// Wait until every command queued so far has been processed, including
    /// regenerations triggered by mutations already flushed with
    /// [`Document::flush_mutations`].
    pub async fn settle(&self) {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Settle(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Current overlay surface, `None` once destroyed
    pub fn surface(&self) -> Option<NodeId> {
        self.status().surface
    }

    /// Configuration of the last completed draw
    pub fn resolved(&self) -> ResolvedConfig {
        self.status().resolved.clone()
    }

    pub fn guard_state(&self) -> GuardState {
        self.status().guard
    }

    pub fn stats(&self) -> Stats {
        self.status().stats
    }

    pub fn is_active(&self) -> bool {
        self.status().alive
    }
}

/// Owns the pipeline and processes commands one at a time.
struct Driver {
    document: Document,
    container: NodeId,
    /// Merged user configuration
    config: WatermarkConfig,
    rasterizer: Rasterizer,
    compositor: Compositor,
    guard: IntegrityGuard,
    status: Arc<Mutex<Status>>,
    /// Weak so the guard's callback alone does not keep the driver alive
    regenerate_tx: mpsc::WeakUnboundedSender<Command>,
    alive: bool,
}

impl Driver {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        init_tx: oneshot::Sender<Result<()>>,
    ) {
        let init = self.draw().await;
        let failed = init.is_err();
        let _ = init_tx.send(init);
        if failed {
            if let Err(e) = self.teardown() {
                log::warn!("cleanup after failed watermark mount: {}", e);
            }
            return;
        }

        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                Command::Update(patch, resp) => {
                    let res = if self.alive {
                        self.config.merge(patch);
                        self.draw().await
                    } else {
                        Ok(())
                    };
                    let _ = resp.send(res);
                }
                Command::Regenerate => self.regenerate().await,
                Command::Settle(resp) => {
                    let _ = resp.send(());
                }
                Command::Destroy(resp) => {
                    let res = self.teardown();
                    let _ = resp.send(res);
                    break;
                }
            }
        }

        // every handle dropped, or destroyed above
        if self.alive {
            log::debug!("all watermark handles dropped, tearing down");
            let _ = self.teardown();
        }
    }

    /// Resolve, rasterize and composite, then (re)arm the guard.
    async fn draw(&mut self) -> Result<()> {
        let resolved = resolve(&self.config);
        let tile = self.rasterizer.rasterize(&resolved).await?;

        let compositor = &mut self.compositor;
        let surface = self.guard.unobserved(|| compositor.mount(&tile, &resolved))?;

        let tx = self.regenerate_tx.clone();
        self.guard.protect(self.container, surface, move || {
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::Regenerate);
            }
        });

        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        status.surface = Some(surface);
        status.resolved = resolved;
        status.guard = self.guard.state();
        status.stats.draws += 1;
        log::debug!(
            "watermark drawn on {:?} ({}x{} tile, draw #{})",
            self.container,
            tile.width,
            tile.height,
            status.stats.draws
        );
        Ok(())
    }

    /// Replace a tampered surface with a fresh one.
    async fn regenerate(&mut self) {
        if !self.alive {
            return;
        }
        log::debug!("regenerating tampered watermark");

        // an attribute-tampered surface is still attached; drop it first
        let compositor = &mut self.compositor;
        if let Err(e) = self.guard.unobserved(|| compositor.unmount()) {
            log::warn!("failed to remove tampered overlay surface: {}", e);
        }

        if let Err(e) = self.draw().await {
            log::warn!("watermark regeneration failed: {}", e);
        }
        self.guard.rearm();

        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        status.stats.regenerations += 1;
        status.guard = self.guard.state();
        status.surface = self.compositor.surface();
    }

    fn teardown(&mut self) -> Result<()> {
        if !self.alive {
            return Ok(());
        }
        self.alive = false;
        self.guard.dispose();
        let res = self.compositor.unmount();

        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        status.alive = false;
        status.surface = None;
        status.guard = GuardState::Idle;
        log::debug!("watermark on {:?} destroyed", self.container);
        res
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("document", &self.document)
            .field("container", &self.container)
            .field("alive", &self.alive)
            .finish()
    }
}
