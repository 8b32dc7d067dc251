//! Overlay compositor: owns the single surface element that carries the
//! tiled watermark background.

use crate::dom::{Document, NodeId};
use crate::options::ResolvedConfig;
use crate::rendering::Tile;
use crate::Result;

/// Tag of the overlay surface element
pub const SURFACE_TAG: &str = "div";

/// Inline style of the overlay surface for `tile` under `config`.
///
/// The surface is inset by the offset, ignores pointer events and repeats
/// the tile with a period of `gap + tile` anchored at its own origin.
pub fn surface_style(tile: &Tile, config: &ResolvedConfig) -> String {
    let [ox, oy] = config.offset;
    let [gx, gy] = config.gap;
    format!(
        "z-index: {}; position: absolute; left: {}px; top: {}px; \
         width: calc(100% - {}px); height: calc(100% - {}px); \
         pointer-events: none; background-repeat: repeat; background-position: 0 0; \
         background-size: {}px {}px; background-image: url('{}');",
        config.z_index,
        ox,
        oy,
        ox,
        oy,
        gx + tile.width,
        gy + tile.height,
        tile.image_data
    )
}

/// Creates, restyles and removes the overlay surface of one container.
#[derive(Debug)]
pub struct Compositor {
    document: Document,
    container: NodeId,
    surface: Option<NodeId>,
}

impl Compositor {
    pub fn new(document: &Document, container: NodeId) -> Self {
        Self {
            document: document.clone(),
            container,
            surface: None,
        }
    }

    pub fn container(&self) -> NodeId {
        self.container
    }

    /// The surface currently tracked, if any
    pub fn surface(&self) -> Option<NodeId> {
        self.surface
    }

    /// Paint `tile` onto the container.
    ///
    /// A tracked surface that is still a child of the container is restyled
    /// in place. Otherwise a fresh surface is appended as the container's
    /// last child, and a stale one is detached wherever it ended up.
    pub fn mount(&mut self, tile: &Tile, config: &ResolvedConfig) -> Result<NodeId> {
        let doc = &self.document;
        let style = surface_style(tile, config);

        let surface = match self.surface.take() {
            Some(s) if doc.parent(s) == Some(self.container) => {
                doc.set_attribute(s, "style", &style)?;
                s
            }
            stale => {
                if let Some(old) = stale.filter(|s| doc.exists(*s)) {
                    log::debug!("overlay surface {:?} left its container, replacing", old);
                    doc.release(old)?;
                }
                let s = doc.create_element(SURFACE_TAG);
                doc.set_attribute(s, "style", &style)?;
                doc.append_child(self.container, s)?;
                s
            }
        };
        self.surface = Some(surface);

        match doc.style_property(self.container, "position").as_deref() {
            None | Some("") | Some("static") => {
                doc.set_style_property(self.container, "position", "relative")?
            }
            Some(_) => {}
        }
        Ok(surface)
    }

    /// Detach and free the surface, and stop tracking it.
    pub fn unmount(&mut self) -> Result<()> {
        if let Some(s) = self.surface.take().filter(|s| self.document.exists(*s)) {
            self.document.release(s)?;
        }
        Ok(())
    }
}
