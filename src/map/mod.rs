//! # Map Renderer Trait
//!
//! This is THE contract between the engine and whatever draws the map.
//! The engine treats the renderer as a sink/source of opaque handles; tiles,
//! projection and animation curves are the renderer's business.
//!
//! ## Implementations
//!
//! | Renderer | Module | Description |
//! |----------|--------|-------------|
//! | `RecordingRenderer` | `memory` | In-memory, records every call; tests and headless use |
//!
//! Exactly one owner: [`MapSyncManager`] holds the renderer and the map
//! handle. Nothing else creates or destroys marker handles.

pub mod memory;
pub mod sync;

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::model::{EntityId, GeoPoint};
use crate::Result;

pub use memory::RecordingRenderer;
pub use sync::{MapSyncManager, MarkerRecord, MarkerState, ReconcileOutcome, ReconcileStats};

// ============================================================================
// Handles & styles
// ============================================================================

/// Opaque map instance handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapHandle(pub u64);

/// Opaque marker handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarkerHandle(pub u64);

impl std::fmt::Display for MarkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "marker#{}", self.0)
    }
}

/// Visual style of a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerStyle {
    /// An entity marker in its resting state.
    Default,
    /// The active entity (highlighted, raised).
    Selected,
    /// The "you are here" dot.
    User,
}

/// Invoked by the renderer when a marker is clicked.
pub type ClickCallback = Arc<dyn Fn() + Send + Sync>;

// ============================================================================
// MapRenderer trait
// ============================================================================

/// The map collaborator.
///
/// Synchronous: every call completes before it returns. A renderer that
/// animates (`fly_to`) starts the animation and returns.
pub trait MapRenderer {
    /// Create a map inside the named container.
    fn create_map(&mut self, container: &str) -> Result<MapHandle>;

    /// Jump to a view without animation.
    fn set_view(&mut self, map: MapHandle, center: GeoPoint, zoom: u8) -> Result<()>;

    /// Animate to a view.
    fn fly_to(&mut self, map: MapHandle, point: GeoPoint, zoom: u8) -> Result<()>;

    fn add_marker(&mut self, map: MapHandle, point: GeoPoint, style: MarkerStyle) -> Result<MarkerHandle>;

    fn set_marker_style(&mut self, marker: MarkerHandle, style: MarkerStyle) -> Result<()>;

    /// Remove a marker from the map and release its handle.
    fn remove_marker(&mut self, marker: MarkerHandle) -> Result<()>;

    fn bind_click(&mut self, marker: MarkerHandle, callback: ClickCallback) -> Result<()>;

    fn open_popup(&mut self, marker: MarkerHandle, html: &str) -> Result<()>;

    /// Release the map. All markers must already be removed.
    fn destroy_map(&mut self, map: MapHandle) -> Result<()>;
}

impl<R: MapRenderer + ?Sized> MapRenderer for Box<R> {
    fn create_map(&mut self, container: &str) -> Result<MapHandle> {
        (**self).create_map(container)
    }

    fn set_view(&mut self, map: MapHandle, center: GeoPoint, zoom: u8) -> Result<()> {
        (**self).set_view(map, center, zoom)
    }

    fn fly_to(&mut self, map: MapHandle, point: GeoPoint, zoom: u8) -> Result<()> {
        (**self).fly_to(map, point, zoom)
    }

    fn add_marker(&mut self, map: MapHandle, point: GeoPoint, style: MarkerStyle) -> Result<MarkerHandle> {
        (**self).add_marker(map, point, style)
    }

    fn set_marker_style(&mut self, marker: MarkerHandle, style: MarkerStyle) -> Result<()> {
        (**self).set_marker_style(marker, style)
    }

    fn remove_marker(&mut self, marker: MarkerHandle) -> Result<()> {
        (**self).remove_marker(marker)
    }

    fn bind_click(&mut self, marker: MarkerHandle, callback: ClickCallback) -> Result<()> {
        (**self).bind_click(marker, callback)
    }

    fn open_popup(&mut self, marker: MarkerHandle, html: &str) -> Result<()> {
        (**self).open_popup(marker, html)
    }

    fn destroy_map(&mut self, map: MapHandle) -> Result<()> {
        (**self).destroy_map(map)
    }
}

/// Renderer as owned by a session.
pub type BoxedRenderer = Box<dyn MapRenderer>;

// ============================================================================
// MarkerClicks: map → selection bridge
// ============================================================================

/// Queue of entity ids clicked on the map, drained by the session into the
/// selection coordinator. Click callbacks only enqueue, so a click never
/// re-enters the manager while it is reconciling.
#[derive(Debug, Clone, Default)]
pub struct MarkerClicks {
    inner: Arc<Mutex<VecDeque<EntityId>>>,
}

impl MarkerClicks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, id: EntityId) {
        self.inner.lock().push_back(id);
    }

    pub fn drain(&self) -> Vec<EntityId> {
        self.inner.lock().drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Callback that enqueues `id`.
    pub(crate) fn callback_for(&self, id: EntityId) -> ClickCallback {
        let clicks = self.clone();
        Arc::new(move || clicks.push(id.clone()))
    }
}

// ============================================================================
// Popup markup
// ============================================================================

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Info popup for an entity marker.
pub fn popup_html(entity: &crate::model::Entity) -> String {
    format!(
        "<div class=\"marker-popup\"><strong>{}</strong><div>{}</div><div>{}</div></div>",
        escape_html(&entity.name),
        entity.category.label(),
        crate::distance::format_distance(entity.distance_from_center()),
    )
}
