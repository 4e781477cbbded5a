//! Marker reconciliation and viewport control.
//!
//! `MapSyncManager` owns the renderer, the map handle and every marker
//! handle. Each reconciliation makes the marker set match the filtered list
//! with the fewest renderer calls:
//!
//! ```text
//!   current ids ─┬─ only in current ──→ remove_marker      (→ Absent)
//!                ├─ in both, moved ───→ remove_marker, then add again
//!                ├─ in both ──────────→ restyle if selection changed
//!   target ids ──┴─ only in target ───→ add_marker + bind_click (→ Rendered)
//! ```
//!
//! A marker is keyed by entity id and placed at the entity's location; an
//! id that reappears at another point (a pool regenerated around a new
//! center) gets a fresh marker.
//!
//! The marker table only ever lists handles that are live on the map with a
//! click handler bound. A renderer error mid-pass leaves it that way, so the
//! next pass picks up where this one stopped.
//!
//! Per-marker states: `Absent → Rendered → (Selected ⇄ Rendered) → Absent`.
//! A new marker for the selected entity is created `Rendered` and then
//! restyled, so no transition skips a state.

use hashbrown::HashMap;
use tracing::{debug, info, warn};

use super::{MapHandle, MapRenderer, MarkerClicks, MarkerHandle, MarkerStyle, popup_html};
use crate::config::DiscoveryConfig;
use crate::filter::Generation;
use crate::location::CenterResolution;
use crate::model::{Entity, EntityId, GeoPoint};
use crate::{Error, Result};

/// Visible marker state. Absent markers have no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerState {
    Rendered,
    Selected,
}

impl MarkerState {
    fn style(self) -> MarkerStyle {
        match self {
            MarkerState::Rendered => MarkerStyle::Default,
            MarkerState::Selected => MarkerStyle::Selected,
        }
    }
}

/// A live marker backing one entity of the filtered set.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerRecord {
    pub entity_id: EntityId,
    pub handle: MarkerHandle,
    /// Where the marker sits on the map.
    pub point: GeoPoint,
    pub state: MarkerState,
}

impl MarkerRecord {
    pub fn is_selected(&self) -> bool {
        self.state == MarkerState::Selected
    }
}

/// Renderer work done by one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub created: usize,
    pub destroyed: usize,
    pub restyled: usize,
}

impl ReconcileStats {
    pub fn is_noop(&self) -> bool {
        *self == ReconcileStats::default()
    }
}

/// Result of a `reconcile` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied(ReconcileStats),
    /// A newer generation was already applied; nothing was touched.
    Stale,
}

#[derive(Debug, Clone, Copy)]
struct Zooms {
    user: u8,
    focus: u8,
}

/// Exclusive owner of the map viewport and its markers.
pub struct MapSyncManager<R: MapRenderer> {
    renderer: R,
    map: Option<MapHandle>,
    markers: HashMap<EntityId, MarkerRecord>,
    user_marker: Option<MarkerHandle>,
    user_point: Option<GeoPoint>,
    applied: Option<Generation>,
    clicks: MarkerClicks,
    zooms: Zooms,
}

impl<R: MapRenderer> MapSyncManager<R> {
    /// Create the map in `container` and show the configured overview.
    ///
    /// Failure is fatal to the map only; callers keep the list usable.
    pub fn initialize(
        mut renderer: R,
        container: &str,
        config: &DiscoveryConfig,
        clicks: MarkerClicks,
    ) -> Result<Self> {
        let map = renderer.create_map(container).map_err(|e| match e {
            Error::MapInitialization(msg) => Error::MapInitialization(msg),
            other => Error::MapInitialization(other.to_string()),
        })?;
        if let Err(e) = renderer.set_view(map, config.initial_view, config.initial_zoom) {
            if let Err(release) = renderer.destroy_map(map) {
                warn!(error = %release, "releasing half-initialized map failed");
            }
            return Err(Error::MapInitialization(e.to_string()));
        }
        info!(container, "map initialized");

        Ok(Self {
            renderer,
            map: Some(map),
            markers: HashMap::new(),
            user_marker: None,
            user_point: None,
            applied: None,
            clicks,
            zooms: Zooms { user: config.user_zoom, focus: config.focus_zoom },
        })
    }

    fn map(&self) -> Result<MapHandle> {
        self.map.ok_or_else(|| Error::Map("map already torn down".into()))
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Make the marker set match `filtered`, styled for `selection`.
    ///
    /// Idempotent: a second call with the same inputs does no renderer work.
    /// Passes for a generation older than the last applied one are dropped.
    pub fn reconcile(
        &mut self,
        generation: Generation,
        filtered: &[Entity],
        selection: Option<&EntityId>,
    ) -> Result<ReconcileOutcome> {
        if self.applied.is_some_and(|g| generation < g) {
            debug!(%generation, "stale reconciliation dropped");
            return Ok(ReconcileOutcome::Stale);
        }
        let map = self.map()?;
        let mut stats = ReconcileStats::default();

        let target: HashMap<&EntityId, &Entity> = filtered.iter().map(|e| (&e.id, e)).collect();

        let mut leaving: Vec<EntityId> = self
            .markers
            .values()
            .filter(|r| target.get(&r.entity_id).is_none_or(|e| e.location != r.point))
            .map(|r| r.entity_id.clone())
            .collect();
        leaving.sort();
        for id in leaving {
            let Some(handle) = self.markers.get(&id).map(|r| r.handle) else {
                continue;
            };
            self.renderer.remove_marker(handle)?;
            self.markers.remove(&id);
            stats.destroyed += 1;
        }

        for entity in filtered {
            if self.markers.contains_key(&entity.id) {
                continue;
            }
            let handle = self.renderer.add_marker(map, entity.location, MarkerStyle::Default)?;
            if let Err(e) = self
                .renderer
                .bind_click(handle, self.clicks.callback_for(entity.id.clone()))
            {
                if let Err(release) = self.renderer.remove_marker(handle) {
                    warn!(error = %release, %handle, "releasing unbound marker failed");
                }
                return Err(e);
            }
            self.markers.insert(
                entity.id.clone(),
                MarkerRecord {
                    entity_id: entity.id.clone(),
                    handle,
                    point: entity.location,
                    state: MarkerState::Rendered,
                },
            );
            stats.created += 1;
        }

        for entity in filtered {
            let wanted = if selection == Some(&entity.id) {
                MarkerState::Selected
            } else {
                MarkerState::Rendered
            };
            if let Some(record) = self.markers.get_mut(&entity.id) {
                if record.state != wanted {
                    self.renderer.set_marker_style(record.handle, wanted.style())?;
                    record.state = wanted;
                    stats.restyled += 1;
                }
            }
        }

        self.applied = Some(generation);
        debug!(
            %generation,
            created = stats.created,
            destroyed = stats.destroyed,
            restyled = stats.restyled,
            live = self.markers.len(),
            "reconciled markers"
        );
        Ok(ReconcileOutcome::Applied(stats))
    }

    // ========================================================================
    // Viewport
    // ========================================================================

    /// Fly to the resolved center. A device fix also gets a "you are here"
    /// marker; a replaced center moves it.
    pub fn center_on_user(&mut self, resolution: &CenterResolution) -> Result<()> {
        let map = self.map()?;
        self.user_point = Some(resolution.center);
        self.renderer.fly_to(map, resolution.center, self.zooms.user)?;

        if let Some(old) = self.user_marker.take() {
            self.renderer.remove_marker(old)?;
        }
        if !resolution.is_degraded() {
            let marker = self.renderer.add_marker(map, resolution.center, MarkerStyle::User)?;
            self.user_marker = Some(marker);
            self.renderer.open_popup(marker, "You are here")?;
        }
        Ok(())
    }

    /// "Recenter on me". No-op until a center is known.
    pub fn recenter_on_me(&mut self) -> Result<bool> {
        let map = self.map()?;
        match self.user_point {
            Some(point) => {
                self.renderer.fly_to(map, point, self.zooms.user)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Fly to an entity and open its popup. Returns false if the entity has
    /// no marker.
    pub fn focus(&mut self, entity: &Entity) -> Result<bool> {
        let map = self.map()?;
        let Some(record) = self.markers.get(&entity.id) else {
            return Ok(false);
        };
        let handle = record.handle;
        self.renderer.fly_to(map, entity.location, self.zooms.focus)?;
        self.renderer.open_popup(handle, &popup_html(entity))?;
        Ok(true)
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn marker(&self, id: &EntityId) -> Option<&MarkerRecord> {
        self.markers.get(id)
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn marker_state(&self, id: &EntityId) -> Option<MarkerState> {
        self.markers.get(id).map(|r| r.state)
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn is_torn_down(&self) -> bool {
        self.map.is_none()
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Destroy every marker, then the map. Idempotent.
    pub fn teardown(&mut self) -> Result<()> {
        let Some(map) = self.map else {
            return Ok(());
        };

        let mut first_err = None;
        let records: Vec<MarkerRecord> = self.markers.drain().map(|(_, r)| r).collect();
        let count = records.len();
        for record in records {
            if let Err(e) = self.renderer.remove_marker(record.handle) {
                first_err.get_or_insert(e);
            }
        }
        if let Some(user) = self.user_marker.take() {
            if let Err(e) = self.renderer.remove_marker(user) {
                first_err.get_or_insert(e);
            }
        }
        if let Err(e) = self.renderer.destroy_map(map) {
            first_err.get_or_insert(e);
        }
        self.map = None;
        self.user_point = None;
        info!(markers = count, "map torn down");

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<R: MapRenderer> Drop for MapSyncManager<R> {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!(error = %e, "map teardown on drop failed");
        }
    }
}
