//! # Discovery Session
//!
//! One mounted discovery view: the candidate pool, the current filter
//! snapshot, the selection, and (optionally) a map.
//!
//! ```text
//!   CenterResolution ──→ apply_center ──→ candidates
//!                                             │
//!   FilterState ──────→ set_filter ──→ FilterEngine::apply ──→ filtered
//!                                                                 │
//!   list click ──→ select_from_list ─┐                            ▼
//!   map click ───→ pump_map_events ──┴──→ SelectionCoordinator ──→ MapSyncManager
//! ```
//!
//! The list never depends on the map. A map that fails to initialize, or a
//! renderer call that fails later, is recorded in [`DiscoverySession::map_error`]
//! and the list keeps working.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::distance::format_distance;
use crate::filter::{FilterCell, FilterEngine, FilterState, Generation};
use crate::location::{CenterResolution, Liveness};
use crate::map::{BoxedRenderer, MapRenderer, MapSyncManager, MarkerClicks};
use crate::model::{Entity, EntityId};
use crate::selection::{SelectionChange, SelectionCoordinator, SelectionReader};
use crate::synth::RandomSource;
use crate::{Error, Result};

/// One row of the list view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListRow {
    pub id: EntityId,
    pub name: String,
    pub category_label: &'static str,
    pub distance_label: String,
    pub selected: bool,
}

pub struct DiscoverySession {
    config: DiscoveryConfig,
    engine: FilterEngine,
    filters: FilterCell,
    center: Option<CenterResolution>,
    candidates: Vec<Entity>,
    filtered: Vec<Entity>,
    selection: SelectionCoordinator,
    map: Option<MapSyncManager<BoxedRenderer>>,
    map_error: Option<Error>,
    clicks: MarkerClicks,
    liveness: Liveness,
    scroll_target: Option<EntityId>,
}

impl DiscoverySession {
    pub fn new(config: DiscoveryConfig) -> Result<Self> {
        config.validate()?;
        let filters = FilterCell::new(config.default_filter()?);
        Ok(Self {
            engine: config.filter_engine(),
            config,
            filters,
            center: None,
            candidates: Vec::new(),
            filtered: Vec::new(),
            selection: SelectionCoordinator::new(),
            map: None,
            map_error: None,
            clicks: MarkerClicks::new(),
            liveness: Liveness::new(),
            scroll_target: None,
        })
    }

    // ========================================================================
    // Map attachment
    // ========================================================================

    /// Create the map in `container`. Returns false (and records the error)
    /// if the renderer could not create it; the list is unaffected.
    pub fn attach_map(&mut self, renderer: impl MapRenderer + 'static, container: &str) -> bool {
        if !self.liveness.is_alive() {
            debug!(container, "attach after teardown ignored");
            return false;
        }
        if let Some(mut old) = self.map.take() {
            let result = old.teardown();
            self.note_map(result);
        }

        let boxed: BoxedRenderer = Box::new(renderer);
        match MapSyncManager::initialize(boxed, container, &self.config, self.clicks.clone()) {
            Ok(map) => {
                self.map = Some(map);
                self.map_error = None;
            }
            Err(e) => {
                warn!(error = %e, "map unavailable; list view only");
                self.map_error = Some(e);
                return false;
            }
        }

        if let Some(resolution) = self.center.clone() {
            if let Some(map) = self.map.as_mut() {
                let result = map.center_on_user(&resolution);
                self.note_map(result);
            }
        }
        let generation = self.filters.snapshot().generation;
        self.reconcile_map(generation);
        true
    }

    pub fn map(&self) -> Option<&MapSyncManager<BoxedRenderer>> {
        self.map.as_ref()
    }

    /// Last map failure, if any.
    pub fn map_error(&self) -> Option<&Error> {
        self.map_error.as_ref()
    }

    fn note_map<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, "map update failed");
                self.map_error = Some(e);
                None
            }
        }
    }

    fn reconcile_map(&mut self, generation: Generation) {
        let selection = self.selection.active();
        if let Some(map) = self.map.as_mut() {
            let result = map.reconcile(generation, &self.filtered, selection.as_ref());
            self.note_map(result);
        }
    }

    // ========================================================================
    // Center
    // ========================================================================

    /// Hand for the location task; cleared at teardown.
    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    pub fn center(&self) -> Option<&CenterResolution> {
        self.center.as_ref()
    }

    /// True while showing results around the fallback center.
    pub fn is_location_approximate(&self) -> bool {
        self.center.as_ref().is_some_and(CenterResolution::is_degraded)
    }

    /// Adopt a resolved center and rebuild the candidate pool around it.
    ///
    /// The first resolution is always taken. After that only a device fix
    /// may replace a fallback center. Returns whether the center changed.
    pub fn apply_center(&mut self, resolution: CenterResolution, rng: &mut impl RandomSource) -> Result<bool> {
        if !self.liveness.is_alive() {
            debug!(center = %resolution.center, "center after teardown dropped");
            return Ok(false);
        }
        if let Some(current) = &self.center {
            if !(current.is_degraded() && !resolution.is_degraded()) {
                debug!(center = %resolution.center, "center already settled");
                return Ok(false);
            }
        }

        let candidates = self.config.source.build(resolution.center, rng)?;
        info!(
            center = %resolution.center,
            degraded = resolution.is_degraded(),
            candidates = candidates.len(),
            "center applied"
        );
        self.candidates = candidates;
        // regenerated ids name different entities now
        if self.center.is_some() && self.config.source.is_generated() {
            self.selection.reset();
            self.scroll_target = None;
        }

        if let Some(map) = self.map.as_mut() {
            let result = map.center_on_user(&resolution);
            self.note_map(result);
        }
        self.center = Some(resolution);

        let state = (*self.filters.snapshot().state).clone();
        self.publish(state);
        Ok(true)
    }

    /// "Recenter on me". False until a center is known or without a map.
    pub fn recenter_on_me(&mut self) -> bool {
        let Some(map) = self.map.as_mut() else {
            return false;
        };
        let result = map.recenter_on_me();
        self.note_map(result).unwrap_or(false)
    }

    // ========================================================================
    // Filtering
    // ========================================================================

    pub fn filter_state(&self) -> FilterState {
        (*self.filters.snapshot().state).clone()
    }

    /// Publish a new filter state and re-derive the filtered view.
    pub fn set_filter(&mut self, state: FilterState) -> Result<Generation> {
        if !self.liveness.is_alive() {
            return Err(Error::InvalidArgument("session torn down".into()));
        }
        Ok(self.publish(state))
    }

    /// Back to the configured defaults (the "no matches" escape hatch).
    pub fn reset_filters(&mut self) -> Result<Generation> {
        let state = self.config.default_filter()?;
        self.set_filter(state)
    }

    fn publish(&mut self, state: FilterState) -> Generation {
        let snapshot = self.filters.replace(state);
        self.filtered = self.engine.apply(&self.candidates, &snapshot.state);
        if self.selection.retain(&self.filtered) {
            self.scroll_target = None;
        }
        self.reconcile_map(snapshot.generation);
        snapshot.generation
    }

    pub fn candidates(&self) -> &[Entity] {
        &self.candidates
    }

    pub fn filtered(&self) -> &[Entity] {
        &self.filtered
    }

    /// The filtered set is empty although a center is known.
    pub fn is_empty_result(&self) -> bool {
        self.center.is_some() && self.filtered.is_empty()
    }

    pub fn list_rows(&self) -> Vec<ListRow> {
        let active = self.selection.active();
        self.filtered
            .iter()
            .map(|e| ListRow {
                id: e.id.clone(),
                name: e.name.clone(),
                category_label: e.category.label(),
                distance_label: format_distance(e.distance_from_center()),
                selected: active.as_ref() == Some(&e.id),
            })
            .collect()
    }

    // ========================================================================
    // Selection
    // ========================================================================

    pub fn selection(&self) -> SelectionReader {
        self.selection.reader()
    }

    /// Row the list should scroll into view.
    pub fn scroll_target(&self) -> Option<&EntityId> {
        self.scroll_target.as_ref()
    }

    pub fn select_from_list(&mut self, id: &EntityId) -> SelectionChange {
        let change = self.selection.select_from_list(id, &self.filtered);
        self.apply_selection(&change);
        change
    }

    /// Feed queued marker clicks into the selection. Returns the number of
    /// clicks processed.
    pub fn pump_map_events(&mut self) -> usize {
        let clicks = self.clicks.drain();
        if !self.liveness.is_alive() {
            return 0;
        }
        for id in &clicks {
            let change = self.selection.select_from_map(id, &self.filtered);
            self.apply_selection(&change);
        }
        clicks.len()
    }

    fn apply_selection(&mut self, change: &SelectionChange) {
        debug!(previous = ?change.previous, current = ?change.current, source = ?change.source, "selection");
        self.scroll_target = change.current.clone();

        let generation = self.filters.snapshot().generation;
        self.reconcile_map(generation);

        let Some(id) = &change.current else {
            return;
        };
        let Some(entity) = self.filtered.iter().find(|e| &e.id == id) else {
            return;
        };
        let Some(map) = self.map.as_mut() else {
            return;
        };
        let result = map.focus(entity);
        self.note_map(result);
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    pub fn is_torn_down(&self) -> bool {
        !self.liveness.is_alive()
    }

    /// Unmount the view. Late location results become no-ops, every marker
    /// is removed before the map is destroyed. Idempotent.
    pub fn teardown(&mut self) -> Result<()> {
        self.liveness.kill();
        self.clicks.drain();
        self.selection.reset();
        self.scroll_target = None;
        self.filtered.clear();
        info!(candidates = self.candidates.len(), "discovery session torn down");
        match self.map.take() {
            Some(mut map) => map.teardown(),
            None => Ok(()),
        }
    }
}

impl Drop for DiscoverySession {
    fn drop(&mut self) {
        self.liveness.kill();
    }
}
