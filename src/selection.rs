//! Selection coordination between the list view and the map view.
//!
//! One cell holds the active entity id. The coordinator is its only writer;
//! list rows and map markers read it through [`SelectionReader`]s.
//! Selecting an id that is not in the current filtered set (a click that
//! raced a filter change) clears the selection and is otherwise a no-op.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::model::{Entity, EntityId};

/// Which view a selection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    List,
    Map,
}

/// What a selection call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionChange {
    pub previous: Option<EntityId>,
    pub current: Option<EntityId>,
    pub source: SelectionSource,
}

impl SelectionChange {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

#[derive(Debug, Default)]
struct SelectionState {
    active: Option<EntityId>,
}

/// Read-only view of the selection.
#[derive(Debug, Clone)]
pub struct SelectionReader {
    state: Arc<RwLock<SelectionState>>,
}

impl SelectionReader {
    pub fn active(&self) -> Option<EntityId> {
        self.state.read().active.clone()
    }

    pub fn is_active(&self, id: &EntityId) -> bool {
        self.state.read().active.as_ref() == Some(id)
    }
}

/// Sole writer of the selection state.
#[derive(Debug, Default)]
pub struct SelectionCoordinator {
    state: Arc<RwLock<SelectionState>>,
}

impl SelectionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reader(&self) -> SelectionReader {
        SelectionReader { state: Arc::clone(&self.state) }
    }

    pub fn active(&self) -> Option<EntityId> {
        self.state.read().active.clone()
    }

    pub fn select_from_list(&self, id: &EntityId, filtered: &[Entity]) -> SelectionChange {
        self.select(id, filtered, SelectionSource::List)
    }

    pub fn select_from_map(&self, id: &EntityId, filtered: &[Entity]) -> SelectionChange {
        self.select(id, filtered, SelectionSource::Map)
    }

    fn select(&self, id: &EntityId, filtered: &[Entity], source: SelectionSource) -> SelectionChange {
        let next = filtered.iter().any(|e| &e.id == id).then(|| id.clone());
        if next.is_none() {
            debug!(%id, ?source, "stale selection ignored");
        }
        let previous = std::mem::replace(&mut self.state.write().active, next.clone());
        SelectionChange { previous, current: next, source }
    }

    /// Drop the selection if the filtered set no longer contains it.
    pub fn retain(&self, filtered: &[Entity]) -> bool {
        let mut state = self.state.write();
        let stale = state
            .active
            .as_ref()
            .is_some_and(|id| !filtered.iter().any(|e| &e.id == id));
        if stale {
            if let Some(id) = state.active.take() {
                debug!(%id, "selection filtered out");
            }
        }
        stale
    }

    /// Clear at view teardown.
    pub fn reset(&self) {
        self.state.write().active = None;
    }
}
