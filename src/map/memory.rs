//! In-memory map renderer.
//!
//! This is the reference implementation of `MapRenderer`. Nothing is drawn;
//! every call is recorded and marker state is kept in a HashMap behind a
//! mutex. Clones share state, so a test can keep one clone for inspection
//! while the manager owns the other.
//!
//! Use this renderer for:
//! - Testing reconciliation and selection sync
//! - Headless sessions (list-only UIs that still want marker bookkeeping)

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{ClickCallback, MapHandle, MapRenderer, MarkerHandle, MarkerStyle};
use crate::model::GeoPoint;
use crate::{Error, Result};

/// One recorded renderer call.
#[derive(Debug, Clone, PartialEq)]
pub enum MapCall {
    CreateMap { container: String },
    SetView { center: GeoPoint, zoom: u8 },
    FlyTo { point: GeoPoint, zoom: u8 },
    AddMarker { marker: MarkerHandle, style: MarkerStyle },
    SetStyle { marker: MarkerHandle, style: MarkerStyle },
    RemoveMarker { marker: MarkerHandle },
    BindClick { marker: MarkerHandle },
    OpenPopup { marker: MarkerHandle },
    DestroyMap,
}

/// Renderer calls that can be made to fail once, for error-path tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    SetView,
    AddMarker,
    BindClick,
    RemoveMarker,
}

struct MarkerEntry {
    point: GeoPoint,
    style: MarkerStyle,
    popup: Option<String>,
    on_click: Option<ClickCallback>,
}

#[derive(Default)]
struct RecorderInner {
    map: Option<MapHandle>,
    destroyed: bool,
    fail_create: Option<String>,
    faults: HashMap<Fault, String>,
    viewport: Option<(GeoPoint, u8)>,
    markers: HashMap<MarkerHandle, MarkerEntry>,
    calls: Vec<MapCall>,
    next_marker: u64,
    created: usize,
    removed: usize,
}

/// Recording renderer. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct RecordingRenderer {
    inner: Arc<Mutex<RecorderInner>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A renderer whose `create_map` fails (container not mounted).
    pub fn failing(reason: impl Into<String>) -> Self {
        let r = Self::default();
        r.inner.lock().fail_create = Some(reason.into());
        r
    }

    /// Make the next `fault` call fail with `reason`. One-shot.
    pub fn fail_next(&self, fault: Fault, reason: impl Into<String>) {
        self.inner.lock().faults.insert(fault, reason.into());
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn calls(&self) -> Vec<MapCall> {
        self.inner.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    /// Markers ever created.
    pub fn created(&self) -> usize {
        self.inner.lock().created
    }

    /// Markers ever removed.
    pub fn removed(&self) -> usize {
        self.inner.lock().removed
    }

    /// Markers currently on the map.
    pub fn live_markers(&self) -> usize {
        self.inner.lock().markers.len()
    }

    pub fn style_of(&self, marker: MarkerHandle) -> Option<MarkerStyle> {
        self.inner.lock().markers.get(&marker).map(|m| m.style)
    }

    pub fn position_of(&self, marker: MarkerHandle) -> Option<GeoPoint> {
        self.inner.lock().markers.get(&marker).map(|m| m.point)
    }

    pub fn popup_of(&self, marker: MarkerHandle) -> Option<String> {
        self.inner.lock().markers.get(&marker).and_then(|m| m.popup.clone())
    }

    /// Last center and zoom set by `set_view` or `fly_to`.
    pub fn viewport(&self) -> Option<(GeoPoint, u8)> {
        self.inner.lock().viewport
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.lock().destroyed
    }

    /// Simulate a user click. Returns false if the marker has no handler.
    pub fn click(&self, marker: MarkerHandle) -> bool {
        let callback = self
            .inner
            .lock()
            .markers
            .get(&marker)
            .and_then(|m| m.on_click.clone());
        match callback {
            Some(cb) => {
                cb();
                true
            }
            None => false,
        }
    }
}

impl RecorderInner {
    fn check_fault(&mut self, fault: Fault) -> Result<()> {
        match self.faults.remove(&fault) {
            Some(reason) => Err(Error::Map(reason)),
            None => Ok(()),
        }
    }

    fn check_map(&self, map: MapHandle) -> Result<()> {
        match self.map {
            Some(m) if m == map && !self.destroyed => Ok(()),
            _ => Err(Error::Map(format!("unknown or destroyed map {}", map.0))),
        }
    }

    fn marker_mut(&mut self, marker: MarkerHandle) -> Result<&mut MarkerEntry> {
        self.markers
            .get_mut(&marker)
            .ok_or_else(|| Error::Map(format!("unknown {marker}")))
    }
}

impl MapRenderer for RecordingRenderer {
    fn create_map(&mut self, container: &str) -> Result<MapHandle> {
        let mut inner = self.inner.lock();
        if let Some(reason) = &inner.fail_create {
            return Err(Error::MapInitialization(reason.clone()));
        }
        if inner.map.is_some() && !inner.destroyed {
            return Err(Error::MapInitialization("map already created".into()));
        }
        let handle = MapHandle(1);
        inner.map = Some(handle);
        inner.destroyed = false;
        inner.calls.push(MapCall::CreateMap { container: container.to_owned() });
        Ok(handle)
    }

    fn set_view(&mut self, map: MapHandle, center: GeoPoint, zoom: u8) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_map(map)?;
        inner.check_fault(Fault::SetView)?;
        inner.viewport = Some((center, zoom));
        inner.calls.push(MapCall::SetView { center, zoom });
        Ok(())
    }

    fn fly_to(&mut self, map: MapHandle, point: GeoPoint, zoom: u8) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_map(map)?;
        inner.viewport = Some((point, zoom));
        inner.calls.push(MapCall::FlyTo { point, zoom });
        Ok(())
    }

    fn add_marker(&mut self, map: MapHandle, point: GeoPoint, style: MarkerStyle) -> Result<MarkerHandle> {
        let mut inner = self.inner.lock();
        inner.check_map(map)?;
        inner.check_fault(Fault::AddMarker)?;
        inner.next_marker += 1;
        let marker = MarkerHandle(inner.next_marker);
        inner.markers.insert(marker, MarkerEntry { point, style, popup: None, on_click: None });
        inner.created += 1;
        inner.calls.push(MapCall::AddMarker { marker, style });
        Ok(marker)
    }

    fn set_marker_style(&mut self, marker: MarkerHandle, style: MarkerStyle) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.marker_mut(marker)?.style = style;
        inner.calls.push(MapCall::SetStyle { marker, style });
        Ok(())
    }

    fn remove_marker(&mut self, marker: MarkerHandle) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_fault(Fault::RemoveMarker)?;
        if inner.markers.remove(&marker).is_none() {
            return Err(Error::Map(format!("unknown {marker}")));
        }
        inner.removed += 1;
        inner.calls.push(MapCall::RemoveMarker { marker });
        Ok(())
    }

    fn bind_click(&mut self, marker: MarkerHandle, callback: ClickCallback) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_fault(Fault::BindClick)?;
        inner.marker_mut(marker)?.on_click = Some(callback);
        inner.calls.push(MapCall::BindClick { marker });
        Ok(())
    }

    fn open_popup(&mut self, marker: MarkerHandle, html: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.marker_mut(marker)?.popup = Some(html.to_owned());
        inner.calls.push(MapCall::OpenPopup { marker });
        Ok(())
    }

    fn destroy_map(&mut self, map: MapHandle) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_map(map)?;
        if !inner.markers.is_empty() {
            return Err(Error::Map(format!(
                "destroying map with {} live markers",
                inner.markers.len()
            )));
        }
        inner.destroyed = true;
        inner.calls.push(MapCall::DestroyMap);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p() -> GeoPoint {
        GeoPoint::new(28.6, 77.2).unwrap()
    }

    #[test]
    fn test_marker_lifecycle_counts() {
        let mut r = RecordingRenderer::new();
        let view = r.clone();
        let map = r.create_map("map").unwrap();
        let m = r.add_marker(map, p(), MarkerStyle::Default).unwrap();
        r.set_marker_style(m, MarkerStyle::Selected).unwrap();
        assert_eq!(view.style_of(m), Some(MarkerStyle::Selected));
        r.remove_marker(m).unwrap();
        assert_eq!((view.created(), view.removed(), view.live_markers()), (1, 1, 0));
        assert!(r.remove_marker(m).is_err());
    }

    #[test]
    fn test_destroy_refuses_live_markers() {
        let mut r = RecordingRenderer::new();
        let map = r.create_map("map").unwrap();
        let m = r.add_marker(map, p(), MarkerStyle::Default).unwrap();
        assert!(r.destroy_map(map).is_err());
        r.remove_marker(m).unwrap();
        r.destroy_map(map).unwrap();
        assert!(r.is_destroyed());
        assert!(r.add_marker(map, p(), MarkerStyle::Default).is_err());
    }

    #[test]
    fn test_fault_fires_once() {
        let mut r = RecordingRenderer::new();
        let map = r.create_map("map").unwrap();
        r.fail_next(Fault::AddMarker, "transient");
        assert!(matches!(r.add_marker(map, p(), MarkerStyle::Default), Err(Error::Map(_))));
        assert!(r.add_marker(map, p(), MarkerStyle::Default).is_ok());
        assert_eq!(r.created(), 1);
    }

    #[test]
    fn test_failing_create() {
        let mut r = RecordingRenderer::failing("container not mounted");
        assert!(matches!(r.create_map("map"), Err(Error::MapInitialization(_))));
    }
}
