//! # nearby-rs: Proximity Discovery & Map Synchronization
//!
//! Turns a user's position into a filtered, ranked set of nearby entities
//! (neighbors or service providers) and keeps a map's marker set in
//! lockstep with that set.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `MapRenderer` and `GeolocationSource` are the contracts
//!    with the outside world; the engine never touches a global map.
//! 2. **Clean DTOs**: `GeoPoint`, `Entity`, `FilterState` cross all boundaries
//! 3. **Pure core**: synthesis, distance, and filtering are synchronous
//!    functions that are safe to re-run on every filter change
//! 4. **Minimal churn**: markers are reconciled by set difference, never
//!    cleared and rebuilt
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nearby_rs::{DiscoveryConfig, DiscoverySession, FilterState, LocationProvider};
//! use nearby_rs::location::StaticGeolocation;
//! use nearby_rs::map::RecordingRenderer;
//!
//! # async fn example() -> nearby_rs::Result<()> {
//! let config = DiscoveryConfig::default();
//! let mut session = DiscoverySession::new(config.clone())?;
//! session.attach_map(RecordingRenderer::new(), "map");
//!
//! let provider = LocationProvider::from_config(StaticGeolocation::delhi(), &config);
//! if let Some(resolution) = provider.resolve_guarded(session.liveness()).await {
//!     session.apply_center(resolution, &mut rand::thread_rng())?;
//! }
//!
//! session.set_filter(FilterState::default().with_radius(1.5)?)?;
//! for row in session.list_rows() {
//!     println!("{}: {}", row.name, row.distance_label);
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod distance;
pub mod synth;
pub mod filter;
pub mod location;
pub mod map;
pub mod selection;
pub mod config;
pub mod session;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    GeoPoint, Entity, EntityId, Category, Value, AttributeMap,
};

// ============================================================================
// Re-exports: Pipeline stages
// ============================================================================

pub use synth::{CandidateSource, EntityTemplate, RandomSource};
pub use filter::{
    FilterEngine, FilterState, CategoryFilter, SearchField, SortKey,
    FilterCell, FilterSnapshot, Generation,
};
pub use location::{
    LocationProvider, GeolocationSource, CenterResolution, CenterOrigin,
    LocationError, LocationStatus, Liveness,
};
pub use map::{MapRenderer, MapSyncManager, MarkerRecord, MarkerState, MarkerStyle, ReconcileOutcome};
pub use selection::{SelectionCoordinator, SelectionReader, SelectionChange, SelectionSource};
pub use config::DiscoveryConfig;
pub use session::{DiscoverySession, ListRow};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    #[error("Invalid radius: {0} km (must be finite and > 0)")]
    InvalidRadius(f64),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Map initialization failed: {0}")]
    MapInitialization(String),

    #[error("Map error: {0}")]
    Map(String),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
