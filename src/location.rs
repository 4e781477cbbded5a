//! # Location Provider
//!
//! Resolves the session's center point. The device is asked once; any
//! failure (denied, timed out, no API) degrades to a configured fallback
//! point instead of an error, and the degraded state is published on a
//! watch channel so the UI can show an "approximate results" notice.
//!
//! The geolocation request is the only suspension point in the engine. A
//! view may be torn down while it is pending, so results are delivered
//! through a [`Liveness`] guard: once the flag is cleared, a late result is
//! dropped on arrival.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{OnceCell, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::model::GeoPoint;

// ============================================================================
// Errors & status
// ============================================================================

/// Why the device position could not be used. Always recovered locally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location request timed out")]
    Timeout,

    #[error("location unavailable: {0}")]
    Unavailable(String),
}

/// What the UI should say about the center point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationStatus {
    Pending,
    Precise,
    /// Results are relative to the fallback point.
    Approximate(LocationError),
}

/// Where a center came from.
#[derive(Debug, Clone, PartialEq)]
pub enum CenterOrigin {
    Device,
    Fallback(LocationError),
}

/// A resolved center point.
#[derive(Debug, Clone, PartialEq)]
pub struct CenterResolution {
    pub center: GeoPoint,
    pub origin: CenterOrigin,
}

impl CenterResolution {
    pub fn device(center: GeoPoint) -> Self {
        Self { center, origin: CenterOrigin::Device }
    }

    pub fn fallback(center: GeoPoint, reason: LocationError) -> Self {
        Self { center, origin: CenterOrigin::Fallback(reason) }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.origin, CenterOrigin::Fallback(_))
    }
}

// ============================================================================
// GeolocationSource trait
// ============================================================================

/// One-shot "get current position" against the device.
#[async_trait]
pub trait GeolocationSource: Send + Sync {
    async fn current_position(&self) -> Result<GeoPoint, LocationError>;
}

/// A source with a fixed answer (desktop builds, demos, tests).
#[derive(Debug, Clone)]
pub struct StaticGeolocation(pub Result<GeoPoint, LocationError>);

impl StaticGeolocation {
    pub fn at(point: GeoPoint) -> Self {
        Self(Ok(point))
    }

    pub fn denied() -> Self {
        Self(Err(LocationError::PermissionDenied))
    }

    /// Connaught Place, New Delhi.
    pub fn delhi() -> Self {
        Self::at(GeoPoint::from_degrees_unchecked(28.6139, 77.2090))
    }
}

#[async_trait]
impl GeolocationSource for StaticGeolocation {
    async fn current_position(&self) -> Result<GeoPoint, LocationError> {
        self.0.clone()
    }
}

/// The platform has no geolocation API.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeolocation;

#[async_trait]
impl GeolocationSource for NoGeolocation {
    async fn current_position(&self) -> Result<GeoPoint, LocationError> {
        Err(LocationError::Unavailable("geolocation is not supported".into()))
    }
}

// ============================================================================
// Liveness
// ============================================================================

/// Shared "is the owning view still mounted" flag.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear the flag. Irreversible.
    pub fn kill(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// LocationProvider
// ============================================================================

/// Resolves a center once per view session, never failing.
pub struct LocationProvider<S: GeolocationSource> {
    source: S,
    fallback: GeoPoint,
    timeout: Duration,
    resolved: OnceCell<CenterResolution>,
    status: watch::Sender<LocationStatus>,
}

impl<S: GeolocationSource> LocationProvider<S> {
    pub fn new(source: S, fallback: GeoPoint, timeout: Duration) -> Self {
        let (status, _) = watch::channel(LocationStatus::Pending);
        Self {
            source,
            fallback,
            timeout,
            resolved: OnceCell::new(),
            status,
        }
    }

    pub fn from_config(source: S, config: &DiscoveryConfig) -> Self {
        Self::new(
            source,
            config.fallback_center,
            Duration::from_millis(config.geolocation_timeout_ms),
        )
    }

    /// Subscribe to the precise/approximate status.
    pub fn status(&self) -> watch::Receiver<LocationStatus> {
        self.status.subscribe()
    }

    /// Resolve the center. The device is queried on the first call only;
    /// later calls return the same resolution.
    pub async fn resolve_center(&self) -> CenterResolution {
        self.resolved
            .get_or_init(|| async {
                let outcome = match tokio::time::timeout(self.timeout, self.source.current_position()).await {
                    Ok(result) => result,
                    Err(_) => Err(LocationError::Timeout),
                };
                match outcome {
                    Ok(center) => {
                        info!(%center, "device location resolved");
                        self.status.send_replace(LocationStatus::Precise);
                        CenterResolution::device(center)
                    }
                    Err(reason) => {
                        warn!(%reason, fallback = %self.fallback, "using fallback location");
                        self.status.send_replace(LocationStatus::Approximate(reason.clone()));
                        CenterResolution::fallback(self.fallback, reason)
                    }
                }
            })
            .await
            .clone()
    }

    /// Resolve, but deliver nothing if the view died in the meantime.
    pub async fn resolve_guarded(&self, liveness: Liveness) -> Option<CenterResolution> {
        let resolution = self.resolve_center().await;
        if liveness.is_alive() {
            Some(resolution)
        } else {
            debug!("location resolved after teardown; dropped");
            None
        }
    }
}

impl<S: GeolocationSource + 'static> LocationProvider<S> {
    /// Run the guarded resolution as a cancellable task on the current
    /// tokio runtime.
    pub fn spawn(self: Arc<Self>, liveness: Liveness) -> LocationTask {
        let handle = tokio::spawn(async move { self.resolve_guarded(liveness).await });
        LocationTask { handle }
    }
}

/// Handle to a spawned center resolution.
pub struct LocationTask {
    handle: JoinHandle<Option<CenterResolution>>,
}

impl LocationTask {
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// `None` when aborted or when the view was torn down first.
    pub async fn join(self) -> Option<CenterResolution> {
        self.handle.await.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fallback() -> GeoPoint {
        GeoPoint::new(28.6139, 77.2090).unwrap()
    }

    fn provider<S: GeolocationSource>(source: S) -> LocationProvider<S> {
        LocationProvider::new(source, fallback(), Duration::from_millis(200))
    }

    struct Hangs;

    #[async_trait]
    impl GeolocationSource for Hangs {
        async fn current_position(&self) -> Result<GeoPoint, LocationError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_device_fix() {
        let here = GeoPoint::new(19.0760, 72.8777).unwrap();
        let p = provider(StaticGeolocation::at(here));
        let status = p.status();
        let r = p.resolve_center().await;
        assert_eq!(r, CenterResolution::device(here));
        assert!(!r.is_degraded());
        assert_eq!(*status.borrow(), LocationStatus::Precise);
    }

    #[tokio::test]
    async fn test_denied_falls_back() {
        let p = provider(StaticGeolocation::denied());
        let status = p.status();
        let r = p.resolve_center().await;
        assert_eq!(r.center, fallback());
        assert!(r.is_degraded());
        assert_eq!(
            *status.borrow(),
            LocationStatus::Approximate(LocationError::PermissionDenied)
        );
    }

    #[tokio::test]
    async fn test_no_api_falls_back() {
        let r = provider(NoGeolocation).resolve_center().await;
        assert!(matches!(r.origin, CenterOrigin::Fallback(LocationError::Unavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back() {
        let r = provider(Hangs).resolve_center().await;
        assert_eq!(r.origin, CenterOrigin::Fallback(LocationError::Timeout));
    }

    #[tokio::test]
    async fn test_queried_once() {
        use std::sync::atomic::AtomicUsize;

        struct Counting(AtomicUsize);

        #[async_trait]
        impl GeolocationSource for Counting {
            async fn current_position(&self) -> Result<GeoPoint, LocationError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(LocationError::PermissionDenied)
            }
        }

        let p = provider(Counting(AtomicUsize::new(0)));
        p.resolve_center().await;
        p.resolve_center().await;
        assert_eq!(p.source.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_guard_drops_late_result() {
        let p = provider(StaticGeolocation::delhi());
        let liveness = Liveness::new();
        liveness.kill();
        assert_eq!(p.resolve_guarded(liveness).await, None);
    }

    #[tokio::test]
    async fn test_spawned_task_abort() {
        let p = Arc::new(provider(Hangs));
        let task = p.spawn(Liveness::new());
        task.abort();
        assert_eq!(task.join().await, None);
    }
}
