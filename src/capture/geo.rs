//! Position fixes for captures
//!
//! A fix is nice to have, never required: [`locate_or_default`] gives up
//! after a bounded wait and tags the capture with zero coordinates instead.

use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

use crate::error::{Result, TourError};
use crate::state::data::GeoCoordinates;

/// One-shot position lookup
#[async_trait]
pub trait GeolocationSource: Send + Sync {
    async fn locate(&self) -> Result<GeoCoordinates>;
}

/// Always reports the same position (desktop shell, tests)
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub GeoCoordinates);

#[async_trait]
impl GeolocationSource for FixedLocation {
    async fn locate(&self) -> Result<GeoCoordinates> {
        Ok(self.0)
    }
}

/// A device without positioning, or where the user refused access
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeolocation;

#[async_trait]
impl GeolocationSource for NoGeolocation {
    async fn locate(&self) -> Result<GeoCoordinates> {
        Err(TourError::PermissionDenied("geolocation unavailable".into()))
    }
}

/// Ask `source` for a fix, waiting at most `timeout`.
///
/// Errors and timeouts both yield [`GeoCoordinates::zero`].
pub async fn locate_or_default(source: &dyn GeolocationSource, timeout: Duration) -> GeoCoordinates {
    match tokio::time::timeout(timeout, source.locate()).await {
        Ok(Ok(coordinates)) => coordinates,
        Ok(Err(err)) => {
            warn!("geolocation failed, using zero coordinates: {}", err);
            GeoCoordinates::zero()
        }
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "geolocation timed out, using zero coordinates");
            GeoCoordinates::zero()
        }
    }
}
