//! Orientation and motion sampling
//!
//! Platform callbacks push readings into a [`SensorHub`]; the capture
//! controller only samples the latest values when it needs them, so no
//! history is queued.

use cgmath::{InnerSpace, Vector3};
use rand::RngExt;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Acceleration magnitude (m/s²) below which the device counts as steady
pub const STEADY_THRESHOLD: f64 = 2.0;

/// Heading changes smaller than this are treated as hand jitter
const JITTER_DEGREES: f64 = 5.0;

/// What the capture flow needs from the device's sensors
pub trait SensorAdapter: Send + Sync {
    /// Latest absolute heading in [0, 360).
    ///
    /// Without orientation support this is a made-up value; check
    /// [`SensorAdapter::is_available`] before trusting it.
    fn current_angle(&self) -> f64;

    /// Whether the device is still enough to shoot. Fails open: with no
    /// motion data the answer is `true`.
    fn is_steady(&self) -> bool;

    /// Whether orientation readings are real
    fn is_available(&self) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
struct SensorSnapshot {
    heading: Option<f64>,
    acceleration: Option<Vector3<f64>>,
}

/// Latest-value store fed by orientation/motion callbacks. Cloning shares
/// the same readings.
#[derive(Debug, Clone, Default)]
pub struct SensorHub {
    latest: Arc<RwLock<SensorSnapshot>>,
}

impl SensorHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a compass heading (the `alpha` angle of a device-orientation event)
    pub fn push_orientation(&self, alpha: f64) {
        if !alpha.is_finite() {
            return;
        }
        let mut latest = self.latest.write().unwrap_or_else(|e| e.into_inner());
        latest.heading = Some(alpha.rem_euclid(360.0));
    }

    /// Record linear acceleration without gravity, in m/s²
    pub fn push_motion(&self, x: f64, y: f64, z: f64) {
        let mut latest = self.latest.write().unwrap_or_else(|e| e.into_inner());
        latest.acceleration = Some(Vector3::new(x, y, z));
    }

    /// Forget all readings, e.g. after the platform reports sensors gone
    pub fn reset(&self) {
        let mut latest = self.latest.write().unwrap_or_else(|e| e.into_inner());
        *latest = SensorSnapshot::default();
    }

    fn snapshot(&self) -> SensorSnapshot {
        *self.latest.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl SensorAdapter for SensorHub {
    fn current_angle(&self) -> f64 {
        match self.snapshot().heading {
            Some(heading) => heading,
            None => {
                let fallback = rand::rng().random_range(0.0..360.0);
                debug!(fallback, "no orientation data, using pseudo-random heading");
                fallback
            }
        }
    }

    fn is_steady(&self) -> bool {
        match self.snapshot().acceleration {
            Some(acceleration) => acceleration.magnitude() < STEADY_THRESHOLD,
            None => true,
        }
    }

    fn is_available(&self) -> bool {
        self.snapshot().heading.is_some()
    }
}

/// Smallest rotation between two headings, in [0, 180]
pub fn angular_distance(from: f64, to: f64) -> f64 {
    let delta = (to - from).rem_euclid(360.0);
    delta.min(360.0 - delta)
}

/// Accumulates rotation since the last shot and reports when the configured
/// step has been turned.
#[derive(Debug, Clone)]
pub struct AngleTracker {
    threshold: f64,
    last_heading: Option<f64>,
    accumulated: f64,
}

impl AngleTracker {
    pub fn new(threshold_degrees: f64) -> Self {
        Self {
            threshold: threshold_degrees,
            last_heading: None,
            accumulated: 0.0,
        }
    }

    /// Feed a heading sample; returns true once the threshold is reached
    pub fn observe(&mut self, heading: f64) -> bool {
        let heading = heading.rem_euclid(360.0);

        if let Some(last) = self.last_heading {
            let delta = angular_distance(last, heading);
            if delta >= JITTER_DEGREES {
                self.accumulated += delta;
                self.last_heading = Some(heading);
            }
        } else {
            self.last_heading = Some(heading);
        }

        self.accumulated >= self.threshold
    }

    /// Start counting again from the current heading
    pub fn reset(&mut self) {
        self.accumulated = 0.0;
    }

    /// Forget the reference heading as well, e.g. when entering a new room
    pub fn rebase(&mut self) {
        self.accumulated = 0.0;
        self.last_heading = None;
    }

    pub fn accumulated(&self) -> f64 {
        self.accumulated
    }
}
