//! Capture controller
//!
//! Drives one guided session: samples sensors, grabs frames, asks the
//! classifier and geolocation for advisory metadata, and feeds the result
//! into the [`CaptureSession`] state machine. Also owns the camera's
//! lifecycle across screen changes and app suspension.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::camera::{Camera, FacingMode};
use super::geo::{self, GeolocationSource, NoGeolocation};
use super::sensor::{AngleTracker, SensorAdapter};
use super::session::{CaptureSession, SessionConfig, SessionState};
use crate::error::{Result, TourError};
use crate::processing::classifier::{Classification, RandomClassifier, RoomClassifier};
use crate::processing::floor_plan::{FixedLayout, FloorPlanGenerator};
use crate::processing::panorama::{DemoPanorama, PanoramaStitcher};
use crate::state::data::Tour;

const DEFAULT_GEOLOCATION_TIMEOUT: Duration = Duration::from_secs(5);

/// What started a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTrigger {
    /// The shutter button
    Manual,
    /// The device turned far enough since the last shot
    Auto,
}

/// Transient reasons a capture was skipped; shown as a toast, never a state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureWarning {
    HoldStill,
    CaptureInProgress,
}

impl CaptureWarning {
    pub fn message(self) -> &'static str {
        match self {
            CaptureWarning::HoldStill => "Hold the device still to take the shot.",
            CaptureWarning::CaptureInProgress => "Still saving the previous shot.",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Captured {
        room: String,
        captures_in_room: usize,
        room_complete: bool,
        trigger: CaptureTrigger,
        /// Advisory only; never changes the stored label
        classification: Option<Classification>,
        prompt: String,
    },
    Rejected(CaptureWarning),
}

/// Single in-flight flag shared by everything that can trigger a capture
#[derive(Debug, Clone, Default)]
pub struct CaptureGate {
    busy: Arc<AtomicBool>,
}

/// Held for the duration of one capture; clears the flag when dropped
#[derive(Debug)]
pub struct InFlight {
    busy: Arc<AtomicBool>,
}

impl CaptureGate {
    pub fn try_enter(&self) -> Option<InFlight> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight {
                busy: self.busy.clone(),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Whether the app is in the background. Set by the shell without taking the
/// controller lock; the controller releases or reacquires the camera on its
/// next call, including at the end of a capture that was already in flight.
#[derive(Debug, Clone, Default)]
pub struct BackgroundSignal {
    backgrounded: Arc<AtomicBool>,
}

impl BackgroundSignal {
    pub fn set(&self, backgrounded: bool) {
        self.backgrounded.store(backgrounded, Ordering::Release);
    }

    pub fn is_backgrounded(&self) -> bool {
        self.backgrounded.load(Ordering::Acquire)
    }
}

/// Guidance text for the user, one function per situation
pub mod prompts {
    pub fn room_intro(room: &str, step_degrees: f64) -> String {
        format!(
            "Capturing {}. Stand in the middle of the room and turn slowly, one shot every {:.0}°.",
            room, step_degrees
        )
    }

    pub fn shot_accepted(remaining: usize) -> String {
        format!("Shot accepted. {} left in this room.", remaining)
    }

    pub fn room_done(room: &str) -> String {
        format!("{} complete. Ready for the next room?", room)
    }

    pub fn back_to(room: &str) -> String {
        format!("Back to {}.", room)
    }

    pub fn all_done() -> String {
        "All rooms captured. Building the tour now.".to_string()
    }
}

pub struct CaptureController {
    config: SessionConfig,
    session: CaptureSession,
    camera: Camera,
    sensors: Arc<dyn SensorAdapter>,
    classifier: Arc<dyn RoomClassifier>,
    geolocation: Arc<dyn GeolocationSource>,
    geolocation_timeout: Duration,
    floor_plan: Box<dyn FloorPlanGenerator>,
    panorama: Box<dyn PanoramaStitcher>,
    tracker: AngleTracker,
    gate: CaptureGate,
    background: BackgroundSignal,
    suspended: bool,
}

impl CaptureController {
    pub fn new(config: SessionConfig, camera: Camera, sensors: Arc<dyn SensorAdapter>) -> Self {
        let step = config.capture_angle_step_degrees;
        Self {
            config,
            session: CaptureSession::new(),
            camera,
            sensors,
            classifier: Arc::new(RandomClassifier::default()),
            geolocation: Arc::new(NoGeolocation),
            geolocation_timeout: DEFAULT_GEOLOCATION_TIMEOUT,
            floor_plan: Box::new(FixedLayout::default()),
            panorama: Box::new(DemoPanorama::new(step)),
            tracker: AngleTracker::new(step),
            gate: CaptureGate::default(),
            background: BackgroundSignal::default(),
            suspended: false,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn RoomClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_geolocation(mut self, source: Arc<dyn GeolocationSource>, timeout: Duration) -> Self {
        self.geolocation = source;
        self.geolocation_timeout = timeout;
        self
    }

    pub fn with_floor_plan(mut self, generator: Box<dyn FloorPlanGenerator>) -> Self {
        self.floor_plan = generator;
        self
    }

    pub fn with_panorama(mut self, stitcher: Box<dyn PanoramaStitcher>) -> Self {
        self.panorama = stitcher;
        self
    }

    /// Start the guided flow at the first room and open the camera.
    ///
    /// A camera that cannot be opened does not abort the session; check
    /// [`CaptureController::camera_ready`] and warn the user.
    pub fn start(&mut self) -> Result<String> {
        self.session.start(self.config.clone())?;
        self.tracker.rebase();
        self.suspended = false;
        self.background.set(false);

        if let Err(err) = self.camera.start() {
            warn!("⚠️  Camera unavailable: {}", err);
        }

        let room = self.session.current_room().unwrap_or_default();
        info!(room, rooms = self.config.room_sequence.len(), "guided capture started");
        Ok(prompts::room_intro(room, self.config.capture_angle_step_degrees))
    }

    /// Take one shot in the current room
    pub async fn capture(&mut self, trigger: CaptureTrigger) -> Result<CaptureOutcome> {
        let Some(_in_flight) = self.gate.try_enter() else {
            debug!("capture ignored, previous one still in flight");
            return Ok(CaptureOutcome::Rejected(CaptureWarning::CaptureInProgress));
        };
        self.release_if_backgrounded();

        if self.session.state() != SessionState::RoomActive {
            return Err(TourError::SessionNotActive {
                state: self.session.state().to_string(),
            });
        }

        if !self.sensors.is_steady() {
            warn!("device moving, capture skipped");
            return Ok(CaptureOutcome::Rejected(CaptureWarning::HoldStill));
        }

        let frame = self.camera.capture_frame()?;

        let classification = match self.classifier.classify(&frame.bytes).await {
            Ok(result) => Some(result),
            Err(err) => {
                warn!("classifier failed: {}", err);
                None
            }
        };

        let coordinates =
            geo::locate_or_default(self.geolocation.as_ref(), self.geolocation_timeout).await;

        let angle = if self.sensors.is_available() {
            self.sensors.current_angle()
        } else {
            self.session.planned_angle()
        };

        let image = self.session.capture(
            frame.bytes,
            classification.as_ref().map(|c| c.label.as_str()),
            angle,
            Some(coordinates),
        )?;
        let room = image.room_label().to_string();
        self.tracker.reset();

        let room_complete = self.session.state() == SessionState::RoomComplete;
        let prompt = if room_complete {
            prompts::room_done(&room)
        } else {
            prompts::shot_accepted(self.session.remaining_in_room())
        };

        // focus may have been lost while the lookups were pending
        self.release_if_backgrounded();

        debug!(room = room.as_str(), angle, ?trigger, "shot recorded");
        Ok(CaptureOutcome::Captured {
            room,
            captures_in_room: self.session.captures_in_current_room(),
            room_complete,
            trigger,
            classification,
            prompt,
        })
    }

    /// Sample the heading and shoot if the device has turned a full step.
    ///
    /// Only armed after the first manual shot in a room, and only with real
    /// orientation data.
    pub async fn poll_auto_capture(&mut self) -> Result<Option<CaptureOutcome>> {
        if self.session.state() != SessionState::RoomActive || !self.sensors.is_available() {
            return Ok(None);
        }

        let heading = self.sensors.current_angle();
        let turned_enough = self.tracker.observe(heading);
        if !turned_enough || self.session.captures_in_current_room() == 0 {
            return Ok(None);
        }

        self.capture(CaptureTrigger::Auto).await.map(Some)
    }

    /// Next room, or session complete after the last one
    pub fn advance_room(&mut self) -> Result<String> {
        let state = self.session.advance_room()?;
        self.tracker.rebase();

        if state == SessionState::SessionComplete {
            self.camera.stop();
            info!(images = self.session.images().len(), "all rooms captured");
            return Ok(prompts::all_done());
        }

        let room = self.session.current_room().unwrap_or_default();
        Ok(prompts::room_intro(room, self.config.capture_angle_step_degrees))
    }

    /// Previous room; `None` when already at the first one
    pub fn retreat_room(&mut self) -> Result<Option<String>> {
        if !self.session.retreat_room()? {
            return Ok(None);
        }
        self.tracker.rebase();
        Ok(self.session.current_room().map(prompts::back_to))
    }

    /// Turn the completed session into a tour. The tour is not saved here.
    pub fn finalize_tour(&mut self) -> Result<Tour> {
        let images = self.session.finalize()?;
        self.camera.stop();

        let rooms = self.floor_plan.generate(&images);
        let panorama = self.panorama.stitch(&images);
        let tour = Tour::new(Utc::now(), images, rooms, Some(panorama));

        info!(tour_id = tour.id, rooms = tour.rooms.len(), images = tour.images.len(), "tour assembled");
        Ok(tour)
    }

    /// Abandon the session and release the camera
    pub fn cancel(&mut self) {
        self.session.cancel();
        self.camera.stop();
        self.suspended = false;
    }

    /// App went to the background: release the camera
    pub fn suspend(&mut self) {
        self.background.set(true);
        self.release_if_backgrounded();
    }

    /// App is visible again: reacquire the camera if a room is being shot
    pub fn resume(&mut self) -> Result<()> {
        self.background.set(false);
        if !self.suspended {
            return Ok(());
        }
        self.suspended = false;

        match self.session.state() {
            SessionState::RoomActive | SessionState::RoomComplete => self.camera.start(),
            _ => Ok(()),
        }
    }

    /// Reopen the feed on the other lens
    pub fn switch_camera(&mut self) -> Result<FacingMode> {
        self.camera.switch_facing()?;
        info!(facing = ?self.camera.facing(), "camera switched");
        Ok(self.camera.facing())
    }

    /// Apply whatever the [`BackgroundSignal`] currently says
    pub fn sync_background(&mut self) -> Result<()> {
        if self.background.is_backgrounded() {
            self.suspend();
            Ok(())
        } else {
            self.resume()
        }
    }

    fn release_if_backgrounded(&mut self) {
        if self.background.is_backgrounded() && self.camera.is_active() {
            self.camera.stop();
            self.suspended = true;
        }
    }

    pub fn background_signal(&self) -> BackgroundSignal {
        self.background.clone()
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn camera_ready(&self) -> bool {
        self.camera.is_active()
    }

    pub fn capture_gate(&self) -> CaptureGate {
        self.gate.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::camera::SyntheticSource;
    use crate::capture::geo::FixedLocation;
    use crate::capture::sensor::SensorHub;
    use crate::state::data::GeoCoordinates;

    fn controller(rooms: &[&str], per_room: usize) -> (CaptureController, SensorHub) {
        let hub = SensorHub::new();
        let camera = Camera::new(Box::new(SyntheticSource::new(32, 24)), 80);
        let controller = CaptureController::new(
            SessionConfig::new(rooms.iter().copied(), per_room),
            camera,
            Arc::new(hub.clone()),
        )
        .with_classifier(Arc::new(RandomClassifier::default().with_seed(1)))
        .with_geolocation(
            Arc::new(FixedLocation(GeoCoordinates::new(55.75, 37.61))),
            Duration::from_secs(1),
        );
        (controller, hub)
    }

    #[tokio::test]
    async fn test_manual_capture_records_guided_label() {
        let (mut ctrl, _hub) = controller(&["Kitchen"], 2);
        ctrl.start().unwrap();
        assert!(ctrl.camera_ready());

        let outcome = ctrl.capture(CaptureTrigger::Manual).await.unwrap();

        match outcome {
            CaptureOutcome::Captured { room, captures_in_room, room_complete, prompt, .. } => {
                assert_eq!(room, "Kitchen");
                assert_eq!(captures_in_room, 1);
                assert!(!room_complete);
                assert_eq!(prompt, prompts::shot_accepted(1));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        let image = &ctrl.session().images()[0];
        assert_eq!(image.room_label(), "Kitchen");
        assert_eq!(image.coordinates(), Some(GeoCoordinates::new(55.75, 37.61)));
    }

    #[tokio::test]
    async fn test_unsteady_device_skips_capture() {
        let (mut ctrl, hub) = controller(&["Kitchen"], 2);
        ctrl.start().unwrap();
        hub.push_motion(3.0, 0.0, 0.0);

        let outcome = ctrl.capture(CaptureTrigger::Manual).await.unwrap();

        assert_eq!(outcome, CaptureOutcome::Rejected(CaptureWarning::HoldStill));
        assert_eq!(ctrl.session().captures_in_current_room(), 0);
        assert!(ctrl.session().images().is_empty());
    }

    #[tokio::test]
    async fn test_capture_while_in_flight_is_rejected() {
        let (mut ctrl, _hub) = controller(&["Kitchen"], 2);
        ctrl.start().unwrap();
        let gate = ctrl.capture_gate();

        let held = gate.try_enter().unwrap();
        let outcome = ctrl.capture(CaptureTrigger::Manual).await.unwrap();
        assert_eq!(outcome, CaptureOutcome::Rejected(CaptureWarning::CaptureInProgress));
        assert!(ctrl.session().images().is_empty());

        drop(held);
        assert!(!gate.is_busy());
        assert!(matches!(
            ctrl.capture(CaptureTrigger::Manual).await.unwrap(),
            CaptureOutcome::Captured { .. }
        ));
        assert!(!gate.is_busy());
    }

    #[tokio::test]
    async fn test_capture_after_room_complete_is_misuse() {
        let (mut ctrl, _hub) = controller(&["Kitchen"], 1);
        ctrl.start().unwrap();
        ctrl.capture(CaptureTrigger::Manual).await.unwrap();

        let err = ctrl.capture(CaptureTrigger::Manual).await.unwrap_err();
        assert!(err.is_misuse());
        assert_eq!(ctrl.session().images().len(), 1);
    }

    #[tokio::test]
    async fn test_auto_capture_needs_first_shot_and_full_step() {
        let (mut ctrl, hub) = controller(&["Kitchen"], 8);
        ctrl.start().unwrap();

        hub.push_orientation(0.0);
        assert_eq!(ctrl.poll_auto_capture().await.unwrap(), None);
        hub.push_orientation(50.0);
        assert_eq!(ctrl.poll_auto_capture().await.unwrap(), None, "not armed before first shot");

        ctrl.capture(CaptureTrigger::Manual).await.unwrap();
        hub.push_orientation(70.0);
        assert_eq!(ctrl.poll_auto_capture().await.unwrap(), None);
        hub.push_orientation(95.0);

        let outcome = ctrl.poll_auto_capture().await.unwrap();
        assert!(matches!(
            outcome,
            Some(CaptureOutcome::Captured { trigger: CaptureTrigger::Auto, captures_in_room: 2, .. })
        ));
        assert_eq!(ctrl.session().images()[1].angle_degrees(), 95.0);
    }

    #[tokio::test]
    async fn test_auto_capture_waits_for_steady_device() {
        let (mut ctrl, hub) = controller(&["Kitchen"], 8);
        ctrl.start().unwrap();
        hub.push_orientation(0.0);
        assert_eq!(ctrl.poll_auto_capture().await.unwrap(), None);
        ctrl.capture(CaptureTrigger::Manual).await.unwrap();

        hub.push_orientation(50.0);
        hub.push_motion(3.0, 0.0, 0.0);
        assert_eq!(
            ctrl.poll_auto_capture().await.unwrap(),
            Some(CaptureOutcome::Rejected(CaptureWarning::HoldStill))
        );
        assert_eq!(ctrl.session().captures_in_current_room(), 1);

        // still armed: the next steady sample at the same heading shoots
        hub.push_motion(0.0, 0.0, 0.0);
        assert!(matches!(
            ctrl.poll_auto_capture().await.unwrap(),
            Some(CaptureOutcome::Captured { trigger: CaptureTrigger::Auto, captures_in_room: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_auto_capture_ignores_fallback_heading() {
        let (mut ctrl, _hub) = controller(&["Kitchen"], 8);
        ctrl.start().unwrap();
        ctrl.capture(CaptureTrigger::Manual).await.unwrap();

        for _ in 0..20 {
            assert_eq!(ctrl.poll_auto_capture().await.unwrap(), None);
        }
        assert_eq!(ctrl.session().images().len(), 1);
    }

    #[tokio::test]
    async fn test_without_orientation_angle_follows_plan() {
        let (mut ctrl, _hub) = controller(&["Kitchen"], 4);
        ctrl.start().unwrap();
        ctrl.capture(CaptureTrigger::Manual).await.unwrap();
        ctrl.capture(CaptureTrigger::Manual).await.unwrap();

        let angles: Vec<f64> = ctrl.session().images().iter().map(|i| i.angle_degrees()).collect();
        assert_eq!(angles, vec![0.0, 90.0]);
    }

    #[tokio::test]
    async fn test_full_flow_produces_tour() {
        let (mut ctrl, _hub) = controller(&["Living room", "Kitchen"], 2);
        ctrl.start().unwrap();

        for _ in 0..2 {
            ctrl.capture(CaptureTrigger::Manual).await.unwrap();
        }
        assert_eq!(ctrl.advance_room().unwrap(), prompts::room_intro("Kitchen", 180.0));
        for _ in 0..2 {
            ctrl.capture(CaptureTrigger::Manual).await.unwrap();
        }
        assert_eq!(ctrl.advance_room().unwrap(), prompts::all_done());
        assert!(!ctrl.camera_ready());

        let tour = ctrl.finalize_tour().unwrap();
        assert_eq!(tour.images.len(), 4);
        let names: Vec<&str> = tour.rooms.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Living room", "Kitchen"]);
        assert_eq!(tour.panorama.as_ref().unwrap().hotspots.len(), 4);
        assert_eq!(tour.preview_image, tour.images[0].image_bytes());
        assert_eq!(ctrl.session().state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_finalize_early_is_incomplete() {
        let (mut ctrl, _hub) = controller(&["Kitchen"], 2);
        ctrl.start().unwrap();
        assert!(matches!(ctrl.finalize_tour(), Err(TourError::SessionIncomplete { .. })));
    }

    #[test]
    fn test_suspend_releases_and_resume_reacquires() {
        let (mut ctrl, _hub) = controller(&["Kitchen", "Hallway"], 2);
        ctrl.start().unwrap();

        ctrl.suspend();
        assert!(!ctrl.camera_ready());

        ctrl.resume().unwrap();
        assert!(ctrl.camera_ready());

        ctrl.cancel();
        assert!(!ctrl.camera_ready());
        ctrl.resume().unwrap();
        assert!(!ctrl.camera_ready());
    }

    /// Flips the background signal while the capture waits for a fix,
    /// like a focus change arriving mid-capture
    struct BackgroundedDuringLookup(BackgroundSignal);

    #[async_trait::async_trait]
    impl GeolocationSource for BackgroundedDuringLookup {
        async fn locate(&self) -> Result<GeoCoordinates> {
            self.0.set(true);
            Ok(GeoCoordinates::zero())
        }
    }

    #[tokio::test]
    async fn test_background_during_capture_releases_camera() {
        let (ctrl, _hub) = controller(&["Kitchen"], 3);
        let signal = ctrl.background_signal();
        let mut ctrl = ctrl.with_geolocation(
            Arc::new(BackgroundedDuringLookup(signal.clone())),
            Duration::from_secs(1),
        );
        ctrl.start().unwrap();

        let outcome = ctrl.capture(CaptureTrigger::Manual).await.unwrap();

        assert!(matches!(outcome, CaptureOutcome::Captured { .. }));
        assert!(!ctrl.camera_ready());

        signal.set(false);
        ctrl.sync_background().unwrap();
        assert!(ctrl.camera_ready());
    }

    #[tokio::test]
    async fn test_capture_while_backgrounded_has_no_feed() {
        let (mut ctrl, _hub) = controller(&["Kitchen"], 3);
        ctrl.start().unwrap();
        ctrl.background_signal().set(true);

        let err = ctrl.capture(CaptureTrigger::Manual).await.unwrap_err();

        assert!(matches!(err, TourError::NoActiveFeed));
        assert!(!ctrl.camera_ready());
        assert!(ctrl.session().images().is_empty());
    }

    #[tokio::test]
    async fn test_switch_camera_keeps_shooting() {
        let (mut ctrl, _hub) = controller(&["Kitchen"], 2);
        ctrl.start().unwrap();

        assert_eq!(ctrl.switch_camera().unwrap(), FacingMode::User);
        assert!(ctrl.camera_ready());
        assert!(matches!(
            ctrl.capture(CaptureTrigger::Manual).await.unwrap(),
            CaptureOutcome::Captured { .. }
        ));
        assert_eq!(ctrl.switch_camera().unwrap(), FacingMode::Environment);
    }

    #[test]
    fn test_retreat_prompts() {
        let (mut ctrl, _hub) = controller(&["Kitchen", "Hallway"], 2);
        ctrl.start().unwrap();
        assert_eq!(ctrl.retreat_room().unwrap(), None);

        ctrl.advance_room().unwrap();
        assert_eq!(ctrl.retreat_room().unwrap(), Some(prompts::back_to("Kitchen")));
    }
}
