//! Guided capture session
//!
//! One machine covers every capture-flow variant: the room list, shots per
//! room and the angle between shots are configuration.
//!
//! ```text
//! Idle -> RoomActive -> RoomComplete -> (advance) RoomActive -> ... -> SessionComplete
//! ```

use chrono::Utc;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

use crate::error::{Result, TourError};
use crate::state::data::{CapturedImage, GeoCoordinates};

/// Parameters of one guided capture flow
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Rooms in visiting order; names must be unique
    pub room_sequence: Vec<String>,
    pub max_captures_per_room: usize,
    /// Rotation between consecutive shots, also the auto-capture threshold
    pub capture_angle_step_degrees: f64,
}

impl SessionConfig {
    /// Config whose angle step spreads `max_captures_per_room` over a full turn
    pub fn new<I, S>(rooms: I, max_captures_per_room: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let step = if max_captures_per_room == 0 {
            0.0
        } else {
            360.0 / max_captures_per_room as f64
        };
        Self {
            room_sequence: rooms.into_iter().map(Into::into).collect(),
            max_captures_per_room,
            capture_angle_step_degrees: step,
        }
    }

    /// Non-empty unique room names, at least one shot per room, a usable angle step
    pub fn validate(&self) -> Result<()> {
        if self.room_sequence.is_empty() {
            return Err(TourError::InvalidConfiguration(
                "room sequence is empty".into(),
            ));
        }
        if self.max_captures_per_room == 0 {
            return Err(TourError::InvalidConfiguration(
                "max captures per room must be at least 1".into(),
            ));
        }
        if !(self.capture_angle_step_degrees > 0.0 && self.capture_angle_step_degrees <= 360.0) {
            return Err(TourError::InvalidConfiguration(format!(
                "capture angle step must be in (0, 360], got {}",
                self.capture_angle_step_degrees
            )));
        }
        let mut seen = HashSet::new();
        for room in &self.room_sequence {
            if room.trim().is_empty() {
                return Err(TourError::InvalidConfiguration("blank room name".into()));
            }
            if !seen.insert(room.as_str()) {
                return Err(TourError::InvalidConfiguration(format!(
                    "room '{}' appears twice",
                    room
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    RoomActive,
    RoomComplete,
    SessionComplete,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "Idle",
            SessionState::RoomActive => "RoomActive",
            SessionState::RoomComplete => "RoomComplete",
            SessionState::SessionComplete => "SessionComplete",
        };
        f.write_str(name)
    }
}

/// In-progress capture state: where we are in the room list and what has
/// been shot so far.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    state: SessionState,
    config: SessionConfig,
    current_room_index: usize,
    captures_in_current_room: usize,
    current_step_count: usize,
    images: Vec<CapturedImage>,
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            config: SessionConfig {
                room_sequence: Vec::new(),
                max_captures_per_room: 0,
                capture_angle_step_degrees: 0.0,
            },
            current_room_index: 0,
            captures_in_current_room: 0,
            current_step_count: 0,
            images: Vec::new(),
        }
    }

    /// Begin a new flow at the first room, discarding anything in progress
    pub fn start(&mut self, config: SessionConfig) -> Result<()> {
        config.validate()?;

        *self = Self {
            state: SessionState::RoomActive,
            config,
            ..Self::new()
        };
        debug!(room = self.config.room_sequence[0].as_str(), "capture session started");
        Ok(())
    }

    /// Record one shot in the current room.
    ///
    /// The stored label is always the planned room; `classified_label` is
    /// advisory and only logged.
    pub fn capture(
        &mut self,
        frame: Vec<u8>,
        classified_label: Option<&str>,
        angle_degrees: f64,
        coordinates: Option<GeoCoordinates>,
    ) -> Result<&CapturedImage> {
        if self.state != SessionState::RoomActive {
            return Err(TourError::SessionNotActive {
                state: self.state.to_string(),
            });
        }

        let room = self.config.room_sequence[self.current_room_index].clone();
        if let Some(label) = classified_label {
            if label != room {
                debug!(planned = room.as_str(), classified = label, "classifier disagrees with guided label");
            }
        }

        self.images.push(CapturedImage::new(
            frame,
            room,
            Utc::now(),
            angle_degrees.rem_euclid(360.0),
            coordinates,
        ));
        self.captures_in_current_room += 1;
        self.current_step_count += 1;

        if self.captures_in_current_room == self.config.max_captures_per_room {
            self.state = SessionState::RoomComplete;
        }

        let last = self.images.len() - 1;
        Ok(&self.images[last])
    }

    /// Move to the next room, or complete the session after the last one
    pub fn advance_room(&mut self) -> Result<SessionState> {
        match self.state {
            SessionState::RoomActive | SessionState::RoomComplete => {}
            other => {
                return Err(TourError::SessionNotActive {
                    state: other.to_string(),
                })
            }
        }

        if self.current_room_index + 1 < self.config.room_sequence.len() {
            self.current_room_index += 1;
            self.captures_in_current_room = 0;
            self.state = SessionState::RoomActive;
        } else {
            self.state = SessionState::SessionComplete;
        }
        Ok(self.state)
    }

    /// Step back one room. At the first room this is a no-op and returns
    /// `false`. Shots already taken in the revisited room are kept.
    pub fn retreat_room(&mut self) -> Result<bool> {
        match self.state {
            SessionState::RoomActive | SessionState::RoomComplete => {}
            other => {
                return Err(TourError::SessionNotActive {
                    state: other.to_string(),
                })
            }
        }

        if self.current_room_index == 0 {
            return Ok(false);
        }

        self.current_room_index -= 1;
        self.captures_in_current_room = 0;
        self.state = SessionState::RoomActive;
        Ok(true)
    }

    /// Hand over every captured image and return to `Idle`
    pub fn finalize(&mut self) -> Result<Vec<CapturedImage>> {
        if self.state != SessionState::SessionComplete {
            return Err(TourError::SessionIncomplete {
                state: self.state.to_string(),
            });
        }

        let images = std::mem::take(&mut self.images);
        *self = Self::new();
        Ok(images)
    }

    /// Abandon the flow, dropping all captures
    pub fn cancel(&mut self) {
        if self.state != SessionState::Idle {
            debug!(discarded = self.images.len(), "capture session cancelled");
        }
        *self = Self::new();
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Name of the room being shot, `None` when idle
    pub fn current_room(&self) -> Option<&str> {
        match self.state {
            SessionState::Idle => None,
            _ => self
                .config
                .room_sequence
                .get(self.current_room_index)
                .map(String::as_str),
        }
    }

    pub fn current_room_index(&self) -> usize {
        self.current_room_index
    }

    pub fn captures_in_current_room(&self) -> usize {
        self.captures_in_current_room
    }

    pub fn max_captures_per_room(&self) -> usize {
        self.config.max_captures_per_room
    }

    pub fn remaining_in_room(&self) -> usize {
        self.config
            .max_captures_per_room
            .saturating_sub(self.captures_in_current_room)
    }

    pub fn current_step_count(&self) -> usize {
        self.current_step_count
    }

    pub fn total_steps_planned(&self) -> usize {
        self.config.room_sequence.len() * self.config.max_captures_per_room
    }

    /// Share of planned shots taken, 0-100
    pub fn progress_percent(&self) -> f64 {
        let total = self.total_steps_planned();
        if total == 0 {
            return 0.0;
        }
        (self.current_step_count as f64 / total as f64 * 100.0).min(100.0)
    }

    /// Heading the next shot is expected at, relative to the room's first shot
    pub fn planned_angle(&self) -> f64 {
        self.captures_in_current_room as f64 * self.config.capture_angle_step_degrees
    }

    pub fn images(&self) -> &[CapturedImage] {
        &self.images
    }

    pub fn can_retreat(&self) -> bool {
        matches!(self.state, SessionState::RoomActive | SessionState::RoomComplete)
            && self.current_room_index > 0
    }

    pub fn can_advance(&self) -> bool {
        matches!(self.state, SessionState::RoomActive | SessionState::RoomComplete)
    }

    /// True when the current room is the last one in the sequence
    pub fn is_last_room(&self) -> bool {
        self.current_room_index + 1 >= self.config.room_sequence.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn shoot(session: &mut CaptureSession) -> Result<()> {
        session.capture(vec![0xFF, 0xD8], None, 0.0, None).map(|_| ())
    }

    #[test]
    fn test_start_rejects_empty_sequence() {
        let mut session = CaptureSession::new();
        let err = session.start(SessionConfig::new(Vec::<String>::new(), 2)).unwrap_err();
        assert!(matches!(err, TourError::InvalidConfiguration(_)));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_start_rejects_duplicate_rooms_and_zero_captures() {
        let mut session = CaptureSession::new();
        assert!(session.start(SessionConfig::new(["Kitchen", "Kitchen"], 2)).is_err());
        assert!(session.start(SessionConfig::new(["Kitchen"], 0)).is_err());
    }

    #[test]
    fn test_capture_outside_active_room_fails() {
        let mut session = CaptureSession::new();
        assert!(matches!(shoot(&mut session), Err(TourError::SessionNotActive { .. })));
    }

    #[test]
    fn test_two_room_walkthrough() {
        let mut session = CaptureSession::new();
        session.start(SessionConfig::new(["Living", "Kitchen"], 2)).unwrap();

        shoot(&mut session).unwrap();
        shoot(&mut session).unwrap();
        assert_eq!(session.state(), SessionState::RoomComplete);
        assert_eq!(session.current_room(), Some("Living"));

        assert_eq!(session.advance_room().unwrap(), SessionState::RoomActive);
        assert_eq!(session.current_room(), Some("Kitchen"));
        assert_eq!(session.captures_in_current_room(), 0);

        shoot(&mut session).unwrap();
        shoot(&mut session).unwrap();
        assert_eq!(session.state(), SessionState::RoomComplete);

        assert_eq!(session.advance_room().unwrap(), SessionState::SessionComplete);

        let images = session.finalize().unwrap();
        assert_eq!(images.len(), 4);
        assert_eq!(images.iter().filter(|i| i.room_label() == "Living").count(), 2);
        assert_eq!(images.iter().filter(|i| i.room_label() == "Kitchen").count(), 2);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_classifier_label_does_not_override_room() {
        let mut session = CaptureSession::new();
        session.start(SessionConfig::new(["Bedroom"], 3)).unwrap();

        let image = session
            .capture(vec![1], Some("Bathroom"), 370.0, None)
            .unwrap();

        assert_eq!(image.room_label(), "Bedroom");
        assert_eq!(image.angle_degrees(), 10.0);
    }

    #[test]
    fn test_advance_from_start_completes_after_every_room() {
        let rooms = ["A", "B", "C"];
        let mut session = CaptureSession::new();
        session.start(SessionConfig::new(rooms, 4)).unwrap();

        for _ in 0..rooms.len() - 1 {
            assert_eq!(session.advance_room().unwrap(), SessionState::RoomActive);
        }
        assert_eq!(session.advance_room().unwrap(), SessionState::SessionComplete);
        assert!(session.advance_room().is_err());
    }

    #[test]
    fn test_retreat_at_first_room_is_noop() {
        let mut session = CaptureSession::new();
        session.start(SessionConfig::new(["A", "B"], 2)).unwrap();
        shoot(&mut session).unwrap();

        assert!(!session.retreat_room().unwrap());
        assert_eq!(session.current_room_index(), 0);
        assert_eq!(session.captures_in_current_room(), 1);
        assert!(!session.can_retreat());
    }

    #[test]
    fn test_retreat_resets_room_counter() {
        let mut session = CaptureSession::new();
        session.start(SessionConfig::new(["A", "B"], 2)).unwrap();
        shoot(&mut session).unwrap();
        shoot(&mut session).unwrap();
        session.advance_room().unwrap();
        shoot(&mut session).unwrap();

        assert!(session.retreat_room().unwrap());
        assert_eq!(session.current_room(), Some("A"));
        assert_eq!(session.state(), SessionState::RoomActive);
        assert_eq!(session.captures_in_current_room(), 0);
        assert_eq!(session.images().len(), 3);
    }

    #[test]
    fn test_finalize_before_completion_fails() {
        let mut session = CaptureSession::new();
        session.start(SessionConfig::new(["A"], 1)).unwrap();
        shoot(&mut session).unwrap();

        assert!(matches!(session.finalize(), Err(TourError::SessionIncomplete { .. })));
        assert_eq!(session.images().len(), 1);
    }

    #[test]
    fn test_progress_and_planned_angle() {
        let mut session = CaptureSession::new();
        session.start(SessionConfig::new(["A", "B"], 4)).unwrap();
        shoot(&mut session).unwrap();
        shoot(&mut session).unwrap();

        assert_eq!(session.total_steps_planned(), 8);
        assert_eq!(session.progress_percent(), 25.0);
        assert_eq!(session.planned_angle(), 180.0);
        assert_eq!(session.remaining_in_room(), 2);
    }

    #[test]
    fn test_cancel_discards_everything() {
        let mut session = CaptureSession::new();
        session.start(SessionConfig::new(["A"], 2)).unwrap();
        shoot(&mut session).unwrap();

        session.cancel();

        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.images().is_empty());
        assert_eq!(session.current_room(), None);
    }

    proptest! {
        #[test]
        fn prop_room_fills_at_max_and_rejects_more(max in 1usize..16) {
            let mut session = CaptureSession::new();
            session.start(SessionConfig::new(["Room"], max)).unwrap();

            for _ in 0..max {
                prop_assert_eq!(session.state(), SessionState::RoomActive);
                shoot(&mut session).unwrap();
            }
            prop_assert_eq!(session.state(), SessionState::RoomComplete);

            let rejected = shoot(&mut session);
            prop_assert!(rejected.is_err());
            prop_assert_eq!(session.images().len(), max);
            prop_assert_eq!(session.captures_in_current_room(), max);
        }
    }
}
