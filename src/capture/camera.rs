//! Frame capture
//!
//! A [`Camera`] owns a [`FrameSource`] and the right to read from it. The
//! feed is released on [`Camera::stop`] and, at the latest, when the camera
//! is dropped, so the hardware never outlives the screen that opened it.

use image::{DynamicImage, Rgb, RgbImage};
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::codec::{self, OutputFormat};
use crate::error::{Result, TourError};

/// Which lens to ask the platform for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacingMode {
    /// Rear camera, the one pointed at the room
    #[default]
    Environment,
    /// Front camera
    User,
}

impl FacingMode {
    pub fn flipped(self) -> Self {
        match self {
            FacingMode::Environment => FacingMode::User,
            FacingMode::User => FacingMode::Environment,
        }
    }
}

/// Anything that can deliver live frames
pub trait FrameSource: Send {
    /// Acquire the device
    fn open(&mut self, facing: FacingMode) -> Result<()>;

    /// Sample the current frame
    fn frame(&mut self) -> Result<DynamicImage>;

    /// Release the device; must be safe to call when already closed
    fn close(&mut self);
}

/// A still ready to be stored in a capture
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Scoped owner of a frame source
pub struct Camera {
    source: Box<dyn FrameSource>,
    facing: FacingMode,
    active: bool,
    quality: u8,
}

impl Camera {
    /// `quality` is the JPEG quality of grabbed stills
    pub fn new(source: Box<dyn FrameSource>, quality: u8) -> Self {
        Self {
            source,
            facing: FacingMode::default(),
            active: false,
            quality,
        }
    }

    /// Open the feed; a no-op when already running
    pub fn start(&mut self) -> Result<()> {
        if self.active {
            return Ok(());
        }
        self.source.open(self.facing)?;
        self.active = true;
        info!("📷 Camera started ({:?})", self.facing);
        Ok(())
    }

    /// Release the feed
    pub fn stop(&mut self) {
        if self.active {
            self.source.close();
            self.active = false;
            info!("📷 Camera released");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    /// Restart the feed on the other lens
    pub fn switch_facing(&mut self) -> Result<()> {
        let was_active = self.active;
        self.stop();
        self.facing = self.facing.flipped();
        if was_active {
            self.start()?;
        }
        Ok(())
    }

    /// Grab the current frame as a JPEG
    pub fn capture_frame(&mut self) -> Result<EncodedFrame> {
        if !self.active {
            return Err(TourError::NoActiveFeed);
        }

        let frame = self.source.frame()?;
        let bytes = codec::encode(&frame, OutputFormat::Jpeg, self.quality)?;
        debug!(width = frame.width(), height = frame.height(), bytes = bytes.len(), "frame captured");

        Ok(EncodedFrame {
            bytes,
            width: frame.width(),
            height: frame.height(),
        })
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Camera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Camera")
            .field("facing", &self.facing)
            .field("active", &self.active)
            .finish()
    }
}

/// Generated test pattern; stands in for a camera on machines without one.
/// Each frame shifts the pattern so consecutive shots differ.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    width: u32,
    height: u32,
    frame_index: u32,
    open: bool,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            frame_index: 0,
            open: false,
        }
    }
}

impl FrameSource for SyntheticSource {
    fn open(&mut self, _facing: FacingMode) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn frame(&mut self) -> Result<DynamicImage> {
        if !self.open {
            return Err(TourError::NoActiveFeed);
        }
        let (width, height) = (self.width, self.height);
        let shift = self.frame_index.wrapping_mul(23) % width;
        let tint = (self.frame_index.wrapping_mul(37) % 256) as u8;
        self.frame_index = self.frame_index.wrapping_add(1);

        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                (((x + shift) % width) as u64 * 255 / width as u64) as u8,
                (y as u64 * 255 / height as u64) as u8,
                tint,
            ])
        });
        Ok(DynamicImage::ImageRgb8(image))
    }

    fn close(&mut self) {
        self.open = false;
    }
}

/// Plays back the stills found under a folder, in path order, looping.
#[derive(Debug, Clone)]
pub struct FolderSource {
    root: PathBuf,
    stills: Vec<PathBuf>,
    next: usize,
}

const STILL_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

impl FolderSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stills: Vec::new(),
            next: 0,
        }
    }

    fn scan(&self) -> Result<Vec<PathBuf>> {
        let mut stills = Vec::new();

        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    if err.io_error().map(|e| e.kind()) == Some(ErrorKind::PermissionDenied) {
                        return Err(TourError::PermissionDenied(format!(
                            "cannot read {}",
                            self.root.display()
                        )));
                    }
                    warn!("⚠️  Skipping unreadable entry: {}", err);
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let is_still = path
                .extension()
                .map(|ext| ext.to_string_lossy().to_lowercase())
                .is_some_and(|ext| STILL_EXTENSIONS.contains(&ext.as_str()));
            if is_still {
                stills.push(path.to_path_buf());
            }
        }

        stills.sort();
        Ok(stills)
    }
}

impl FrameSource for FolderSource {
    fn open(&mut self, _facing: FacingMode) -> Result<()> {
        if !self.root.is_dir() {
            return Err(TourError::NoActiveFeed);
        }
        self.stills = self.scan()?;
        if self.stills.is_empty() {
            return Err(TourError::NoActiveFeed);
        }
        self.next = 0;
        info!("🔍 {} stills found in {}", self.stills.len(), self.root.display());
        Ok(())
    }

    fn frame(&mut self) -> Result<DynamicImage> {
        if self.stills.is_empty() {
            return Err(TourError::NoActiveFeed);
        }
        let path = &self.stills[self.next % self.stills.len()];
        self.next = (self.next + 1) % self.stills.len();
        Ok(image::open(path)?)
    }

    fn close(&mut self) {
        self.stills.clear();
        self.next = 0;
    }
}
