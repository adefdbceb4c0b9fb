//! Camera capture module
//!
//! Owns the one active camera stream. The physical device sits behind
//! [`CameraBackend`]: nokhwa drives it in the application, a fake drives it
//! in tests.

mod capture;
#[cfg(test)]
pub(crate) mod fake;

use std::time::Instant;

use image::{ImageBuffer, Rgba};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use capture::{CameraCapture, NokhwaBackend};

/// Errors that can occur while acquiring a camera stream.
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("No camera available")]
    NoDevice,
    #[error("Failed to open camera: {0}")]
    Open(String),
    #[error("Failed to start camera stream: {0}")]
    Stream(String),
    #[error("Failed to spawn capture thread: {0}")]
    Thread(#[from] std::io::Error),
}

/// Which physical camera to request
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front camera, facing the user
    User,
    /// Back camera, facing away from the user
    #[default]
    Environment,
}

impl FacingMode {
    /// The opposite camera
    pub fn toggled(self) -> Self {
        match self {
            FacingMode::User => FacingMode::Environment,
            FacingMode::Environment => FacingMode::User,
        }
    }

    /// Get display name for UI
    pub fn display_name(&self) -> &'static str {
        match self {
            FacingMode::User => "Front",
            FacingMode::Environment => "Back",
        }
    }
}

/// Parameters for opening a stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamRequest {
    pub facing: FacingMode,
    /// Preferred frame width, the camera may deliver something else
    pub ideal_width: u32,
    /// Preferred frame height
    pub ideal_height: u32,
}

impl Default for StreamRequest {
    fn default() -> Self {
        Self {
            facing: FacingMode::Environment,
            ideal_width: 1280,
            ideal_height: 720,
        }
    }
}

/// Camera frame data
#[derive(Clone)]
pub struct CameraFrame {
    /// RGBA pixel data
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Frame number
    pub frame_number: u64,
    /// Frame timestamp
    pub timestamp: Instant,
}

impl CameraFrame {
    /// Borrow the pixels as an image, `None` if the buffer is shorter than
    /// `width * height * 4`
    pub fn as_image(&self) -> Option<ImageBuffer<Rgba<u8>, &[u8]>> {
        ImageBuffer::from_raw(self.width, self.height, self.data.as_slice())
    }
}

/// Information about an available camera
#[derive(Clone, Debug)]
pub struct CameraInfo {
    /// Camera index
    pub index: u32,
    /// Camera name
    pub name: String,
}

/// A running stream of frames
pub trait VideoStream {
    /// Most recent frame, if one has arrived
    fn latest_frame(&self) -> Option<CameraFrame>;

    /// Stop delivering frames and release the device
    fn stop(&mut self);
}

/// Source of camera streams
pub trait CameraBackend {
    type Stream: VideoStream;

    /// Open a new stream. Must not return until the device is either
    /// streaming or has failed.
    fn open(&mut self, request: &StreamRequest) -> Result<Self::Stream, CameraError>;
}

const FRONT_HINTS: &[&str] = &["front", "user", "facetime", "integrated"];
const BACK_HINTS: &[&str] = &["back", "rear", "environment", "external"];

/// Pick the camera that best matches a facing mode.
///
/// Desktop drivers do not report facing, so the device name is used as a
/// hint. Without a match the front camera is the first device and the back
/// camera the last one.
pub fn select_camera_index(cameras: &[CameraInfo], facing: FacingMode) -> Option<u32> {
    let hints = match facing {
        FacingMode::User => FRONT_HINTS,
        FacingMode::Environment => BACK_HINTS,
    };

    let by_name = cameras.iter().find(|camera| {
        let name = camera.name.to_lowercase();
        hints.iter().any(|hint| name.contains(hint))
    });

    if let Some(camera) = by_name {
        return Some(camera.index);
    }

    match facing {
        FacingMode::User => cameras.first(),
        FacingMode::Environment => cameras.last(),
    }
    .map(|camera| camera.index)
}

/// Holds at most one active stream and the facing preference
pub struct CaptureController<B: CameraBackend> {
    backend: B,
    stream: Option<B::Stream>,
    request: StreamRequest,
}

impl<B: CameraBackend> CaptureController<B> {
    pub fn new(backend: B, request: StreamRequest) -> Self {
        Self {
            backend,
            stream: None,
            request,
        }
    }

    /// Stop any bound stream, then open a new one with the current facing.
    ///
    /// On failure no stream is left bound.
    pub fn start_camera(&mut self) -> Result<(), CameraError> {
        self.stop();

        log::info!(
            "Requesting {} camera ({}x{})",
            self.request.facing.display_name(),
            self.request.ideal_width,
            self.request.ideal_height
        );

        match self.backend.open(&self.request) {
            Ok(stream) => {
                self.stream = Some(stream);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to start camera: {}", e);
                Err(e)
            }
        }
    }

    /// Flip the facing preference and, if streaming, reopen on the other camera
    pub fn switch_camera(&mut self) -> Result<(), CameraError> {
        self.request.facing = self.request.facing.toggled();
        log::info!("Switched to {} camera", self.request.facing.display_name());

        if self.stream.is_some() {
            self.start_camera()
        } else {
            Ok(())
        }
    }

    /// Stop and release the bound stream
    pub fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            log::info!("Camera stream stopped");
        }
    }

    pub fn latest_frame(&self) -> Option<CameraFrame> {
        self.stream.as_ref().and_then(|s| s.latest_frame())
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    pub fn facing(&self) -> FacingMode {
        self.request.facing
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}
