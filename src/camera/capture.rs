//! Native camera capture using the nokhwa crate.
//!
//! Frames are captured on a background thread and the latest one is handed
//! to the render thread through a triple buffer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Sender;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;
use parking_lot::Mutex;

use super::{
    select_camera_index, CameraBackend, CameraError, CameraFrame, CameraInfo, StreamRequest,
    VideoStream,
};

const PREFERRED_FRAME_RATE: u32 = 30;

type FrameSlots = [Arc<Mutex<Option<CameraFrame>>>; 3];

/// Opens cameras through the platform's native capture API
#[derive(Default)]
pub struct NokhwaBackend;

impl NokhwaBackend {
    /// List available cameras
    pub fn list_cameras() -> Vec<CameraInfo> {
        match nokhwa::query(ApiBackend::Auto) {
            Ok(camera_list) => camera_list
                .iter()
                .enumerate()
                .map(|(idx, info)| CameraInfo {
                    index: idx as u32,
                    name: info.human_name().to_string(),
                })
                .collect(),
            Err(e) => {
                log::warn!("Failed to enumerate cameras: {:?}", e);
                Vec::new()
            }
        }
    }
}

impl CameraBackend for NokhwaBackend {
    type Stream = CameraCapture;

    fn open(&mut self, request: &StreamRequest) -> Result<CameraCapture, CameraError> {
        let cameras = Self::list_cameras();
        let index = select_camera_index(&cameras, request.facing).ok_or(CameraError::NoDevice)?;
        CameraCapture::new(index, request.ideal_width, request.ideal_height)
    }
}

/// Camera capture running on its own thread
pub struct CameraCapture {
    /// Current frame (latest captured) - triple buffered
    frames: FrameSlots,
    /// Index of the latest complete frame
    latest_frame_idx: Arc<AtomicU64>,
    /// Whether capture is running
    running: Arc<AtomicBool>,
    /// Capture thread handle
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl CameraCapture {
    /// Open a camera and start capturing.
    ///
    /// Blocks until the capture thread reports that the stream is open, so
    /// a permission or device failure is returned here rather than logged
    /// from the thread.
    pub fn new(camera_index: u32, width: u32, height: u32) -> Result<Self, CameraError> {
        let frames: FrameSlots = [
            Arc::new(Mutex::new(None)),
            Arc::new(Mutex::new(None)),
            Arc::new(Mutex::new(None)),
        ];
        let latest_frame_idx = Arc::new(AtomicU64::new(0));
        let running = Arc::new(AtomicBool::new(true));

        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let frames_clone = frames.clone();
        let latest_frame_idx_clone = latest_frame_idx.clone();
        let running_clone = running.clone();

        let thread_handle = std::thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || {
                Self::capture_thread(
                    camera_index,
                    width,
                    height,
                    ready_tx,
                    frames_clone,
                    latest_frame_idx_clone,
                    running_clone,
                );
            })?;

        let opened = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(CameraError::Stream("capture thread exited".to_string())));

        match opened {
            Ok(()) => Ok(Self {
                frames,
                latest_frame_idx,
                running,
                thread_handle: Some(thread_handle),
            }),
            Err(e) => {
                running.store(false, Ordering::Release);
                let _ = thread_handle.join();
                Err(e)
            }
        }
    }

    /// Try progressively looser format requests until one opens
    fn open_camera(camera_index: u32, width: u32, height: u32) -> Result<Camera, CameraError> {
        let index = CameraIndex::Index(camera_index);
        let attempts = [
            RequestedFormatType::Closest(CameraFormat::new(
                Resolution::new(width, height),
                FrameFormat::MJPEG,
                PREFERRED_FRAME_RATE,
            )),
            RequestedFormatType::AbsoluteHighestResolution,
            RequestedFormatType::None,
        ];

        let mut last_error = String::from("no format attempted");
        for format_type in attempts {
            let requested = RequestedFormat::new::<RgbAFormat>(format_type);
            match Camera::new(index.clone(), requested) {
                Ok(mut camera) => {
                    camera
                        .open_stream()
                        .map_err(|e| CameraError::Stream(e.to_string()))?;
                    return Ok(camera);
                }
                Err(e) => {
                    log::warn!("Camera format request {:?} failed: {}", format_type, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(CameraError::Open(last_error))
    }

    /// Camera capture thread
    fn capture_thread(
        camera_index: u32,
        width: u32,
        height: u32,
        ready: Sender<Result<(), CameraError>>,
        frames: FrameSlots,
        latest_frame_idx: Arc<AtomicU64>,
        running: Arc<AtomicBool>,
    ) {
        log::info!("Starting camera capture thread (camera {})", camera_index);

        let mut camera = match Self::open_camera(camera_index, width, height) {
            Ok(camera) => camera,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };

        let resolution = camera.resolution();
        log::info!(
            "Camera opened: {} ({}x{})",
            camera.info().human_name(),
            resolution.width(),
            resolution.height()
        );
        if ready.send(Ok(())).is_err() {
            return;
        }

        let mut write_idx: u64 = 0;
        let mut frame_number: u64 = 0;

        while running.load(Ordering::Acquire) {
            match camera.frame() {
                Ok(frame) => match frame.decode_image::<RgbAFormat>() {
                    Ok(image) => {
                        let camera_frame = CameraFrame {
                            width: image.width(),
                            height: image.height(),
                            data: image.into_raw(),
                            frame_number,
                            timestamp: Instant::now(),
                        };
                        frame_number = frame_number.wrapping_add(1);

                        let slot = (write_idx % 3) as usize;
                        *frames[slot].lock() = Some(camera_frame);

                        latest_frame_idx.store(write_idx, Ordering::Release);
                        write_idx = write_idx.wrapping_add(1);
                    }
                    Err(e) => {
                        log::warn!("Failed to decode frame: {:?}", e);
                    }
                },
                Err(e) => {
                    log::warn!("Failed to capture frame: {:?}", e);
                    std::thread::sleep(std::time::Duration::from_millis(10));
                }
            }
        }

        if let Err(e) = camera.stop_stream() {
            log::warn!("Failed to stop camera stream: {:?}", e);
        }
        log::info!("Camera capture thread stopped");
    }

    /// Get the latest captured frame
    pub fn latest_frame(&self) -> Option<CameraFrame> {
        let idx = self.latest_frame_idx.load(Ordering::Acquire);
        let slot = (idx % 3) as usize;
        self.frames[slot].lock().clone()
    }

    /// Stop capturing
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl VideoStream for CameraCapture {
    fn latest_frame(&self) -> Option<CameraFrame> {
        CameraCapture::latest_frame(self)
    }

    fn stop(&mut self) {
        CameraCapture::stop(self);
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
