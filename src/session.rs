//! Run/stop state machine stepped once per redraw
//!
//! Owns the capture controller, the model slot and the overlay canvas. All
//! of it is touched from the event-loop thread only. Stopping is
//! cooperative: the flag is checked at the start of every [`Session::tick`].

use crate::camera::{CameraBackend, CameraFrame, CaptureController, FacingMode};
use crate::ml::{process_frame, ModelError, ModelSlot, ModelStatus, Segmenter};
use crate::overlay::{draw_placeholder, rasterize_mask, Canvas, Orientation};

/// Whether the render loop is running
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Stopped,
    Running,
}

impl RunState {
    /// Label for the run/stop button
    pub fn button_label(&self) -> &'static str {
        match self {
            RunState::Stopped => "▶ Start",
            RunState::Running => "■ Stop",
        }
    }
}

/// Result of one loop iteration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Stopped, nothing painted, do not reschedule
    Idle,
    /// Running but the camera has not delivered a frame yet
    Waiting,
    /// Model output painted
    Mask,
    /// No model, placeholder painted
    Placeholder,
    /// Inference failed, canvas left clear
    InferenceFailed,
}

impl TickOutcome {
    /// Whether another iteration should be scheduled
    pub fn reschedule(&self) -> bool {
        !matches!(self, TickOutcome::Idle)
    }
}

pub struct Session<B: CameraBackend> {
    capture: CaptureController<B>,
    model: ModelSlot,
    canvas: Canvas,
    state: RunState,
    orientation: Orientation,
    /// Frame the canvas was last painted for
    frame: Option<CameraFrame>,
    /// Pending user-facing error, shown as a blocking dialog
    alert: Option<String>,
    inference_error: Option<String>,
}

impl<B: CameraBackend> Session<B> {
    pub fn new(capture: CaptureController<B>) -> Self {
        Self {
            capture,
            model: ModelSlot::new(),
            canvas: Canvas::new(),
            state: RunState::Stopped,
            orientation: Orientation::Landscape,
            frame: None,
            alert: None,
            inference_error: None,
        }
    }

    /// Start or stop the loop.
    ///
    /// Starting opens the camera first; if that fails an alert is raised and
    /// the loop stays stopped. The model is loaded after the camera, using
    /// `loader` only when no model is held yet.
    pub fn toggle<F>(&mut self, loader: F)
    where
        F: FnOnce() -> Result<Box<dyn Segmenter>, ModelError>,
    {
        match self.state {
            RunState::Stopped => {
                if let Err(e) = self.capture.start_camera() {
                    self.alert = Some(format!("Unable to start camera: {}", e));
                    return;
                }
                self.model.ensure_loaded(loader);
                self.state = RunState::Running;
                log::info!("Render loop started ({})", self.model.status().status_text());
            }
            RunState::Running => {
                self.state = RunState::Stopped;
                self.capture.stop();
                self.frame = None;
                log::info!("Render loop stopped");
            }
        }
    }

    /// Switch between front and back camera
    pub fn switch_camera(&mut self) {
        if let Err(e) = self.capture.switch_camera() {
            self.alert = Some(format!("Unable to start camera: {}", e));
            if self.state == RunState::Running {
                self.state = RunState::Stopped;
                self.frame = None;
                log::info!("Render loop stopped, no camera bound");
            }
        }
    }

    /// One loop iteration: size the canvas to the video, clear it, then
    /// paint either the model's mask or the placeholder.
    pub fn tick(&mut self) -> TickOutcome {
        if self.state != RunState::Running {
            return TickOutcome::Idle;
        }

        let Some(frame) = self.capture.latest_frame() else {
            return TickOutcome::Waiting;
        };

        self.canvas.resize(frame.width, frame.height);
        self.orientation = Orientation::of(frame.width, frame.height);
        self.canvas.clear();

        let outcome = match self.model.model_mut() {
            Some(model) => match process_frame(model, &frame) {
                Ok(mask) => {
                    rasterize_mask(&mask, &mut self.canvas);
                    self.inference_error = None;
                    TickOutcome::Mask
                }
                Err(e) => {
                    let message = e.to_string();
                    if self.inference_error.as_deref() != Some(message.as_str()) {
                        log::warn!("Inference failed: {}", message);
                    }
                    self.inference_error = Some(message);
                    TickOutcome::InferenceFailed
                }
            },
            None => {
                draw_placeholder(&mut self.canvas);
                TickOutcome::Placeholder
            }
        };

        self.frame = Some(frame);
        outcome
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn is_streaming(&self) -> bool {
        self.capture.is_streaming()
    }

    pub fn facing(&self) -> FacingMode {
        self.capture.facing()
    }

    pub fn model_status(&self) -> ModelStatus {
        self.model.status()
    }

    /// Status line text
    pub fn status_text(&self) -> String {
        match &self.inference_error {
            Some(e) => format!("Inference error: {}", e),
            None => self.model.status().status_text().to_string(),
        }
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Frame matching the current canvas contents
    pub fn frame(&self) -> Option<&CameraFrame> {
        self.frame.as_ref()
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn alert(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    pub fn dismiss_alert(&mut self) {
        self.alert = None;
    }

    pub fn capture(&self) -> &CaptureController<B> {
        &self.capture
    }
}
