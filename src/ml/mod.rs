//! ML inference module
//!
//! Loads the segmentation model and turns camera frames into per-pixel
//! class labels. The runtime sits behind [`Segmenter`] so the render loop
//! does not depend on ONNX Runtime directly.

mod onnx;
pub mod tensor;

use std::path::{Path, PathBuf};

use ndarray::{Array4, ArrayD};
use thiserror::Error;

use crate::camera::CameraFrame;
use crate::settings::Settings;

pub use onnx::OrtSegmenter;
pub use tensor::{argmax_labels, preprocess};

/// Side length of the square model input
pub const DEFAULT_INPUT_SIZE: u32 = 256;

const MODEL_DIR: &str = "model";
const MODEL_FILE: &str = "model.onnx";

/// Errors that can occur while loading or running the model.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("ONNX Runtime error: {0}")]
    Runtime(String),
    #[error("Invalid model input: {0}")]
    Input(String),
    #[error("Unexpected output shape {0:?}, expected [H, W, classes] with optional batch")]
    OutputShape(Vec<usize>),
    #[error("Model produced no outputs")]
    NoOutput,
}

/// Per-pixel class ids at the model's working resolution
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelMask {
    /// Row-major class ids
    pub labels: Vec<u32>,
    pub width: u32,
    pub height: u32,
}

impl LabelMask {
    pub fn label_at(&self, x: u32, y: u32) -> u32 {
        self.labels
            .get((y * self.width + x) as usize)
            .copied()
            .unwrap_or(0)
    }
}

/// A loaded segmentation model
pub trait Segmenter {
    /// Side length of the square input the model expects
    fn input_size(&self) -> u32;

    /// Run one inference and return the first output
    fn run(&mut self, input: Array4<f32>) -> Result<ArrayD<f32>, ModelError>;
}

/// Resize, run and reduce one frame to a label mask.
///
/// The input and output tensors are owned locals and are dropped before
/// this returns, on the error path as well.
pub fn process_frame(
    model: &mut dyn Segmenter,
    frame: &CameraFrame,
) -> Result<LabelMask, ModelError> {
    let input = preprocess(frame, model.input_size())?;
    let output = model.run(input)?;
    argmax_labels(output.view())
}

/// Model loading state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ModelStatus {
    #[default]
    NotLoaded,
    Loading,
    /// Model loaded and in use
    Ready,
    /// No usable model, the placeholder is drawn instead
    Demo,
}

impl ModelStatus {
    /// Get status text for UI
    pub fn status_text(&self) -> &'static str {
        match self {
            ModelStatus::NotLoaded => "Model not loaded",
            ModelStatus::Loading => "Loading model...",
            ModelStatus::Ready => "Model loaded",
            ModelStatus::Demo => "No model found (demo mode)",
        }
    }
}

/// Holds the optional model for the lifetime of the process
#[derive(Default)]
pub struct ModelSlot {
    model: Option<Box<dyn Segmenter>>,
    status: ModelStatus,
}

impl ModelSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a model unless one is already held.
    ///
    /// A failed load is not an error: the slot drops to demo mode and the
    /// next call tries again.
    pub fn ensure_loaded<F>(&mut self, loader: F)
    where
        F: FnOnce() -> Result<Box<dyn Segmenter>, ModelError>,
    {
        if self.model.is_some() {
            return;
        }

        self.status = ModelStatus::Loading;
        log::info!("{}", self.status.status_text());

        match loader() {
            Ok(model) => {
                log::info!("Model loaded (input {}x{})", model.input_size(), model.input_size());
                self.model = Some(model);
                self.status = ModelStatus::Ready;
            }
            Err(e) => {
                log::warn!("Model unavailable, running in demo mode: {}", e);
                self.model = None;
                self.status = ModelStatus::Demo;
            }
        }
    }

    pub fn status(&self) -> ModelStatus {
        self.status
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    pub fn model_mut(&mut self) -> Option<&mut (dyn Segmenter + 'static)> {
        self.model.as_deref_mut()
    }
}

/// Locate the model artifact.
///
/// An explicit path wins. Otherwise `model/model.onnx` is searched next to
/// the executable and its ancestors (covers `cargo run` from target/), then
/// under the current directory.
pub fn find_model_path(explicit: Option<&Path>) -> Result<PathBuf, ModelError> {
    let mut search_dirs = Vec::new();
    if let Ok(exe_path) = std::env::current_exe() {
        search_dirs.extend(exe_path.ancestors().skip(1).take(4).map(Path::to_path_buf));
    }
    if let Ok(cwd) = std::env::current_dir() {
        search_dirs.push(cwd);
    }
    search_model_path(explicit, &search_dirs)
}

/// Resolve the model artifact against an ordered list of base directories
fn search_model_path(
    explicit: Option<&Path>,
    search_dirs: &[PathBuf],
) -> Result<PathBuf, ModelError> {
    if let Some(path) = explicit {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(ModelError::NotFound(path.to_path_buf()))
        };
    }

    let relative = Path::new(MODEL_DIR).join(MODEL_FILE);
    let found = search_dirs
        .iter()
        .map(|dir| dir.join(&relative))
        .find(|candidate| candidate.is_file());
    found.ok_or(ModelError::NotFound(relative))
}

/// Load the ONNX model described by the settings
pub fn load_model(settings: &Settings) -> Result<Box<dyn Segmenter>, ModelError> {
    let path = find_model_path(settings.model_path.as_deref())?;
    log::info!("Loading model from {:?}", path);
    let segmenter = OrtSegmenter::from_file(&path, settings.input_size, settings.intra_threads)?;
    Ok(Box::new(segmenter))
}


#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::testing::FakeSegmenter;
    use super::*;

    fn frame(width: u32, height: u32) -> CameraFrame {
        CameraFrame {
            data: vec![255u8; (width * height * 4) as usize],
            width,
            height,
            frame_number: 0,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn test_process_frame_produces_model_resolution_mask() {
        let mut model = FakeSegmenter::uniform(8, 2);
        let mask = process_frame(&mut model, &frame(32, 24)).unwrap();

        assert_eq!((mask.width, mask.height), (8, 8));
        assert!(mask.labels.iter().all(|&l| l == 2));
        assert_eq!(model.calls, 1);
    }

    #[test]
    fn test_process_frame_propagates_runtime_error() {
        let mut model = FakeSegmenter::uniform(4, 1);
        model.fail = true;
        assert!(matches!(
            process_frame(&mut model, &frame(8, 8)),
            Err(ModelError::Runtime(_))
        ));
    }

    #[test]
    fn test_model_slot_falls_back_to_demo() {
        let mut slot = ModelSlot::new();
        assert_eq!(slot.status(), ModelStatus::NotLoaded);

        slot.ensure_loaded(|| Err(ModelError::NotFound(PathBuf::from("model/model.onnx"))));

        assert_eq!(slot.status(), ModelStatus::Demo);
        assert_eq!(slot.status().status_text(), "No model found (demo mode)");
        assert!(!slot.is_ready());
        assert!(slot.model_mut().is_none());
    }

    #[test]
    fn test_model_slot_loads_once() {
        let mut slot = ModelSlot::new();
        slot.ensure_loaded(|| Ok(Box::new(FakeSegmenter::uniform(4, 1))));
        assert_eq!(slot.status(), ModelStatus::Ready);

        let mut reloaded = false;
        slot.ensure_loaded(|| {
            reloaded = true;
            Err(ModelError::NoOutput)
        });

        assert!(!reloaded);
        assert_eq!(slot.status(), ModelStatus::Ready);
        assert_eq!(slot.model_mut().map(|m| m.input_size()), Some(4));
    }

    #[test]
    fn test_model_slot_retries_after_failure() {
        let mut slot = ModelSlot::new();
        slot.ensure_loaded(|| Err(ModelError::NoOutput));
        slot.ensure_loaded(|| Ok(Box::new(FakeSegmenter::uniform(4, 1))));
        assert_eq!(slot.status(), ModelStatus::Ready);
    }

    #[test]
    fn test_find_model_path_explicit_missing() {
        let missing = Path::new("definitely/not/here/model.onnx");
        assert!(matches!(
            find_model_path(Some(missing)),
            Err(ModelError::NotFound(p)) if p == missing
        ));
    }

    /// Writes a placeholder `model/model.onnx` under `dir`
    fn place_model(dir: &Path) -> PathBuf {
        let path = dir.join(MODEL_DIR).join(MODEL_FILE);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"onnx").unwrap();
        path
    }

    #[test]
    fn test_find_model_path_explicit_existing() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("food.onnx");
        std::fs::write(&model, b"onnx").unwrap();

        assert_eq!(find_model_path(Some(&model)).unwrap(), model);
    }

    #[test]
    fn test_explicit_path_skips_search_dirs() {
        let dir = tempfile::tempdir().unwrap();
        place_model(dir.path());
        let missing = dir.path().join("other.onnx");

        assert!(matches!(
            search_model_path(Some(&missing), &[dir.path().to_path_buf()]),
            Err(ModelError::NotFound(p)) if p == missing
        ));
    }

    #[test]
    fn test_search_finds_model_dir_in_order() {
        let exe_dir = tempfile::tempdir().unwrap();
        let cwd = tempfile::tempdir().unwrap();
        let in_cwd = place_model(cwd.path());

        let dirs = [exe_dir.path().to_path_buf(), cwd.path().to_path_buf()];
        assert_eq!(search_model_path(None, &dirs).unwrap(), in_cwd);

        let in_exe_dir = place_model(exe_dir.path());
        assert_eq!(search_model_path(None, &dirs).unwrap(), in_exe_dir);
    }

    #[test]
    fn test_search_without_artifact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            search_model_path(None, &[dir.path().to_path_buf()]),
            Err(ModelError::NotFound(p)) if p == Path::new("model/model.onnx")
        ));
    }

    #[test]
    fn test_missing_runtime_library_falls_back_to_demo() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            model_path: Some(place_model(dir.path())),
            ..Settings::default()
        };
        std::env::set_var("ORT_DYLIB_PATH", dir.path().join("libonnxruntime.so"));

        assert!(matches!(load_model(&settings), Err(ModelError::Runtime(_))));

        let mut slot = ModelSlot::new();
        slot.ensure_loaded(|| load_model(&settings));
        assert_eq!(slot.status(), ModelStatus::Demo);
        assert!(!slot.is_ready());

        std::env::remove_var("ORT_DYLIB_PATH");
    }
}
