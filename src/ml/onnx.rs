//! ONNX Runtime backed segmentation model

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use ndarray::{Array4, ArrayD, IxDyn};
use ort::session::Session;
use ort::value::Tensor;

use super::{ModelError, Segmenter};

/// Variable `ort` reads the runtime library location from
const ORT_DYLIB_ENV: &str = "ORT_DYLIB_PATH";

/// Segmentation model executed through an ONNX Runtime session
pub struct OrtSegmenter {
    session: Session,
    input_size: u32,
}

impl OrtSegmenter {
    /// Load a model from disk.
    ///
    /// The runtime library is loaded on first use. When it cannot be found
    /// `ort` panics rather than returning an error, so the load runs under
    /// `catch_unwind` and the panic is reported as [`ModelError::Runtime`].
    pub fn from_file(
        path: &Path,
        input_size: u32,
        intra_threads: usize,
    ) -> Result<Self, ModelError> {
        if !path.is_file() {
            return Err(ModelError::NotFound(path.to_path_buf()));
        }
        check_runtime_library()?;

        let session = panic::catch_unwind(AssertUnwindSafe(|| build_session(path, intra_threads)))
            .map_err(|payload| {
                ModelError::Runtime(format!(
                    "ONNX Runtime library unavailable: {}",
                    panic_message(payload.as_ref())
                ))
            })??;

        log::info!("Loaded segmentation model from {:?}", path);

        Ok(Self { session, input_size })
    }
}

fn build_session(path: &Path, intra_threads: usize) -> Result<Session, ModelError> {
    ort::init()
        .with_name("CameraSegment")
        .commit()
        .map_err(|e| ModelError::Runtime(format!("Failed to initialize ORT: {}", e)))?;

    Session::builder()
        .map_err(|e| ModelError::Runtime(format!("Failed to create session builder: {}", e)))?
        .with_intra_threads(intra_threads)
        .map_err(|e| ModelError::Runtime(format!("Failed to set threads: {}", e)))?
        .commit_from_file(path)
        .map_err(|e| ModelError::Runtime(format!("Failed to load model: {}", e)))
}

/// Reject an absolute `ORT_DYLIB_PATH` that points at nothing before `ort`
/// tries to open it. Relative values go through the loader's own search.
fn check_runtime_library() -> Result<(), ModelError> {
    let Some(value) = std::env::var_os(ORT_DYLIB_ENV) else {
        return Ok(());
    };
    let library = PathBuf::from(value);
    if library.is_absolute() && !library.is_file() {
        return Err(ModelError::Runtime(format!(
            "ONNX Runtime library not found: {}",
            library.display()
        )));
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown error"
    }
}

impl Segmenter for OrtSegmenter {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn run(&mut self, input: Array4<f32>) -> Result<ArrayD<f32>, ModelError> {
        let input_tensor = Tensor::from_array(input)
            .map_err(|e| ModelError::Input(format!("Failed to create tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| ModelError::Runtime(format!("Inference failed: {}", e)))?;

        // Multi-output graphs: the mask is the first output
        let (_name, output) = outputs.iter().next().ok_or(ModelError::NoOutput)?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::Runtime(format!("Failed to extract output: {}", e)))?;

        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())
            .map_err(|_| ModelError::OutputShape(dims))
    }
}
