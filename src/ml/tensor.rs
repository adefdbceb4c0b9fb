//! Tensor preparation and reduction around a single inference call

use image::imageops::{self, FilterType};
use ndarray::{Array4, ArrayView1, ArrayViewD, Axis};

use super::{LabelMask, ModelError};
use crate::camera::CameraFrame;

/// Build the NHWC input `[1, size, size, 3]`: bilinear square resize, alpha
/// dropped, channels scaled to 0..1.
pub fn preprocess(frame: &CameraFrame, size: u32) -> Result<Array4<f32>, ModelError> {
    if frame.width == 0 || frame.height == 0 || size == 0 {
        return Err(ModelError::Input(format!(
            "cannot resize {}x{} frame to {}x{}",
            frame.width, frame.height, size, size
        )));
    }

    let image = frame.as_image().ok_or_else(|| {
        ModelError::Input(format!(
            "frame buffer holds {} bytes, {}x{} RGBA needs {}",
            frame.data.len(),
            frame.width,
            frame.height,
            frame.width as usize * frame.height as usize * 4
        ))
    })?;

    let resized = imageops::resize(&image, size, size, FilterType::Triangle);
    let side = size as usize;

    Ok(Array4::from_shape_fn((1, side, side, 3), |(_, y, x, c)| {
        resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    }))
}

/// Collapse the trailing class axis of a `[H, W, C]` (or `[1, H, W, C]`)
/// output into one label per pixel. Ties go to the lower class id.
pub fn argmax_labels(output: ArrayViewD<'_, f32>) -> Result<LabelMask, ModelError> {
    let output = if output.ndim() == 4 && output.shape()[0] == 1 {
        output.index_axis_move(Axis(0), 0)
    } else {
        output
    };

    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape.contains(&0) {
        return Err(ModelError::OutputShape(shape));
    }

    let labels = output.map_axis(Axis(2), argmax);

    Ok(LabelMask {
        labels: labels.iter().copied().collect(),
        width: shape[1] as u32,
        height: shape[0] as u32,
    })
}

fn argmax(lane: ArrayView1<'_, f32>) -> u32 {
    let mut best = 0;
    let mut best_value = f32::NEG_INFINITY;
    for (i, &value) in lane.iter().enumerate() {
        if value > best_value {
            best = i;
            best_value = value;
        }
    }
    best as u32
}
