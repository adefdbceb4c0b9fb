//! Overlay canvas and mask rasterization
//!
//! The canvas is a CPU-side RGBA image, always sized to the camera's native
//! resolution, that is drawn over the video each frame.

use image::{Rgba, RgbaImage};

use crate::ml::LabelMask;

/// Translucent colour for class 1
pub const LABEL_1_COLOR: [u8; 4] = [50, 220, 50, 100];
/// Translucent colour for class 2
pub const LABEL_2_COLOR: [u8; 4] = [220, 60, 50, 100];
pub const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

/// rgba(0, 255, 0, 0.3)
pub const PLACEHOLDER_COLOR: [u8; 4] = [0, 255, 0, 77];
/// Placeholder circle radius in canvas pixels
pub const PLACEHOLDER_RADIUS: f32 = 80.0;

/// Overlay colour for a class id
pub fn label_color(label: u32) -> [u8; 4] {
    match label {
        1 => LABEL_1_COLOR,
        2 => LABEL_2_COLOR,
        _ => TRANSPARENT,
    }
}

/// RGBA drawing surface
pub struct Canvas {
    pixels: RgbaImage,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new()
    }
}

impl Canvas {
    pub fn new() -> Self {
        Self {
            pixels: RgbaImage::new(0, 0),
        }
    }

    /// Match the canvas to the video's native size. Reallocates (and so
    /// clears) only when the size changes.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.pixels.dimensions() != (width, height) {
            self.pixels = RgbaImage::new(width, height);
        }
    }

    /// Make every pixel fully transparent
    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixels.get_pixel(x, y).0
    }

    /// Raw RGBA bytes, row-major
    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }
}

/// Paint a label mask over the whole canvas, upsampled nearest-neighbour
pub fn rasterize_mask(mask: &LabelMask, canvas: &mut Canvas) {
    if mask.width == 0 || mask.height == 0 {
        return;
    }

    let (width, height) = canvas.pixels.dimensions();
    for (x, y, pixel) in canvas.pixels.enumerate_pixels_mut() {
        let src_x = (x as u64 * mask.width as u64 / width as u64) as u32;
        let src_y = (y as u64 * mask.height as u64 / height as u64) as u32;
        *pixel = Rgba(label_color(mask.label_at(src_x, src_y)));
    }
}

/// Fixed circle drawn at the canvas centre when no model is loaded
pub fn draw_placeholder(canvas: &mut Canvas) {
    let cx = canvas.width() as f32 / 2.0;
    let cy = canvas.height() as f32 / 2.0;
    let r2 = PLACEHOLDER_RADIUS * PLACEHOLDER_RADIUS;

    for (x, y, pixel) in canvas.pixels.enumerate_pixels_mut() {
        let dx = x as f32 + 0.5 - cx;
        let dy = y as f32 + 0.5 - cy;
        if dx * dx + dy * dy <= r2 {
            *pixel = Rgba(PLACEHOLDER_COLOR);
        }
    }
}

/// How the video is fitted to the window
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    /// Taller than wide: fill the viewport height
    Portrait,
    /// Fill the viewport width
    Landscape,
}

impl Orientation {
    pub fn of(width: u32, height: u32) -> Self {
        if height > width {
            Orientation::Portrait
        } else {
            Orientation::Landscape
        }
    }
}

/// On-screen size of the video for a viewport, aspect ratio preserved
pub fn fit_to_viewport(
    video: (u32, u32),
    viewport: (f32, f32),
    orientation: Orientation,
) -> (f32, f32) {
    if video.0 == 0 || video.1 == 0 {
        return (0.0, 0.0);
    }

    let (video_w, video_h) = (video.0 as f32, video.1 as f32);
    match orientation {
        Orientation::Portrait => (viewport.1 * video_w / video_h, viewport.1),
        Orientation::Landscape => (viewport.0, viewport.0 * video_h / video_w),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_mask(label: u32, size: u32) -> LabelMask {
        LabelMask {
            labels: vec![label; (size * size) as usize],
            width: size,
            height: size,
        }
    }

    fn canvas(width: u32, height: u32) -> Canvas {
        let mut canvas = Canvas::new();
        canvas.resize(width, height);
        canvas
    }

    fn all_pixels(canvas: &Canvas) -> Vec<[u8; 4]> {
        canvas.as_raw().chunks_exact(4).map(|p| [p[0], p[1], p[2], p[3]]).collect()
    }

    #[test]
    fn test_label_one_fills_uniformly() {
        let mut canvas = canvas(40, 30);
        rasterize_mask(&uniform_mask(1, 8), &mut canvas);
        assert!(all_pixels(&canvas).iter().all(|&p| p == LABEL_1_COLOR));
    }

    #[test]
    fn test_label_two_fills_uniformly() {
        let mut canvas = canvas(17, 9);
        rasterize_mask(&uniform_mask(2, 8), &mut canvas);
        assert!(all_pixels(&canvas).iter().all(|&p| p == LABEL_2_COLOR));
    }

    #[test]
    fn test_other_labels_are_transparent() {
        for label in [0, 3, 255, u32::MAX] {
            let mut canvas = canvas(12, 12);
            rasterize_mask(&uniform_mask(1, 4), &mut canvas);
            rasterize_mask(&uniform_mask(label, 4), &mut canvas);
            assert!(
                all_pixels(&canvas).iter().all(|&p| p == TRANSPARENT),
                "label {}",
                label
            );
        }
    }

    #[test]
    fn test_nearest_neighbour_upsampling() {
        // 2x2 mask: [1, 2]
        //           [0, 1]
        let mask = LabelMask {
            labels: vec![1, 2, 0, 1],
            width: 2,
            height: 2,
        };
        let mut canvas = canvas(6, 4);
        rasterize_mask(&mask, &mut canvas);

        assert_eq!(canvas.pixel(0, 0), LABEL_1_COLOR);
        assert_eq!(canvas.pixel(2, 1), LABEL_1_COLOR);
        assert_eq!(canvas.pixel(3, 0), LABEL_2_COLOR);
        assert_eq!(canvas.pixel(5, 1), LABEL_2_COLOR);
        assert_eq!(canvas.pixel(0, 2), TRANSPARENT);
        assert_eq!(canvas.pixel(2, 3), TRANSPARENT);
        assert_eq!(canvas.pixel(3, 2), LABEL_1_COLOR);
        assert_eq!(canvas.pixel(5, 3), LABEL_1_COLOR);
    }

    #[test]
    fn test_resize_matches_video_dimensions() {
        let mut canvas = Canvas::new();
        for (w, h) in [(1280, 720), (720, 1280), (1, 1), (640, 480)] {
            canvas.resize(w, h);
            assert_eq!((canvas.width(), canvas.height()), (w, h));
            assert_eq!(canvas.as_raw().len(), (w * h * 4) as usize);
        }
    }

    #[test]
    fn test_clear() {
        let mut canvas = canvas(8, 8);
        rasterize_mask(&uniform_mask(2, 2), &mut canvas);
        canvas.clear();
        assert!(all_pixels(&canvas).iter().all(|&p| p == TRANSPARENT));
    }

    #[test]
    fn test_placeholder_circle() {
        let mut canvas = canvas(640, 480);
        draw_placeholder(&mut canvas);

        assert_eq!(canvas.pixel(320, 240), PLACEHOLDER_COLOR);
        assert_eq!(canvas.pixel(320 + 79, 240), PLACEHOLDER_COLOR);
        assert_eq!(canvas.pixel(320, 240 - 80), PLACEHOLDER_COLOR);
        assert_eq!(canvas.pixel(320 + 81, 240), TRANSPARENT);
        assert_eq!(canvas.pixel(320 + 60, 240 + 60), TRANSPARENT);
        assert_eq!(canvas.pixel(0, 0), TRANSPARENT);
        assert_eq!(canvas.pixel(639, 479), TRANSPARENT);
    }

    #[test]
    fn test_fit_to_viewport() {
        assert_eq!(Orientation::of(1280, 720), Orientation::Landscape);
        assert_eq!(Orientation::of(720, 1280), Orientation::Portrait);
        assert_eq!(Orientation::of(500, 500), Orientation::Landscape);

        let viewport = (1000.0, 800.0);
        assert_eq!(
            fit_to_viewport((1280, 720), viewport, Orientation::Landscape),
            (1000.0, 562.5)
        );
        assert_eq!(
            fit_to_viewport((720, 1280), viewport, Orientation::Portrait),
            (450.0, 800.0)
        );
        assert_eq!(
            fit_to_viewport((0, 0), viewport, Orientation::Landscape),
            (0.0, 0.0)
        );
    }
}
