//! Camera Segment - live segmentation overlay for a camera feed
//!
//! Captures frames from a camera, runs a pretrained segmentation model on
//! each one and paints a translucent per-class mask over the video. Without
//! a model it runs in demo mode and draws a fixed placeholder instead.

pub mod app;
pub mod camera;
pub mod ml;
pub mod overlay;
pub mod session;
pub mod settings;

pub use app::App;
