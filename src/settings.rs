//! Settings management for Camera Segment
//!
//! Handles loading/saving of the JSON preferences file in the platform
//! config directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::camera::{FacingMode, StreamRequest};
use crate::ml::DEFAULT_INPUT_SIZE;

/// Errors that can occur while loading or saving settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("No config directory available on this platform")]
    NoConfigDir,
    #[error("Settings I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Settings JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Application preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Explicit model location, bypasses the `model/model.onnx` search
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
    /// Side length of the square model input
    pub input_size: u32,
    /// Requested camera width
    pub ideal_width: u32,
    /// Requested camera height
    pub ideal_height: u32,
    /// Camera used on the first start
    pub initial_facing: FacingMode,
    /// ONNX Runtime intra-op threads
    pub intra_threads: usize,
    /// Log filter used when RUST_LOG is not set
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_path: None,
            input_size: DEFAULT_INPUT_SIZE,
            ideal_width: 1280,
            ideal_height: 720,
            initial_facing: FacingMode::Environment,
            intra_threads: 2,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Get the settings file path
    fn get_settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("CameraSegment");
            p.push("settings.json");
            p
        })
    }

    /// Load settings from the config directory.
    ///
    /// A missing config directory or file yields the defaults. An unreadable
    /// or malformed file is returned as an error so the caller can report it
    /// once logging is up.
    pub fn load() -> Result<Self, SettingsError> {
        match Self::get_settings_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load settings from a specific file, defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Save settings to the config directory
    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::get_settings_path().ok_or(SettingsError::NoConfigDir)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, self.to_json()?)?;
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Camera request derived from these settings
    pub fn stream_request(&self) -> StreamRequest {
        StreamRequest {
            facing: self.initial_facing,
            ideal_width: self.ideal_width,
            ideal_height: self.ideal_height,
        }
    }
}
