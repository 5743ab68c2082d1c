//! Viewer settings supplied by the embedding application
//!
//! Settings are read-mostly: the host updates them whenever its own state
//! changes and the viewer picks them up on the next frame.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Default eye height used by the tour-mode floor lock.
pub const DEFAULT_TOUR_HEIGHT: f32 = 1.7;

/// Scene light parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightSettings {
    pub intensity: f32,
    pub color: [f32; 3],
    pub position: [f32; 3],
}

impl Default for LightSettings {
    fn default() -> Self {
        Self {
            intensity: 1.0,
            color: [1.0, 1.0, 1.0],
            position: [5.0, 10.0, 7.5],
        }
    }
}

/// Everything the host can tune about a running viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerSettings {
    pub background_color: [f32; 3],
    pub light: LightSettings,
    /// Depth-of-field toggle owned by the host
    pub dynamic_focus: bool,
    pub auto_rotate: bool,
    pub tour_mode: bool,
    pub tour_height: f32,
    pub collision_enabled: bool,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            background_color: [0.08, 0.09, 0.11],
            light: LightSettings::default(),
            dynamic_focus: false,
            auto_rotate: false,
            tour_mode: false,
            tour_height: DEFAULT_TOUR_HEIGHT,
            collision_enabled: false,
        }
    }
}

impl ViewerSettings {
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
