//! Persistent calibration configuration
//!
//! Stores which calibration profile is current in
//! `System/AudiometricCalibration.json`:
//!
//! ```json
//! { "Version": 1, "Current": "Calibration_24_03_09_14_05_07.json" }
//! ```
//!
//! `"Current"` is omitted when no custom calibration is active.

use serde::{Deserialize, Serialize};

/// Config file format version
pub const CONFIG_VERSION: u32 = 1;

/// Config file name inside the system scope
pub const CONFIG_FILE_NAME: &str = "AudiometricCalibration.json";

fn default_version() -> u32 {
    CONFIG_VERSION
}

/// Persistent calibration configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Format version
    #[serde(rename = "Version", default = "default_version")]
    pub version: u32,
    /// File name of the current custom calibration (None = default formula)
    #[serde(rename = "Current", default, skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            current: None,
        }
    }
}

impl CalibrationConfig {
    /// Config pointing at `current`; empty names count as none
    pub fn with_current(current: Option<&str>) -> Self {
        Self {
            version: CONFIG_VERSION,
            current: current.filter(|name| !name.is_empty()).map(str::to_string),
        }
    }

    /// Name of the current calibration, ignoring empty strings
    pub fn current_name(&self) -> Option<&str> {
        self.current.as_deref().filter(|name| !name.is_empty())
    }
}
