//! Audiometric calibration
//!
//! Converts clinical hearing levels (dB HL) into playback RMS amplitudes and
//! records how well measured output matches expectation:
//! - Device HL/SPL curves ([`transducer`])
//! - Frequency-indexed point tables and interpolation ([`table`])
//! - Calibration sets and profiles ([`profile`])
//! - Validation records ([`validation`])
//! - Persistence collaborator and config file ([`store`], [`config`])
//! - The lifecycle context object ([`facade`])

pub mod config;
pub mod facade;
pub mod profile;
pub mod store;
pub mod table;
pub mod transducer;
pub mod validation;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use store::StoreError;

/// Output channel of a stereo transducer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioChannel {
    Left,
    Right,
}

impl AudioChannel {
    /// Both channels, left first
    pub const ALL: [AudioChannel; 2] = [AudioChannel::Left, AudioChannel::Right];
}

impl fmt::Display for AudioChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioChannel::Left => write!(f, "left"),
            AudioChannel::Right => write!(f, "right"),
        }
    }
}

/// Stimulus family a calibration point belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalibrationSet {
    PureTone,
    Narrowband,
    Broadband,
}

impl CalibrationSet {
    /// All sets in lookup order
    pub const ALL: [CalibrationSet; 3] = [
        CalibrationSet::PureTone,
        CalibrationSet::Narrowband,
        CalibrationSet::Broadband,
    ];
}

impl fmt::Display for CalibrationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationSet::PureTone => write!(f, "pure-tone"),
            CalibrationSet::Narrowband => write!(f, "narrowband"),
            CalibrationSet::Broadband => write!(f, "broadband"),
        }
    }
}

/// Where calibration values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// Closed-form formula, no profile needed
    Default,
    /// The persisted custom profile marked as current
    Custom,
    /// The in-progress calibration
    Results,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Default => write!(f, "default"),
            Source::Custom => write!(f, "custom"),
            Source::Results => write!(f, "results"),
        }
    }
}

/// Errors that can occur during calibration operations
#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("Calibration not initialized")]
    CalibrationNotInitialized,

    #[error("Validation not initialized")]
    ValidationNotInitialized,

    #[error("No custom calibration profile loaded")]
    NoCustomCalibration,

    #[error("Source {requested} has no calibration profile for {operation}")]
    NoBackingProfile {
        requested: Source,
        operation: &'static str,
    },

    #[error("Unexpected source for this operation: {0}")]
    InvalidSource(Source),

    #[error("Missing {set} calibration data for {channel} channel{}", at_frequency(.frequency))]
    MissingCalibrationData {
        set: CalibrationSet,
        channel: AudioChannel,
        frequency: Option<f64>,
    },

    #[error("Invalid calibration value: {0}")]
    InvalidCalibrationValue(String),

    #[error("Invalid transducer profile: {0}")]
    InvalidTransducerProfile(String),

    #[error("Calibration storage failed: {0}")]
    Store(#[from] StoreError),

    #[error("Calibration record could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn at_frequency(frequency: &Option<f64>) -> String {
    frequency.map(|f| format!(" at {f} Hz")).unwrap_or_default()
}

/// Reject frequencies that cannot address a control point
pub fn check_frequency(frequency: f64) -> Result<f64, CalibrationError> {
    if frequency.is_finite() && frequency > 0.0 {
        Ok(frequency)
    } else {
        Err(CalibrationError::InvalidCalibrationValue(format!(
            "frequency {frequency} Hz must be positive"
        )))
    }
}

/// Convert decibels to a linear amplitude ratio
pub fn db_to_amplitude(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Convert a linear amplitude ratio to decibels
pub fn amplitude_to_db(amplitude: f64) -> f64 {
    20.0 * amplitude.log10()
}
