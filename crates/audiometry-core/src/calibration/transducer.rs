//! Transducer HL/SPL curves
//!
//! A hearing level of 0 dB HL corresponds to a device- and
//! frequency-dependent sound pressure level, the reference equivalent
//! threshold SPL. A [`TransducerProfile`] stores those offsets at a set of
//! control frequencies and interpolates between them.

use super::table::interpolate_log_frequency;
use super::CalibrationError;
use serde::{Deserialize, Serialize};

/// One control point of a transducer curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransducerPoint {
    /// Frequency in Hz
    pub frequency: f64,
    /// SPL (dB) produced at 0 dB HL
    pub offset: f64,
}

/// Frequency-dependent HL↔SPL mapping for one output device
///
/// Offsets are interpolated linearly over log-frequency and held constant
/// outside the control range, so `hl(f, spl(f, x)) == x` for any `f`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", try_from = "RawTransducerProfile")]
pub struct TransducerProfile {
    /// Device name
    name: String,
    /// Control points, strictly increasing in frequency
    points: Vec<TransducerPoint>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawTransducerProfile {
    name: String,
    points: Vec<TransducerPoint>,
}

impl TryFrom<RawTransducerProfile> for TransducerProfile {
    type Error = CalibrationError;

    fn try_from(raw: RawTransducerProfile) -> Result<Self, Self::Error> {
        Self::new(raw.name, raw.points)
    }
}

impl TransducerProfile {
    /// Create a profile from `(frequency, offset)` control points
    ///
    /// Points are sorted by frequency.
    ///
    /// # Errors
    /// [`CalibrationError::InvalidTransducerProfile`] if there are no points,
    /// a value is not finite, a frequency is not positive, or two points
    /// share a frequency.
    pub fn new(name: impl Into<String>, mut points: Vec<TransducerPoint>) -> Result<Self, CalibrationError> {
        let name = name.into();
        if points.is_empty() {
            return Err(CalibrationError::InvalidTransducerProfile(format!(
                "{name}: no control points"
            )));
        }

        for point in &points {
            if !point.frequency.is_finite() || point.frequency <= 0.0 || !point.offset.is_finite() {
                return Err(CalibrationError::InvalidTransducerProfile(format!(
                    "{name}: invalid control point {} Hz / {} dB",
                    point.frequency, point.offset
                )));
            }
        }

        points.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));
        if let Some(pair) = points.windows(2).find(|w| w[0].frequency == w[1].frequency) {
            return Err(CalibrationError::InvalidTransducerProfile(format!(
                "{name}: duplicate control frequency {} Hz",
                pair[0].frequency
            )));
        }

        Ok(Self { name, points })
    }

    /// Create a profile from `(frequency, offset)` tuples
    pub fn from_pairs(name: impl Into<String>, pairs: &[(f64, f64)]) -> Result<Self, CalibrationError> {
        let points = pairs
            .iter()
            .map(|&(frequency, offset)| TransducerPoint { frequency, offset })
            .collect();
        Self::new(name, points)
    }

    /// Supra-aural audiometric headphones (TDH-39 reference thresholds)
    pub fn supra_aural() -> Self {
        Self {
            name: "TDH-39".to_string(),
            points: [
                (125.0, 45.0),
                (250.0, 25.5),
                (500.0, 11.5),
                (750.0, 8.0),
                (1000.0, 7.0),
                (1500.0, 6.5),
                (2000.0, 9.0),
                (3000.0, 10.0),
                (4000.0, 9.5),
                (6000.0, 15.5),
                (8000.0, 13.0),
            ]
            .iter()
            .map(|&(frequency, offset)| TransducerPoint { frequency, offset })
            .collect(),
        }
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Control points in increasing frequency order
    pub fn points(&self) -> &[TransducerPoint] {
        &self.points
    }

    /// Reference equivalent threshold SPL at `frequency`
    ///
    /// Frequencies outside the control range take the nearest end point.
    /// A NaN frequency yields NaN.
    pub fn offset(&self, frequency: f64) -> f64 {
        if frequency.is_nan() {
            return f64::NAN;
        }
        let pairs: Vec<(f64, f64)> = self.points.iter().map(|p| (p.frequency, p.offset)).collect();
        // Construction guarantees at least one point
        interpolate_log_frequency(&pairs, frequency).unwrap_or(f64::NAN)
    }

    /// Sound pressure level produced by `level_hl` at `frequency`
    pub fn spl(&self, frequency: f64, level_hl: f64) -> f64 {
        level_hl + self.offset(frequency)
    }

    /// Hearing level corresponding to `level_spl` at `frequency`
    pub fn hl(&self, frequency: f64, level_spl: f64) -> f64 {
        level_spl - self.offset(frequency)
    }
}

impl Default for TransducerProfile {
    fn default() -> Self {
        Self::supra_aural()
    }
}
