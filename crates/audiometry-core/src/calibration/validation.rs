//! Validation records
//!
//! A validation pass plays stimuli at the RMS a calibration predicts for a
//! target level and records the level actually measured. Results mirror the
//! shape of a [`CalibrationProfile`](super::profile::CalibrationProfile) but
//! each point stores the expected/measured pair.

use super::table::{ChannelPair, FrequencyTable};
use super::transducer::TransducerProfile;
use super::{check_frequency, AudioChannel, CalibrationError, CalibrationSet};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// File name pattern of persisted validation records (chrono format)
pub const VALIDATION_FILE_FORMAT: &str = "Validation_%y_%m_%d_%H_%M_%S.json";

/// Expected versus measured output at one calibration point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationPoint {
    /// Hearing level the stimulus targeted (dB HL)
    #[serde(rename = "LevelHL")]
    pub level_hl: f64,
    /// RMS amplitude played to reach the target
    #[serde(rename = "ExpectedRMS")]
    pub expected_rms: f64,
    /// Hearing level actually measured (dB HL)
    #[serde(rename = "MeasuredLevelHL")]
    pub measured_level_hl: f64,
}

impl ValidationPoint {
    /// Measured minus targeted level in dB; positive means too loud
    pub fn discrepancy(&self) -> f64 {
        self.measured_level_hl - self.level_hl
    }
}

/// Frequency-dependent validation points
pub type FrequencyValidationSet = FrequencyTable<ValidationPoint>;

/// Frequency-independent validation values
pub type BroadbandValidationSet = ChannelPair<ValidationPoint>;

/// Outcome of one validation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ValidationResults {
    transducer_profile: TransducerProfile,
    #[serde(default)]
    pure_tone: FrequencyValidationSet,
    #[serde(default)]
    narrowband: FrequencyValidationSet,
    #[serde(default)]
    broadband: BroadbandValidationSet,
    validation_date: DateTime<Local>,
}

impl ValidationResults {
    /// Start an empty validation for `transducer_profile`
    pub fn new(transducer_profile: TransducerProfile) -> Self {
        Self {
            transducer_profile,
            pure_tone: FrequencyValidationSet::new(),
            narrowband: FrequencyValidationSet::new(),
            broadband: BroadbandValidationSet::default(),
            validation_date: Local::now(),
        }
    }

    /// Record a validation measurement
    ///
    /// `frequency` is ignored for [`CalibrationSet::Broadband`].
    pub fn set_validation_point(
        &mut self,
        set: CalibrationSet,
        frequency: f64,
        level_hl: f64,
        channel: AudioChannel,
        expected_rms: f64,
        measured_level_hl: f64,
    ) -> Result<(), CalibrationError> {
        if !(level_hl.is_finite() && expected_rms.is_finite() && measured_level_hl.is_finite()) {
            return Err(CalibrationError::InvalidCalibrationValue(format!(
                "validation point {level_hl} dB HL / {expected_rms} RMS / {measured_level_hl} dB HL is not finite"
            )));
        }

        let point = ValidationPoint {
            level_hl,
            expected_rms,
            measured_level_hl,
        };
        match set {
            CalibrationSet::PureTone | CalibrationSet::Narrowband => {
                check_frequency(frequency)?;
                let table = if set == CalibrationSet::PureTone {
                    &mut self.pure_tone
                } else {
                    &mut self.narrowband
                };
                table.set(frequency, channel, point);
            }
            CalibrationSet::Broadband => self.broadband.set(channel, point),
        }
        Ok(())
    }

    /// Device curve the validation ran with
    pub fn transducer_profile(&self) -> &TransducerProfile {
        &self.transducer_profile
    }

    /// Pure-tone validation points
    pub fn pure_tone(&self) -> &FrequencyValidationSet {
        &self.pure_tone
    }

    /// Narrowband validation points
    pub fn narrowband(&self) -> &FrequencyValidationSet {
        &self.narrowband
    }

    /// Broadband validation values
    pub fn broadband(&self) -> &BroadbandValidationSet {
        &self.broadband
    }

    /// When the validation was started or stamped
    pub fn validation_date(&self) -> DateTime<Local> {
        self.validation_date
    }

    /// Assign the finalization timestamp
    pub fn stamp(&mut self, date: DateTime<Local>) {
        self.validation_date = date;
    }

    /// Name of the persisted record, derived from the timestamp
    pub fn file_name(&self) -> String {
        self.validation_date.format(VALIDATION_FILE_FORMAT).to_string()
    }

    /// Every recorded point
    pub fn points(&self) -> impl Iterator<Item = &ValidationPoint> + '_ {
        let tables = [&self.pure_tone, &self.narrowband];
        tables
            .into_iter()
            .flat_map(|table| table.entries().iter().flat_map(|e| [&e.channels.left, &e.channels.right]))
            .chain([&self.broadband.left, &self.broadband.right])
            .flatten()
    }

    /// Largest absolute discrepancy across all points, in dB
    pub fn max_discrepancy(&self) -> Option<f64> {
        self.points()
            .map(|p| p.discrepancy().abs())
            .max_by(|a, b| a.total_cmp(b))
    }

    /// Whether every point is within `tolerance_db` of its target
    pub fn within_tolerance(&self, tolerance_db: f64) -> bool {
        self.points().all(|p| p.discrepancy().abs() <= tolerance_db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn results() -> ValidationResults {
        ValidationResults::new(TransducerProfile::supra_aural())
    }

    #[test]
    fn test_empty_results() {
        let results = results();
        assert_eq!(results.points().count(), 0);
        assert_eq!(results.max_discrepancy(), None);
        assert!(results.within_tolerance(0.0));
    }

    #[test]
    fn test_records_points_per_set() {
        let mut results = results();
        results
            .set_validation_point(CalibrationSet::PureTone, 1000.0, 70.0, AudioChannel::Left, 0.1, 71.5)
            .unwrap();
        results
            .set_validation_point(CalibrationSet::Narrowband, 500.0, 60.0, AudioChannel::Right, 0.02, 59.0)
            .unwrap();
        results
            .set_validation_point(CalibrationSet::Broadband, 0.0, 80.0, AudioChannel::Left, 0.3, 80.2)
            .unwrap();

        assert_eq!(results.points().count(), 3);
        let point = results.pure_tone().get(1000.0, AudioChannel::Left).unwrap();
        assert!((point.discrepancy() - 1.5).abs() < 1e-12);
        assert!((results.max_discrepancy().unwrap() - 1.5).abs() < 1e-12);
        assert!(results.within_tolerance(2.0));
        assert!(!results.within_tolerance(1.0));
    }

    #[test]
    fn test_overwrites_same_point() {
        let mut results = results();
        results
            .set_validation_point(CalibrationSet::PureTone, 1000.0, 70.0, AudioChannel::Left, 0.1, 75.0)
            .unwrap();
        results
            .set_validation_point(CalibrationSet::PureTone, 1000.0, 70.0, AudioChannel::Left, 0.1, 70.5)
            .unwrap();
        assert_eq!(results.points().count(), 1);
        assert!((results.max_discrepancy().unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_non_finite() {
        let mut results = results();
        assert!(results
            .set_validation_point(CalibrationSet::Broadband, 0.0, 70.0, AudioChannel::Left, 0.1, f64::NAN)
            .is_err());
        assert!(results
            .set_validation_point(CalibrationSet::PureTone, 0.0, 70.0, AudioChannel::Left, 0.1, 70.0)
            .is_err());
    }

    #[test]
    fn test_file_name_from_timestamp() {
        let mut results = results();
        results.stamp(Local.with_ymd_and_hms(2025, 11, 30, 8, 0, 59).unwrap());
        assert_eq!(results.file_name(), "Validation_25_11_30_08_00_59.json");
    }

    #[test]
    fn test_serde_round_trip() {
        let mut results = results();
        results
            .set_validation_point(CalibrationSet::PureTone, 2000.0, 50.0, AudioChannel::Right, 0.01, 49.0)
            .unwrap();

        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(json["PureTone"][0]["Right"]["MeasuredLevelHL"], 49.0);

        let loaded: ValidationResults = serde_json::from_value(json).unwrap();
        assert_eq!(loaded, results);
    }
}
