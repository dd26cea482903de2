//! Calibration sets and profiles
//!
//! A calibration point records the RMS amplitude that produced a known
//! hearing level. Because amplitude scales linearly with pressure, any other
//! level follows from `rms · 10^((target − calibrated) / 20)`.

use super::table::{ChannelPair, FrequencyTable};
use super::transducer::TransducerProfile;
use super::{
    amplitude_to_db, check_frequency, db_to_amplitude, AudioChannel, CalibrationError, CalibrationSet,
};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Record format version written with every profile
pub const PROFILE_VERSION: u32 = 1;

/// Frequency used to relate broadband levels to SPL
pub const BROADBAND_REFERENCE_FREQUENCY: f64 = 1000.0;

/// File name pattern of persisted calibration profiles (chrono format)
pub const CALIBRATION_FILE_FORMAT: &str = "Calibration_%y_%m_%d_%H_%M_%S.json";

/// RMS amplitude measured to produce a hearing level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    /// Hearing level (dB HL) the amplitude produced
    #[serde(rename = "LevelHL")]
    pub level_hl: f64,
    /// RMS amplitude of the calibration stimulus
    #[serde(rename = "RMS")]
    pub rms: f64,
}

impl CalibrationPoint {
    /// Validate and build a point
    ///
    /// # Errors
    /// [`CalibrationError::InvalidCalibrationValue`] for a non-finite level or
    /// a non-positive RMS.
    pub fn new(level_hl: f64, rms: f64) -> Result<Self, CalibrationError> {
        if !level_hl.is_finite() {
            return Err(CalibrationError::InvalidCalibrationValue(format!(
                "level {level_hl} dB HL is not finite"
            )));
        }
        if !rms.is_finite() || rms <= 0.0 {
            return Err(CalibrationError::InvalidCalibrationValue(format!(
                "RMS {rms} must be positive and finite"
            )));
        }
        Ok(Self { level_hl, rms })
    }

    /// RMS producing `level_hl`
    pub fn scaled_to(&self, level_hl: f64) -> f64 {
        db_to_amplitude(level_hl - self.level_hl) * self.rms
    }

    /// RMS (in dB) that would produce 0 dB HL
    fn reference_db(&self) -> f64 {
        amplitude_to_db(self.rms) - self.level_hl
    }
}

/// Frequency-dependent calibration (pure tones, narrowband noise)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrequencyCalibrationSet {
    points: FrequencyTable<CalibrationPoint>,
}

impl FrequencyCalibrationSet {
    /// Record or overwrite the point at `(frequency, channel)`
    pub fn set_calibration_point(
        &mut self,
        frequency: f64,
        level_hl: f64,
        channel: AudioChannel,
        rms: f64,
    ) -> Result<(), CalibrationError> {
        check_frequency(frequency)?;
        let point = CalibrationPoint::new(level_hl, rms)?;
        self.points.set(frequency, channel, point);
        Ok(())
    }

    /// RMS producing `level_hl` at `frequency` on `channel`
    ///
    /// Exact frequencies use the recorded point; others interpolate the
    /// level-normalized dB value over log-frequency. Returns `None` if the
    /// channel has no points.
    pub fn rms(&self, channel: AudioChannel, frequency: f64, level_hl: f64) -> Option<f64> {
        if let Some(point) = self.points.get(frequency, channel) {
            return Some(point.scaled_to(level_hl));
        }
        self.points
            .interpolate(channel, frequency, |_, p| p.reference_db())
            .map(|reference| db_to_amplitude(reference + level_hl))
    }

    /// Recorded points
    pub fn points(&self) -> &FrequencyTable<CalibrationPoint> {
        &self.points
    }

    /// Whether no point has been recorded
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Frequency-independent calibration (broadband noise)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BroadbandCalibrationSet {
    values: ChannelPair<CalibrationPoint>,
}

impl BroadbandCalibrationSet {
    /// Record or overwrite the value for `channel`
    pub fn set_calibration_value(
        &mut self,
        level_hl: f64,
        channel: AudioChannel,
        rms: f64,
    ) -> Result<(), CalibrationError> {
        let point = CalibrationPoint::new(level_hl, rms)?;
        self.values.set(channel, point);
        Ok(())
    }

    /// RMS producing `level_hl` on `channel`
    pub fn rms(&self, channel: AudioChannel, level_hl: f64) -> Option<f64> {
        self.values.get(channel).map(|p| p.scaled_to(level_hl))
    }

    /// Recorded value for `channel`
    pub fn value(&self, channel: AudioChannel) -> Option<&CalibrationPoint> {
        self.values.get(channel)
    }

    /// Whether no value has been recorded
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A complete calibration for one transducer
///
/// Built point by point during a calibration pass, then stamped and
/// persisted. The timestamp names the record on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CalibrationProfile {
    #[serde(default = "default_version")]
    version: u32,
    transducer_profile: TransducerProfile,
    #[serde(default)]
    pure_tone: FrequencyCalibrationSet,
    #[serde(default)]
    narrowband: FrequencyCalibrationSet,
    #[serde(default)]
    broadband: BroadbandCalibrationSet,
    calibration_date: DateTime<Local>,
}

fn default_version() -> u32 {
    PROFILE_VERSION
}

impl CalibrationProfile {
    /// Start an empty profile for `transducer_profile`
    pub fn new(transducer_profile: TransducerProfile) -> Self {
        Self {
            version: PROFILE_VERSION,
            transducer_profile,
            pure_tone: FrequencyCalibrationSet::default(),
            narrowband: FrequencyCalibrationSet::default(),
            broadband: BroadbandCalibrationSet::default(),
            calibration_date: Local::now(),
        }
    }

    /// Device curve this profile was measured with
    pub fn transducer_profile(&self) -> &TransducerProfile {
        &self.transducer_profile
    }

    /// Pure-tone calibration set
    pub fn pure_tone(&self) -> &FrequencyCalibrationSet {
        &self.pure_tone
    }

    /// Narrowband calibration set
    pub fn narrowband(&self) -> &FrequencyCalibrationSet {
        &self.narrowband
    }

    /// Broadband calibration set
    pub fn broadband(&self) -> &BroadbandCalibrationSet {
        &self.broadband
    }

    /// When the profile was finalized (or created, if not finalized yet)
    pub fn calibration_date(&self) -> DateTime<Local> {
        self.calibration_date
    }

    /// Assign the finalization timestamp
    pub fn stamp(&mut self, date: DateTime<Local>) {
        self.calibration_date = date;
    }

    /// Name of the persisted record, derived from the timestamp
    pub fn file_name(&self) -> String {
        self.calibration_date.format(CALIBRATION_FILE_FORMAT).to_string()
    }

    /// Whether any set holds data
    pub fn is_empty(&self) -> bool {
        self.pure_tone.is_empty() && self.narrowband.is_empty() && self.broadband.is_empty()
    }

    /// Record a calibration measurement
    ///
    /// `frequency` is ignored for [`CalibrationSet::Broadband`].
    pub fn set_calibration_point(
        &mut self,
        set: CalibrationSet,
        frequency: f64,
        level_hl: f64,
        channel: AudioChannel,
        rms: f64,
    ) -> Result<(), CalibrationError> {
        match set {
            CalibrationSet::PureTone => self
                .pure_tone
                .set_calibration_point(frequency, level_hl, channel, rms),
            CalibrationSet::Narrowband => self
                .narrowband
                .set_calibration_point(frequency, level_hl, channel, rms),
            CalibrationSet::Broadband => self.broadband.set_calibration_value(level_hl, channel, rms),
        }
    }

    /// RMS per channel producing `level_hl` with stimuli of `set` at `frequency`
    ///
    /// # Errors
    /// [`CalibrationError::MissingCalibrationData`] if either channel has no
    /// data in `set`, [`CalibrationError::InvalidCalibrationValue`] for a
    /// frequency that is not positive and finite.
    pub fn get_rms(
        &self,
        set: CalibrationSet,
        frequency: f64,
        level_hl: f64,
    ) -> Result<(f64, f64), CalibrationError> {
        if set != CalibrationSet::Broadband {
            check_frequency(frequency)?;
        }
        let left = self.channel_rms(set, AudioChannel::Left, frequency, level_hl)?;
        let right = self.channel_rms(set, AudioChannel::Right, frequency, level_hl)?;
        Ok((left, right))
    }

    fn channel_rms(
        &self,
        set: CalibrationSet,
        channel: AudioChannel,
        frequency: f64,
        level_hl: f64,
    ) -> Result<f64, CalibrationError> {
        let rms = match set {
            CalibrationSet::PureTone => self.pure_tone.rms(channel, frequency, level_hl),
            CalibrationSet::Narrowband => self.narrowband.rms(channel, frequency, level_hl),
            CalibrationSet::Broadband => self.broadband.rms(channel, level_hl),
        };
        rms.ok_or(CalibrationError::MissingCalibrationData {
            set,
            channel,
            frequency: (set != CalibrationSet::Broadband).then_some(frequency),
        })
    }

    /// Estimate the RMS producing `level_hl` through the transducer's SPL curve
    ///
    /// Each recorded point gives the device sensitivity (RMS in dB relative
    /// to the SPL it produced). The sensitivity is interpolated to
    /// `frequency` and applied to the target SPL. When `set` has no points on
    /// `channel`, the other sets are tried in order.
    ///
    /// # Errors
    /// [`CalibrationError::MissingCalibrationData`] if no set has data for
    /// `channel`.
    pub fn estimate_rms(
        &self,
        set: CalibrationSet,
        channel: AudioChannel,
        frequency: f64,
        level_hl: f64,
    ) -> Result<f64, CalibrationError> {
        let target_frequency = match set {
            CalibrationSet::Broadband => BROADBAND_REFERENCE_FREQUENCY,
            _ => check_frequency(frequency)?,
        };
        let target_spl = self.transducer_profile.spl(target_frequency, level_hl);

        let order = std::iter::once(set).chain(CalibrationSet::ALL.into_iter().filter(|s| *s != set));
        for candidate in order {
            if let Some(sensitivity) = self.sensitivity(candidate, channel, target_frequency) {
                if candidate != set {
                    debug!(
                        requested = %set,
                        used = %candidate,
                        channel = %channel,
                        "Estimating RMS from another calibration set"
                    );
                }
                return Ok(db_to_amplitude(sensitivity + target_spl));
            }
        }

        Err(CalibrationError::MissingCalibrationData {
            set,
            channel,
            frequency: (set != CalibrationSet::Broadband).then_some(frequency),
        })
    }

    /// Device sensitivity (dB RMS re SPL) of `set` interpolated at `frequency`
    fn sensitivity(&self, set: CalibrationSet, channel: AudioChannel, frequency: f64) -> Option<f64> {
        let transducer = &self.transducer_profile;
        let from_point =
            |f: f64, p: &CalibrationPoint| amplitude_to_db(p.rms) - transducer.spl(f, p.level_hl);

        match set {
            CalibrationSet::PureTone => self.pure_tone.points().interpolate(channel, frequency, from_point),
            CalibrationSet::Narrowband => self.narrowband.points().interpolate(channel, frequency, from_point),
            CalibrationSet::Broadband => self
                .broadband
                .value(channel)
                .map(|p| from_point(BROADBAND_REFERENCE_FREQUENCY, p)),
        }
    }

    /// SPL produced by `level_hl` at `frequency` on this profile's transducer
    pub fn level_spl(&self, frequency: f64, level_hl: f64) -> f64 {
        self.transducer_profile.spl(frequency, level_hl)
    }

    /// Hearing level corresponding to `level_spl` at `frequency`
    pub fn level_hl(&self, frequency: f64, level_spl: f64) -> f64 {
        self.transducer_profile.hl(frequency, level_spl)
    }
}
