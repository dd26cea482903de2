//! Calibration lifecycle
//!
//! [`AudiometricCalibration`] owns the calibration state of an application:
//! - at most one current custom profile (persisted, named in the config file)
//! - at most one in-progress calibration
//! - at most one in-progress validation
//!
//! ## Source resolution
//!
//! RMS lookups name a [`Source`] and fall back when it is unavailable:
//!
//! ```text
//! Results ──(no calibration in progress)──▶ Custom ──(no profile)──▶ Default
//! ```
//!
//! The default source is a closed-form formula. SPL/HL conversions and RMS
//! estimates need a transducer curve, so they never fall back to it.

use super::config::{CalibrationConfig, CONFIG_FILE_NAME};
use super::profile::CalibrationProfile;
use super::store::{CalibrationStore, DataScope, StoreError};
use super::transducer::TransducerProfile;
use super::validation::ValidationResults;
use super::{check_frequency, db_to_amplitude, AudioChannel, CalibrationError, CalibrationSet, Source};
use chrono::Local;
use serde::de::DeserializeOwned;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

/// Prefix of persisted calibration record names
const CALIBRATION_PREFIX: &str = "Calibration_";

/// Prefix of persisted validation record names
const VALIDATION_PREFIX: &str = "Validation_";

/// RMS producing `level_hl` without any calibration
///
/// `(1/32) · 10^((level_hl − 110) / 20)`, identical on both channels.
pub fn default_level_rms(level_hl: f64) -> f64 {
    (1.0 / 32.0) * db_to_amplitude(level_hl - 110.0)
}

/// Outcome of resolving a requested [`Source`]
#[derive(Debug, Clone, Copy)]
pub enum ResolvedSource<'a> {
    /// A profile backs the request
    Profile {
        source: Source,
        profile: &'a CalibrationProfile,
    },
    /// No profile; use [`default_level_rms`]
    Formula,
}

impl ResolvedSource<'_> {
    /// Source that actually answers the request
    pub fn source(&self) -> Source {
        match self {
            ResolvedSource::Profile { source, .. } => *source,
            ResolvedSource::Formula => Source::Default,
        }
    }
}

#[derive(Debug, Default)]
struct CalibrationState {
    /// File name of the current custom profile
    current_name: Option<String>,
    /// Loaded current custom profile
    custom: Option<CalibrationProfile>,
    /// In-progress calibration
    results: Option<CalibrationProfile>,
    /// In-progress validation
    validation: Option<ValidationResults>,
}

impl CalibrationState {
    /// Walk the fallback chain starting at `requested`
    fn resolve_source(&self, requested: Source) -> ResolvedSource<'_> {
        let mut source = requested;
        loop {
            match source {
                Source::Results => match &self.results {
                    Some(profile) => return ResolvedSource::Profile { source, profile },
                    None => {
                        debug!(requested = %requested, "No calibration in progress, falling back to custom");
                        source = Source::Custom;
                    }
                },
                Source::Custom => match &self.custom {
                    Some(profile) => return ResolvedSource::Profile { source, profile },
                    None => {
                        warn!(
                            requested = %requested,
                            "Fallback behavior with audiometric calibration, using default formula"
                        );
                        source = Source::Default;
                    }
                },
                Source::Default => return ResolvedSource::Formula,
            }
        }
    }

    /// Profile backing `source`, without fallback
    fn require(&self, source: Source, operation: &'static str) -> Result<&CalibrationProfile, CalibrationError> {
        let profile = match source {
            Source::Custom => self.custom.as_ref().ok_or(CalibrationError::NoCustomCalibration),
            Source::Results => self
                .results
                .as_ref()
                .ok_or(CalibrationError::CalibrationNotInitialized),
            Source::Default => Err(CalibrationError::NoBackingProfile {
                requested: source,
                operation,
            }),
        };
        profile.inspect_err(|e| error!(operation, error = %e, "Unable to use calibration source"))
    }
}

/// Calibration context: current profile, in-progress results, persistence
///
/// All state transitions happen under one internal lock, so a context can be
/// shared between threads.
///
/// # Example
/// ```
/// use audiometry_core::calibration::facade::AudiometricCalibration;
/// use audiometry_core::calibration::store::MemoryStore;
/// use audiometry_core::calibration::transducer::TransducerProfile;
/// use audiometry_core::calibration::{AudioChannel, CalibrationSet, Source};
///
/// let calibration = AudiometricCalibration::new(MemoryStore::new());
/// calibration.initiate_calibration(TransducerProfile::supra_aural());
/// for channel in AudioChannel::ALL {
///     calibration
///         .push_calibration_value(70.0, CalibrationSet::PureTone, 1000.0, channel, 0.05)
///         .unwrap();
/// }
/// calibration.finalize_calibration_results().unwrap();
///
/// let (left, right) = calibration
///     .get_level_rms(70.0, CalibrationSet::PureTone, 1000.0, Source::Custom)
///     .unwrap();
/// assert_eq!((left, right), (0.05, 0.05));
/// ```
#[derive(Debug)]
pub struct AudiometricCalibration<S: CalibrationStore> {
    store: S,
    state: Mutex<CalibrationState>,
}

impl<S: CalibrationStore> AudiometricCalibration<S> {
    /// Create a context and load the current calibration from `store`
    pub fn new(store: S) -> Self {
        let calibration = Self {
            store,
            state: Mutex::new(CalibrationState::default()),
        };
        calibration.reload();
        calibration
    }

    /// Persistence backend
    pub fn store(&self) -> &S {
        &self.store
    }

    fn state(&self) -> MutexGuard<'_, CalibrationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Re-read the config file and the current custom profile
    ///
    /// A missing or malformed config is replaced by a fresh one. A missing or
    /// malformed profile leaves no custom calibration active. In-progress
    /// results are kept.
    pub fn reload(&self) {
        let mut state = self.state();
        state.current_name = None;
        state.custom = None;

        let config = match self.read_object::<CalibrationConfig>(DataScope::System, CONFIG_FILE_NAME) {
            Ok(config) => config,
            Err(e) => {
                match &e {
                    CalibrationError::Store(StoreError::NotFound(_)) => {
                        info!("No calibration config found, writing defaults")
                    }
                    _ => warn!(error = %e, "Failed to load calibration config, writing defaults"),
                }
                if let Err(e) = self.write_config(None) {
                    error!(error = %e, "Failed to write calibration config");
                }
                return;
            }
        };

        let Some(name) = config.current_name() else {
            debug!("No custom calibration selected");
            return;
        };

        match self.read_object::<CalibrationProfile>(DataScope::Calibration, name) {
            Ok(profile) => {
                info!(name = %name, "Loaded custom calibration");
                state.current_name = Some(name.to_string());
                state.custom = Some(profile);
            }
            Err(e) => {
                error!(name = %name, error = %e, "Unable to load calibration file");
            }
        }
    }

    fn read_object<T: DeserializeOwned>(&self, scope: DataScope, name: &str) -> Result<T, CalibrationError> {
        let value = self.store.read_json(scope, name)?;
        serde_json::from_value(value).map_err(|source| {
            CalibrationError::Store(StoreError::Malformed {
                name: name.to_string(),
                source,
            })
        })
    }

    fn write_config(&self, current: Option<&str>) -> Result<(), CalibrationError> {
        let value = serde_json::to_value(CalibrationConfig::with_current(current))?;
        self.store
            .write_json(DataScope::System, CONFIG_FILE_NAME, &value, true)?;
        Ok(())
    }

    /// Persist the config file pointing at the current custom profile
    pub fn save_settings(&self) -> Result<(), CalibrationError> {
        let state = self.state();
        self.write_config(state.current_name.as_deref())
    }

    /// Whether a custom profile is loaded
    pub fn has_calibration_profile(&self) -> bool {
        self.state().custom.is_some()
    }

    /// File name of the current custom profile
    pub fn current_calibration_name(&self) -> Option<String> {
        self.state().current_name.clone()
    }

    /// Copy of the current custom profile
    pub fn custom_profile(&self) -> Option<CalibrationProfile> {
        self.state().custom.clone()
    }

    /// Copy of the in-progress calibration
    pub fn calibration_results(&self) -> Option<CalibrationProfile> {
        self.state().results.clone()
    }

    /// Whether a calibration is in progress
    pub fn calibration_in_progress(&self) -> bool {
        self.state().results.is_some()
    }

    /// Whether a validation is in progress
    pub fn validation_in_progress(&self) -> bool {
        self.state().validation.is_some()
    }

    /// Source that would answer an RMS lookup for `requested`
    pub fn resolved_source(&self, requested: Source) -> Source {
        self.state().resolve_source(requested).source()
    }

    /// Start a calibration, discarding any calibration already in progress
    pub fn initiate_calibration(&self, transducer_profile: TransducerProfile) {
        let mut state = self.state();
        if state.results.is_some() {
            warn!("Discarding calibration already in progress");
        }
        info!(transducer = %transducer_profile.name(), "Calibration started");
        state.results = Some(CalibrationProfile::new(transducer_profile));
    }

    /// Record a calibration measurement
    ///
    /// # Errors
    /// [`CalibrationError::CalibrationNotInitialized`] when no calibration is
    /// in progress; [`CalibrationError::InvalidCalibrationValue`] for
    /// unusable values.
    pub fn push_calibration_value(
        &self,
        level_hl: f64,
        set: CalibrationSet,
        frequency: f64,
        channel: AudioChannel,
        rms: f64,
    ) -> Result<(), CalibrationError> {
        let mut state = self.state();
        let results = state
            .results
            .as_mut()
            .ok_or(CalibrationError::CalibrationNotInitialized)?;
        results.set_calibration_point(set, frequency, level_hl, channel, rms)?;
        debug!(
            set = %set,
            frequency,
            level_hl,
            channel = %channel,
            rms,
            "Calibration value recorded"
        );
        Ok(())
    }

    /// Persist the in-progress calibration and make it current
    ///
    /// # Returns
    /// File name of the persisted profile
    ///
    /// # Errors
    /// [`CalibrationError::CalibrationNotInitialized`] when nothing is in
    /// progress. If the profile or the config cannot be written, the
    /// calibration stays in progress and the current profile is unchanged.
    pub fn finalize_calibration_results(&self) -> Result<String, CalibrationError> {
        let mut state = self.state();

        let (name, value) = match state.results.as_mut() {
            Some(profile) => {
                profile.stamp(Local::now());
                (profile.file_name(), serde_json::to_value(&*profile)?)
            }
            None => {
                error!("No calibration results to finalize");
                return Err(CalibrationError::CalibrationNotInitialized);
            }
        };

        self.store
            .write_json(DataScope::Calibration, &name, &value, true)?;
        self.write_config(Some(&name))?;

        state.custom = state.results.take();
        state.current_name = Some(name.clone());

        info!(name = %name, "Calibration finalized");
        Ok(name)
    }

    /// Discard calibration data from `source`
    ///
    /// [`Source::Custom`] clears the current profile and rewrites the config
    /// without a current entry. [`Source::Results`] discards the in-progress
    /// calibration.
    ///
    /// # Errors
    /// [`CalibrationError::InvalidSource`] for [`Source::Default`].
    pub fn drop_calibration_results(&self, source: Source) -> Result<(), CalibrationError> {
        let mut state = self.state();
        match source {
            Source::Custom => {
                self.write_config(None)?;
                state.custom = None;
                state.current_name = None;
                info!("Custom calibration dropped");
            }
            Source::Results => {
                state.results = None;
                info!("Calibration results dropped");
            }
            Source::Default => {
                error!(source = %source, "Unexpected source to drop");
                return Err(CalibrationError::InvalidSource(source));
            }
        }
        Ok(())
    }

    /// RMS per channel producing `level_hl`
    ///
    /// Falls back from [`Source::Results`] to [`Source::Custom`] to
    /// [`Source::Default`] when a source has no profile. Multiply every
    /// sample by the result divided by the stream RMS to present the stream
    /// at `level_hl`.
    ///
    /// # Errors
    /// [`CalibrationError::MissingCalibrationData`] if the resolved profile
    /// lacks data for `set`.
    pub fn get_level_rms(
        &self,
        level_hl: f64,
        set: CalibrationSet,
        frequency: f64,
        source: Source,
    ) -> Result<(f64, f64), CalibrationError> {
        let state = self.state();
        match state.resolve_source(source) {
            ResolvedSource::Profile { profile, .. } => profile.get_rms(set, frequency, level_hl),
            ResolvedSource::Formula => {
                let value = default_level_rms(level_hl);
                Ok((value, value))
            }
        }
    }

    /// Estimate the RMS producing `level_hl` on `channel`
    ///
    /// # Errors
    /// Fails for [`Source::Default`] or a source without a profile.
    pub fn estimate_rms(
        &self,
        source: Source,
        set: CalibrationSet,
        channel: AudioChannel,
        frequency: f64,
        level_hl: f64,
    ) -> Result<f64, CalibrationError> {
        let state = self.state();
        state
            .require(source, "estimate_rms")?
            .estimate_rms(set, channel, frequency, level_hl)
    }

    /// SPL produced by `level_hl` at `frequency`
    ///
    /// # Errors
    /// Fails for [`Source::Default`], a source without a profile or a
    /// frequency that is not positive and finite.
    pub fn level_spl(&self, source: Source, frequency: f64, level_hl: f64) -> Result<f64, CalibrationError> {
        let state = self.state();
        let profile = state.require(source, "level_spl")?;
        Ok(profile.level_spl(check_frequency(frequency)?, level_hl))
    }

    /// Hearing level corresponding to `level_spl` at `frequency`
    ///
    /// # Errors
    /// Fails for [`Source::Default`], a source without a profile or a
    /// frequency that is not positive and finite.
    pub fn level_hl(&self, source: Source, frequency: f64, level_spl: f64) -> Result<f64, CalibrationError> {
        let state = self.state();
        let profile = state.require(source, "level_hl")?;
        Ok(profile.level_hl(check_frequency(frequency)?, level_spl))
    }

    /// Names of persisted calibration profiles, oldest first
    pub fn available_calibrations(&self) -> Result<Vec<String>, CalibrationError> {
        self.list_records(CALIBRATION_PREFIX)
    }

    /// Names of persisted validation records, oldest first
    pub fn available_validations(&self) -> Result<Vec<String>, CalibrationError> {
        self.list_records(VALIDATION_PREFIX)
    }

    fn list_records(&self, prefix: &str) -> Result<Vec<String>, CalibrationError> {
        let mut names: Vec<String> = self
            .store
            .list(DataScope::Calibration)?
            .into_iter()
            .filter(|name| name.starts_with(prefix))
            .collect();
        // yy_MM_dd_HH_mm_ss names sort chronologically within a century
        names.sort();
        Ok(names)
    }

    /// Make a previously persisted profile the current custom calibration
    ///
    /// # Errors
    /// Store or parse errors; the current calibration is unchanged on error.
    pub fn select_calibration(&self, name: &str) -> Result<(), CalibrationError> {
        let profile = self.read_object::<CalibrationProfile>(DataScope::Calibration, name)?;
        let mut state = self.state();
        self.write_config(Some(name))?;
        state.custom = Some(profile);
        state.current_name = Some(name.to_string());
        info!(name = %name, "Custom calibration selected");
        Ok(())
    }

    /// Start a validation, discarding any validation already in progress
    pub fn initiate_validation(&self, transducer_profile: TransducerProfile) {
        let mut state = self.state();
        if state.validation.is_some() {
            warn!("Discarding validation already in progress");
        }
        info!(transducer = %transducer_profile.name(), "Validation started");
        state.validation = Some(ValidationResults::new(transducer_profile));
    }

    /// Record a validation measurement
    ///
    /// # Errors
    /// [`CalibrationError::ValidationNotInitialized`] when no validation is in
    /// progress.
    pub fn push_validation_value(
        &self,
        level_hl: f64,
        set: CalibrationSet,
        frequency: f64,
        channel: AudioChannel,
        expected_rms: f64,
        measured_level_hl: f64,
    ) -> Result<(), CalibrationError> {
        let mut state = self.state();
        let validation = state
            .validation
            .as_mut()
            .ok_or(CalibrationError::ValidationNotInitialized)?;
        validation.set_validation_point(set, frequency, level_hl, channel, expected_rms, measured_level_hl)?;
        debug!(
            set = %set,
            frequency,
            level_hl,
            channel = %channel,
            measured_level_hl,
            "Validation value recorded"
        );
        Ok(())
    }

    /// Persist the in-progress validation as a standalone record
    ///
    /// The current calibration is not affected.
    ///
    /// # Errors
    /// [`CalibrationError::ValidationNotInitialized`] when nothing is in
    /// progress. If the record cannot be written, the validation stays in
    /// progress.
    pub fn finalize_validation_results(&self) -> Result<ValidationResults, CalibrationError> {
        let mut state = self.state();

        let (name, value) = match state.validation.as_mut() {
            Some(validation) => {
                validation.stamp(Local::now());
                (validation.file_name(), serde_json::to_value(&*validation)?)
            }
            None => {
                error!("No validation results to finalize");
                return Err(CalibrationError::ValidationNotInitialized);
            }
        };

        self.store
            .write_json(DataScope::Calibration, &name, &value, true)?;

        let validation = state
            .validation
            .take()
            .ok_or(CalibrationError::ValidationNotInitialized)?;
        info!(
            name = %name,
            max_discrepancy = validation.max_discrepancy().unwrap_or(0.0),
            "Validation finalized"
        );
        Ok(validation)
    }

    /// Discard the in-progress validation
    pub fn drop_validation_results(&self) {
        if self.state().validation.take().is_some() {
            info!("Validation results dropped");
        }
    }

    /// Load a persisted validation record
    pub fn load_validation(&self, name: &str) -> Result<ValidationResults, CalibrationError> {
        self.read_object(DataScope::Calibration, name)
    }
}
