//! Audiometry Core - Analytic streams and audiometric calibration
//!
//! This library provides the building blocks for presenting calibrated
//! stimuli in hearing tests: a pull-based graph of complex-valued (analytic)
//! sample streams, and a calibration engine that converts hearing levels
//! (dB HL) into playback RMS amplitudes.

pub mod calibration;
pub mod stream;

pub use calibration::facade::{default_level_rms, AudiometricCalibration};
pub use calibration::profile::CalibrationProfile;
pub use calibration::store::{CalibrationStore, FileStore, MemoryStore};
pub use calibration::transducer::TransducerProfile;
pub use calibration::validation::ValidationResults;
pub use calibration::{AudioChannel, CalibrationError, CalibrationSet, Source};
pub use stream::adder::{StreamAdder, StreamId};
pub use stream::{AnalyticSample, AnalyticStream, PresentationConstraints, StreamError};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date, emitted by build.rs (YYYY-MM-DD)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

pub use stream::DEFAULT_SAMPLING_RATE;
