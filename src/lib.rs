//! Audiometry - calibrated stimulus presentation for hearing tests
//!
//! This library re-exports the analytic stream graph and the calibration
//! engine from `audiometry-core`.

pub use audiometry_core::calibration;
pub use audiometry_core::stream;

pub use audiometry_core::{
    default_level_rms, AnalyticSample, AnalyticStream, AudioChannel, AudiometricCalibration,
    CalibrationError, CalibrationProfile, CalibrationSet, CalibrationStore, FileStore, MemoryStore,
    PresentationConstraints, Source, StreamAdder, StreamError, StreamId, TransducerProfile,
    ValidationResults,
};
pub use audiometry_core::{BUILD_DATE, DEFAULT_SAMPLING_RATE, VERSION};
