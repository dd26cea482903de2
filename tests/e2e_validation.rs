//! E2E tests for validation passes
//!
//! Tests a calibrate -> validate flow, the persisted validation record and
//! its independence from the current calibration.

use audiometry::{
    AudioChannel, AudiometricCalibration, CalibrationError, CalibrationSet, FileStore, Source,
    TransducerProfile,
};

fn calibrated(root: &std::path::Path) -> (AudiometricCalibration<FileStore>, String) {
    let calibration = AudiometricCalibration::new(FileStore::new(root));
    calibration.initiate_calibration(TransducerProfile::supra_aural());
    for frequency in [500.0, 1000.0, 2000.0] {
        for channel in AudioChannel::ALL {
            calibration
                .push_calibration_value(60.0, CalibrationSet::Narrowband, frequency, channel, 0.02)
                .unwrap();
        }
    }
    let name = calibration.finalize_calibration_results().unwrap();
    (calibration, name)
}

#[test]
fn test_validation_flow() {
    let dir = tempfile::tempdir().unwrap();
    let (calibration, current) = calibrated(dir.path());

    calibration.initiate_validation(TransducerProfile::supra_aural());
    assert!(calibration.validation_in_progress());

    let measured = [(500.0, 60.4), (1000.0, 59.2), (2000.0, 61.0)];
    for (frequency, measured_hl) in measured {
        let (left, _) = calibration
            .get_level_rms(60.0, CalibrationSet::Narrowband, frequency, Source::Custom)
            .unwrap();
        calibration
            .push_validation_value(
                60.0,
                CalibrationSet::Narrowband,
                frequency,
                AudioChannel::Left,
                left,
                measured_hl,
            )
            .unwrap();
    }

    let results = calibration.finalize_validation_results().unwrap();
    assert!(!calibration.validation_in_progress());
    assert_eq!(results.points().count(), 3);
    assert!((results.max_discrepancy().unwrap() - 1.0).abs() < 1e-9);
    assert!(results.within_tolerance(1.0));
    assert!(!results.within_tolerance(0.5));

    let name = results.file_name();
    assert!(name.starts_with("Validation_"));
    assert!(dir.path().join("Calibration").join(&name).exists());

    // Validation does not touch the current calibration
    assert_eq!(calibration.current_calibration_name(), Some(current));
    assert_eq!(calibration.available_calibrations().unwrap().len(), 1);
}

#[test]
fn test_validation_record_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let (calibration, _) = calibrated(dir.path());

    calibration.initiate_validation(TransducerProfile::supra_aural());
    calibration
        .push_validation_value(70.0, CalibrationSet::Broadband, 0.0, AudioChannel::Right, 0.3, 68.5)
        .unwrap();
    let results = calibration.finalize_validation_results().unwrap();

    let reopened = AudiometricCalibration::new(FileStore::new(dir.path()));
    let names = reopened.available_validations().unwrap();
    assert_eq!(names, vec![results.file_name()]);

    let loaded = reopened.load_validation(&names[0]).unwrap();
    assert_eq!(loaded, results);
    let point = loaded.broadband().right.unwrap();
    assert_eq!(point.measured_level_hl, 68.5);
    assert_eq!(point.discrepancy(), -1.5);
}

#[test]
fn test_validation_requires_initiate() {
    let dir = tempfile::tempdir().unwrap();
    let calibration = AudiometricCalibration::new(FileStore::new(dir.path()));

    assert!(matches!(
        calibration.push_validation_value(60.0, CalibrationSet::PureTone, 1000.0, AudioChannel::Left, 0.1, 60.0),
        Err(CalibrationError::ValidationNotInitialized)
    ));
    assert!(matches!(
        calibration.finalize_validation_results(),
        Err(CalibrationError::ValidationNotInitialized)
    ));
    assert!(calibration.available_validations().unwrap().is_empty());
}

#[test]
fn test_dropped_validation_not_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let calibration = AudiometricCalibration::new(FileStore::new(dir.path()));

    calibration.initiate_validation(TransducerProfile::supra_aural());
    calibration
        .push_validation_value(60.0, CalibrationSet::PureTone, 1000.0, AudioChannel::Left, 0.1, 60.0)
        .unwrap();
    calibration.drop_validation_results();

    assert!(!calibration.validation_in_progress());
    assert!(calibration.available_validations().unwrap().is_empty());
}

#[test]
fn test_validation_independent_of_calibration_in_progress() {
    let dir = tempfile::tempdir().unwrap();
    let calibration = AudiometricCalibration::new(FileStore::new(dir.path()));

    calibration.initiate_calibration(TransducerProfile::supra_aural());
    calibration.initiate_validation(TransducerProfile::supra_aural());
    calibration.drop_calibration_results(Source::Results).unwrap();

    assert!(!calibration.calibration_in_progress());
    assert!(calibration.validation_in_progress());
}
