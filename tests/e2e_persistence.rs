//! E2E tests for calibration persistence
//!
//! Tests the config file contents, dropping the custom calibration,
//! recovery from a corrupt config and switching between stored profiles.

use audiometry::calibration::profile::CalibrationProfile;
use audiometry::calibration::store::DataScope;
use audiometry::{
    AudioChannel, AudiometricCalibration, CalibrationError, CalibrationSet, CalibrationStore, FileStore,
    Source, TransducerProfile,
};
use chrono::{Local, TimeZone};
use std::path::Path;

fn read_config(root: &Path) -> serde_json::Value {
    let text = std::fs::read_to_string(root.join("System").join("AudiometricCalibration.json")).unwrap();
    serde_json::from_str(&text).unwrap()
}

fn finalize_broadband(calibration: &AudiometricCalibration<FileStore>, rms: f64) -> String {
    calibration.initiate_calibration(TransducerProfile::supra_aural());
    for channel in AudioChannel::ALL {
        calibration
            .push_calibration_value(65.0, CalibrationSet::Broadband, 0.0, channel, rms)
            .unwrap();
    }
    calibration.finalize_calibration_results().unwrap()
}

#[test]
fn test_fresh_directory_gets_default_config() {
    let dir = tempfile::tempdir().unwrap();
    let calibration = AudiometricCalibration::new(FileStore::new(dir.path()));
    assert!(!calibration.has_calibration_profile());
    assert_eq!(read_config(dir.path()), serde_json::json!({ "Version": 1 }));
}

#[test]
fn test_finalize_points_config_at_profile() {
    let dir = tempfile::tempdir().unwrap();
    let calibration = AudiometricCalibration::new(FileStore::new(dir.path()));
    let name = finalize_broadband(&calibration, 0.2);

    let config = read_config(dir.path());
    assert_eq!(config["Version"], 1);
    assert_eq!(config["Current"], name.as_str());
}

#[test]
fn test_drop_custom_removes_current() {
    let dir = tempfile::tempdir().unwrap();
    let calibration = AudiometricCalibration::new(FileStore::new(dir.path()));
    let name = finalize_broadband(&calibration, 0.2);

    calibration.drop_calibration_results(Source::Custom).unwrap();
    assert!(!calibration.has_calibration_profile());
    assert!(read_config(dir.path()).get("Current").is_none());

    // The profile record itself is kept
    assert!(dir.path().join("Calibration").join(&name).exists());

    let reloaded = AudiometricCalibration::new(FileStore::new(dir.path()));
    assert!(!reloaded.has_calibration_profile());
    assert_eq!(reloaded.current_calibration_name(), None);
}

#[test]
fn test_drop_default_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let calibration = AudiometricCalibration::new(FileStore::new(dir.path()));
    let name = finalize_broadband(&calibration, 0.2);

    assert!(matches!(
        calibration.drop_calibration_results(Source::Default),
        Err(CalibrationError::InvalidSource(Source::Default))
    ));
    assert_eq!(calibration.current_calibration_name(), Some(name));
}

#[test]
fn test_corrupt_config_replaced() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("System")).unwrap();
    std::fs::write(dir.path().join("System").join("AudiometricCalibration.json"), "not json").unwrap();

    let calibration = AudiometricCalibration::new(FileStore::new(dir.path()));
    assert!(!calibration.has_calibration_profile());
    assert_eq!(read_config(dir.path()), serde_json::json!({ "Version": 1 }));
}

#[test]
fn test_save_settings_rewrites_config() {
    let dir = tempfile::tempdir().unwrap();
    let calibration = AudiometricCalibration::new(FileStore::new(dir.path()));
    let name = finalize_broadband(&calibration, 0.2);

    std::fs::remove_file(dir.path().join("System").join("AudiometricCalibration.json")).unwrap();
    calibration.save_settings().unwrap();
    assert_eq!(read_config(dir.path())["Current"], name.as_str());
}

#[test]
fn test_select_stored_calibration() {
    let dir = tempfile::tempdir().unwrap();
    let calibration = AudiometricCalibration::new(FileStore::new(dir.path()));
    let latest = finalize_broadband(&calibration, 0.2);

    // An older record written by a previous session
    let mut older = CalibrationProfile::new(TransducerProfile::supra_aural());
    for channel in AudioChannel::ALL {
        older
            .set_calibration_point(CalibrationSet::Broadband, 0.0, 65.0, channel, 0.05)
            .unwrap();
    }
    older.stamp(Local.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap());
    let older_name = older.file_name();
    calibration
        .store()
        .write_json(
            DataScope::Calibration,
            &older_name,
            &serde_json::to_value(&older).unwrap(),
            true,
        )
        .unwrap();

    let names = calibration.available_calibrations().unwrap();
    assert_eq!(names, vec![older_name.clone(), latest]);

    calibration.select_calibration(&older_name).unwrap();
    let (left, _) = calibration
        .get_level_rms(65.0, CalibrationSet::Broadband, 0.0, Source::Custom)
        .unwrap();
    assert_eq!(left, 0.05);

    let reloaded = AudiometricCalibration::new(FileStore::new(dir.path()));
    assert_eq!(reloaded.current_calibration_name(), Some(older_name));
    assert_eq!(reloaded.custom_profile(), Some(older));
}

#[test]
fn test_select_missing_calibration_keeps_current() {
    let dir = tempfile::tempdir().unwrap();
    let calibration = AudiometricCalibration::new(FileStore::new(dir.path()));
    let name = finalize_broadband(&calibration, 0.2);

    assert!(calibration.select_calibration("Calibration_99_01_01_00_00_00.json").is_err());
    assert_eq!(calibration.current_calibration_name(), Some(name.clone()));
    assert_eq!(read_config(dir.path())["Current"], name.as_str());
}
