use pretty_assertions::assert_eq;
use scorepulse_infra_storage_fs::FsStorage;
use scorepulse_ports::playback::SubdivisionMode;
use scorepulse_ports::storage::{SettingsDto, StorageError, StoragePort};
use scorepulse_ports::types::{DeviceId, Volume01};
use std::fs;

#[test]
fn missing_settings_fall_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = FsStorage::new(dir.path().to_path_buf());
    let settings = storage.load_settings().expect("settings");
    assert_eq!(settings.click_volume, Volume01::new(0.8));
    assert_eq!(settings.start_latency_ms, 100);
    assert_eq!(settings.default_subdivision, SubdivisionMode::Quarter);
}

#[test]
fn settings_survive_a_save() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = FsStorage::new(dir.path().join("nested"));
    let settings = SettingsDto {
        selected_audio_out: Some(DeviceId("cpal:Alsa:0:default".to_string())),
        click_volume: Volume01::new(0.5),
        default_subdivision: SubdivisionMode::Eighth,
        count_in: true,
        ..SettingsDto::default()
    };
    storage.save_settings(&settings).expect("save");

    let loaded = storage.load_settings().expect("load");
    assert_eq!(loaded.selected_audio_out, settings.selected_audio_out);
    assert_eq!(loaded.click_volume, Volume01::new(0.5));
    assert_eq!(loaded.default_subdivision, SubdivisionMode::Eighth);
    assert!(loaded.count_in);
}

#[test]
fn partial_settings_file_keeps_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("settings.json"), r#"{ "count_in": true }"#).expect("write");
    let storage = FsStorage::new(dir.path().to_path_buf());
    let settings = storage.load_settings().expect("settings");
    assert!(settings.count_in);
    assert_eq!(settings.start_latency_ms, 100);
}

#[test]
fn corrupt_settings_are_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("settings.json"), "not json").expect("write");
    let storage = FsStorage::new(dir.path().to_path_buf());
    assert!(matches!(storage.load_settings(), Err(StorageError::Serde(_))));
}

#[test]
fn score_library_lists_saved_scores() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = FsStorage::new(dir.path().to_path_buf());
    assert_eq!(storage.list_scores().expect("empty"), Vec::<String>::new());

    storage.save_score("waltz", r#"{"title":"Waltz"}"#).expect("save");
    storage.save_score("etude", r#"{"title":"Etude"}"#).expect("save");
    fs::write(storage.library_dir().join("notes.txt"), "ignored").expect("write");

    assert_eq!(storage.list_scores().expect("list"), vec!["etude", "waltz"]);
    assert_eq!(storage.load_score("waltz").expect("load"), r#"{"title":"Waltz"}"#);
    assert!(storage.library_dir().join("waltz.scorepulse").exists());
}

#[test]
fn unknown_and_unsafe_names_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = FsStorage::new(dir.path().to_path_buf());
    assert!(matches!(storage.load_score("missing"), Err(StorageError::NotFound(name)) if name == "missing"));
    assert!(matches!(storage.save_score("../escape", "{}"), Err(StorageError::Io(_))));
    assert!(matches!(storage.load_score(""), Err(StorageError::Io(_))));
}
