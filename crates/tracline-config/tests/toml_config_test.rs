//! Loading configuration files from disk.

use std::io::Write;
use tempfile::NamedTempFile;
use tracline_config::{ConfigError, ConfigLoader, RenameDetection, WatchBackend};

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn partial_file_keeps_defaults_for_other_fields() {
    let file = write_config(
        r#"
[monitor]
debounce_ms = 150
rename_detection = "off"
backend = "polling"

[history]
max_entries_per_project = 1000
"#,
    );

    let config = ConfigLoader::new()
        .without_env()
        .with_path(file.path())
        .load()
        .unwrap();

    assert_eq!(config.monitor.debounce_ms, 150);
    assert_eq!(config.monitor.rename_detection, RenameDetection::Off);
    assert_eq!(config.monitor.backend, WatchBackend::Polling);
    assert_eq!(config.monitor.stop_timeout_ms, 5000);
    assert_eq!(config.history.max_entries_per_project, 1000);
    assert!(!config.history.prune_on_stop);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn storage_path_is_read_verbatim_when_absolute() {
    let file = write_config(
        r#"
[storage]
database_path = "/var/lib/tracline/db.sqlite"
busy_timeout_ms = 100
"#,
    );

    let config = ConfigLoader::new()
        .without_env()
        .with_path(file.path())
        .load()
        .unwrap();

    assert_eq!(
        config.storage.database_path,
        std::path::PathBuf::from("/var/lib/tracline/db.sqlite")
    );
    assert_eq!(config.storage.busy_timeout().as_millis(), 100);
}

#[test]
fn invalid_extension_is_a_config_error() {
    let file = write_config(
        r#"
[monitor]
default_extensions = ["*.py"]
"#,
    );

    let err = ConfigLoader::new()
        .without_env()
        .with_path(file.path())
        .load()
        .unwrap_err();

    assert!(matches!(err, ConfigError::InvalidExtension { .. }));
}

#[test]
fn malformed_toml_reports_parse_error() {
    let file = write_config("[monitor\ndebounce_ms = ");

    let err = ConfigLoader::new()
        .without_env()
        .with_path(file.path())
        .load()
        .unwrap_err();

    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn missing_explicit_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ConfigLoader::new()
        .without_env()
        .with_path(dir.path().join("absent.toml"))
        .load()
        .unwrap_err();

    assert!(matches!(err, ConfigError::Read { .. }));
}
