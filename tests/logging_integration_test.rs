//! Integration tests for logging functionality

use edi::config::{parse_config, LoggingConfig};
use edi::logging::init_logging;
use tempfile::TempDir;

#[test]
fn test_logging_config_default() {
    let config = LoggingConfig::default();
    assert!(config.local_enabled);
    assert_eq!(config.local_rotation, "daily");
    assert_eq!(config.local_path, "/var/log/edi");
}

#[test]
fn test_console_only_config() {
    let config = LoggingConfig::console_only();
    assert!(!config.local_enabled);
}

#[test]
fn test_invalid_rotation_is_rejected() {
    let err = parse_config("[logging]\nlocal_rotation = \"weekly\"").unwrap_err();
    assert!(err.to_string().contains("local_rotation"));
}

// The only test in this binary that installs the global subscriber
#[test]
fn test_file_logging_writes_json_lines() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("logs");

    let config = LoggingConfig {
        local_enabled: true,
        local_path: log_path.to_string_lossy().to_string(),
        local_rotation: "never".to_string(),
    };

    let guard = init_logging("debug", &config).unwrap();
    drop(guard);

    assert!(log_path.is_dir());
    let contents = std::fs::read_to_string(log_path.join("edi.log")).unwrap();
    let line = contents
        .lines()
        .find(|l| l.contains("Logging initialized"))
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(json["level"], "DEBUG");
    assert_eq!(json["fields"]["local_enabled"], true);
}
