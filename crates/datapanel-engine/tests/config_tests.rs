//! Configuration loading from disk

use datapanel_engine::{EngineConfig, EngineError, Evaluator, VERSION};
use std::io::Write;

#[test]
fn load_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "script_timeout_secs = 5").unwrap();
    writeln!(file, "csv_infer_types = false").unwrap();

    let config = EngineConfig::from_toml_file(file.path()).unwrap();
    assert_eq!(config.script_timeout_secs, 5);
    assert!(!config.csv_infer_types);
    assert_eq!(config.http_timeout_secs, 30);
    assert_eq!(config.user_agent, format!("datapanel/{VERSION}"));

    let evaluator = Evaluator::offline(config.clone());
    assert_eq!(evaluator.config(), &config);
}

#[test]
fn missing_config_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = EngineConfig::from_toml_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, EngineError::Io(_)));
}

#[test]
fn malformed_config_file_is_config_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "http_timeout_secs = \"soon\"").unwrap();
    let err = EngineConfig::from_toml_file(file.path()).unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}
