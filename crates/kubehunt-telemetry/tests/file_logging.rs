//! Global subscriber installation. Kept to a single test because the
//! subscriber can only be installed once per process.

use kubehunt_telemetry::{FileRotation, LogConfig, LogFormat, TelemetryError, setup_logging};

#[test]
fn test_file_target_creates_directory_and_rejects_second_install() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().join("logs");

    let config = LogConfig::new("info")
        .with_format(LogFormat::Json)
        .with_file_logging(&log_dir, FileRotation::Never);
    setup_logging(&config).unwrap();
    tracing::info!(probe = "namespaces", "written to file");

    assert!(log_dir.is_dir());

    let err = setup_logging(&LogConfig::default()).unwrap_err();
    assert!(matches!(err, TelemetryError::InitError(_)));
}
