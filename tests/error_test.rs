//! Tests for error types

use moran_validate::storage::{ParamKey, RecordType};
use moran_validate::Error;

#[test]
fn test_missing_file_error() {
    let error = Error::MissingFile {
        path: "data/moran_simulation_results.csv".into(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("Input file not found"));
    assert!(error_str.contains("data/moran_simulation_results.csv"));
    assert!(error_str.contains("Run the Moran simulator first"));
    assert!(error.is_fatal());
}

#[test]
fn test_schema_error() {
    let error = Error::Schema {
        column: "std_sup_dev".to_string(),
        context: "Deviation record for N=100, r=1.1".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("required column 'std_sup_dev'"));
    assert!(error_str.contains("N=100, r=1.1"));
    assert_eq!(error.kind(), "Schema");
}

#[test]
fn test_empty_result_error() {
    let error = Error::EmptyResult {
        key: ParamKey::new(1000, 1.05),
        record_type: RecordType::Moran,
        step: "trajectories".to_string(),
    };
    let error_str = format!("{error}");
    assert_eq!(
        error_str,
        "No Moran records for N=1000, r=1.05; skipping trajectories"
    );
    assert!(!error.is_fatal());
}

#[test]
fn test_integration_error() {
    let error = Error::Integration {
        t: 1.5,
        x: 1.2,
        message: "left [0, 1]".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("t=1.5"));
    assert!(error_str.contains("x=1.2"));
    assert!(!error.is_fatal());
    assert_eq!(error.kind(), "Integration");
}

#[test]
fn test_invalid_parameter_error() {
    let error = Error::InvalidParameter("n_sim must be positive".to_string());
    assert_eq!(
        format!("{error}"),
        "Invalid parameter: n_sim must be positive"
    );
    assert!(!error.is_fatal());
}

#[test]
fn test_invalid_record_error() {
    let error = Error::InvalidRecord {
        row: 7,
        message: "unknown record type 'Gillespie'".to_string(),
    };
    assert!(format!("{error}").contains("row 7"));
    assert!(error.is_fatal());
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let error: Error = io_error.into();
    assert!(format!("{error}").contains("IO error"));
    assert_eq!(error.kind(), "Io");
}

#[test]
fn test_json_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let error: Error = json_error.into();
    assert!(format!("{error}").contains("JSON error"));
    assert_eq!(error.kind(), "Json");
}

#[test]
fn test_error_debug() {
    let error = Error::InvalidParameter("test".to_string());
    let debug_str = format!("{error:?}");
    assert!(debug_str.contains("InvalidParameter"));
}
