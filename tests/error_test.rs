//! Tests for error types

use planout_experiments::script::Script;
use planout_experiments::Error;

#[test]
fn test_invalid_operator_error() {
    let error = Error::InvalidOperator("unknown op 'shuffle'".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid operator"));
    assert!(error_str.contains("unknown op 'shuffle'"));
    assert!(error_str.contains("Fix the experiment definition"));
}

#[test]
fn test_undefined_variable_error() {
    let error = Error::UndefinedVariable("undefined_name".to_string());
    assert_eq!(format!("{error}"), "Undefined variable: undefined_name");
}

#[test]
fn test_type_mismatch_error() {
    let error = Error::TypeMismatch {
        op: "sum".to_string(),
        detail: "expected a number, got \"a\"".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("Type mismatch in 'sum'"));
    assert!(error_str.contains("expected a number"));
}

#[test]
fn test_json_error_from_parse() {
    let error = Script::parse("{not json").unwrap_err();
    assert!(matches!(error, Error::Json(_)));
    assert!(format!("{error}").contains("JSON error"));
}

#[test]
fn test_storage_error() {
    let error = Error::StorageError("connection reset".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Storage error"));
    assert!(error_str.contains("connection reset"));
}

#[test]
fn test_user_not_found_error() {
    let error = Error::UserNotFound("42".to_string());
    assert_eq!(format!("{error}"), "User not found: 42");
}

#[test]
fn test_experiment_not_found_error() {
    let error = Error::ExperimentNotFound("checkout_flow".to_string());
    assert_eq!(format!("{error}"), "Experiment not found: checkout_flow");
}

#[test]
fn test_invalid_config_error() {
    let error = Error::InvalidConfig("internal_identifier_type must not be empty".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid configuration"));
    assert!(error_str.contains("internal_identifier_type"));
}

#[test]
fn test_error_debug() {
    let error = Error::UndefinedVariable("x".to_string());
    let debug_str = format!("{error:?}");
    assert!(debug_str.contains("UndefinedVariable"));
}
