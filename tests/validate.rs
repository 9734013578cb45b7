//! Integration tests for the `validate` command.
use gridplan::cli::handle_validate_command;
use gridplan::log::{LOG_LEVEL_ENV_VAR, is_logger_initialised};
use gridplan::settings::Settings;
use std::path::PathBuf;

/// Get the path to the demo model.
fn get_model_dir() -> PathBuf {
    PathBuf::from("demos/multi_region")
}

/// An integration test for the `validate` command.
///
/// We also check that the logger is initialised after it is run.
#[test]
fn test_handle_validate_command() {
    unsafe { std::env::set_var(LOG_LEVEL_ENV_VAR, "off") };

    assert!(!is_logger_initialised());

    handle_validate_command(&get_model_dir(), Some(Settings::default())).unwrap();

    assert!(is_logger_initialised());
}
