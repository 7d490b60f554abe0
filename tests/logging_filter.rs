// tests/logging_filter.rs

use std::error::Error;

use tracing::Level;

use assetpipe::logging::{default_filter, filter_from_env_value, parse_level_str};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn level_applies_to_pipeline_modules_only() -> TestResult {
    let debug = default_filter(Level::DEBUG)?.to_string();
    assert!(debug.contains("assetpipe=debug"), "{debug}");
    assert!(debug.contains("warn"), "{debug}");

    let error = default_filter(Level::ERROR)?.to_string();
    assert!(error.contains("assetpipe=error"), "{error}");
    assert!(!error.contains("warn"), "{error}");
    Ok(())
}

#[test]
fn env_value_is_a_level_or_directives() -> TestResult {
    assert!(filter_from_env_value(" Debug ")?.to_string().contains("assetpipe=debug"));

    let custom = filter_from_env_value("info,assetpipe::engine=trace")?.to_string();
    assert!(custom.contains("assetpipe::engine=trace"), "{custom}");

    let fallback = filter_from_env_value("assetpipe=[unclosed")?.to_string();
    assert!(fallback.contains("assetpipe=info"), "{fallback}");
    Ok(())
}

#[test]
fn level_names_parse_loosely() {
    assert_eq!(parse_level_str("WARNING"), Some(Level::WARN));
    assert_eq!(parse_level_str(" trace"), Some(Level::TRACE));
    assert_eq!(parse_level_str("loud"), None);
}
