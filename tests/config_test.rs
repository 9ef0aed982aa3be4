//! Tests for config module

use trendcast::config::Config;
use trendcast::models::GapFill;

#[test]
fn test_defaults_are_valid() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.combine.policy, "sum");
    assert_eq!(config.features.cadence_secs, 3600);
    assert_eq!(config.predictor.horizon, 24);
}

#[test]
fn test_load_partial_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trendcast.toml");
    std::fs::write(
        &path,
        r#"
[combine]
policy = "priority_list"
priority = ["bluesky", "archive"]

[features]
cadence_secs = 900
gap_fill = "linear_interpolation"

[pipeline]
max_concurrent_entities = 4

[logging]
level = "debug"
format = "json"
"#,
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();
    assert!(config.validate().is_ok());

    // Overridden sections
    assert_eq!(config.combine.priority, vec!["bluesky", "archive"]);
    assert_eq!(config.features.cadence_secs, 900);
    assert_eq!(
        config.features.gap_fill_method().unwrap(),
        GapFill::LinearInterpolation
    );
    assert_eq!(config.pipeline.max_concurrent_entities, 4);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, "json");

    // Untouched sections keep their defaults
    assert_eq!(config.predictor.horizon, 24);
    assert_eq!(config.cache.ttl_secs, 300);
}

#[test]
fn test_missing_file_is_an_error() {
    assert!(Config::from_file(std::path::Path::new("/nonexistent/trendcast.toml")).is_err());
}

#[test]
fn test_invalid_values_rejected() {
    let mut config = Config::default();
    config.features.cadence_secs = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.predictor.confidence_level = 1.5;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.combine.policy = "newest_wins".to_string();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.pipeline.max_concurrent_entities = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.logging.level = "loud".to_string();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.logging.format = "xml".to_string();
    assert!(config.validate().is_err());
}
