use msoe_rust::config::TrainingConfig;
use msoe_rust::config_file::RunConfigFile;

#[test]
fn test_training_config_default() {
    let config = TrainingConfig::default();
    assert_eq!(config.learning_rate, 0.012);
    assert_eq!(config.batch_size, 4);
    assert_eq!(config.iterations, 600_000);
    assert_eq!(config.print_interval, 10);
    assert_eq!(config.validation_interval, 50);
    assert_eq!(config.snapshot_interval, 20);
    assert_eq!(config.num_threads, 6);
    assert_eq!(config.num_scales, 5);
    assert_eq!(config.segment_thresholds.len(), 7);
}

#[test]
fn test_training_config_validate_success() {
    assert!(TrainingConfig::default().validate().is_ok());
}

#[test]
fn test_training_config_validate_zero_batch() {
    let result = TrainingConfig::builder().batch_size(0).build().validate();
    assert!(result.is_err());
    assert!(format!("{}", result.unwrap_err()).contains("batch size"));
}

#[test]
fn test_training_config_validate_negative_rate() {
    let result = TrainingConfig::builder().learning_rate(-1.0).build().validate();
    assert!(result.is_err());
    assert!(format!("{}", result.unwrap_err()).contains("learning rate"));
}

#[test]
fn test_training_config_validate_unordered_thresholds() {
    let result = TrainingConfig::builder()
        .segment_thresholds(vec![1.0, 4.0, 2.0])
        .build()
        .validate();
    assert!(result.is_err());
}

#[test]
fn test_builder_keeps_unset_defaults() {
    let config = TrainingConfig::builder().iterations(100).num_scales(3).build();
    assert_eq!(config.iterations, 100);
    assert_eq!(config.num_scales, 3);
    assert_eq!(config.batch_size, TrainingConfig::default().batch_size);
}

#[test]
fn test_config_file_round_trip_and_conversion() {
    let dir = std::env::temp_dir().join(format!("msoe-it-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("run.toml");

    let mut file = RunConfigFile::default();
    file.training.batch_size = 8;
    file.network.num_scales = 2;
    file.output.run_id = "it-test".to_string();
    file.to_toml_file(&path).unwrap();

    let back = RunConfigFile::from_toml_file(&path).unwrap();
    assert_eq!(back.output.run_id, "it-test");
    let config = back.to_training_config().unwrap();
    assert_eq!(config.batch_size, 8);
    assert_eq!(config.num_scales, 2);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_config_file_rejects_invalid_values() {
    let file: RunConfigFile = toml::from_str("[training]\niterations = 0\n").unwrap();
    assert!(file.to_training_config().is_err());
}

#[test]
fn test_missing_config_file_is_an_error() {
    assert!(RunConfigFile::from_toml_file("/nonexistent/run.toml").is_err());
}
