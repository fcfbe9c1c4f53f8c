//! Configuration file round-trip and validation behavior

use thermorig::Config;
use thermorig::registers::{Channel, MeterFamily};

#[test]
fn test_yaml_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("thermorig_config.yaml");

    let mut config = Config::default();
    config.serial.port = "/dev/ttyUSB1".to_string();
    config.meter.family = MeterFamily::Sdm120;
    config.meter.heater_slave_id = 1;
    config.meter.fan_slave_id = 2;
    config.acquisition.default_sample_interval_secs = 10;

    config.save_to_file(&path).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded.serial.port, "/dev/ttyUSB1");
    assert_eq!(loaded.meter.family, MeterFamily::Sdm120);
    assert_eq!(loaded.meter.slave_id(Channel::Heater), 1);
    assert_eq!(loaded.meter.slave_id(Channel::Fan), 2);
    assert_eq!(loaded.acquisition.default_sample_interval_secs, 10);
    assert!(loaded.validate().is_ok());
}

#[test]
fn test_partial_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.yaml");
    std::fs::write(
        &path,
        "meter:\n  family: sdm120\n  fan_slave_id: 3\nlogging:\n  level: DEBUG\n",
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.meter.family, MeterFamily::Sdm120);
    assert_eq!(config.meter.slave_id(Channel::Fan), 3);
    assert_eq!(config.serial.baud_rate, 9600);
    assert_eq!(config.logging.level, "DEBUG");
}

#[test]
fn test_malformed_yaml_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.yaml");
    std::fs::write(&path, "serial: [not, a, mapping\n").unwrap();
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_missing_file_is_an_error() {
    assert!(Config::from_file("/nonexistent/thermorig.yaml").is_err());
}
