//! TOML loading of the calibration through `ConfigLoader`.

use std::io::Write;
use std::path::Path;

use ogrc_common::prelude::*;
use serde::Deserialize;
use tempfile::NamedTempFile;

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    shared: SharedConfig,
    #[serde(flatten)]
    calibration: CalibrationConfig,
}

fn write_toml(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn full_file_loads_and_validates() {
    let file = write_toml(
        r#"
[shared]
log_level = "warn"

[motor]
steps_per_revolution = 400
gear_ratio = 90.0
microstep_multiplier = 8

[motion]
default_speed = 400.0
min_speed = 20.0
max_speed = 2000.0
homing_speed = 100.0
correction_speed = 100.0

[feedback]
period_ms = 50
correction_threshold = 0.05
jitter_tolerance = 0.2

[azimuth]
soft_min = -180.0
soft_max = 180.0
homing_direction = "cw"

[elevation]
soft_min = 0.0
soft_max = 85.0
"#,
    );

    let cfg = FileConfig::load(file.path()).unwrap();
    assert_eq!(cfg.shared.log_level, LogLevel::Warn);
    let cal = cfg.calibration;
    assert!(cal.validate().is_ok());
    assert_eq!(cal.motor.steps_per_revolution, 400);
    assert_eq!(cal.azimuth.homing_direction, Direction::Cw);
    assert_eq!(cal.feedback.period_ms, 50);
    // 400 * 8 * 90 / 360 = 800 pulses per degree.
    assert_eq!(cal.degrees_to_steps(1.0), 800);
    assert_eq!(cal.elevation.soft_limits(), SoftLimits::new(0.0, 85.0));
}

#[test]
fn missing_file_yields_stock_calibration() {
    let cfg = FileConfig::load_or_default(Path::new("/nonexistent/ogrc.toml")).unwrap();
    assert_eq!(cfg.calibration, CalibrationConfig::default());
}

#[test]
fn invalid_values_fail_validation_not_parsing() {
    let file = write_toml(
        r#"
[motion]
default_speed = 5.0
min_speed = 10.0
"#,
    );
    let cfg = FileConfig::load(file.path()).unwrap();
    assert!(matches!(
        cfg.calibration.validate(),
        Err(ConfigError::ValidationError(_))
    ));
}

#[test]
fn wrong_types_are_parse_errors() {
    let file = write_toml("[motor]\nsteps_per_revolution = \"many\"\n");
    assert!(matches!(
        FileConfig::load(file.path()),
        Err(ConfigError::ParseError(_))
    ));
}
