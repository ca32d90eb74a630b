//! End-to-end walkthroughs on the reference mount (AZ 0..360, EL 0..90,
//! 200 steps/rev, 40:1 gear, microstep 1).

use std::time::Duration;

use ogrc_common::rotator::{AxisId, AxisStateKind, CalibrationConfig, FaultReason};
use ogrc_hal::SimulationSettings;

use super::{TestRig, eventually, fast_calibration};

#[test]
fn set_azimuth_then_query() {
    let rig = TestRig::homed();
    let mut client = rig.connect();

    assert_eq!(client.send("AZ180"), "OK");
    let snap = rig.wait_at_rest(AxisId::Azimuth);
    assert_eq!(snap.commanded_steps, 4000);

    let (_, _, line) = client.position();
    assert_eq!(line, "AZ=180.0 EL=0.0");
}

#[test]
fn out_of_range_target_is_rejected_without_side_effects() {
    let rig = TestRig::homed();
    let mut client = rig.connect();
    let before = rig.snapshot(AxisId::Azimuth);

    assert_eq!(client.send("AZ400"), "ERROR RANGE");
    assert_eq!(client.send("EL90.5"), "ERROR RANGE");
    assert_eq!(client.send("AZ-0.1"), "ERROR RANGE");

    let after = rig.snapshot(AxisId::Azimuth);
    assert_eq!(after.commanded_steps, before.commanded_steps);
    assert_eq!(after.target_angle, before.target_angle);
    assert!(after.active_motion.is_none());
    assert_eq!(client.position().2, "AZ=0.0 EL=0.0");
}

#[test]
fn home_drives_to_switch_and_zeroes() {
    let rig = TestRig::fast();
    let mut client = rig.connect();
    assert!(!rig.snapshot(AxisId::Azimuth).is_homed());

    assert_eq!(client.send("H"), "OK");
    let snap = rig.wait_for(AxisId::Azimuth, |s| {
        s.state == AxisStateKind::Idle && s.is_homed()
    });
    assert_eq!(snap.commanded_steps, 0);
    assert_eq!(snap.commanded_angle, 0.0);
    assert_eq!(snap.home_epoch, 1);

    // Zero sits just past the switch release point, with the sensor
    // re-referenced to it.
    assert!(rig.sim.angle(AxisId::Azimuth).abs() < 0.5);
    assert!(!rig.sim.limit_active(AxisId::Azimuth));
    assert!(rig.rotator.limit_trips(AxisId::Azimuth) >= 1);
    eventually("actual angle near zero", || {
        rig.snapshot(AxisId::Azimuth)
            .actual_angle
            .is_some_and(|a| a.abs() < 0.05)
    });

    rig.wait_for(AxisId::Elevation, |s| s.is_homed());
    assert_eq!(client.position().2, "AZ=0.0 EL=0.0");
}

#[test]
fn small_error_is_left_alone() {
    let rig = TestRig::homed();
    let mut client = rig.connect();
    assert_eq!(client.send("AZ180"), "OK");
    rig.wait_at_rest(AxisId::Azimuth);
    let shaft = rig.sim.position_steps(AxisId::Azimuth);

    rig.sim.set_sensor_offset(AxisId::Azimuth, 0.3);
    eventually("sensor shows the bias", || {
        rig.snapshot(AxisId::Azimuth)
            .actual_angle
            .is_some_and(|a| (a - 180.3).abs() < 0.05)
    });
    std::thread::sleep(Duration::from_millis(200));

    assert_eq!(rig.sim.position_steps(AxisId::Azimuth), shaft);
    assert_eq!(rig.snapshot(AxisId::Azimuth).commanded_steps, 4000);
}

#[test]
fn error_above_threshold_is_corrected_within_cap() {
    let rig = TestRig::homed();
    let mut client = rig.connect();
    assert_eq!(client.send("AZ180"), "OK");
    rig.wait_at_rest(AxisId::Azimuth);
    let shaft = rig.sim.angle(AxisId::Azimuth);

    // Sensor now says 181 while dead reckoning says 180.
    rig.sim.set_sensor_offset(AxisId::Azimuth, 1.0);
    eventually("shaft pulled back by the correction", || {
        (rig.sim.angle(AxisId::Azimuth) - (shaft - 1.0)).abs() < 0.05
    });

    let snap = rig.wait_at_rest(AxisId::Azimuth);
    assert_eq!(snap.target_angle, 180.0);
    assert_eq!(snap.commanded_steps, 4000);
    assert_eq!(client.position().2, "AZ=180.0 EL=0.0");
}

#[test]
fn unexpected_elevation_limit_faults_until_homed() {
    let mut cal = fast_calibration();
    cal.motion.default_speed = cal.motion.min_speed;
    let rig = TestRig::start(cal, SimulationSettings::default());
    rig.rotator.home_all_blocking(super::WAIT).unwrap();
    let mut client = rig.connect();

    assert_eq!(client.send("EL80"), "OK");
    rig.wait_for(AxisId::Elevation, |s| s.state == AxisStateKind::Moving);
    rig.sim.force_limit(AxisId::Elevation, Some(true));

    let snap = rig.wait_for(AxisId::Elevation, |s| {
        s.state == AxisStateKind::Fault && s.active_motion.is_none()
    });
    assert_eq!(snap.fault, Some(FaultReason::UnexpectedLimit));
    assert!(!snap.is_homed());
    let halted = rig.sim.pulse_count(AxisId::Elevation);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(rig.sim.pulse_count(AxisId::Elevation), halted);

    assert_eq!(client.send("EL10"), "ERROR FAULT");
    assert!(client.position().2.ends_with("EL:FAULT(unexpected-limit)"));

    rig.sim.force_limit(AxisId::Elevation, None);
    assert_eq!(client.send("H"), "OK");
    rig.wait_for(AxisId::Elevation, |s| {
        s.state == AxisStateKind::Idle && s.is_homed()
    });
    assert_eq!(client.send("EL10"), "OK");
}

#[test]
fn step_conversion_round_trips_within_resolution() {
    let cal = CalibrationConfig::default();
    let resolution = cal.step_resolution();
    for tenth in 0..=3600 {
        let angle = f64::from(tenth) / 10.0;
        let back = cal.steps_to_degrees(cal.degrees_to_steps(angle));
        assert!((back - angle).abs() <= resolution, "{angle} -> {back}");
    }
}
