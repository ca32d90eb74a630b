//! Stop, retarget and live position behaviour.

use std::time::Duration;

use ogrc_common::rotator::{AxisId, AxisStateKind};
use ogrc_hal::SimulationSettings;

use super::{TestRig, fast_calibration};

/// Homed rig whose moves cruise at the minimum speed.
fn slow_rig() -> TestRig {
    let mut cal = fast_calibration();
    cal.motion.default_speed = cal.motion.min_speed;
    let rig = TestRig::start(cal, SimulationSettings::default());
    rig.rotator.home_all_blocking(super::WAIT).unwrap();
    rig
}

#[test]
fn stop_halts_and_commanded_matches_emitted_pulses() {
    let rig = slow_rig();
    let mut client = rig.connect();
    let home_steps = rig.sim.position_steps(AxisId::Azimuth);

    assert_eq!(client.send("AZ300"), "OK");
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(client.send("S"), "OK");

    // The reply to S is sent once both axes are at rest.
    let snap = rig.snapshot(AxisId::Azimuth);
    assert!(snap.active_motion.is_none());
    assert_ne!(snap.state, AxisStateKind::Moving);
    assert!(snap.commanded_steps > 0 && snap.commanded_steps < 6667);

    let shaft = rig.sim.position_steps(AxisId::Azimuth);
    assert_eq!(shaft - home_steps, snap.commanded_steps);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(rig.sim.position_steps(AxisId::Azimuth), shaft);
}

#[test]
fn no_motion_after_stop_until_retargeted() {
    let rig = slow_rig();
    let mut client = rig.connect();

    assert_eq!(client.send("AZ200"), "OK");
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(client.send("S"), "OK");
    let stopped = rig.sim.pulse_count(AxisId::Azimuth);

    // A feedback correction is disarmed by the stop.
    rig.sim.set_sensor_offset(AxisId::Azimuth, 2.0);
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(rig.sim.pulse_count(AxisId::Azimuth), stopped);

    assert_eq!(client.send("AZ20"), "OK");
    rig.wait_at_rest(AxisId::Azimuth);
    assert!(rig.sim.pulse_count(AxisId::Azimuth) > stopped);
}

#[test]
fn position_never_regresses_while_moving() {
    let rig = slow_rig();
    let mut client = rig.connect();

    assert_eq!(client.send("AZ90"), "OK");
    let mut last = -1.0;
    let mut samples = 0;
    while rig.snapshot(AxisId::Azimuth).state == AxisStateKind::Moving {
        let (az, _, line) = client.position();
        assert!(az >= last, "position regressed: {last} -> {az} ({line})");
        last = az;
        samples += 1;
    }
    assert!(samples > 5, "move too short to observe ({samples} samples)");
    rig.wait_at_rest(AxisId::Azimuth);
    assert_eq!(client.position().0, 90.0);
}

#[test]
fn retarget_while_moving_lands_on_new_target() {
    let rig = slow_rig();
    let mut client = rig.connect();
    let home_steps = rig.sim.position_steps(AxisId::Azimuth);

    assert_eq!(client.send("AZ300"), "OK");
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(client.send("AZ45"), "OK");

    let snap = rig.wait_for(AxisId::Azimuth, |s| {
        s.active_motion.is_none() && s.state != AxisStateKind::Moving
    });
    assert_eq!(snap.target_angle, 45.0);
    assert_eq!(snap.commanded_steps, 1000);
    assert_eq!(rig.sim.position_steps(AxisId::Azimuth) - home_steps, 1000);
}

#[test]
fn set_both_moves_both_axes() {
    let rig = TestRig::homed();
    let mut client = rig.connect();

    assert_eq!(client.send("W90 45"), "OK");
    rig.wait_at_rest(AxisId::Azimuth);
    rig.wait_at_rest(AxisId::Elevation);
    assert_eq!(client.position().2, "AZ=90.0 EL=45.0");

    assert_eq!(client.send("AZ120 EL30"), "OK");
    rig.wait_at_rest(AxisId::Azimuth);
    rig.wait_at_rest(AxisId::Elevation);
    assert_eq!(client.position().2, "AZ=120.0 EL=30.0");
}

#[test]
fn set_both_rejects_whole_command_on_one_bad_value() {
    let rig = TestRig::homed();
    let mut client = rig.connect();

    assert_eq!(client.send("W10 95"), "ERROR RANGE");
    std::thread::sleep(Duration::from_millis(50));
    let az = rig.snapshot(AxisId::Azimuth);
    assert!(az.active_motion.is_none());
    assert_eq!(az.commanded_steps, 0);
    assert_eq!(az.target_angle, 0.0);
}
