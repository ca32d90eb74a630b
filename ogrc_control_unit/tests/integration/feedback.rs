//! Sensor staleness and correction limits through the full stack.

use std::time::Duration;

use ogrc_common::rotator::AxisId;

use super::{TestRig, eventually};

#[test]
fn offline_sensor_marks_both_axes_stale_until_it_returns() {
    let rig = TestRig::homed();
    let mut client = rig.connect();
    assert_eq!(client.position().2, "AZ=0.0 EL=0.0");

    rig.sim.set_sensor_offline(true);
    eventually("stale flags", || {
        rig.snapshot(AxisId::Azimuth).is_stale() && rig.snapshot(AxisId::Elevation).is_stale()
    });
    assert_eq!(client.position().2, "AZ=0.0 EL=0.0 AZ:STALE EL:STALE");

    // Commands are still accepted while the sensor is away.
    assert_eq!(client.send("AZ20"), "OK");
    rig.wait_at_rest(AxisId::Azimuth);

    rig.sim.set_sensor_offline(false);
    eventually("fresh sample", || {
        !rig.snapshot(AxisId::Azimuth).is_stale() && !rig.snapshot(AxisId::Elevation).is_stale()
    });
    assert_eq!(client.position().2, "AZ=20.0 EL=0.0");
}

#[test]
fn isolated_read_failures_are_absorbed() {
    let rig = TestRig::homed();

    // Fewer failures than one cycle's retries.
    let reads = rig.sim.sensor_reads();
    rig.sim.fail_sensor_reads(2);
    eventually("sensor polled again", || rig.sim.sensor_reads() > reads + 5);
    assert!(!rig.snapshot(AxisId::Azimuth).is_stale());
    assert!(!rig.snapshot(AxisId::Elevation).is_stale());
}

#[test]
fn large_error_is_corrected_in_capped_steps() {
    let rig = TestRig::homed();
    let mut client = rig.connect();
    assert_eq!(client.send("AZ100"), "OK");
    rig.wait_at_rest(AxisId::Azimuth);
    let shaft = rig.sim.angle(AxisId::Azimuth);

    // Sensor reads 3° high: corrections are capped at 1° each.
    rig.sim.set_sensor_offset(AxisId::Azimuth, 3.0);
    eventually("first correction", || {
        rig.sim.angle(AxisId::Azimuth) < shaft - 0.5
    });
    let after_first = rig.sim.angle(AxisId::Azimuth);
    assert!(after_first > shaft - 1.05, "overshot the cap: {after_first}");

    eventually("converged", || {
        (rig.sim.angle(AxisId::Azimuth) - (shaft - 3.0)).abs() < 0.5
    });
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(client.position().0, 100.0);
    assert_eq!(rig.snapshot(AxisId::Azimuth).target_angle, 100.0);
}

#[test]
fn no_corrections_before_homing() {
    let rig = TestRig::fast();
    rig.sim.set_sensor_offset(AxisId::Azimuth, 5.0);
    let pulses = rig.sim.pulse_count(AxisId::Azimuth);

    eventually("several samples", || rig.snapshot(AxisId::Azimuth).actual_angle.is_some());
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(rig.sim.pulse_count(AxisId::Azimuth), pulses);
}
