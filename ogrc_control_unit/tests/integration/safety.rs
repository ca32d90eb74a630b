//! Faults, limit handling and drive shutdown.

use std::time::Duration;

use ogrc_common::rotator::{AxisId, AxisStateKind, AxisStatusFlags, FaultReason};
use ogrc_hal::SimulationSettings;

use super::{TestRig, eventually, fast_calibration};

#[test]
fn homing_without_switch_faults_with_timeout() {
    let mut cal = fast_calibration();
    cal.elevation.homing_max_travel_deg = 5.0;
    let rig = TestRig::start(cal, SimulationSettings::default());
    let mut client = rig.connect();

    assert_eq!(client.send("H"), "OK");
    let el = rig.wait_for(AxisId::Elevation, |s| s.state == AxisStateKind::Fault);
    assert_eq!(el.fault, Some(FaultReason::HomingTimeout));
    assert!(!el.is_homed());
    // 10° start, 5° of allowed travel.
    assert!((rig.sim.angle(AxisId::Elevation) - 5.0).abs() < 0.1);

    let az = rig.wait_for(AxisId::Azimuth, |s| s.state == AxisStateKind::Idle);
    assert!(az.is_homed());

    let (_, _, line) = client.position();
    assert!(line.ends_with(" EL:FAULT(homing-timeout)"), "{line}");
    assert_eq!(client.send("EL10"), "ERROR FAULT");
    assert_eq!(client.send("AZ10"), "OK");
}

#[test]
fn persistent_pulse_failure_faults_the_drive() {
    let rig = TestRig::homed();
    let mut client = rig.connect();

    rig.sim.fail_pulses(AxisId::Azimuth, 3);
    assert_eq!(client.send("AZ90"), "OK");
    let snap = rig.wait_for(AxisId::Azimuth, |s| s.state == AxisStateKind::Fault);
    assert_eq!(snap.fault, Some(FaultReason::DriveFault));
    assert!(!snap.is_homed());

    let (_, _, line) = client.position();
    assert!(line.contains(" AZ:FAULT(drive-fault)"), "{line}");

    // Homing clears the fault.
    assert_eq!(client.send("H"), "OK");
    let snap = rig.wait_for(AxisId::Azimuth, |s| {
        s.state == AxisStateKind::Idle && s.is_homed()
    });
    assert_eq!(snap.fault, None);
}

#[test]
fn transient_pulse_failures_are_retried() {
    let rig = TestRig::homed();
    let mut client = rig.connect();

    rig.sim.fail_pulses(AxisId::Azimuth, 2);
    assert_eq!(client.send("AZ30"), "OK");
    let snap = rig.wait_at_rest(AxisId::Azimuth);
    assert_eq!(snap.fault, None);
    assert_eq!(snap.commanded_steps, 667);
    assert_eq!(client.position().0, 30.0);
}

#[test]
fn limit_at_rest_only_sets_the_flag() {
    let rig = TestRig::homed();
    let mut client = rig.connect();

    rig.sim.force_limit(AxisId::Azimuth, Some(true));
    let snap = rig.wait_for(AxisId::Azimuth, |s| {
        s.flags.contains(AxisStatusFlags::LIMIT_ACTIVE)
    });
    assert_ne!(snap.state, AxisStateKind::Fault);
    assert_eq!(snap.fault, None);

    rig.sim.force_limit(AxisId::Azimuth, Some(false));
    rig.wait_for(AxisId::Azimuth, |s| {
        !s.flags.contains(AxisStatusFlags::LIMIT_ACTIVE)
    });
    assert_eq!(client.send("AZ10"), "OK");
    let snap = rig.wait_at_rest(AxisId::Azimuth);
    assert_eq!(snap.fault, None);
}

#[test]
fn every_trip_is_counted() {
    let rig = TestRig::homed();
    let before = rig.rotator.limit_trips(AxisId::Elevation);

    for _ in 0..3 {
        rig.sim.force_limit(AxisId::Elevation, Some(true));
        rig.sim.force_limit(AxisId::Elevation, Some(false));
    }
    eventually("three more trips", || {
        rig.rotator.limit_trips(AxisId::Elevation) == before + 3
    });
}

#[test]
fn shutdown_disables_both_drives() {
    let mut rig = TestRig::homed();
    let sim = rig.sim.clone();
    let mut client = rig.connect();
    assert_eq!(client.send("AZ200"), "OK");
    std::thread::sleep(Duration::from_millis(20));

    rig.rotator.shutdown();
    assert!(!sim.is_enabled(AxisId::Azimuth));
    assert!(!sim.is_enabled(AxisId::Elevation));

    let pulses = sim.pulse_count(AxisId::Azimuth);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(sim.pulse_count(AxisId::Azimuth), pulses);

    // Idempotent; `Drop` calls it again.
    rig.rotator.shutdown();
}
