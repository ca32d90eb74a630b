//! GS-232 line handling over a real socket.

use std::thread;
use std::time::Duration;

use ogrc_common::consts::MAX_LINE_LEN;
use ogrc_common::rotator::{AxisId, AxisStateKind};
use ogrc_hal::SimulationSettings;

use super::{Client, TestRig, fast_calibration};

#[test]
fn malformed_lines_answer_error_and_keep_the_session() {
    let rig = TestRig::homed();
    let mut client = rig.connect();

    for line in ["XYZ", "AZ", "AZabc", "AZ1e2", "W10", "EL 1 2", "PP"] {
        assert_eq!(client.send(line), "ERROR", "line {line:?}");
    }
    assert_eq!(client.send("AZ15"), "OK");
}

#[test]
fn blank_lines_get_no_response() {
    let rig = TestRig::homed();
    let mut client = rig.connect();

    client.send_raw(b"\n   \r\n\t\n");
    assert_eq!(client.send("p"), "AZ=0.0 EL=0.0");
}

#[test]
fn crlf_and_lowercase_are_accepted() {
    let rig = TestRig::homed();
    let mut client = rig.connect();

    client.send_raw(b"az12.5\r\n");
    assert_eq!(client.read_line(), "OK");
    rig.wait_at_rest(AxisId::Azimuth);
    client.send_raw(b"P\r\n");
    assert_eq!(client.read_line(), "AZ=12.5 EL=0.0");
}

#[test]
fn overlong_line_is_rejected_once() {
    let rig = TestRig::homed();
    let mut client = rig.connect();

    let mut line = "AZ1".to_string();
    line.push_str(&"0".repeat(MAX_LINE_LEN * 3));
    line.push('\n');
    client.send_raw(line.as_bytes());
    assert_eq!(client.read_line(), "ERROR");

    assert_eq!(client.send("P"), "AZ=0.0 EL=0.0");
    assert!(rig.snapshot(AxisId::Azimuth).active_motion.is_none());
}

#[test]
fn pipelined_commands_are_answered_in_order() {
    let rig = TestRig::homed();
    let mut client = rig.connect();

    client.send_raw(b"AZ400\nEL45\nXYZ\nS\n");
    assert_eq!(client.read_line(), "ERROR RANGE");
    assert_eq!(client.read_line(), "OK");
    assert_eq!(client.read_line(), "ERROR");
    assert_eq!(client.read_line(), "OK");
}

#[test]
fn commands_during_homing_answer_error_homing() {
    let mut cal = fast_calibration();
    cal.motion.homing_speed = cal.motion.min_speed;
    let rig = TestRig::start(cal, SimulationSettings::default());
    let mut client = rig.connect();

    assert_eq!(client.send("H"), "OK");
    assert_eq!(client.send("AZ20"), "ERROR HOMING");
    assert_eq!(client.send("W20 20"), "ERROR HOMING");
    // Queries and malformed lines never reach the queue.
    assert!(client.send("P").starts_with("AZ="));
    assert_eq!(client.send("AZx"), "ERROR");

    rig.wait_for(AxisId::Azimuth, |s| s.state == AxisStateKind::Idle);
    assert_eq!(client.send("AZ20"), "OK");
}

#[test]
fn unhomed_axis_still_accepts_targets() {
    let rig = TestRig::fast();
    let mut client = rig.connect();

    assert_eq!(client.send("AZ5"), "OK");
    let snap = rig.wait_at_rest(AxisId::Azimuth);
    assert!(!snap.is_homed());
    assert_eq!(snap.state, AxisStateKind::Unhomed);
    assert_eq!(snap.target_angle, 5.0);
}

#[test]
fn reset_stops_and_rehomes() {
    let rig = TestRig::homed();
    let mut client = rig.connect();
    let epoch = rig.snapshot(AxisId::Azimuth).home_epoch;

    assert_eq!(client.send("AZ90"), "OK");
    thread::sleep(Duration::from_millis(20));
    assert_eq!(client.send("R"), "OK");

    let snap = rig.wait_for(AxisId::Azimuth, |s| {
        s.state == AxisStateKind::Idle && s.home_epoch > epoch
    });
    assert_eq!(snap.commanded_steps, 0);
    assert!(rig.sim.angle(AxisId::Azimuth).abs() < 0.5);
}

#[test]
fn concurrent_clients_are_serialised() {
    let rig = TestRig::homed();
    let addr = rig.addr;

    let workers: Vec<_> = (0..4)
        .map(|i| {
            thread::spawn(move || {
                let mut client = Client::connect(addr);
                (0..10)
                    .map(|j| client.send(&format!("AZ{}", 10 * i + j)))
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    for worker in workers {
        let replies = worker.join().unwrap();
        assert!(replies.iter().all(|r| r == "OK"), "{replies:?}");
    }

    let snap = rig.wait_at_rest(AxisId::Azimuth);
    assert_eq!(
        snap.commanded_steps,
        (snap.target_angle / 0.045).round() as i64
    );
    let mut client = rig.connect();
    let (az, _, _) = client.position();
    assert!((az - snap.target_angle).abs() < 0.05 + 1e-9);
}

#[test]
fn disconnect_does_not_affect_other_clients() {
    let rig = TestRig::homed();
    let mut first = rig.connect();
    {
        let mut second = rig.connect();
        second.send_raw(b"XY");
    }
    assert_eq!(first.send("AZ7"), "OK");
    let snap = rig.wait_at_rest(AxisId::Azimuth);
    assert_eq!(snap.target_angle, 7.0);
}
