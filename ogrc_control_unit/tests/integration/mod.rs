//! Shared rig for the integration suites.

mod feedback;
mod motion;
mod protocol;
mod safety;
mod scenarios;

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use ogrc_common::hal::driver::HalDriver;
use ogrc_common::rotator::{AxisId, AxisSnapshot, AxisStateKind, CalibrationConfig};
use ogrc_control_unit::Rotator;
use ogrc_control_unit::config::ServerConfig;
use ogrc_control_unit::server::Server;
use ogrc_hal::{SimulationDriver, SimulationHandle, SimulationSettings};
use tokio::sync::watch;

pub const WAIT: Duration = Duration::from_secs(15);

/// Calibration of the reference mount (200 steps/rev, 40:1, microstep 1)
/// with speeds high enough to keep tests short.
pub fn fast_calibration() -> CalibrationConfig {
    let mut cal = CalibrationConfig::default();
    cal.motion.min_speed = 2000.0;
    cal.motion.default_speed = 20_000.0;
    cal.motion.max_speed = 20_000.0;
    cal.motion.homing_speed = 5000.0;
    cal.motion.correction_speed = 5000.0;
    cal.motion.ramp_steps = 100;
    cal.feedback.period_ms = 20;
    cal
}

/// Rotator + simulated mount + GS-232 server.
pub struct TestRig {
    pub rotator: Rotator,
    pub sim: SimulationHandle,
    pub addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    runtime: Option<tokio::runtime::Runtime>,
}

impl TestRig {
    pub fn start(calibration: CalibrationConfig, settings: SimulationSettings) -> Self {
        let mut driver = SimulationDriver::with_settings(settings);
        let hardware = driver.init(&calibration).expect("sim init");
        let sim = driver.handle().expect("sim handle");
        let rotator = Rotator::start_with_hardware(calibration, hardware, Some(Box::new(driver)), None)
            .expect("rotator start");

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("tokio runtime");
        let config = ServerConfig {
            bind_address: "127.0.0.1".into(),
            port: 0,
            ..ServerConfig::default()
        };
        let server = runtime
            .block_on(Server::bind(&config, rotator.axes()))
            .expect("bind");
        let addr = server.local_addr().expect("local addr");
        let (shutdown, rx) = watch::channel(false);
        runtime.spawn(server.run(rx));

        Self {
            rotator,
            sim,
            addr,
            shutdown,
            runtime: Some(runtime),
        }
    }

    /// Default mount: both axes at 10°, switches at 0°.
    pub fn fast() -> Self {
        Self::start(fast_calibration(), SimulationSettings::default())
    }

    /// `fast()` and home both axes.
    pub fn homed() -> Self {
        let rig = Self::fast();
        rig.rotator.home_all_blocking(WAIT).expect("homing");
        for axis in AxisId::ALL {
            rig.wait_for(axis, |s| s.state == AxisStateKind::Idle && s.is_homed());
        }
        rig
    }

    pub fn connect(&self) -> Client {
        Client::connect(self.addr)
    }

    pub fn snapshot(&self, axis: AxisId) -> AxisSnapshot {
        self.rotator.axis(axis).snapshot()
    }

    pub fn wait_for(&self, axis: AxisId, predicate: impl Fn(&AxisSnapshot) -> bool) -> AxisSnapshot {
        self.rotator
            .wait_for(axis, WAIT, predicate)
            .unwrap_or_else(|_| panic!("{axis} never reached state: {:?}", self.snapshot(axis)))
    }

    /// Wait until `axis` has no move in flight and is not homing.
    pub fn wait_at_rest(&self, axis: AxisId) -> AxisSnapshot {
        self.wait_for(axis, |s| {
            s.active_motion.is_none()
                && !matches!(s.state, AxisStateKind::Moving | AxisStateKind::Homing)
        })
    }
}

impl Drop for TestRig {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_secs(1));
        }
        self.rotator.shutdown();
    }
}

/// Blocking line client.
pub struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    pub fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("timeout");
        Self {
            reader: BufReader::new(stream.try_clone().expect("clone")),
            writer: stream,
        }
    }

    /// Send one line, return the response without terminator.
    pub fn send(&mut self, line: &str) -> String {
        self.send_raw(format!("{line}\n").as_bytes());
        self.read_line()
    }

    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).expect("write");
    }

    pub fn read_line(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read");
        line.trim_end().to_string()
    }

    /// `P`, parsed into (az, el) plus the raw line.
    pub fn position(&mut self) -> (f64, f64, String) {
        let line = self.send("P");
        let mut fields = line.split_whitespace();
        let az = parse_field(fields.next(), "AZ=", &line);
        let el = parse_field(fields.next(), "EL=", &line);
        (az, el, line)
    }
}

fn parse_field(field: Option<&str>, prefix: &str, line: &str) -> f64 {
    field
        .and_then(|f| f.strip_prefix(prefix))
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| panic!("bad position line {line:?}"))
}

/// Poll `check` until it returns true.
pub fn eventually(what: &str, check: impl Fn() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(10));
    }
}
