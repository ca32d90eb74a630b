//! GS-232 line grammar and responses.
//!
//! | Input               | Command          |
//! |---------------------|------------------|
//! | `AZ<deg>`           | `SetAzimuth`     |
//! | `EL<deg>`           | `SetElevation`   |
//! | `AZ<a> EL<e>`       | `SetBoth`        |
//! | `W<a> <e>`          | `SetBoth`        |
//! | `P`                 | `QueryPosition`  |
//! | `S`                 | `Stop`           |
//! | `H`                 | `Home`           |
//! | `R`                 | `Reset`          |
//!
//! Case-insensitive. Anything else is `Malformed` and answered `ERROR`.

use std::fmt;

use ogrc_common::rotator::{CommandError, FaultReason};

/// One parsed protocol line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetAzimuth(f64),
    SetElevation(f64),
    SetBoth { az: f64, el: f64 },
    QueryPosition,
    Stop,
    Home,
    /// Stop both axes, then home both.
    Reset,
    Malformed(String),
}

impl Command {
    /// Whether the command changes axis state (goes through the queue).
    #[inline]
    pub const fn is_mutating(&self) -> bool {
        !matches!(self, Self::QueryPosition | Self::Malformed(_))
    }
}

/// Parse one line. `None` for blank lines, which get no response.
pub fn parse(line: &str) -> Option<Command> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let upper = trimmed.to_ascii_uppercase();
    let malformed = || Command::Malformed(trimmed.to_string());

    let command = match upper.as_str() {
        "P" => Command::QueryPosition,
        "S" => Command::Stop,
        "H" => Command::Home,
        "R" => Command::Reset,
        _ => {
            if let Some(rest) = upper.strip_prefix("AZ") {
                parse_azimuth(rest).unwrap_or_else(malformed)
            } else if let Some(rest) = upper.strip_prefix("EL") {
                number(rest).map_or_else(malformed, Command::SetElevation)
            } else if let Some(rest) = upper.strip_prefix('W') {
                parse_pair(rest).unwrap_or_else(malformed)
            } else {
                malformed()
            }
        }
    };
    Some(command)
}

/// `<a>` or `<a> EL<e>`.
fn parse_azimuth(rest: &str) -> Option<Command> {
    match rest.find("EL") {
        Some(split) => Some(Command::SetBoth {
            az: number(&rest[..split])?,
            el: number(&rest[split + 2..])?,
        }),
        None => number(rest).map(Command::SetAzimuth),
    }
}

/// `<a> <e>`.
fn parse_pair(rest: &str) -> Option<Command> {
    let mut fields = rest.split_whitespace();
    let az = number(fields.next()?)?;
    let el = number(fields.next()?)?;
    fields.next().is_none().then_some(Command::SetBoth { az, el })
}

/// Finite signed decimal.
fn number(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() || text.chars().any(char::is_alphabetic) {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

// ─── Responses ──────────────────────────────────────────────────────

/// Reported position of one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisPosition {
    /// Dead-reckoned angle [deg].
    pub angle: f64,
    /// Sensor reads failing.
    pub stale: bool,
    pub fault: Option<FaultReason>,
}

impl AxisPosition {
    pub const fn at(angle: f64) -> Self {
        Self {
            angle,
            stale: false,
            fault: None,
        }
    }
}

/// Answer to `P`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionReport {
    pub az: AxisPosition,
    pub el: AxisPosition,
}

/// One response line (without terminator).
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Ok,
    Position(PositionReport),
    Error(CommandError),
}

impl From<Result<(), CommandError>> for Response {
    fn from(result: Result<(), CommandError>) -> Self {
        match result {
            Ok(()) => Self::Ok,
            Err(e) => Self::Error(e),
        }
    }
}

/// One decimal, never `-0.0`.
fn tenth(angle: f64) -> f64 {
    (angle * 10.0).round() / 10.0 + 0.0
}

fn write_status(f: &mut fmt::Formatter<'_>, tag: &str, pos: &AxisPosition) -> fmt::Result {
    if let Some(reason) = pos.fault {
        write!(f, " {tag}:FAULT({reason})")?;
    }
    if pos.stale {
        write!(f, " {tag}:STALE")?;
    }
    Ok(())
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::Error(e) => f.write_str(e.response_token()),
            Self::Position(report) => {
                write!(
                    f,
                    "AZ={:.1} EL={:.1}",
                    tenth(report.az.angle),
                    tenth(report.el.angle)
                )?;
                write_status(f, "AZ", &report.az)?;
                write_status(f, "EL", &report.el)
            }
        }
    }
}
