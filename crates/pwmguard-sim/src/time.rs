//! Simulated time.
//!
//! All time in the simulator is kept as integer picoseconds so that edge
//! ordering and interval arithmetic are exact.  [`SimTime`] is an instant
//! on the timeline, [`SimDuration`] a span between two instants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Sub};
use std::str::FromStr;
use thiserror::Error;

const PS_PER_NS: u64 = 1_000;
const PS_PER_US: u64 = 1_000_000;
const PS_PER_MS: u64 = 1_000_000_000;

/// Unit used when converting simulated time to floating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Ps,
    Ns,
    Us,
    Ms,
}

impl TimeUnit {
    /// Number of picoseconds in one unit.
    pub const fn picoseconds(self) -> u64 {
        match self {
            TimeUnit::Ps => 1,
            TimeUnit::Ns => PS_PER_NS,
            TimeUnit::Us => PS_PER_US,
            TimeUnit::Ms => PS_PER_MS,
        }
    }

    /// Unit suffix as used in log output and duration strings.
    pub const fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Ps => "ps",
            TimeUnit::Ns => "ns",
            TimeUnit::Us => "us",
            TimeUnit::Ms => "ms",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// An instant on the simulated timeline, in picoseconds since start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimTime(u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    pub const fn from_ps(ps: u64) -> Self {
        SimTime(ps)
    }

    pub const fn as_ps(self) -> u64 {
        self.0
    }

    /// This instant expressed in `unit`.
    pub fn as_unit(self, unit: TimeUnit) -> f64 {
        self.0 as f64 / unit.picoseconds() as f64
    }

    /// Time elapsed since `earlier`, or zero if `earlier` is in the future.
    pub fn saturating_since(self, earlier: SimTime) -> SimDuration {
        SimDuration(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % PS_PER_NS == 0 {
            write!(f, "{}ns", self.0 / PS_PER_NS)
        } else {
            write!(f, "{:.3}ns", self.as_unit(TimeUnit::Ns))
        }
    }
}

/// A span of simulated time, in picoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SimDuration(u64);

impl SimDuration {
    pub const ZERO: SimDuration = SimDuration(0);

    pub const fn from_ps(ps: u64) -> Self {
        SimDuration(ps)
    }

    pub const fn from_ns(ns: u64) -> Self {
        SimDuration(ns * PS_PER_NS)
    }

    pub const fn from_us(us: u64) -> Self {
        SimDuration(us * PS_PER_US)
    }

    pub const fn from_ms(ms: u64) -> Self {
        SimDuration(ms * PS_PER_MS)
    }

    pub const fn as_ps(self) -> u64 {
        self.0
    }

    /// This span expressed in `unit`.
    pub fn as_unit(self, unit: TimeUnit) -> f64 {
        self.0 as f64 / unit.picoseconds() as f64
    }

    pub fn saturating_sub(self, rhs: SimDuration) -> SimDuration {
        SimDuration(self.0.saturating_sub(rhs.0))
    }

    /// Largest unit that represents this span exactly.
    fn natural_unit(self) -> TimeUnit {
        [TimeUnit::Ms, TimeUnit::Us, TimeUnit::Ns]
            .into_iter()
            .find(|unit| self.0 != 0 && self.0 % unit.picoseconds() == 0)
            .unwrap_or(TimeUnit::Ps)
    }
}

impl fmt::Display for SimDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = self.natural_unit();
        write!(f, "{}{}", self.0 / unit.picoseconds(), unit)
    }
}

/// Error parsing a duration string such as `"143us"`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseDurationError {
    #[error("duration {0:?} has no unit suffix (expected ps, ns, us or ms)")]
    MissingUnit(String),

    #[error("duration {0:?} has an invalid magnitude")]
    InvalidMagnitude(String),

    #[error("duration {0:?} overflows the picosecond range")]
    Overflow(String),
}

impl FromStr for SimDuration {
    type Err = ParseDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| c.is_ascii_alphabetic())
            .ok_or_else(|| ParseDurationError::MissingUnit(s.to_string()))?;
        let (magnitude, suffix) = trimmed.split_at(split);
        let unit = match suffix {
            "ps" => TimeUnit::Ps,
            "ns" => TimeUnit::Ns,
            "us" => TimeUnit::Us,
            "ms" => TimeUnit::Ms,
            _ => return Err(ParseDurationError::MissingUnit(s.to_string())),
        };
        let magnitude: u64 = magnitude
            .trim()
            .parse()
            .map_err(|_| ParseDurationError::InvalidMagnitude(s.to_string()))?;
        magnitude
            .checked_mul(unit.picoseconds())
            .map(SimDuration)
            .ok_or_else(|| ParseDurationError::Overflow(s.to_string()))
    }
}

impl TryFrom<String> for SimDuration {
    type Error = ParseDurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SimDuration> for String {
    fn from(value: SimDuration) -> Self {
        value.to_string()
    }
}

impl Add<SimDuration> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimDuration) -> SimTime {
        SimTime(self.0 + rhs.0)
    }
}

impl AddAssign<SimDuration> for SimTime {
    fn add_assign(&mut self, rhs: SimDuration) {
        self.0 += rhs.0;
    }
}

impl Sub<SimTime> for SimTime {
    type Output = SimDuration;

    fn sub(self, rhs: SimTime) -> SimDuration {
        SimDuration(self.0 - rhs.0)
    }
}

impl Add for SimDuration {
    type Output = SimDuration;

    fn add(self, rhs: SimDuration) -> SimDuration {
        SimDuration(self.0 + rhs.0)
    }
}

impl Sub for SimDuration {
    type Output = SimDuration;

    fn sub(self, rhs: SimDuration) -> SimDuration {
        SimDuration(self.0 - rhs.0)
    }
}

impl Mul<u64> for SimDuration {
    type Output = SimDuration;

    fn mul(self, rhs: u64) -> SimDuration {
        SimDuration(self.0 * rhs)
    }
}

impl Div<u64> for SimDuration {
    type Output = SimDuration;

    fn div(self, rhs: u64) -> SimDuration {
        SimDuration(self.0 / rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_constructors_agree() {
        assert_eq!(SimDuration::from_ns(1), SimDuration::from_ps(1_000));
        assert_eq!(SimDuration::from_us(143), SimDuration::from_ns(143_000));
        assert_eq!(SimDuration::from_ms(12), SimDuration::from_us(12_000));
    }

    #[test]
    fn duration_parse_and_display() {
        let d: SimDuration = "143us".parse().unwrap();
        assert_eq!(d, SimDuration::from_us(143));
        assert_eq!(d.to_string(), "143us");

        let d: SimDuration = "9ns".parse().unwrap();
        assert_eq!(d.to_string(), "9ns");

        assert_eq!(SimDuration::from_ns(1500).to_string(), "1500ns");
        assert_eq!(SimDuration::ZERO.to_string(), "0ps");
    }

    #[test]
    fn duration_parse_errors() {
        assert!(matches!(
            "10".parse::<SimDuration>(),
            Err(ParseDurationError::MissingUnit(_))
        ));
        assert!(matches!(
            "abcns".parse::<SimDuration>(),
            Err(ParseDurationError::MissingUnit(_))
        ));
        assert!(matches!(
            "x10ns".parse::<SimDuration>(),
            Err(ParseDurationError::MissingUnit(_))
        ));
        assert!(matches!(
            "10s".parse::<SimDuration>(),
            Err(ParseDurationError::MissingUnit(_))
        ));
        assert!(matches!(
            "-5ns".parse::<SimDuration>(),
            Err(ParseDurationError::InvalidMagnitude(_))
        ));
    }

    #[test]
    fn duration_string_form_is_config_form() {
        let text = String::from(SimDuration::from_ms(12));
        assert_eq!(text, "12ms");
        assert_eq!(SimDuration::try_from(text).unwrap(), SimDuration::from_ms(12));
    }

    #[test]
    fn time_arithmetic() {
        let t = SimTime::from_ps(5_000) + SimDuration::from_ns(10);
        assert_eq!(t.as_ps(), 15_000);
        assert_eq!(t - SimTime::from_ps(5_000), SimDuration::from_ns(10));
        assert_eq!(
            SimTime::from_ps(1).saturating_since(SimTime::from_ps(10)),
            SimDuration::ZERO
        );
        assert_eq!(t.to_string(), "15ns");
        assert_eq!(SimTime::from_ps(1_500).to_string(), "1.500ns");
    }

    #[test]
    fn unit_conversion() {
        let d = SimDuration::from_us(160);
        assert_eq!(d.as_unit(TimeUnit::Us), 160.0);
        assert_eq!(d.as_unit(TimeUnit::Ms), 0.16);
    }
}
