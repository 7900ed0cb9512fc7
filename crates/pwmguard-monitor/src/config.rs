//! Harness configuration.
//!
//! Every struct has a `Default` matching the PMOD H-bridge limits and can
//! be loaded from JSON with any subset of fields present.  Durations are
//! written as strings with a unit suffix:
//!
//! ```json
//! { "seed": 7, "timing": { "pwm_timeout": "12ms", "min_pwm_period": "143us" } }
//! ```

use crate::harness::HarnessError;
use pwmguard_device::DeviceConfig;
use pwmguard_sim::{SimConfig, SimDuration};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Limits the checkers enforce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Period of `mclk`.
    pub clock_period: SimDuration,
    /// Enable periods must be strictly longer (7 kHz maximum).
    pub min_pwm_period: SimDuration,
    /// Longest time `en` may stay static while the control value is nonzero.
    pub pwm_timeout: SimDuration,
    /// Allowed gap between set and measured duty, in percentage points.
    pub duty_tolerance: f64,
    /// Clock cycles `dir` may take to follow the control sign.
    pub direction_cycles: u32,
    /// Minimum time `en` must be low on both sides of a `dir` change.
    /// Unset means one nanosecond short of a clock period.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_circuit_margin: Option<SimDuration>,
    /// Delay before the monitors start, letting initial values settle.
    pub startup_settle: SimDuration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self::for_clock(SimDuration::from_ns(10))
    }
}

impl TimingConfig {
    /// Defaults for a given clock.
    pub fn for_clock(clock_period: SimDuration) -> Self {
        Self {
            clock_period,
            min_pwm_period: SimDuration::from_us(143),
            pwm_timeout: SimDuration::from_ms(12),
            duty_tolerance: 5.0,
            direction_cycles: 2,
            short_circuit_margin: None,
            startup_settle: SimDuration::from_ns(1),
        }
    }

    /// The configured margin, or the clock period minus one nanosecond.
    pub fn short_circuit_margin(&self) -> SimDuration {
        self.short_circuit_margin
            .unwrap_or_else(|| self.clock_period.saturating_sub(SimDuration::from_ns(1)))
    }
}

/// A control value held for a number of enable pulses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedDuty {
    /// Signed duty in percent.
    pub percent: i32,
    /// Rising edges of `en` to wait before moving on.
    pub pulses: u32,
}

/// Nominal stimulus program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StimulusConfig {
    /// Wait after start before the first control value.
    pub start_delay: SimDuration,
    /// Length of each reset pulse.
    pub reset_hold: SimDuration,
    pub fixed: Vec<FixedDuty>,
    /// Random values drawn in the first round, before the mid-run reset.
    pub random_first: usize,
    /// Random values drawn after the mid-run reset.
    pub random_second: usize,
    /// Smallest random duty magnitude, in percent.
    pub random_min_percent: i32,
    /// Largest random duty magnitude, in percent.
    pub random_max_percent: i32,
    /// Enable pulses each random value is held for.
    pub random_pulses: u32,
    /// Upper bound of the idle wait closing each random round.
    pub idle_max: SimDuration,
}

impl Default for StimulusConfig {
    fn default() -> Self {
        Self {
            start_delay: SimDuration::from_ns(20),
            reset_hold: SimDuration::from_ns(15),
            fixed: vec![
                FixedDuty {
                    percent: 50,
                    pulses: 3,
                },
                FixedDuty {
                    percent: -50,
                    pulses: 2,
                },
            ],
            random_first: 4,
            random_second: 3,
            random_min_percent: 11,
            random_max_percent: 89,
            random_pulses: 2,
            idle_max: SimDuration::from_us(300),
        }
    }
}

/// Everything a harness run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Seed for the random stimulus.
    pub seed: u64,
    pub timing: TimingConfig,
    pub stimulus: StimulusConfig,
    pub device: DeviceConfig,
    pub sim: SimConfig,
    /// Also run the static-enable scenario, which simulates past the
    /// liveness timeout.
    pub include_timeout_scenario: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            timing: TimingConfig::default(),
            stimulus: StimulusConfig::default(),
            device: DeviceConfig::default(),
            sim: SimConfig::default(),
            include_timeout_scenario: false,
        }
    }
}

impl HarnessConfig {
    /// Load a JSON configuration file.  Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, HarnessError> {
        let text = std::fs::read_to_string(path).map_err(|source| HarnessError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&text).map_err(|source| HarnessError::ParseConfig {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would stall simulated time.
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.timing.clock_period == SimDuration::ZERO {
            return Err(HarnessError::InvalidConfig(
                "timing.clock_period must be nonzero".into(),
            ));
        }
        if self.device.prescale == 0 {
            return Err(HarnessError::InvalidConfig(
                "device.prescale must be nonzero".into(),
            ));
        }
        Ok(())
    }
}
