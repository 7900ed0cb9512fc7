//! Port bundle shared by the device, the stimulus and the monitors.

use pwmguard_sim::{Sim, Signal};

/// Raw control value that corresponds to 100 % duty.
pub const DUTY_FULL_SCALE: i32 = 128;

/// The five signals of a PWM H-bridge controller.
///
/// | Port         | Type | Driven by |
/// |--------------|------|-----------|
/// | `mclk`       | bool | harness   |
/// | `reset`      | bool | harness   |
/// | `duty_cycle` | i8   | harness   |
/// | `dir`        | bool | device    |
/// | `en`         | bool | device    |
#[derive(Debug, Clone)]
pub struct PwmPorts {
    /// Master clock
    pub clk: Signal<bool>,
    /// Synchronous active-high reset
    pub reset: Signal<bool>,
    /// Signed control value, 128 = 100 %
    pub duty: Signal<i8>,
    /// H-bridge direction, 1 = forward
    pub dir: Signal<bool>,
    /// PWM pulse output
    pub en: Signal<bool>,
}

impl PwmPorts {
    /// Declare the bundle on `sim` with every port low.
    pub fn new(sim: &Sim) -> Self {
        Self {
            clk: sim.signal("mclk", false),
            reset: sim.signal("reset", false),
            duty: sim.signal("duty_cycle", 0i8),
            dir: sim.signal("dir", false),
            en: sim.signal("en", false),
        }
    }
}

/// Raw control value for a signed duty percentage, truncated toward zero
/// and saturated to the `i8` range.
pub fn duty_from_percent(percent: i32) -> i8 {
    let raw = percent.saturating_mul(DUTY_FULL_SCALE) / 100;
    raw.clamp(i32::from(i8::MIN), i32::from(i8::MAX)) as i8
}

/// Signed duty percentage represented by a raw control value.
pub fn duty_percent(raw: i8) -> f64 {
    f64::from(raw) * 100.0 / f64::from(DUTY_FULL_SCALE)
}
