//! Cycle-accurate PWM H-bridge controller model.
//!
//! The model is a synchronous state machine evaluated once per rising
//! clock edge.  It knows nothing about the simulator; [`crate::PwmDevice`]
//! feeds it sampled inputs and drives its outputs.
//!
//! ```text
//!   counter: 0 ────────────── high ────────────── period-1 │ 0 ...
//!   en:      ▔▔▔▔▔▔▔▔▔▔▔▔▔▔▔▔▔▁▁▁▁▁▁▁▁▁▁▁▁▁▁▁▁▁▁▁▁▁▁▁▁▁▁▁│▔▔▔
//! ```
//!
//! Direction changes are made safe in three steps: `en` is dropped on the
//! first cycle the sign disagrees with `dir`, `dir` flips on the next, and
//! the output stays blanked until the following period boundary.

use serde::{Deserialize, Serialize};

/// Counter steps per full-scale control value.
pub const DUTY_STEPS: u32 = 128;

/// Device timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Clock cycles per control step.  The PWM period is
    /// `DUTY_STEPS * prescale` clock cycles.
    pub prescale: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        // 16 000 cycles at 10 ns = 160 us, 6.25 kHz.
        Self { prescale: 125 }
    }
}

impl DeviceConfig {
    pub fn period_cycles(&self) -> u32 {
        DUTY_STEPS * self.prescale
    }

    /// Clock cycles `en` stays high for the given control value.
    pub fn high_cycles(&self, duty: i8) -> u32 {
        u32::from(duty.unsigned_abs()) * self.prescale
    }
}

/// Registered outputs after a clock edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Outputs {
    pub dir: bool,
    pub en: bool,
}

/// Controller state.
#[derive(Debug, Clone)]
pub struct PwmCore {
    config: DeviceConfig,
    /// Position within the current period
    counter: u32,
    /// Registered direction output
    dir: bool,
    /// Registered enable output
    en: bool,
    /// Output held low until the next period boundary
    blank: bool,
}

impl PwmCore {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            counter: 0,
            dir: false,
            en: false,
            blank: true,
        }
    }

    pub fn outputs(&self) -> Outputs {
        Outputs {
            dir: self.dir,
            en: self.en,
        }
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Evaluate one rising clock edge with the sampled inputs.
    pub fn step(&mut self, reset: bool, duty: i8) -> Outputs {
        if reset {
            // Direction is left as is so reset never moves the bridge.
            self.counter = 0;
            self.en = false;
            self.blank = true;
            return self.outputs();
        }

        self.counter = (self.counter + 1) % self.config.period_cycles().max(1);
        if self.counter == 0 {
            self.blank = false;
        }

        let wanted_dir = match duty.signum() {
            1 => true,
            -1 => false,
            _ => self.dir,
        };

        if wanted_dir != self.dir {
            if self.en {
                self.en = false;
            } else {
                self.dir = wanted_dir;
                self.blank = true;
            }
        } else {
            self.en = !self.blank && self.counter < self.config.high_cycles(duty);
        }
        self.outputs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One clock cycle per control step: a 128-cycle period.
    fn small() -> DeviceConfig {
        DeviceConfig { prescale: 1 }
    }

    fn run(core: &mut PwmCore, cycles: u32, reset: bool, duty: i8) -> Vec<Outputs> {
        (0..cycles).map(|_| core.step(reset, duty)).collect()
    }

    #[test]
    fn test_default_period_is_160us_at_100mhz() {
        let config = DeviceConfig::default();
        assert_eq!(config.period_cycles(), 16_000);
        assert_eq!(config.high_cycles(64), 8_000);
        assert_eq!(config.high_cycles(-128), 16_000);
    }

    #[test]
    fn test_reset_clears_enable_and_keeps_direction() {
        let mut core = PwmCore::new(small());
        run(&mut core, 300, false, 64);
        assert!(core.outputs().dir);
        let out = core.step(true, 64);
        assert!(!out.en);
        assert!(out.dir);
        assert_eq!(core.counter(), 0);
    }

    #[test]
    fn test_blanked_until_period_boundary_after_reset() {
        let mut core = PwmCore::new(small());
        core.step(true, 64);
        // The first cycle flips direction, which blanks as well.
        let trace = run(&mut core, 127, false, 64);
        assert!(trace.iter().all(|o| !o.en));
        let out = core.step(false, 64);
        assert_eq!(core.counter(), 0);
        assert!(out.en);
    }

    #[test]
    fn test_duty_cycle_high_time() {
        let mut core = PwmCore::new(small());
        run(&mut core, 127, false, 32);
        assert_eq!(core.counter(), 127);
        let trace = run(&mut core, 128, false, 32);
        let high = trace.iter().filter(|o| o.en).count();
        assert_eq!(high, 32);
        assert!(trace[..32].iter().all(|o| o.en));
    }

    #[test]
    fn test_direction_change_drops_enable_first() {
        let mut core = PwmCore::new(small());
        run(&mut core, 128, false, 64);
        let out = core.step(false, 64);
        assert!(out.en && out.dir);

        let drop = core.step(false, -64);
        assert!(!drop.en);
        assert!(drop.dir);

        let flip = core.step(false, -64);
        assert!(!flip.en);
        assert!(!flip.dir);

        // Blanked for the remainder of the period.
        let until_wrap = 128 - core.counter() - 1;
        let trace = run(&mut core, until_wrap, false, -64);
        assert!(trace.iter().all(|o| !o.en && !o.dir));
        assert!(core.step(false, -64).en);
    }

    #[test]
    fn test_zero_duty_keeps_direction_and_stays_low() {
        let mut core = PwmCore::new(small());
        run(&mut core, 10, false, -5);
        let trace = run(&mut core, 300, false, 0);
        assert!(trace.iter().all(|o| !o.en && !o.dir));
    }
}
