//! Runs a [`PwmCore`] against a port bundle.

use crate::controller::{DeviceConfig, Outputs, PwmCore};
use crate::ports::PwmPorts;
use log::{debug, trace};
use pwmguard_sim::{Sim, SimError};

/// The device under test: samples `reset` and `duty_cycle` on every rising
/// edge of `mclk` and drives `dir` and `en`.
pub struct PwmDevice;

impl PwmDevice {
    /// Spawn the device process.  Outputs are written only when they
    /// change, so an override on an output sees a quiet driver.
    pub fn spawn(sim: &Sim, ports: &PwmPorts, config: DeviceConfig) -> Result<(), SimError> {
        let ports = ports.clone();
        let mut core = PwmCore::new(config);
        debug!(
            "pwm device: period {} cycles, prescale {}",
            config.period_cycles(),
            config.prescale
        );
        sim.spawn(async move {
            let mut last = Outputs {
                dir: ports.dir.read(),
                en: ports.en.read(),
            };
            loop {
                ports.clk.rising_edge().await;
                let out = core.step(ports.reset.read(), ports.duty.read());
                if out.dir != last.dir {
                    trace!("{} device dir -> {}", ports.clk.now(), out.dir);
                    ports.dir.set(out.dir);
                }
                if out.en != last.en {
                    ports.en.set(out.en);
                }
                last = out;
            }
        })
    }
}
