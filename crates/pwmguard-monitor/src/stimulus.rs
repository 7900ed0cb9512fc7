//! Nominal stimulus: the valid input sequence a correct device must pass.

use crate::config::StimulusConfig;
use log::info;
use pwmguard_device::{duty_from_percent, PwmPorts};
use pwmguard_sim::{Clock, Signal, Sim, SimDuration, SimError};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::Serialize;

/// What the generator actually applied, for reports and replay checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StimulusSummary {
    /// Raw control values in the order they were applied.
    pub duties: Vec<i8>,
    /// Idle wait closing each random round.
    pub idle_waits: Vec<SimDuration>,
    /// Reset pulses applied, including the initial one.
    pub resets: u32,
}

/// Drives clock, reset and control value.  Never overrides anything.
pub struct StimulusGenerator {
    sim: Sim,
    ports: PwmPorts,
    config: StimulusConfig,
    rng: ChaCha20Rng,
    summary: StimulusSummary,
}

impl StimulusGenerator {
    /// Start the clock, zero the control value and spawn the initial
    /// reset pulse.
    pub fn start(
        sim: &Sim,
        ports: &PwmPorts,
        config: &StimulusConfig,
        clock_period: SimDuration,
        seed: u64,
    ) -> Result<Self, SimError> {
        info!("Starting clock");
        Clock::new(ports.clk.clone(), clock_period).start(sim)?;
        ports.duty.set(0);
        sim.spawn(reset_pulse(sim.clone(), ports.reset.clone(), config.reset_hold))?;
        Ok(Self {
            sim: sim.clone(),
            ports: ports.clone(),
            config: config.clone(),
            rng: rng_from_seed(seed),
            summary: StimulusSummary {
                resets: 1,
                ..StimulusSummary::default()
            },
        })
    }

    /// Fixed values, a random round, a reset aligned with an enable pulse,
    /// then a second random round.
    pub async fn run(mut self) -> StimulusSummary {
        info!("Starting duty cycle tests");
        self.sim.timer(self.config.start_delay).await;
        self.fixed_duty_tests().await;
        info!("Fixed duty tests complete");
        self.random_duties(self.config.random_first).await;
        info!("Random duty tests 1/2 complete");
        self.ports.en.rising_edge().await;
        reset_pulse(
            self.sim.clone(),
            self.ports.reset.clone(),
            self.config.reset_hold,
        )
        .await;
        self.summary.resets += 1;
        info!("Reset between duties complete");
        self.random_duties(self.config.random_second).await;
        info!("Random duty tests 2/2 complete");
        self.summary
    }

    fn set_duty(&mut self, percent: i32) {
        let raw = duty_from_percent(percent);
        self.ports.duty.set(raw);
        self.summary.duties.push(raw);
    }

    async fn wait_pulses(&self, pulses: u32) {
        for _ in 0..pulses {
            self.ports.en.rising_edge().await;
        }
    }

    async fn fixed_duty_tests(&mut self) {
        for step in self.config.fixed.clone() {
            self.set_duty(step.percent);
            self.wait_pulses(step.pulses).await;
        }
    }

    /// Values are drawn without replacement from both signs, excluding the
    /// extremes, then the round ends with a random idle wait.
    async fn random_duties(&mut self, tests: usize) {
        let lo = self.config.random_min_percent;
        let hi = self.config.random_max_percent;
        let mut candidates: Vec<i32> = (-hi..=-lo).chain(lo..=hi).collect();
        for _ in 0..tests {
            if candidates.is_empty() {
                break;
            }
            let idx = self.rng.gen_range(0..candidates.len());
            let percent = candidates.remove(idx);
            self.set_duty(percent);
            self.wait_pulses(self.config.random_pulses).await;
        }

        let max_us = (self.config.idle_max.as_ps() / SimDuration::from_us(1).as_ps()).max(1);
        let idle = SimDuration::from_us(self.rng.gen_range(1..=max_us));
        self.summary.idle_waits.push(idle);
        self.sim.timer(idle).await;
    }
}

async fn reset_pulse(sim: Sim, reset: Signal<bool>, hold: SimDuration) {
    info!("Resetting module...");
    reset.set(true);
    sim.timer(hold).await;
    reset.set(false);
}

fn rng_from_seed(seed: u64) -> ChaCha20Rng {
    let mut key = [0u8; 32];
    key[..8].copy_from_slice(&seed.to_le_bytes());
    ChaCha20Rng::from_seed(key)
}
