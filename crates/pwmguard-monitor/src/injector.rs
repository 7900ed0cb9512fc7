//! Fault injector: proves the checkers fire.
//!
//! Each scenario overrides port signals to produce one invalid condition,
//! then releases every override and asks the violation queue for the
//! expected category.  A scenario that goes unnoticed is a harness
//! failure, not a device failure.

use crate::config::TimingConfig;
use crate::harness::HarnessError;
use crate::scenario::{Expectation, FaultPlan, Scenario};
use crate::violation::{Category, Violation, ViolationQueue};
use log::{debug, info};
use pwmguard_device::{DeviceConfig, PwmPorts};
use pwmguard_sim::{clock_cycles, OverrideLease, Sim, SimDuration, SimTime};
use serde::Serialize;

/// Lease owner name used while a plan runs.
const LEASE_OWNER: &str = "fault-injector";

/// Result of one injected scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    pub scenario: Scenario,
    /// `None` for scenarios run under [`Expectation::Report`].
    pub expected: Option<Category>,
    pub started: SimTime,
    pub finished: SimTime,
    /// The matching violation, oldest first.
    pub detected: Option<Violation>,
}

pub struct FaultInjector {
    sim: Sim,
    ports: PwmPorts,
    queue: ViolationQueue,
    timing: TimingConfig,
}

impl FaultInjector {
    pub fn new(sim: &Sim, ports: &PwmPorts, queue: &ViolationQueue, timing: &TimingConfig) -> Self {
        Self {
            sim: sim.clone(),
            ports: ports.clone(),
            queue: queue.clone(),
            timing: timing.clone(),
        }
    }

    /// Run every step of `plan` in order.  Stops at the first scenario
    /// whose expectation is not met.
    pub async fn run(&self, plan: &FaultPlan) -> Result<Vec<ScenarioOutcome>, HarnessError> {
        info!("*** FAULT INJECTION RUNNING ***");
        let lease = self.sim.claim_overrides(LEASE_OWNER)?;
        let mut outcomes = Vec::with_capacity(plan.len());

        for step in plan.steps() {
            let started = self.sim.now();
            info!("Injecting error: {}...", step.scenario.description());
            self.inject(&lease, step.scenario).await;
            lease.release_all();

            let (expected, detected) = match step.expect {
                Expectation::Violation(category) => {
                    let found = self.queue.find_and_clear(category).map_err(|source| {
                        HarnessError::MissedFault {
                            scenario: step.scenario,
                            source,
                        }
                    })?;
                    (Some(category), Some(found))
                }
                Expectation::Report => {
                    self.queue.check_empty()?;
                    (None, None)
                }
            };

            outcomes.push(ScenarioOutcome {
                scenario: step.scenario,
                expected,
                started,
                finished: self.sim.now(),
                detected,
            });
        }

        info!("Injected faults managed!");
        info!("*** FAULT INJECTION COMPLETE ***");
        Ok(outcomes)
    }

    async fn inject(&self, lease: &OverrideLease, scenario: Scenario) {
        match scenario {
            Scenario::EnableDuringReset => self.enable_during_reset(lease).await,
            Scenario::ShortWhilePulsing => self.short_while_pulsing(lease).await,
            Scenario::ShortPreStability => self.short_pre_stability(lease).await,
            Scenario::ShortPostStability => self.short_post_stability(lease).await,
            Scenario::LateDirection => self.late_direction(lease).await,
            Scenario::StaticEnable => self.static_enable(lease).await,
            Scenario::TooFastPwm => self.too_fast_pwm(lease).await,
            Scenario::DutyMismatch => self.duty_mismatch(lease).await,
        }
        debug!("{scenario} finished at {}", self.sim.now());
    }

    fn period(&self) -> SimDuration {
        self.timing.clock_period
    }

    fn nudge() -> SimDuration {
        SimDuration::from_ns(1)
    }

    /// Hold reset low so the device runs while overrides are applied.
    async fn disable_reset(&self, lease: &OverrideLease) {
        self.ports.reset.force(lease, false);
        self.sim.timer(self.period() * 2).await;
    }

    async fn enable_during_reset(&self, lease: &OverrideLease) {
        let clk = &self.ports.clk;
        clk.rising_edge().await;
        self.ports.reset.force(lease, true);
        self.ports.en.force(lease, true);
        clk.rising_edge().await;
        self.ports.reset.force(lease, false);
        clk.rising_edge().await;
    }

    async fn short_while_pulsing(&self, lease: &OverrideLease) {
        self.disable_reset(lease).await;
        self.ports.dir.force(lease, false);
        self.ports.en.force(lease, true);
        self.sim.timer(Self::nudge()).await;
        self.ports.dir.force(lease, true);
        self.sim.timer(self.period() * 3).await;
    }

    async fn short_pre_stability(&self, lease: &OverrideLease) {
        self.disable_reset(lease).await;
        self.ports.en.force(lease, true);
        self.sim.timer(Self::nudge()).await;
        self.ports.en.force(lease, false);
        self.sim
            .timer(self.timing.short_circuit_margin().saturating_sub(Self::nudge()))
            .await;
        let flipped = !self.ports.dir.read();
        self.ports.dir.force(lease, flipped);
        self.sim.timer(self.period()).await;
    }

    async fn short_post_stability(&self, lease: &OverrideLease) {
        self.disable_reset(lease).await;
        self.ports.en.force(lease, false);
        self.sim.timer(self.period() * 2).await;
        let flipped = !self.ports.dir.read();
        self.ports.dir.force(lease, flipped);
        self.sim
            .timer(self.timing.short_circuit_margin().saturating_sub(Self::nudge()))
            .await;
        self.ports.en.force(lease, true);
        self.sim.timer(Self::nudge()).await;
    }

    async fn late_direction(&self, lease: &OverrideLease) {
        self.disable_reset(lease).await;
        let cycles = self.timing.direction_cycles + 1;
        self.ports.dir.freeze(lease);
        self.ports.duty.force(lease, -18);
        clock_cycles(&self.ports.clk, cycles).await;
        self.ports.duty.force(lease, 17);
        clock_cycles(&self.ports.clk, cycles).await;
    }

    async fn static_enable(&self, lease: &OverrideLease) {
        self.disable_reset(lease).await;
        self.ports.duty.force(lease, 0x50);
        self.ports.en.force(lease, false);
        self.sim
            .timer(self.timing.pwm_timeout + self.timing.min_pwm_period)
            .await;
    }

    async fn too_fast_pwm(&self, lease: &OverrideLease) {
        self.disable_reset(lease).await;
        let clk = &self.ports.clk;
        clk.rising_edge().await;
        for _ in 0..4 {
            self.ports.en.force(lease, true);
            clk.rising_edge().await;
            self.ports.en.force(lease, false);
            clk.rising_edge().await;
        }
    }

    /// Control says 25 % reverse while `en` pulses at 50 %.
    async fn duty_mismatch(&self, lease: &OverrideLease) {
        self.disable_reset(lease).await;
        let clk = &self.ports.clk;
        self.ports.en.force(lease, false);
        clock_cycles(clk, 10).await;
        self.ports.duty.force(lease, -32);
        clock_cycles(clk, 10).await;
        let half = self.half_period_cycles();
        for _ in 0..2 {
            self.ports.en.force(lease, true);
            clock_cycles(clk, half).await;
            self.ports.en.force(lease, false);
            clock_cycles(clk, half).await;
        }
    }

    /// Half of the reference device's default period plus one cycle, or of
    /// the minimum period if that is longer: 8001 cycles at 10 ns.
    fn half_period_cycles(&self) -> u32 {
        let clock = self.period().as_ps().max(1);
        let min_half = (self.timing.min_pwm_period.as_ps() / 2 + clock - 1) / clock;
        let device_half = u64::from(DeviceConfig::default().period_cycles() / 2);
        u32::try_from(min_half.max(device_half) + 1).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkers::Monitor;
    use crate::scenario::FaultPlanBuilder;
    use pwmguard_sim::{Clock, SimConfig, Simulator};

    /// Clock, monitors and injector on bare ports.
    fn run_plan(plan: FaultPlan, timing: TimingConfig) -> Result<Vec<ScenarioOutcome>, HarnessError> {
        let sim = Simulator::new(SimConfig::default());
        let h = sim.handle();
        let ports = PwmPorts::new(&h);
        let queue = ViolationQueue::new(&h);
        Clock::new(ports.clk.clone(), timing.clock_period)
            .start(&h)
            .unwrap();
        Monitor::start(&h, &ports, &queue, &timing).unwrap();
        let injector = FaultInjector::new(&h, &ports, &queue, &timing);
        sim.run(async move { injector.run(&plan).await }).unwrap()
    }

    #[test]
    fn half_period_for_default_limits() {
        let sim = Simulator::new(SimConfig::default());
        let h = sim.handle();
        let ports = PwmPorts::new(&h);
        let queue = ViolationQueue::new(&h);
        let injector = FaultInjector::new(&h, &ports, &queue, &TimingConfig::default());
        assert_eq!(injector.half_period_cycles(), 8001);
    }

    #[test]
    fn short_circuit_scenarios_are_detected() {
        let plan = FaultPlanBuilder::new()
            .expect(Scenario::ShortWhilePulsing)
            .expect(Scenario::ShortPreStability)
            .expect(Scenario::ShortPostStability)
            .build();
        let outcomes = run_plan(plan, TimingConfig::default()).unwrap();
        assert_eq!(outcomes.len(), 3);
        for outcome in &outcomes {
            let found = outcome.detected.as_ref().unwrap();
            assert_eq!(found.category, Category::ShortCircuit);
            assert!(found.timestamp >= outcome.started && found.timestamp <= outcome.finished);
        }
    }

    #[test]
    fn enable_during_reset_is_detected() {
        let plan = FaultPlanBuilder::new()
            .expect(Scenario::EnableDuringReset)
            .build();
        let outcomes = run_plan(plan, TimingConfig::default()).unwrap();
        let found = outcomes[0].detected.as_ref().unwrap();
        assert_eq!(found.category, Category::Reset);
        assert_eq!(found.timestamp, SimTime::from_ps(10_000));
    }

    #[test]
    fn wrong_expectation_is_a_missed_fault() {
        let plan = FaultPlanBuilder::new()
            .expect_category(Scenario::ShortWhilePulsing, Category::Timeout)
            .expect(Scenario::ShortPreStability)
            .build();
        let err = run_plan(plan, TimingConfig::default()).unwrap_err();
        match err {
            HarnessError::MissedFault { scenario, source } => {
                assert_eq!(scenario, Scenario::ShortWhilePulsing);
                assert!(matches!(
                    source,
                    crate::violation::QueueError::NotFound {
                        sought: Category::Timeout,
                        ..
                    }
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn report_expectation_fails_with_violations() {
        let plan = FaultPlanBuilder::new()
            .report(Scenario::LateDirection)
            .build();
        let err = run_plan(plan, TimingConfig::default()).unwrap_err();
        match err {
            HarnessError::Violations(report) => {
                assert_eq!(report.violations.len(), 1);
                assert_eq!(report.cause.category, Category::Direction);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn static_enable_times_out() {
        let timing = TimingConfig {
            pwm_timeout: SimDuration::from_us(20),
            min_pwm_period: SimDuration::from_us(2),
            ..TimingConfig::default()
        };
        let plan = FaultPlanBuilder::new()
            .expect(Scenario::StaticEnable)
            .build();
        let outcomes = run_plan(plan, timing).unwrap();
        let found = outcomes[0].detected.as_ref().unwrap();
        assert_eq!(found.category, Category::Timeout);
    }
}
