//! Run entry points: the nominal run and the fault-injection run.
//!
//! Both build a fresh simulation with the reference device, the monitor
//! and the stimulus generator, then differ in who drives the ports
//! afterwards and how the violation queue is judged.

use crate::checkers::Monitor;
use crate::config::HarnessConfig;
use crate::injector::{FaultInjector, ScenarioOutcome};
use crate::scenario::{FaultPlan, Scenario};
use crate::stimulus::{StimulusGenerator, StimulusSummary};
use crate::violation::{QueueError, ViolationQueue, ViolationReport};
use log::info;
use pwmguard_device::{PwmDevice, PwmPorts};
use pwmguard_sim::{KernelStats, Sim, SimError, SimTime, Simulator};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can stop a harness run.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("simulation failed: {0}")]
    Sim(#[from] SimError),

    /// The device broke an invariant during a nominal run.
    #[error(transparent)]
    Violations(#[from] ViolationReport),

    /// The checkers did not notice an injected fault.
    #[error("injected fault {scenario} went undetected: {source}")]
    MissedFault {
        scenario: Scenario,
        #[source]
        source: QueueError,
    },

    #[error("cannot read config {}: {source}", path.display())]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    ParseConfig {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Outcome of a passing nominal run.
#[derive(Debug, Clone, Serialize)]
pub struct NominalReport {
    pub seed: u64,
    pub finished_at: SimTime,
    pub stimulus: StimulusSummary,
    pub stats: KernelStats,
}

impl fmt::Display for NominalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "✅ NOMINAL RUN PASSED (seed {})", self.seed)?;
        writeln!(f, "   Finished at:   {}", self.finished_at)?;
        writeln!(f, "   Duty values:   {}", self.stimulus.duties.len())?;
        writeln!(f, "   Resets:        {}", self.stimulus.resets)?;
        writeln!(
            f,
            "   Kernel:        {} instants, {} deltas, {} writes",
            self.stats.instants, self.stats.deltas, self.stats.writes
        )
    }
}

/// Outcome of a passing fault-injection run.
#[derive(Debug, Clone, Serialize)]
pub struct FaultReport {
    pub seed: u64,
    pub finished_at: SimTime,
    pub outcomes: Vec<ScenarioOutcome>,
}

impl fmt::Display for FaultReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "✅ FAULT INJECTION PASSED: {} scenario(s) detected",
            self.outcomes.len()
        )?;
        writeln!(
            f,
            "   {:<22} {:<14} {:>12}  {}",
            "Scenario", "Category", "Detected at", "Detail"
        )?;
        for outcome in &self.outcomes {
            let (category, at, detail) = match &outcome.detected {
                Some(v) => (v.category.to_string(), v.timestamp.to_string(), v.summary()),
                None => ("-".to_string(), "-".to_string(), "reported"),
            };
            writeln!(
                f,
                "   {:<22} {:<14} {:>12}  {}",
                outcome.scenario.to_string(),
                category,
                at,
                detail
            )?;
        }
        writeln!(f, "   Finished at {}", self.finished_at)
    }
}

/// The ports, device and queue shared by both runs.
struct Bench {
    simulator: Simulator,
    sim: Sim,
    ports: PwmPorts,
    queue: ViolationQueue,
}

impl Bench {
    fn new(config: &HarnessConfig) -> Result<Self, HarnessError> {
        config.validate()?;
        let simulator = Simulator::new(config.sim);
        let sim = simulator.handle();
        let ports = PwmPorts::new(&sim);
        PwmDevice::spawn(&sim, &ports, config.device)?;
        let queue = ViolationQueue::new(&sim);
        Ok(Self {
            simulator,
            sim,
            ports,
            queue,
        })
    }
}

/// Drive the device with the valid stimulus and require an empty queue.
pub fn run_nominal(config: &HarnessConfig) -> Result<NominalReport, HarnessError> {
    let Bench {
        simulator,
        sim,
        ports,
        queue,
    } = Bench::new(config)?;
    let stimulus = StimulusGenerator::start(
        &sim,
        &ports,
        &config.stimulus,
        config.timing.clock_period,
        config.seed,
    )?;
    Monitor::start(&sim, &ports, &queue, &config.timing)?;

    info!("*** STARTING ORDINARY TESTS ***");
    let summary = simulator.run(stimulus.run())?;
    queue.check_empty()?;
    info!("*** ORDINARY TESTS DONE! ***");

    Ok(NominalReport {
        seed: config.seed,
        finished_at: sim.now(),
        stimulus: summary,
        stats: sim.stats(),
    })
}

/// Run the standard fault plan, with the timeout scenario if configured.
pub fn run_fault_injection(config: &HarnessConfig) -> Result<FaultReport, HarnessError> {
    let plan = FaultPlan::standard(config.include_timeout_scenario);
    run_fault_plan(config, &plan)
}

/// Inject every scenario of `plan` and require each expected category.
pub fn run_fault_plan(config: &HarnessConfig, plan: &FaultPlan) -> Result<FaultReport, HarnessError> {
    let Bench {
        simulator,
        sim,
        ports,
        queue,
    } = Bench::new(config)?;
    Monitor::start(&sim, &ports, &queue, &config.timing)?;
    // Clock and initial reset only; the injector drives from here on.
    StimulusGenerator::start(
        &sim,
        &ports,
        &config.stimulus,
        config.timing.clock_period,
        config.seed,
    )?;
    let injector = FaultInjector::new(&sim, &ports, &queue, &config.timing);

    let plan = plan.clone();
    let outcomes = simulator.run(async move { injector.run(&plan).await })??;

    Ok(FaultReport {
        seed: config.seed,
        finished_at: sim.now(),
        outcomes,
    })
}
