//! Runtime-verification monitor for PWM H-bridge controllers.
//!
//! Five property checkers watch the port bundle of a
//! [`pwmguard_device::PwmDevice`] and report every broken invariant to a
//! shared [`ViolationQueue`].  Two harnesses drive them:
//!
//! - [`run_nominal`] applies a valid, seeded stimulus and passes only if
//!   the queue stays empty.
//! - [`run_fault_injection`] forces each invalid condition in turn through
//!   signal overrides and passes only if every expected category shows up.
//!
//! ```text
//!   StimulusGenerator ─┐                  ┌─► EdgeMonitor ─┐
//!                      ├─► PwmPorts ──────┤                ├─► Checkers ─► ViolationQueue
//!   FaultInjector ─────┘   (overrides)    └────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use pwmguard_monitor::{run_fault_injection, HarnessConfig};
//!
//! let report = run_fault_injection(&HarnessConfig::default()).unwrap();
//! println!("{report}");
//! ```

pub mod checkers;
pub mod config;
pub mod edge;
pub mod harness;
pub mod injector;
pub mod scenario;
pub mod stimulus;
pub mod violation;

pub use checkers::Monitor;
pub use config::{FixedDuty, HarnessConfig, StimulusConfig, TimingConfig};
pub use edge::EdgeMonitor;
pub use harness::{
    run_fault_injection, run_fault_plan, run_nominal, FaultReport, HarnessError, NominalReport,
};
pub use injector::{FaultInjector, ScenarioOutcome};
pub use scenario::{Expectation, FaultPlan, FaultPlanBuilder, PlannedFault, Scenario};
pub use stimulus::{StimulusGenerator, StimulusSummary};
pub use violation::{Category, QueueError, Violation, ViolationQueue, ViolationReport};
