//! Fault scenarios and the plans that sequence them.
//!
//! Each [`Scenario`] drives one invalid condition through signal overrides
//! and names the violation category it must provoke.  A [`FaultPlan`] is
//! the ordered list the injector walks.

use crate::violation::Category;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A deliberately invalid signal sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    // ── Reset ───────────────────────────────────────────────────
    /// `en` forced high across a forced reset pulse.
    EnableDuringReset,

    // ── Short circuit ───────────────────────────────────────────
    /// `dir` changed while `en` is forced high.
    ShortWhilePulsing,
    /// `en` dropped less than the margin before a `dir` change.
    ShortPreStability,
    /// `en` raised less than the margin after a `dir` change.
    ShortPostStability,

    // ── Direction ───────────────────────────────────────────────
    /// `dir` frozen while the control value changes sign.
    LateDirection,

    // ── Timeout ─────────────────────────────────────────────────
    /// Nonzero control with `en` forced low past the liveness timeout.
    StaticEnable,

    // ── Duty cycle ──────────────────────────────────────────────
    /// `en` toggled every clock cycle.
    TooFastPwm,
    /// One control value forced while `en` pulses at another duty.
    DutyMismatch,
}

impl Scenario {
    /// Every scenario, in injection order.
    pub const ALL: [Scenario; 8] = [
        Scenario::EnableDuringReset,
        Scenario::ShortWhilePulsing,
        Scenario::ShortPreStability,
        Scenario::ShortPostStability,
        Scenario::LateDirection,
        Scenario::StaticEnable,
        Scenario::TooFastPwm,
        Scenario::DutyMismatch,
    ];

    /// The category a working checker set reports for this scenario.
    pub fn category(&self) -> Category {
        match self {
            Scenario::EnableDuringReset => Category::Reset,
            Scenario::ShortWhilePulsing
            | Scenario::ShortPreStability
            | Scenario::ShortPostStability => Category::ShortCircuit,
            Scenario::LateDirection => Category::Direction,
            Scenario::StaticEnable => Category::Timeout,
            Scenario::TooFastPwm | Scenario::DutyMismatch => Category::DutyCycle,
        }
    }

    /// Log line announcing the injection.
    pub fn description(&self) -> &'static str {
        match self {
            Scenario::EnableDuringReset => "Enable during reset",
            Scenario::ShortWhilePulsing => "direction change during pulse",
            Scenario::ShortPreStability => {
                "pulse deassertion < 1 cycle before direction change"
            }
            Scenario::ShortPostStability => "pulse assertion < 1 cycle after direction change",
            Scenario::LateDirection => "Too late response on direction change",
            Scenario::StaticEnable => "Timeout, static enable with nonzero duty",
            Scenario::TooFastPwm => "Pulsing too fast",
            Scenario::DutyMismatch => "Setting one duty cycle and pulsing another",
        }
    }

    /// Whether the scenario has to outlast the liveness timeout.
    pub fn is_slow(&self) -> bool {
        matches!(self, Scenario::StaticEnable)
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scenario::EnableDuringReset => "enable-during-reset",
            Scenario::ShortWhilePulsing => "short-while-pulsing",
            Scenario::ShortPreStability => "short-pre-stability",
            Scenario::ShortPostStability => "short-post-stability",
            Scenario::LateDirection => "late-direction",
            Scenario::StaticEnable => "static-enable",
            Scenario::TooFastPwm => "too-fast-pwm",
            Scenario::DutyMismatch => "duty-mismatch",
        })
    }
}

/// What the injector checks after a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Expectation {
    /// The queue must hold this category; the rest is discarded.
    Violation(Category),
    /// Run the nominal end-of-run check instead, so the scenario's
    /// violations are reported as a failure.
    Report,
}

/// One step of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedFault {
    pub scenario: Scenario,
    pub expect: Expectation,
}

/// Ordered scenarios for one fault-injection run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultPlan {
    steps: Vec<PlannedFault>,
}

impl FaultPlan {
    /// Every fast scenario in order, plus the static-enable timeout when
    /// `include_timeout` is set.
    pub fn standard(include_timeout: bool) -> Self {
        Scenario::ALL
            .iter()
            .filter(|s| include_timeout || !s.is_slow())
            .fold(FaultPlanBuilder::new(), |b, s| b.expect(*s))
            .build()
    }

    pub fn steps(&self) -> &[PlannedFault] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Builder for fault plans.
///
/// # Example
///
/// ```
/// use pwmguard_monitor::scenario::{FaultPlanBuilder, Scenario};
///
/// let plan = FaultPlanBuilder::new()
///     .expect(Scenario::ShortWhilePulsing)
///     .expect(Scenario::DutyMismatch)
///     .build();
/// assert_eq!(plan.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct FaultPlanBuilder {
    steps: Vec<PlannedFault>,
}

impl FaultPlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `scenario` and expect its own category.
    pub fn expect(self, scenario: Scenario) -> Self {
        let category = scenario.category();
        self.expect_category(scenario, category)
    }

    /// Run `scenario` and expect `category` instead of its own.
    pub fn expect_category(mut self, scenario: Scenario, category: Category) -> Self {
        self.steps.push(PlannedFault {
            scenario,
            expect: Expectation::Violation(category),
        });
        self
    }

    /// Run `scenario` and fail with the ordinary end-of-run report.
    pub fn report(mut self, scenario: Scenario) -> Self {
        self.steps.push(PlannedFault {
            scenario,
            expect: Expectation::Report,
        });
        self
    }

    pub fn build(self) -> FaultPlan {
        FaultPlan { steps: self.steps }
    }
}
