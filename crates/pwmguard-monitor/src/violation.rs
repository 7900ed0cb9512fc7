//! Violation records and the queue the checkers report into.
//!
//! The queue is the single point of truth for pass/fail:
//!
//! | Operation        | Used by        | Fails when                          |
//! |------------------|----------------|-------------------------------------|
//! | `put`            | checkers       | never                               |
//! | `check_empty`    | nominal run    | any violation is queued             |
//! | `find_and_clear` | fault injector | queue empty or category not present |
//!
//! Both draining operations leave the queue empty.

use log::{error, info};
use pwmguard_sim::{Sim, SimTime};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// What kind of invariant was broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// `en` high when reset is released.
    Reset,
    /// `dir` changed without `en` safely low around it.
    ShortCircuit,
    /// `en` static for too long with a nonzero control value.
    Timeout,
    /// `dir` does not follow the sign of the control value.
    Direction,
    /// Enable period too short or duty off target.
    DutyCycle,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Reset,
        Category::ShortCircuit,
        Category::Timeout,
        Category::Direction,
        Category::DutyCycle,
    ];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::Reset => "Reset",
            Category::ShortCircuit => "Short circuit",
            Category::Timeout => "Timeout",
            Category::Direction => "Direction",
            Category::DutyCycle => "Duty cycle",
        })
    }
}

/// One detected violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub category: Category,
    /// Simulated time of detection.
    pub timestamp: SimTime,
    pub detail: String,
}

impl Violation {
    /// First line of the detail text.
    pub fn summary(&self) -> &str {
        self.detail.lines().next().unwrap_or("")
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @{}: {}", self.category, self.timestamp, self.summary())
    }
}

/// Every violation found by a nominal run.  The last one is the cause.
#[derive(Error, Debug, Clone, Serialize)]
#[error("{} violation(s) detected, last: {cause}", .violations.len())]
pub struct ViolationReport {
    pub violations: Vec<Violation>,
    pub cause: Violation,
}

/// A fault-injection lookup came back empty-handed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("violation queue empty while looking for {sought}")]
    Empty { sought: Category },

    #[error("{sought} violation sought but not found among {discarded} queued")]
    NotFound { sought: Category, discarded: usize },
}

/// FIFO of violations in detection order.  Clones share the queue.
#[derive(Clone)]
pub struct ViolationQueue {
    sim: Sim,
    entries: Rc<RefCell<VecDeque<Violation>>>,
}

impl ViolationQueue {
    pub fn new(sim: &Sim) -> Self {
        Self {
            sim: sim.clone(),
            entries: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    /// Append a violation stamped with the current simulated time.
    pub fn put(&self, category: Category, detail: impl Into<String>) {
        let violation = Violation {
            category,
            timestamp: self.sim.now(),
            detail: detail.into(),
        };
        self.entries.borrow_mut().push_back(violation);
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<Violation> {
        self.entries.borrow().iter().cloned().collect()
    }

    /// Pass if nothing was reported.  Otherwise log every entry and fail
    /// with the most recent one as the cause.
    pub fn check_empty(&self) -> Result<(), ViolationReport> {
        let drained: Vec<Violation> = self.entries.borrow_mut().drain(..).collect();
        let Some(cause) = drained.last().cloned() else {
            info!("No errors found");
            return Ok(());
        };
        for v in &drained {
            error!("Error found: {} @{}\n{}", v.category, v.timestamp, v.summary());
        }
        Err(ViolationReport {
            violations: drained,
            cause,
        })
    }

    /// Look for `category`, oldest first, and discard the whole queue
    /// whatever the outcome.
    pub fn find_and_clear(&self, category: Category) -> Result<Violation, QueueError> {
        let drained: Vec<Violation> = self.entries.borrow_mut().drain(..).collect();
        if drained.is_empty() {
            return Err(QueueError::Empty { sought: category });
        }
        let discarded = drained.len();
        match drained.into_iter().find(|v| v.category == category) {
            Some(found) => {
                info!("    Found error: {} @ {}... ", found.category, found.timestamp);
                Ok(found)
            }
            None => Err(QueueError::NotFound {
                sought: category,
                discarded,
            }),
        }
    }
}

impl fmt::Debug for ViolationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.borrow().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pwmguard_sim::{SimConfig, SimDuration, Simulator};

    fn queue_with(entries: &[(Category, u64)]) -> ViolationQueue {
        let sim = Simulator::new(SimConfig::default());
        let h = sim.handle();
        let queue = ViolationQueue::new(&h);
        let writer = queue.clone();
        let entries = entries.to_vec();
        sim.run(async move {
            for (category, at_ns) in entries {
                let wait = SimDuration::from_ns(at_ns).saturating_sub(h.now() - SimTime::ZERO);
                h.timer(wait).await;
                writer.put(category, format!("{category} at {at_ns}ns\nsecond line"));
            }
        })
        .unwrap();
        queue
    }

    #[test]
    fn category_names() {
        assert_eq!(Category::ShortCircuit.to_string(), "Short circuit");
        assert_eq!(Category::DutyCycle.to_string(), "Duty cycle");
        assert_eq!(
            serde_json::to_string(&Category::DutyCycle).unwrap(),
            "\"duty-cycle\""
        );
    }

    #[test]
    fn put_stamps_simulated_time() {
        let q = queue_with(&[(Category::Reset, 15)]);
        let v = q.snapshot();
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].timestamp, SimTime::from_ps(15_000));
        assert_eq!(v[0].summary(), "Reset at 15ns");
    }

    #[test]
    fn check_empty_passes_on_empty_queue() {
        let q = queue_with(&[]);
        assert!(q.check_empty().is_ok());
    }

    #[test]
    fn check_empty_reports_last_as_cause() {
        let q = queue_with(&[(Category::Direction, 5), (Category::Timeout, 9)]);
        let report = q.check_empty().unwrap_err();
        assert_eq!(report.violations.len(), 2);
        assert_eq!(report.cause.category, Category::Timeout);
        assert!(q.is_empty());
        assert!(report.to_string().starts_with("2 violation(s) detected"));
    }

    #[test]
    fn find_and_clear_found() {
        let q = queue_with(&[
            (Category::DutyCycle, 1),
            (Category::ShortCircuit, 2),
            (Category::ShortCircuit, 3),
        ]);
        let found = q.find_and_clear(Category::ShortCircuit).unwrap();
        assert_eq!(found.timestamp, SimTime::from_ps(2_000));
        assert!(q.is_empty());
    }

    #[test]
    fn find_and_clear_not_found_still_clears() {
        let q = queue_with(&[(Category::DutyCycle, 1), (Category::Reset, 2)]);
        let err = q.find_and_clear(Category::Direction).unwrap_err();
        assert_eq!(
            err,
            QueueError::NotFound {
                sought: Category::Direction,
                discarded: 2
            }
        );
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn find_and_clear_empty() {
        let q = queue_with(&[]);
        assert_eq!(
            q.find_and_clear(Category::Reset),
            Err(QueueError::Empty {
                sought: Category::Reset
            })
        );
    }
}
