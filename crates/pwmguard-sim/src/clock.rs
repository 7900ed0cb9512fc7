//! Free-running clock driver.

use crate::error::SimError;
use crate::signal::Signal;
use crate::sim::Sim;
use crate::time::SimDuration;
use log::debug;

/// Periodic square wave on a boolean signal, starting high at the moment
/// it is started.  An odd picosecond period gives the extra picosecond to
/// the high phase.
#[derive(Debug, Clone)]
pub struct Clock {
    signal: Signal<bool>,
    period: SimDuration,
}

impl Clock {
    pub fn new(signal: Signal<bool>, period: SimDuration) -> Self {
        Self { signal, period }
    }

    pub fn period(&self) -> SimDuration {
        self.period
    }

    /// Spawn the driving task.  It runs for the rest of the simulation.
    pub fn start(self, sim: &Sim) -> Result<(), SimError> {
        let low = self.period / 2;
        let high = self.period - low;
        debug!("clock {} started, period {}", self.signal.name(), self.period);
        let timers = sim.clone();
        sim.spawn(async move {
            loop {
                self.signal.set(true);
                timers.timer(high).await;
                self.signal.set(false);
                timers.timer(low).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimConfig, Simulator};
    use crate::time::SimTime;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn square_wave_timing() {
        let sim = Simulator::new(SimConfig::default());
        let h = sim.handle();
        let clk = h.signal("mclk", false);
        Clock::new(clk.clone(), SimDuration::from_ns(10))
            .start(&h)
            .unwrap();

        let edges = Rc::new(RefCell::new(Vec::new()));
        let record = Rc::clone(&edges);
        let watched = clk.clone();
        h.spawn(async move {
            loop {
                let level = watched.edge().await;
                record.borrow_mut().push((watched.now(), level));
            }
        })
        .unwrap();

        let h2 = h.clone();
        sim.run(async move { h2.timer(SimDuration::from_ns(21)).await })
            .unwrap();
        assert_eq!(
            *edges.borrow(),
            vec![
                (SimTime::from_ps(0), true),
                (SimTime::from_ps(5_000), false),
                (SimTime::from_ps(10_000), true),
                (SimTime::from_ps(15_000), false),
                (SimTime::from_ps(20_000), true),
            ]
        );
    }
}
