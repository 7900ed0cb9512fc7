//! Edge monitors: when did a signal last change?

use pwmguard_sim::{Signal, SignalValue, Sim, SimDuration, SimError, SimTime, TimeUnit};
use std::cell::Cell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy)]
struct EdgeTimes {
    last_event: SimTime,
    last_rise: SimTime,
    last_fall: SimTime,
}

/// Tracks the timestamps of a signal's most recent transitions.
///
/// All three timestamps start at the moment the monitor is created.  They
/// are recorded in the settle phase of the instant the transition happened,
/// so a task woken by the same edge still sees the previous values; that is
/// what lets the duty checker measure edge-to-edge intervals.
#[derive(Clone)]
pub struct EdgeMonitor<T> {
    signal: Signal<T>,
    times: Rc<Cell<EdgeTimes>>,
}

impl<T: SignalValue> EdgeMonitor<T> {
    /// Start watching `signal`.
    pub fn spawn(sim: &Sim, signal: &Signal<T>) -> Result<Self, SimError> {
        Self::spawn_after(sim, signal, SimDuration::ZERO)
    }

    /// Start watching `signal` once `delay` has passed.  Transitions before
    /// then are ignored and the timestamps start at the end of the delay.
    pub fn spawn_after(sim: &Sim, signal: &Signal<T>, delay: SimDuration) -> Result<Self, SimError> {
        let start = sim.now() + delay;
        let times = Rc::new(Cell::new(EdgeTimes {
            last_event: start,
            last_rise: start,
            last_fall: start,
        }));

        let watched = signal.clone();
        let record = Rc::clone(&times);
        let settle = sim.clone();
        sim.spawn(async move {
            if delay > SimDuration::ZERO {
                settle.timer(delay).await;
            }
            loop {
                watched.edge().await;
                settle.settle().await;
                let now = settle.now();
                let mut t = record.get();
                t.last_event = now;
                match watched.read().level() {
                    Some(true) => t.last_rise = now,
                    Some(false) => t.last_fall = now,
                    None => {}
                }
                record.set(t);
            }
        })?;

        Ok(Self {
            signal: signal.clone(),
            times,
        })
    }

    pub fn signal(&self) -> &Signal<T> {
        &self.signal
    }

    pub fn last_event(&self) -> SimTime {
        self.times.get().last_event
    }

    /// Last transition to 1.  Only meaningful for single-bit signals.
    pub fn last_rise(&self) -> SimTime {
        self.times.get().last_rise
    }

    /// Last transition to 0.  Only meaningful for single-bit signals.
    pub fn last_fall(&self) -> SimTime {
        self.times.get().last_fall
    }

    /// Time since the last recorded transition.
    pub fn stable_interval(&self) -> SimDuration {
        self.signal.now().saturating_since(self.last_event())
    }

    pub fn stable_interval_in(&self, unit: TimeUnit) -> f64 {
        self.stable_interval().as_unit(unit)
    }
}

impl<T: SignalValue> std::fmt::Debug for EdgeMonitor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = self.times.get();
        f.debug_struct("EdgeMonitor")
            .field("signal", &self.signal.name())
            .field("last_event", &t.last_event)
            .field("last_rise", &t.last_rise)
            .field("last_fall", &t.last_fall)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pwmguard_sim::{SimConfig, Simulator};

    fn ns(n: u64) -> SimDuration {
        SimDuration::from_ns(n)
    }

    #[test]
    fn records_rise_and_fall() {
        let sim = Simulator::new(SimConfig::default());
        let h = sim.handle();
        let en = h.signal("en", false);
        let mon = EdgeMonitor::spawn(&h, &en).unwrap();
        let watcher = mon.clone();
        sim.run(async move {
            h.timer(ns(10)).await;
            en.set(true);
            h.timer(ns(30)).await;
            en.set(false);
            h.timer(ns(5)).await;
        })
        .unwrap();
        assert_eq!(watcher.last_rise(), SimTime::from_ps(10_000));
        assert_eq!(watcher.last_fall(), SimTime::from_ps(40_000));
        assert_eq!(watcher.last_event(), SimTime::from_ps(40_000));
        assert_eq!(watcher.stable_interval(), ns(5));
        assert_eq!(watcher.stable_interval_in(TimeUnit::Ns), 5.0);
    }

    #[test]
    fn timestamps_start_at_creation() {
        let sim = Simulator::new(SimConfig::default());
        let h = sim.handle();
        let duty = h.signal("duty_cycle", 0i8);
        let mon = sim
            .run({
                let h = h.clone();
                async move {
                    h.timer(ns(1)).await;
                    let mon = EdgeMonitor::spawn(&h, &duty).unwrap();
                    h.timer(ns(9)).await;
                    mon
                }
            })
            .unwrap();
        assert_eq!(mon.last_event(), SimTime::from_ps(1_000));
        assert_eq!(mon.last_rise(), SimTime::from_ps(1_000));
    }

    #[test]
    fn delayed_monitor_ignores_early_edges() {
        let sim = Simulator::new(SimConfig::default());
        let h = sim.handle();
        let en = h.signal("en", false);
        let mon = EdgeMonitor::spawn_after(&h, &en, ns(10)).unwrap();
        let watcher = mon.clone();
        sim.run(async move {
            h.timer(ns(3)).await;
            en.set(true);
            h.timer(ns(2)).await;
            en.set(false);
            h.timer(ns(10)).await;
        })
        .unwrap();
        assert_eq!(watcher.last_event(), SimTime::from_ps(10_000));
        assert_eq!(watcher.last_rise(), SimTime::from_ps(10_000));
        assert_eq!(watcher.stable_interval(), ns(5));
    }

    #[test]
    fn same_edge_waiter_sees_previous_timestamp() {
        let sim = Simulator::new(SimConfig::default());
        let h = sim.handle();
        let en = h.signal("en", false);
        let mon = EdgeMonitor::spawn(&h, &en).unwrap();
        let driver = en.clone();
        let dh = h.clone();
        h.spawn(async move {
            for _ in 0..2 {
                dh.timer(ns(100)).await;
                driver.set(true);
                dh.timer(ns(20)).await;
                driver.set(false);
            }
        })
        .unwrap();
        let (start, now) = sim
            .run(async move {
                en.rising_edge().await;
                en.rising_edge().await;
                (mon.last_rise(), h.now())
            })
            .unwrap();
        assert_eq!(start, SimTime::from_ps(100_000));
        assert_eq!(now, SimTime::from_ps(220_000));
    }

    #[test]
    fn multi_bit_signal_has_no_rise_or_fall() {
        let sim = Simulator::new(SimConfig::default());
        let h = sim.handle();
        let duty = h.signal("duty_cycle", 0i8);
        let mon = EdgeMonitor::spawn(&h, &duty).unwrap();
        let watcher = mon.clone();
        sim.run(async move {
            h.timer(ns(3)).await;
            duty.set(-5);
            h.timer(ns(1)).await;
        })
        .unwrap();
        assert_eq!(watcher.last_event(), SimTime::from_ps(3_000));
        assert_eq!(watcher.last_rise(), SimTime::ZERO);
        assert_eq!(watcher.last_fall(), SimTime::ZERO);
    }
}
