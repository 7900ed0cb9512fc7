//! The five property checkers.
//!
//! Each checker is a perpetual task on the simulation executor.  A failed
//! check becomes a [`Violation`](crate::violation::Violation) in the queue
//! and the checker carries on; nothing here ever aborts the run.
//!
//! | Checker        | Wakes on                 | Category      |
//! |----------------|--------------------------|---------------|
//! | reset          | falling `reset`          | Reset         |
//! | short circuit  | any `dir` transition     | ShortCircuit  |
//! | timeout        | nonzero control          | Timeout       |
//! | direction      | any control transition   | Direction     |
//! | duty cycle     | rising `en`              | DutyCycle     |

use crate::config::TimingConfig;
use crate::edge::EdgeMonitor;
use crate::violation::{Category, ViolationQueue};
use log::{debug, info};
use pwmguard_device::{duty_percent, PwmPorts};
use pwmguard_sim::{
    clock_cycles, first, with_timeout, Either, Sim, SimDuration, SimError, SimTime, TimeUnit,
};
use std::future::Future;
use std::rc::Rc;

/// Entry point for starting the checker set.
pub struct Monitor;

impl Monitor {
    /// Spawn the edge monitors and checkers.  They begin after
    /// `timing.startup_settle`, once the initial values have propagated.
    pub fn start(
        sim: &Sim,
        ports: &PwmPorts,
        queue: &ViolationQueue,
        timing: &TimingConfig,
    ) -> Result<(), SimError> {
        let delay = timing.startup_settle;
        let this = Rc::new(Checkers {
            sim: sim.clone(),
            ports: ports.clone(),
            queue: queue.clone(),
            timing: timing.clone(),
            en_mon: EdgeMonitor::spawn_after(sim, &ports.en, delay)?,
            duty_mon: EdgeMonitor::spawn_after(sim, &ports.duty, delay)?,
            reset_mon: EdgeMonitor::spawn_after(sim, &ports.reset, delay)?,
        });

        this.spawn_after_settle(Rc::clone(&this).check_reset())?;
        this.spawn_after_settle(Rc::clone(&this).check_short_circuit())?;
        this.spawn_after_settle(Rc::clone(&this).check_timeout())?;
        this.spawn_after_settle(Rc::clone(&this).check_direction())?;
        this.spawn_after_settle(Rc::clone(&this).check_duty_cycle())?;
        info!("Monitoring events from {}", sim.now() + delay);
        Ok(())
    }
}

struct Checkers {
    sim: Sim,
    ports: PwmPorts,
    queue: ViolationQueue,
    timing: TimingConfig,
    en_mon: EdgeMonitor<bool>,
    duty_mon: EdgeMonitor<i8>,
    reset_mon: EdgeMonitor<bool>,
}

impl Checkers {
    fn spawn_after_settle<F>(&self, check: F) -> Result<(), SimError>
    where
        F: Future<Output = ()> + 'static,
    {
        let sim = self.sim.clone();
        let delay = self.timing.startup_settle;
        self.sim.spawn(async move {
            sim.timer(delay).await;
            check.await;
        })
    }

    fn report(&self, category: Category, detail: String) {
        debug!("{} {category}: {detail}", self.sim.now());
        self.queue.put(category, detail);
    }

    /// `en` must already be low when reset is released.
    async fn check_reset(self: Rc<Self>) {
        loop {
            self.ports.reset.falling_edge().await;
            if self.ports.en.read() {
                self.report(
                    Category::Reset,
                    "PWM enable has not been deasserted during reset".to_string(),
                );
            }
            debug!("Completed: Reset test");
        }
    }

    async fn check_short_circuit(self: Rc<Self>) {
        loop {
            self.ports.dir.edge().await;
            if self.ports.reset.read() {
                continue;
            }
            if let Err(detail) = self.short_circuit_guard().await {
                self.report(Category::ShortCircuit, detail);
            }
        }
    }

    /// `en` low at the change, low for longer than the margin before it,
    /// and staying low for the margin after it.
    async fn short_circuit_guard(&self) -> Result<(), String> {
        let margin = self.timing.short_circuit_margin();
        if self.ports.en.read() {
            return Err("HALF-BRIDGE SHORT CIRCUITED: en active when changing direction".into());
        }
        let stable = self.en_mon.stable_interval();
        if stable <= margin {
            return Err(format!(
                "SHORT CIRCUIT DANGER: en deactivated {stable} before dir change, \
                 less than one cycle ({margin})"
            ));
        }
        match first(self.sim.timer(margin), self.ports.en.edge()).await {
            Either::Left(()) => Ok(()),
            Either::Right(_) => Err(format!(
                "SHORT CIRCUIT DANGER: en was not stable for {margin} after dir change"
            )),
        }
    }

    async fn check_timeout(self: Rc<Self>) {
        let limit = self.timing.pwm_timeout;
        loop {
            if self.ports.duty.read() == 0 {
                self.ports.duty.edge().await;
            }
            if with_timeout(&self.sim, self.ports.en.edge(), limit).await.is_err() {
                self.report(
                    Category::Timeout,
                    format!("PWM signal is static, no enable transition for {limit}"),
                );
            }
        }
    }

    async fn check_direction(self: Rc<Self>) {
        let cycles = self.timing.direction_cycles;
        loop {
            self.ports.duty.edge().await;
            clock_cycles(&self.ports.clk, cycles).await;
            self.sim.settle().await;

            let duty = self.ports.duty.read();
            let dir = self.ports.dir.read();
            let expected = match duty.signum() {
                1 => true,
                -1 => false,
                _ => continue,
            };
            if dir != expected {
                let sign = if expected { "positive" } else { "negative" };
                self.report(
                    Category::Direction,
                    format!(
                        "DIR is not '{}' within {cycles} clock cycles of {sign} duty cycle: \
                         {duty} = {duty:#04x}",
                        u8::from(expected),
                    ),
                );
            }
        }
    }

    async fn check_duty_cycle(self: Rc<Self>) {
        self.ports.en.rising_edge().await;
        loop {
            if self.ports.reset.read() {
                self.ports.reset.falling_edge().await;
                self.ports.en.rising_edge().await;
            }
            self.ports.en.rising_edge().await;

            // The monitor has not recorded this edge yet: last_rise is the
            // start of the period that just ended.
            let start = self.en_mon.last_rise();
            let interval = self.sim.now().saturating_since(start);

            if self.reset_mon.last_event() > start {
                debug!("enable period spans a reset, resynchronising");
                continue;
            }
            // Only judge periods the control value was stable for.
            if self.duty_mon.stable_interval() <= interval {
                continue;
            }
            if let Err(detail) = self.evaluate_period(start, interval) {
                self.report(Category::DutyCycle, detail);
            }
        }
    }

    fn evaluate_period(&self, start: SimTime, interval: SimDuration) -> Result<(), String> {
        let min_period = self.timing.min_pwm_period;
        let interval_us = interval.as_unit(TimeUnit::Us);
        if interval <= min_period {
            return Err(format!(
                "PWM period too short!: {interval_us:.2}us, f={:.3}kHz   \
                 Minimum period: {min_period}, ({:.2}kHz)",
                1000.0 / interval_us,
                1000.0 / min_period.as_unit(TimeUnit::Us),
            ));
        }

        let high = self.en_mon.last_fall().saturating_since(start);
        let measured = (high.as_unit(TimeUnit::Us) * 100.0 / interval_us).trunc();
        let set = duty_percent(self.ports.duty.read());
        let sign = if self.ports.dir.read() { " " } else { "-" };
        info!(
            "Duty cycles: Set dc: {set:.1}%, Measured dc: {sign}{measured:.1}%, \
             period = {interval_us:.1}us, f = {:.2}kHz",
            1000.0 / interval_us
        );

        let deviation = (set.abs() - measured).abs().trunc();
        if deviation >= self.timing.duty_tolerance {
            return Err(format!(
                "Set and measured duty cycle deviates by more than {}% ({deviation}%)",
                self.timing.duty_tolerance
            ));
        }
        Ok(())
    }
}
