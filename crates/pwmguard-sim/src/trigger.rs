//! Suspension points: timers, settle, edges, clock counts and races.

use crate::kernel::{EdgeKind, SignalId, WaitSlot};
use crate::signal::Signal;
use crate::sim::Sim;
use crate::time::SimDuration;
use futures::future::{select, Either};
use futures::pin_mut;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use thiserror::Error;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Wait {
    Timer(SimDuration),
    Settle,
    Edge(SignalId, EdgeKind),
}

/// A single kernel event a task can wait for.
///
/// The wait is registered on first poll, so a trigger that is built but
/// never awaited has no effect.  Dropping a registered trigger withdraws it.
#[must_use = "triggers do nothing unless awaited"]
pub struct Trigger {
    sim: Sim,
    wait: Wait,
    slot: Option<Rc<WaitSlot>>,
}

impl Trigger {
    pub(crate) fn new(sim: Sim, wait: Wait) -> Self {
        Self {
            sim,
            wait,
            slot: None,
        }
    }
}

impl Future for Trigger {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if let Some(slot) = &self.slot {
            if slot.has_fired() {
                return Poll::Ready(());
            }
            slot.update_waker(cx.waker());
            return Poll::Pending;
        }

        let slot = Rc::new(WaitSlot::new(cx.waker().clone()));
        let wait = self.wait;
        self.sim.with_kernel_mut(|k| match wait {
            Wait::Timer(delay) => k.wait_timer(delay, Rc::clone(&slot)),
            Wait::Settle => k.wait_settle(Rc::clone(&slot)),
            Wait::Edge(id, kind) => k.wait_edge(id, kind, Rc::clone(&slot)),
        });
        self.slot = Some(slot);
        Poll::Pending
    }
}

impl std::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trigger")
            .field("wait", &self.wait)
            .field("armed", &self.slot.is_some())
            .finish()
    }
}

/// Wait for `cycles` rising edges of `clock`.
pub async fn clock_cycles(clock: &Signal<bool>, cycles: u32) {
    for _ in 0..cycles {
        clock.rising_edge().await;
    }
}

/// Race two futures; the loser is dropped, withdrawing any wait it holds.
/// If both complete in the same poll, `a` wins.
pub async fn first<A, B>(a: A, b: B) -> Either<A::Output, B::Output>
where
    A: Future,
    B: Future,
{
    pin_mut!(a);
    pin_mut!(b);
    match select(a, b).await {
        Either::Left((value, _)) => Either::Left(value),
        Either::Right((value, _)) => Either::Right(value),
    }
}

/// A bounded wait ran out.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no completion within {after}")]
pub struct Elapsed {
    pub after: SimDuration,
}

/// Run `fut` for at most `limit` of simulated time.
pub async fn with_timeout<F: Future>(
    sim: &Sim,
    fut: F,
    limit: SimDuration,
) -> Result<F::Output, Elapsed> {
    match first(fut, sim.timer(limit)).await {
        Either::Left(value) => Ok(value),
        Either::Right(()) => Err(Elapsed { after: limit }),
    }
}
