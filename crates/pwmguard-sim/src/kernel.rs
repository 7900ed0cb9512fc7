//! Event kernel: signal storage, wait lists, and the timeline.
//!
//! The kernel never polls futures itself.  It only records who is waiting
//! on what and fires [`WaitSlot`]s; the [`Simulator`](crate::Simulator)
//! run loop decides when to commit writes, when to open the settle phase,
//! and when to advance time.
//!
//! # One simulated instant
//!
//! ```text
//!  advance ──→ fire timers ──→ run tasks ──→ commit writes ─┐
//!                                 ▲                          │ edges fired
//!                                 └──────── delta cycle ─────┘
//!                                 │ nothing pending
//!                                 ▼
//!                          settle phase (read-only)
//! ```

use crate::error::SimError;
use crate::signal::Override;
use crate::time::{SimDuration, SimTime};
use log::trace;
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::task::Waker;

/// Index of a signal in the kernel's signal table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalId(usize);

/// Which transitions wake an edge waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EdgeKind {
    Any,
    Rising,
    Falling,
}

/// A deferred write, applied when the current delta cycle is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteAction {
    Drive(u64),
    Force(u64),
    Freeze,
    Release,
}

/// Shared between a suspended trigger and the kernel list it waits in.
///
/// When the trigger future is dropped (for instance the losing side of a
/// race) the kernel holds the only reference and skips the slot.
#[derive(Debug)]
pub(crate) struct WaitSlot {
    fired: Cell<bool>,
    waker: RefCell<Option<Waker>>,
}

impl WaitSlot {
    pub(crate) fn new(waker: Waker) -> Self {
        Self {
            fired: Cell::new(false),
            waker: RefCell::new(Some(waker)),
        }
    }

    pub(crate) fn has_fired(&self) -> bool {
        self.fired.get()
    }

    pub(crate) fn update_waker(&self, waker: &Waker) {
        let mut slot = self.waker.borrow_mut();
        match slot.as_ref() {
            Some(current) if current.will_wake(waker) => {}
            _ => *slot = Some(waker.clone()),
        }
    }

    fn fire(&self) {
        self.fired.set(true);
        if let Some(waker) = self.waker.borrow_mut().take() {
            waker.wake();
        }
    }
}

fn is_abandoned(slot: &Rc<WaitSlot>) -> bool {
    Rc::strong_count(slot) == 1
}

#[derive(Debug)]
struct SignalState {
    name: String,
    mask: u64,
    /// Last value written by the normal driver.
    driven: u64,
    /// Effective value seen by readers.
    value: u64,
    mode: Override<u64>,
    waiters: Vec<(EdgeKind, Rc<WaitSlot>)>,
}

impl SignalState {
    fn apply(&mut self, action: WriteAction) {
        match action {
            WriteAction::Drive(bits) => {
                self.driven = bits & self.mask;
                if self.mode.is_normal() {
                    self.value = self.driven;
                }
            }
            WriteAction::Force(bits) => {
                self.mode = Override::Forced(bits & self.mask);
                self.value = bits & self.mask;
            }
            WriteAction::Freeze => self.mode = Override::Frozen,
            WriteAction::Release => {
                self.mode = Override::Normal;
                self.value = self.driven;
            }
        }
    }

    fn wake_edges(&mut self, old: u64) {
        let new = self.value;
        let rose = old == 0 && new != 0;
        let fell = old != 0 && new == 0;
        self.waiters.retain(|(kind, slot)| {
            if is_abandoned(slot) {
                return false;
            }
            let hit = match kind {
                EdgeKind::Any => true,
                EdgeKind::Rising => rose,
                EdgeKind::Falling => fell,
            };
            if hit {
                slot.fire();
            }
            !hit
        });
    }
}

/// Counters describing how much work the kernel has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KernelStats {
    /// Distinct simulated instants visited.
    pub instants: u64,
    /// Delta cycles committed across all instants.
    pub deltas: u64,
    /// Signal writes applied.
    pub writes: u64,
}

#[derive(Debug)]
pub(crate) struct Kernel {
    now: SimTime,
    signals: Vec<SignalState>,
    pending: Vec<(SignalId, WriteAction)>,
    timers: BTreeMap<(SimTime, u64), Rc<WaitSlot>>,
    settle: Vec<Rc<WaitSlot>>,
    next_seq: u64,
    deltas_this_instant: u32,
    override_owner: Option<String>,
    stats: KernelStats,
}

impl Kernel {
    pub(crate) fn new() -> Self {
        Self {
            now: SimTime::ZERO,
            signals: Vec::new(),
            pending: Vec::new(),
            timers: BTreeMap::new(),
            settle: Vec::new(),
            next_seq: 0,
            deltas_this_instant: 0,
            override_owner: None,
            stats: KernelStats::default(),
        }
    }

    pub(crate) fn now(&self) -> SimTime {
        self.now
    }

    pub(crate) fn stats(&self) -> KernelStats {
        self.stats
    }

    // ── Signals ─────────────────────────────────────────────────

    pub(crate) fn add_signal(&mut self, name: &str, width: u32, init: u64) -> SignalId {
        let mask = if width >= 64 {
            u64::MAX
        } else {
            (1u64 << width) - 1
        };
        let id = SignalId(self.signals.len());
        self.signals.push(SignalState {
            name: name.to_string(),
            mask,
            driven: init & mask,
            value: init & mask,
            mode: Override::Normal,
            waiters: Vec::new(),
        });
        id
    }

    pub(crate) fn signal_name(&self, id: SignalId) -> &str {
        &self.signals[id.0].name
    }

    pub(crate) fn value(&self, id: SignalId) -> u64 {
        self.signals[id.0].value
    }

    pub(crate) fn override_state(&self, id: SignalId) -> Override<u64> {
        self.signals[id.0].mode
    }

    pub(crate) fn queue_write(&mut self, id: SignalId, action: WriteAction) {
        self.pending.push((id, action));
    }

    // ── Waiting ─────────────────────────────────────────────────

    pub(crate) fn wait_edge(&mut self, id: SignalId, kind: EdgeKind, slot: Rc<WaitSlot>) {
        self.signals[id.0].waiters.push((kind, slot));
    }

    pub(crate) fn wait_timer(&mut self, delay: SimDuration, slot: Rc<WaitSlot>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timers.insert((self.now + delay, seq), slot);
    }

    pub(crate) fn wait_settle(&mut self, slot: Rc<WaitSlot>) {
        self.settle.push(slot);
    }

    // ── Overrides ───────────────────────────────────────────────

    pub(crate) fn claim_overrides(&mut self, owner: &str) -> Result<(), SimError> {
        if let Some(current) = &self.override_owner {
            return Err(SimError::OverridesOwned {
                owner: current.clone(),
                requested_by: owner.to_string(),
            });
        }
        self.override_owner = Some(owner.to_string());
        Ok(())
    }

    pub(crate) fn return_overrides(&mut self) {
        self.override_owner = None;
    }

    // ── Run-loop phases ─────────────────────────────────────────

    /// Apply all deferred writes as one delta cycle and wake edge waiters
    /// of every signal whose effective value changed.
    ///
    /// Returns `false` when nothing was pending.
    pub(crate) fn commit(&mut self, max_deltas: u32) -> Result<bool, SimError> {
        if self.pending.is_empty() {
            return Ok(false);
        }
        self.deltas_this_instant += 1;
        if self.deltas_this_instant > max_deltas {
            return Err(SimError::DeltaOverflow {
                at: self.now,
                limit: max_deltas,
            });
        }
        self.stats.deltas += 1;

        let writes = std::mem::take(&mut self.pending);
        let mut before: Vec<(SignalId, u64)> = Vec::new();
        for (id, action) in writes {
            let state = &mut self.signals[id.0];
            if !before.iter().any(|(seen, _)| *seen == id) {
                before.push((id, state.value));
            }
            state.apply(action);
            self.stats.writes += 1;
        }

        // A signal written several times in one delta produces at most one
        // edge, judged on its final value.
        for (id, old) in before {
            let state = &mut self.signals[id.0];
            if state.value != old {
                trace!(
                    "{} {}: {:#x} -> {:#x}",
                    self.now,
                    state.name,
                    old,
                    state.value
                );
                state.wake_edges(old);
            }
        }
        Ok(true)
    }

    /// Open the settle phase: wake everything waiting for values to be
    /// final in this instant.  Returns `false` if nobody was waiting.
    pub(crate) fn open_settle(&mut self) -> bool {
        if self.settle.is_empty() {
            return false;
        }
        for slot in std::mem::take(&mut self.settle) {
            if !is_abandoned(&slot) {
                slot.fire();
            }
        }
        true
    }

    /// Jump to the earliest pending timer and fire every timer due then.
    ///
    /// Timers whose trigger was dropped are discarded first and never
    /// visit their instant.  A timer due at the current instant (a zero
    /// delay) does not start a new instant: it counts as a delta cycle
    /// against `max_deltas`.
    pub(crate) fn advance(&mut self, max_deltas: u32) -> Result<Option<SimTime>, SimError> {
        while let Some(entry) = self.timers.first_entry() {
            if !is_abandoned(entry.get()) {
                break;
            }
            entry.remove();
        }
        let Some((&(at, _), _)) = self.timers.first_key_value() else {
            return Ok(None);
        };

        if at > self.now {
            self.now = at;
            self.deltas_this_instant = 0;
            self.stats.instants += 1;
        } else {
            self.deltas_this_instant += 1;
            if self.deltas_this_instant > max_deltas {
                return Err(SimError::DeltaOverflow {
                    at: self.now,
                    limit: max_deltas,
                });
            }
        }

        while let Some(entry) = self.timers.first_entry() {
            if entry.key().0 != at {
                break;
            }
            let slot = entry.remove();
            if !is_abandoned(&slot) {
                slot.fire();
            }
        }
        Ok(Some(at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::noop_waker;

    fn slot() -> Rc<WaitSlot> {
        Rc::new(WaitSlot::new(noop_waker()))
    }

    /// A slot that stays live because `held` keeps a second reference.
    fn slot_kept(held: &mut Vec<Rc<WaitSlot>>) -> Rc<WaitSlot> {
        let s = slot();
        held.push(Rc::clone(&s));
        s
    }

    #[test]
    fn drive_is_deferred_until_commit() {
        let mut k = Kernel::new();
        let id = k.add_signal("en", 1, 0);
        k.queue_write(id, WriteAction::Drive(1));
        assert_eq!(k.value(id), 0);
        assert!(k.commit(10).unwrap());
        assert_eq!(k.value(id), 1);
        assert!(!k.commit(10).unwrap());
    }

    #[test]
    fn value_is_masked_to_width() {
        let mut k = Kernel::new();
        let id = k.add_signal("duty", 8, 0x1FF);
        assert_eq!(k.value(id), 0xFF);
    }

    #[test]
    fn rising_and_falling_waiters() {
        let mut k = Kernel::new();
        let id = k.add_signal("en", 1, 0);
        let rise = slot();
        let fall = slot();
        let any = slot();
        k.wait_edge(id, EdgeKind::Rising, Rc::clone(&rise));
        k.wait_edge(id, EdgeKind::Falling, Rc::clone(&fall));
        k.wait_edge(id, EdgeKind::Any, Rc::clone(&any));

        k.queue_write(id, WriteAction::Drive(1));
        k.commit(10).unwrap();
        assert!(rise.has_fired());
        assert!(any.has_fired());
        assert!(!fall.has_fired());

        k.queue_write(id, WriteAction::Drive(0));
        k.commit(10).unwrap();
        assert!(fall.has_fired());
    }

    #[test]
    fn glitch_within_one_delta_is_not_an_edge() {
        let mut k = Kernel::new();
        let id = k.add_signal("dir", 1, 0);
        let any = slot();
        k.wait_edge(id, EdgeKind::Any, Rc::clone(&any));
        k.queue_write(id, WriteAction::Drive(1));
        k.queue_write(id, WriteAction::Drive(0));
        k.commit(10).unwrap();
        assert!(!any.has_fired());
    }

    #[test]
    fn force_freeze_release() {
        let mut k = Kernel::new();
        let id = k.add_signal("dir", 1, 0);

        k.queue_write(id, WriteAction::Force(1));
        k.commit(10).unwrap();
        assert_eq!(k.value(id), 1);
        assert_eq!(k.override_state(id), Override::Forced(1));

        // Driver writes are remembered but not visible.
        k.queue_write(id, WriteAction::Drive(0));
        k.commit(10).unwrap();
        assert_eq!(k.value(id), 1);

        k.queue_write(id, WriteAction::Release);
        k.commit(10).unwrap();
        assert_eq!(k.value(id), 0);

        k.queue_write(id, WriteAction::Drive(1));
        k.queue_write(id, WriteAction::Freeze);
        k.commit(10).unwrap();
        assert_eq!(k.value(id), 1);
        k.queue_write(id, WriteAction::Drive(0));
        k.commit(10).unwrap();
        assert_eq!(k.value(id), 1);
        assert_eq!(k.override_state(id), Override::Frozen);

        k.queue_write(id, WriteAction::Release);
        k.commit(10).unwrap();
        assert_eq!(k.value(id), 0);
    }

    #[test]
    fn advance_fires_all_timers_due_at_earliest_instant() {
        let mut k = Kernel::new();
        let a = slot();
        let b = slot();
        let c = slot();
        k.wait_timer(SimDuration::from_ns(5), Rc::clone(&a));
        k.wait_timer(SimDuration::from_ns(10), Rc::clone(&c));
        k.wait_timer(SimDuration::from_ns(5), Rc::clone(&b));

        assert_eq!(k.advance(10).unwrap(), Some(SimTime::from_ps(5_000)));
        assert!(a.has_fired() && b.has_fired());
        assert!(!c.has_fired());
        assert_eq!(k.advance(10).unwrap(), Some(SimTime::from_ps(10_000)));
        assert!(c.has_fired());
        assert_eq!(k.advance(10).unwrap(), None);
        assert_eq!(k.stats().instants, 2);
    }

    #[test]
    fn abandoned_waiters_are_dropped() {
        let mut k = Kernel::new();
        let id = k.add_signal("en", 1, 0);
        k.wait_edge(id, EdgeKind::Any, slot());
        k.queue_write(id, WriteAction::Drive(1));
        k.commit(10).unwrap();
        assert!(k.signals[id.0].waiters.is_empty());
    }

    #[test]
    fn abandoned_timers_do_not_visit_their_instant() {
        let mut k = Kernel::new();
        let live = slot();
        k.wait_timer(SimDuration::from_ms(12), slot());
        k.wait_timer(SimDuration::from_ms(20), Rc::clone(&live));

        assert_eq!(k.advance(10).unwrap(), Some(SimTime::from_ps(20_000_000_000)));
        assert!(live.has_fired());
        assert_eq!(k.stats().instants, 1);
        assert_eq!(k.advance(10).unwrap(), None);
    }

    #[test]
    fn zero_delay_timers_count_as_deltas() {
        let mut k = Kernel::new();
        let mut held = Vec::new();
        k.wait_timer(SimDuration::from_ns(1), slot_kept(&mut held));
        k.advance(2).unwrap();
        let now = k.now();

        for i in 0..3 {
            k.wait_timer(SimDuration::ZERO, slot_kept(&mut held));
            let result = k.advance(2);
            if i < 2 {
                assert_eq!(result.unwrap(), Some(now));
            } else {
                assert!(matches!(result, Err(SimError::DeltaOverflow { limit: 2, .. })));
            }
        }
        assert_eq!(k.stats().instants, 1);
    }

    #[test]
    fn delta_overflow_is_reported() {
        let mut k = Kernel::new();
        let id = k.add_signal("osc", 1, 0);
        for i in 0..3u64 {
            k.queue_write(id, WriteAction::Drive(i & 1));
            let result = k.commit(2);
            if i < 2 {
                assert!(result.is_ok());
            } else {
                assert!(matches!(result, Err(SimError::DeltaOverflow { limit: 2, .. })));
            }
        }
    }

    #[test]
    fn single_override_owner() {
        let mut k = Kernel::new();
        k.claim_overrides("faults").unwrap();
        let err = k.claim_overrides("stimulus").unwrap_err();
        assert!(matches!(err, SimError::OverridesOwned { .. }));
        k.return_overrides();
        assert!(k.claim_overrides("stimulus").is_ok());
    }
}
