//! Signals, their value encoding, and the override state machine.
//!
//! The kernel stores every signal as a raw bit vector.  [`SignalValue`] is
//! the single place where a typed value is converted to and from that
//! representation; the control input of a PWM controller, for instance,
//! is an `i8` from its declaration through every computation on it.
//!
//! # Override semantics
//!
//! | Mode         | Effective value                | Driver writes          |
//! |--------------|--------------------------------|------------------------|
//! | `Normal`     | last driver write              | take effect            |
//! | `Forced(v)`  | `v`                            | recorded, not visible  |
//! | `Frozen`     | value at the moment of freezing| recorded, not visible  |
//!
//! Releasing returns the signal to `Normal`; the effective value becomes
//! the most recent driver write.

use crate::kernel::{EdgeKind, SignalId, WriteAction};
use crate::sim::{OverrideLease, Sim};
use crate::time::SimTime;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

/// A value type that can be carried on a [`Signal`].
pub trait SignalValue: Copy + PartialEq + fmt::Debug + 'static {
    /// Width of the underlying bit vector.
    const WIDTH: u32;

    fn to_bits(self) -> u64;

    fn from_bits(bits: u64) -> Self;

    /// Logic level for single-bit signals, `None` for multi-bit values.
    fn level(self) -> Option<bool>;
}

impl SignalValue for bool {
    const WIDTH: u32 = 1;

    fn to_bits(self) -> u64 {
        u64::from(self)
    }

    fn from_bits(bits: u64) -> Self {
        bits & 1 == 1
    }

    fn level(self) -> Option<bool> {
        Some(self)
    }
}

/// Two's-complement 8-bit vector.  `from_bits` is the one conversion point
/// from the device's `std_logic_vector(7 downto 0)` to a signed value.
impl SignalValue for i8 {
    const WIDTH: u32 = 8;

    fn to_bits(self) -> u64 {
        u64::from(self as u8)
    }

    fn from_bits(bits: u64) -> Self {
        (bits & 0xFF) as u8 as i8
    }

    fn level(self) -> Option<bool> {
        None
    }
}

/// Override state of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Override<T> {
    /// The normal driver controls the signal.
    Normal,
    /// The value is fixed at `T` until released.
    Forced(T),
    /// The value is held at whatever it was when frozen.
    Frozen,
}

impl<T> Override<T> {
    pub fn is_normal(&self) -> bool {
        matches!(self, Override::Normal)
    }

    pub(crate) fn map<U>(self, f: impl FnOnce(T) -> U) -> Override<U> {
        match self {
            Override::Normal => Override::Normal,
            Override::Forced(value) => Override::Forced(f(value)),
            Override::Frozen => Override::Frozen,
        }
    }
}

/// Handle to a named signal owned by the simulation kernel.
///
/// Handles are cheap to clone; every clone refers to the same signal.
#[derive(Clone)]
pub struct Signal<T> {
    id: SignalId,
    sim: Sim,
    _value: PhantomData<T>,
}

impl<T: SignalValue> Signal<T> {
    pub(crate) fn new(id: SignalId, sim: Sim) -> Self {
        Self {
            id,
            sim,
            _value: PhantomData,
        }
    }

    pub fn name(&self) -> String {
        self.sim.with_kernel(|k| k.signal_name(self.id).to_string())
    }

    /// Current effective value.  Writes made during the current delta
    /// cycle are not visible until it is committed.
    pub fn read(&self) -> T {
        T::from_bits(self.sim.with_kernel(|k| k.value(self.id)))
    }

    /// Write through the normal driver path.  Ignored while an override
    /// is active, but remembered for when it is released.
    pub fn set(&self, value: T) {
        self.sim
            .with_kernel_mut(|k| k.queue_write(self.id, WriteAction::Drive(value.to_bits())));
    }

    /// Suspend until the value changes; resolves to the new value.
    pub fn edge(&self) -> impl Future<Output = T> + 'static {
        let trigger = self.sim.edge_trigger(self.id, EdgeKind::Any);
        let signal = self.clone();
        async move {
            trigger.await;
            signal.read()
        }
    }

    pub fn override_state(&self) -> Override<T> {
        self.sim
            .with_kernel(|k| k.override_state(self.id))
            .map(T::from_bits)
    }

    /// Fix the signal at `value` until released.
    pub fn force(&self, lease: &OverrideLease, value: T) {
        lease.touch(self.id);
        self.sim
            .with_kernel_mut(|k| k.queue_write(self.id, WriteAction::Force(value.to_bits())));
    }

    /// Hold the signal at its current value until released.
    pub fn freeze(&self, lease: &OverrideLease) {
        lease.touch(self.id);
        self.sim
            .with_kernel_mut(|k| k.queue_write(self.id, WriteAction::Freeze));
    }

    /// Return control to the normal driver.
    pub fn release(&self, lease: &OverrideLease) {
        lease.touch(self.id);
        self.sim
            .with_kernel_mut(|k| k.queue_write(self.id, WriteAction::Release));
    }

    pub fn now(&self) -> SimTime {
        self.sim.now()
    }
}

impl Signal<bool> {
    /// Suspend until the signal goes from 0 to 1.
    pub fn rising_edge(&self) -> impl Future<Output = ()> + 'static {
        self.sim.edge_trigger(self.id, EdgeKind::Rising)
    }

    /// Suspend until the signal goes from 1 to 0.
    pub fn falling_edge(&self) -> impl Future<Output = ()> + 'static {
        self.sim.edge_trigger(self.id, EdgeKind::Falling)
    }
}

impl<T: SignalValue> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.name())
            .field("value", &self.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_encoding() {
        assert_eq!(true.to_bits(), 1);
        assert!(!bool::from_bits(0));
        assert!(bool::from_bits(1));
        assert_eq!(true.level(), Some(true));
    }

    #[test]
    fn i8_encoding_is_twos_complement() {
        assert_eq!((-32i8).to_bits(), 0xE0);
        assert_eq!(i8::from_bits(0xEE), -18);
        assert_eq!(i8::from_bits(0x11), 17);
        assert_eq!(i8::from_bits(0x80), -128);
        assert_eq!(i8::from_bits(0x1_7F), 127);
        assert_eq!(5i8.level(), None);
    }

    #[test]
    fn override_map() {
        assert_eq!(Override::Forced(1u64).map(bool::from_bits), Override::Forced(true));
        assert!(Override::<u64>::Normal.map(bool::from_bits).is_normal());
        assert_eq!(Override::<u64>::Frozen.map(i8::from_bits), Override::Frozen);
    }
}
