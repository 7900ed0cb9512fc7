//! Deterministic discrete-event simulation substrate.
//!
//! A single-threaded cooperative executor over a picosecond timeline.
//! Tasks are plain futures; they suspend on [`Trigger`]s and communicate
//! through [`Signal`]s whose writes are deferred to the end of the current
//! delta cycle, the way an HDL simulator schedules signal assignments.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │                     Simulator                      │
//! │  ┌──────────────┐  wake   ┌──────────────────────┐ │
//! │  │  LocalPool   │ ◄────── │        Kernel        │ │
//! │  │  (tasks)     │ ──────► │  signals · timers ·  │ │
//! │  └──────────────┘  writes │  settle · overrides  │ │
//! │                           └──────────────────────┘ │
//! └────────────────────────────────────────────────────┘
//!          ▲ Sim handle (cloneable, passed explicitly)
//! ```
//!
//! # Example
//!
//! ```
//! use pwmguard_sim::{SimConfig, SimDuration, Simulator};
//!
//! let sim = Simulator::new(SimConfig::default());
//! let h = sim.handle();
//! let en = h.signal("en", false);
//! let value = sim
//!     .run(async move {
//!         en.set(true);
//!         h.timer(SimDuration::from_ns(1)).await;
//!         en.read()
//!     })
//!     .unwrap();
//! assert!(value);
//! ```

pub mod clock;
pub mod error;
mod kernel;
pub mod signal;
pub mod sim;
pub mod time;
pub mod trigger;

pub use clock::Clock;
pub use error::SimError;
pub use futures::future::Either;
pub use kernel::KernelStats;
pub use signal::{Override, Signal, SignalValue};
pub use sim::{OverrideLease, Sim, SimConfig, Simulator};
pub use time::{ParseDurationError, SimDuration, SimTime, TimeUnit};
pub use trigger::{clock_cycles, first, with_timeout, Elapsed, Trigger};
