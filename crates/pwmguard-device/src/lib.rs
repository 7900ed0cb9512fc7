//! Reference PWM H-bridge controller.
//!
//! A deterministic stand-in for the hardware block the monitors watch:
//!
//! ```text
//!   mclk ──────►┌────────────┐
//!   reset ─────►│  PwmCore   ├──► dir
//!   duty_cycle ►│            ├──► en
//!               └────────────┘
//! ```
//!
//! [`PwmPorts`] is the signal bundle every other component is handed.

pub mod controller;
pub mod device;
pub mod ports;

pub use controller::{DeviceConfig, Outputs, PwmCore, DUTY_STEPS};
pub use device::PwmDevice;
pub use ports::{duty_from_percent, duty_percent, PwmPorts, DUTY_FULL_SCALE};
