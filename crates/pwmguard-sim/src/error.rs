//! Simulator error type.

use crate::time::SimTime;
use futures::task::SpawnError;
use thiserror::Error;

/// Ways a simulation run can end without its main task completing.
#[derive(Error, Debug)]
pub enum SimError {
    /// Every task is blocked and no timer is pending.
    #[error("simulation stalled at {at}: no runnable task and no pending timer")]
    Stalled { at: SimTime },

    /// The next event lies past the configured time limit.
    #[error("simulation exceeded time limit of {limit}")]
    TimeLimit { limit: SimTime },

    /// Writes or zero-delay timers kept the run within one instant.
    #[error("more than {limit} delta cycles at {at}; combinational loop?")]
    DeltaOverflow { at: SimTime, limit: u32 },

    #[error("overrides already owned by {owner:?}, requested by {requested_by:?}")]
    OverridesOwned { owner: String, requested_by: String },

    #[error("failed to spawn simulation task: {0}")]
    Spawn(#[from] SpawnError),
}
