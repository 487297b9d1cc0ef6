//! Error type for the discrete-event core.

use std::time::Duration;
use thiserror::Error;

/// Failures raised by the event queue, the simulator and the sampler.
///
/// None of these are recoverable at the scheduler layer: every variant aborts
/// the run it occurs in.
#[derive(Debug, Error)]
pub enum SimError {
    /// A negative, non-finite or overflowing delay was requested, or an
    /// absolute fire time that already lies in the past.
    #[error("invalid delay: {0}")]
    InvalidDelay(String),

    /// `run` was called while a run was already in progress (or was aborted
    /// by a failing action).
    #[error("simulator is already running")]
    AlreadyRunning,

    /// `run` was called on a simulator that already reached its terminal state.
    #[error("simulator has already stopped and cannot be resumed")]
    AlreadyStopped,

    /// An event action returned an error; the run was aborted at `at`.
    #[error("event action failed at {at:?}")]
    ActionFailed {
        at: Duration,
        #[source]
        source: anyhow::Error,
    },
}
