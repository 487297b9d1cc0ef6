//! Discrete-event driver.
//!
//! The simulator owns the event queue (and with it the virtual clock) and runs
//! events strictly one at a time. An action receives `&mut Simulator`, so it can
//! read the clock, schedule follow-up work, cancel events or request a stop.
//! Periodic tasks are expressed by an action re-scheduling itself; the stop
//! horizon of `run` is what eventually ends them.

use serde::Serialize;
use std::time::Duration;

use super::error::SimError;
use super::event_queue::{EventHandle, EventQueue};

/// Lifecycle of a simulator. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatorState {
    Idle,
    Running,
    Stopped,
}

/// Bookkeeping returned by a completed `run`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Number of actions executed.
    pub events_executed: u64,
    /// Pending events dropped when the run ended (beyond the horizon or after `stop`).
    pub events_discarded: usize,
    /// Clock value when the run ended: the fire time of the last executed event.
    pub final_time: Duration,
}

pub struct Simulator {
    queue: EventQueue<Simulator>,
    state: SimulatorState,
    stop_requested: bool,
    events_executed: u64,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    pub fn new() -> Self {
        Self {
            queue: EventQueue::new(),
            state: SimulatorState::Idle,
            stop_requested: false,
            events_executed: 0,
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.queue.now()
    }

    #[cfg(test)]
    fn state(&self) -> SimulatorState {
        self.state
    }

    /// Schedule `action` to run `delay` after the current virtual time.
    pub fn schedule_after<F>(&mut self, delay: Duration, action: F) -> Result<EventHandle, SimError>
    where
        F: FnOnce(&mut Simulator) -> anyhow::Result<()> + 'static,
    {
        self.queue.schedule(delay, action)
    }

    /// Schedule `action` at an absolute virtual time, which must not lie in the past.
    pub fn schedule_at<F>(&mut self, time: Duration, action: F) -> Result<EventHandle, SimError>
    where
        F: FnOnce(&mut Simulator) -> anyhow::Result<()> + 'static,
    {
        self.queue.schedule_at(time, action)
    }

    /// Best-effort cancellation; see `EventQueue::cancel`.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        self.queue.cancel(handle)
    }

    /// Request the run to end once the current action returns.
    ///
    /// Calling this before `run` leaves the simulator stopped for good.
    pub fn stop(&mut self) {
        match self.state {
            SimulatorState::Running => self.stop_requested = true,
            SimulatorState::Idle => self.state = SimulatorState::Stopped,
            SimulatorState::Stopped => {}
        }
    }

    /// Execute events in time order until the queue drains, `stop` is called,
    /// or the next event would fire after `stop_time`.
    ///
    /// Events due exactly at `stop_time` still run. Anything left in the queue
    /// afterwards is discarded, never fired.
    ///
    /// # Errors
    ///
    /// - `AlreadyStopped` / `AlreadyRunning` if the simulator is not idle.
    /// - `ActionFailed` if an action returns an error. The run is aborted on the
    ///   spot and the simulator is left as it was at the failure.
    pub fn run(&mut self, stop_time: Duration) -> Result<RunSummary, SimError> {
        match self.state {
            SimulatorState::Idle => {}
            SimulatorState::Running => return Err(SimError::AlreadyRunning),
            SimulatorState::Stopped => return Err(SimError::AlreadyStopped),
        }
        self.state = SimulatorState::Running;
        log::debug!("Simulation started with {} pending events, horizon {:?}", self.queue.len(), stop_time);

        while !self.stop_requested {
            let Some(next_time) = self.queue.peek_time() else {
                log::debug!("Event queue drained at {:?}", self.now());
                break;
            };
            if next_time > stop_time {
                break;
            }
            let Some(event) = self.queue.pop_next() else {
                break;
            };
            let at = event.fire_time();
            self.events_executed += 1;
            if let Err(source) = event.fire(self) {
                log::error!("Event action failed at {:?}: {:#}", at, source);
                return Err(SimError::ActionFailed { at, source });
            }
        }

        let events_discarded = self.queue.clear();
        self.state = SimulatorState::Stopped;
        let summary = RunSummary {
            events_executed: self.events_executed,
            events_discarded,
            final_time: self.now(),
        };
        log::debug!(
            "Simulation stopped at {:?}: {} events executed, {} discarded",
            summary.final_time,
            summary.events_executed,
            summary.events_discarded
        );
        Ok(summary)
    }
}
