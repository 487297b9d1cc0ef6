//! Discrete-event simulation core.
//!
//! A single-threaded scheduler over virtual time plus the periodic throughput
//! sampler that rides on it. Nothing in here knows about radios or packets; the
//! network model only meets this module through `TrafficSink`.
//!
//! ## Module Organization
//!
//! - `event_queue`: time-ordered pending events with FIFO tie-breaking
//! - `simulator`: the run loop, clock ownership and stop horizon
//! - `sampler`: self re-arming throughput sampling over a byte counter
//! - `error`: failures shared by the above

pub mod error;
pub mod event_queue;
pub mod sampler;
pub mod simulator;

pub use error::SimError;
pub use event_queue::{delay_from_millis, delay_from_secs};
pub use sampler::{SampleObserver, ThroughputSample, ThroughputSampler, TrafficSink, significant};
pub use simulator::{RunSummary, Simulator};
