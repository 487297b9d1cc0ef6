//! Periodic throughput sampling.
//!
//! The sampler polls a byte counter every `interval` of virtual time and
//! reports the rate observed since the previous poll. It only ever reads the
//! counter, through a weak reference, so it neither keeps the network alive
//! nor influences it.

use serde::Serialize;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use super::error::SimError;
use super::event_queue::EventHandle;
use super::simulator::Simulator;

/// Anything that accumulates received bytes. The total must never decrease.
pub trait TrafficSink {
    fn total_bytes_received(&self) -> u64;
}

/// One throughput report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThroughputSample {
    /// Virtual time of the sample.
    pub timestamp: Duration,
    /// Bytes received since the previous sample (or since `start`).
    pub bytes_since_last: u64,
    /// Sampling period the rate is computed over.
    pub interval: Duration,
    /// `bytes_since_last * 8 / (interval_ms * 1000)`.
    pub rate_mbps: f64,
}

impl ThroughputSample {
    pub fn new(timestamp: Duration, bytes_since_last: u64, interval: Duration) -> Self {
        let interval_millis = interval.as_secs_f64() * 1e3;
        Self {
            timestamp,
            bytes_since_last,
            interval,
            rate_mbps: bytes_since_last as f64 * 8.0 / (interval_millis * 1e3),
        }
    }
}

impl fmt::Display for ThroughputSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}s: \t{} Mbit/s",
            significant(self.timestamp.as_secs_f64()),
            significant(self.rate_mbps)
        )
    }
}

/// Six significant digits, trailing zeros trimmed: `3.33333`, `10`, `0.00125`.
pub fn significant(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return format!("{}", value);
    }
    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (5 - magnitude).max(0) as usize;
    let text = format!("{:.*}", decimals, value);
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

/// Callback invoked with every sample as it is taken.
pub type SampleObserver = Box<dyn FnMut(&ThroughputSample)>;

struct SamplerState {
    interval: Duration,
    sink: Weak<dyn TrafficSink>,
    last_total: u64,
    samples: Vec<ThroughputSample>,
    observer: Option<SampleObserver>,
}

/// Self re-arming sampling task. Cloning yields another handle to the same task.
#[derive(Clone)]
pub struct ThroughputSampler {
    state: Rc<RefCell<SamplerState>>,
}

impl ThroughputSampler {
    /// Create a sampler over `sink`.
    ///
    /// # Errors
    ///
    /// `InvalidDelay` if `interval` is zero, which would re-arm at the same
    /// instant forever.
    pub fn new<S: TrafficSink + 'static>(interval: Duration, sink: &Rc<S>) -> Result<Self, SimError> {
        if interval.is_zero() {
            return Err(SimError::InvalidDelay("sample interval must be positive".to_string()));
        }
        let sink: Rc<dyn TrafficSink> = sink.clone();
        Ok(Self {
            state: Rc::new(RefCell::new(SamplerState {
                interval,
                sink: Rc::downgrade(&sink),
                last_total: 0,
                samples: Vec::new(),
                observer: None,
            })),
        })
    }

    /// Forward every sample to `observer` in addition to recording it.
    pub fn with_observer(self, observer: SampleObserver) -> Self {
        self.state.borrow_mut().observer = Some(observer);
        self
    }

    /// Arm the first firing at the absolute virtual time `first_fire_time`.
    ///
    /// The counter value at the moment of this call becomes the baseline, so the
    /// first sample covers everything received between `start` and its firing.
    pub fn start(&self, sim: &mut Simulator, first_fire_time: Duration) -> Result<EventHandle, SimError> {
        {
            let mut state = self.state.borrow_mut();
            state.last_total = state.sink.upgrade().map(|sink| sink.total_bytes_received()).unwrap_or(0);
        }
        let state = Rc::clone(&self.state);
        sim.schedule_at(first_fire_time, move |sim| fire(state, sim))
    }

    /// All samples taken so far.
    pub fn samples(&self) -> Vec<ThroughputSample> {
        self.state.borrow().samples.clone()
    }
}

fn fire(state: Rc<RefCell<SamplerState>>, sim: &mut Simulator) -> anyhow::Result<()> {
    let (sample, interval, observer) = {
        let mut guard = state.borrow_mut();
        let Some(sink) = guard.sink.upgrade() else {
            log::warn!("Traffic sink dropped at {:?}, throughput sampling stops", sim.now());
            return Ok(());
        };
        let current = sink.total_bytes_received();
        let Some(delta) = current.checked_sub(guard.last_total) else {
            anyhow::bail!("byte counter went backwards: {} -> {}", guard.last_total, current);
        };
        let sample = ThroughputSample::new(sim.now(), delta, guard.interval);
        log::trace!("Sample at {:?}: {} bytes, {} Mbit/s", sample.timestamp, delta, sample.rate_mbps);
        guard.samples.push(sample.clone());
        guard.last_total = current;
        (sample, guard.interval, guard.observer.take())
    };
    // Called with the state released so the observer may read the sampler.
    if let Some(mut observer) = observer {
        observer(&sample);
        let mut guard = state.borrow_mut();
        if guard.observer.is_none() {
            guard.observer = Some(observer);
        }
    }
    sim.schedule_after(interval, move |sim| fire(state, sim))?;
    Ok(())
}
