//! Shared half-duplex medium.
//!
//! All nodes hear each other's carrier, so at most one frame exchange is on the
//! air at any time. Exchanges are granted strictly in request order.

use std::time::Duration;

use super::phy::{ACK_BYTES, PhyRate};

#[derive(Debug, Default)]
pub struct WifiChannel {
    busy_until: Duration,
    airtime_used: Duration,
}

impl WifiChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Book the medium for `duration`, starting no earlier than `earliest`.
    /// Returns the `(start, end)` of the granted slot.
    pub fn reserve(&mut self, earliest: Duration, duration: Duration) -> (Duration, Duration) {
        let start = earliest.max(self.busy_until);
        let end = start.saturating_add(duration);
        self.busy_until = end;
        self.airtime_used = self.airtime_used.saturating_add(duration);
        (start, end)
    }

    #[cfg(test)]
    fn busy_until(&self) -> Duration {
        self.busy_until
    }

    /// Total time booked so far.
    pub fn airtime_used(&self) -> Duration {
        self.airtime_used
    }
}

/// Medium occupancy of one unicast attempt: DIFS, mean backoff, the data frame,
/// SIFS and the ACK at the family's basic rate.
pub fn exchange_duration(rate: &PhyRate, frame_bytes: u32) -> Duration {
    let family = rate.family;
    family.difs() + family.mean_backoff() + rate.frame_duration(frame_bytes) + family.sifs() + family.basic_rate().frame_duration(ACK_BYTES)
}
