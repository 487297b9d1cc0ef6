//! Traffic endpoints: the receiving packet sink and the constant-rate source.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use super::data_rate::DataRate;
use super::wifi::WifiNetwork;
use crate::simulation::{SimError, Simulator, TrafficSink};

/// Receiving application on the sink node. Counts payload bytes only.
#[derive(Debug)]
pub struct PacketSink {
    node: usize,
    total_rx: Cell<u64>,
}

impl PacketSink {
    pub fn new(node: usize) -> Self {
        Self {
            node,
            total_rx: Cell::new(0),
        }
    }

    pub fn node(&self) -> usize {
        self.node
    }

    pub fn receive(&self, bytes: u32) {
        self.total_rx.set(self.total_rx.get() + u64::from(bytes));
    }
}

impl TrafficSink for PacketSink {
    fn total_bytes_received(&self) -> u64 {
        self.total_rx.get()
    }
}

/// On/off UDP source that is permanently "on": one packet every
/// `packet_size * 8 / data_rate` seconds from its start time onward.
#[derive(Debug, Clone)]
pub struct OnOffSource {
    node: usize,
    packet_size: u32,
    data_rate: DataRate,
}

impl OnOffSource {
    pub fn new(node: usize, packet_size: u32, data_rate: DataRate) -> Self {
        Self {
            node,
            packet_size,
            data_rate,
        }
    }

    /// Gap between consecutive packets.
    pub fn interval(&self) -> Duration {
        self.data_rate.transmission_time(u64::from(self.packet_size))
    }

    /// Start sending into `network` at the absolute time `at`. The source keeps
    /// re-arming itself until the simulator horizon cuts it off.
    ///
    /// # Errors
    ///
    /// `InvalidDelay` if `at` lies in the past or the send interval is zero.
    pub fn start(self, sim: &mut Simulator, network: Rc<RefCell<WifiNetwork>>, at: Duration) -> Result<(), SimError> {
        let interval = self.interval();
        if interval.is_zero() {
            return Err(SimError::InvalidDelay(format!(
                "{} byte packets at {} leave no gap between sends",
                self.packet_size, self.data_rate
            )));
        }
        log::debug!(
            "Source on node {} starts at {:?}: {} byte packets every {:?} ({})",
            self.node,
            at,
            self.packet_size,
            interval,
            self.data_rate
        );
        let source = Rc::new(self);
        sim.schedule_at(at, move |sim| send(sim, source, network, interval))?;
        Ok(())
    }
}

fn send(sim: &mut Simulator, source: Rc<OnOffSource>, network: Rc<RefCell<WifiNetwork>>, interval: Duration) -> anyhow::Result<()> {
    WifiNetwork::send(&network, sim, source.node, source.packet_size)?;
    sim.schedule_after(interval, move |sim| send(sim, source, network, interval))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_accumulates_bytes() {
        let sink = PacketSink::new(0);
        assert_eq!(sink.total_bytes_received(), 0);
        sink.receive(1_472);
        sink.receive(28);
        assert_eq!(sink.total_bytes_received(), 1_500);
        assert_eq!(sink.node(), 0);
    }

    #[test]
    fn source_interval_follows_rate() {
        let source = OnOffSource::new(2, 1_250, DataRate::from_bps(10_000_000));
        assert_eq!(source.interval(), Duration::from_millis(1));

        let default_source = OnOffSource::new(2, 1_472, DataRate::from_bps(100_000_000));
        assert_eq!(default_source.interval(), Duration::from_nanos(117_760));
    }
}
