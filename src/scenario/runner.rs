//! Builds one scenario from a validated configuration and runs it to its horizon.

use anyhow::Context;
use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

use super::config::ScenarioConfig;
use crate::network::{LinkBudget, NetworkStats, OnOffSource, PacketSink, PacketTrace, PathLossParameters, Topology, WifiNetwork, compute_route};
use crate::simulation::{RunSummary, SampleObserver, Simulator, ThroughputSample, ThroughputSampler, TrafficSink};

/// Carrier frequency of the modelled channel (Hz).
const CARRIER_FREQUENCY_HZ: f64 = 5.0e9;
/// Receiver bandwidth (Hz).
const CHANNEL_BANDWIDTH_HZ: f64 = 20.0e6;
/// Receiver noise figure (dB).
const NOISE_FIGURE_DB: f32 = 7.0;

/// Everything a finished run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub config: ScenarioConfig,
    pub samples: Vec<ThroughputSample>,
    /// Payload bytes the sink received over the whole run, warm-up included.
    pub total_bytes_received: u64,
    /// `total_bytes_received * 8 / (1e6 * simulation_time)`.
    pub average_throughput_mbps: f64,
    pub network: NetworkStats,
    pub run: RunSummary,
}

/// Run the scenario described by `config` on a fresh simulator.
///
/// The sink (node 0) listens from time zero. The source (the last node) starts
/// one sample interval before measuring begins, the sampler fires first at the
/// start of the measurement and the run ends after the measurement window.
/// `observer` sees every sample as it is taken.
pub fn run_scenario(config: &ScenarioConfig, observer: Option<SampleObserver>) -> anyhow::Result<ScenarioReport> {
    let topology = Topology::line(config.num_nodes(), config.distance());
    let sink_node = 0;
    let source_node = config.num_nodes() - 1;
    for node in 0..topology.len() {
        if let Some(position) = topology.position(node) {
            debug!("Node {} at ({:.1}, {:.1})", node, position.x, position.y);
        }
    }

    let budget = LinkBudget {
        tx_power_dbm: config.tx_power_dbm(),
        rx_gain_db: config.rx_gain_db(),
        path_loss: PathLossParameters::free_space(CARRIER_FREQUENCY_HZ, CHANNEL_BANDWIDTH_HZ, NOISE_FIGURE_DB, config.shadowing_sigma()),
    };
    let route = compute_route(&topology, &budget, config.phy_rate(), config.routing(), source_node, sink_node);
    match &route {
        Some(route) => info!("{} route from node {} to node {}: {}", config.routing(), source_node, sink_node, route),
        None => warn!(
            "No {} route from node {} to node {} at {} m spacing, every packet will be lost",
            config.routing(),
            source_node,
            sink_node,
            config.distance()
        ),
    }
    debug!(
        "Legacy mode {}, transport variant {} (informational)",
        config.phy_mode(),
        config.tcp_variant()
    );

    let trace = if config.pcap() {
        std::fs::create_dir_all(config.trace_dir())
            .with_context(|| format!("Failed to create trace directory {}", config.trace_dir().display()))?;
        Some(PacketTrace::new(config.trace_dir()))
    } else {
        None
    };

    let sink = Rc::new(PacketSink::new(sink_node));
    let network = Rc::new(RefCell::new(WifiNetwork::new(
        route,
        budget,
        StdRng::seed_from_u64(config.seed()),
        Rc::clone(&sink),
        trace,
    )));

    let mut sim = Simulator::new();
    OnOffSource::new(source_node, config.payload_size(), config.data_rate()).start(
        &mut sim,
        Rc::clone(&network),
        config.source_start(),
    )?;

    let mut sampler = ThroughputSampler::new(config.sample_interval(), &sink)?;
    if let Some(observer) = observer {
        sampler = sampler.with_observer(observer);
    }
    sampler.start(&mut sim, config.start_measure_time())?;

    info!(
        "Running {} nodes {} m apart for {:?} (measuring from {:?})",
        config.num_nodes(),
        config.distance(),
        config.horizon(),
        config.start_measure_time()
    );
    let run = sim.run(config.horizon())?;
    network.borrow_mut().finish()?;

    let total_bytes_received = sink.total_bytes_received();
    let average_throughput_mbps = total_bytes_received as f64 * 8.0 / (1e6 * config.simulation_time().as_secs_f64());
    let stats = network.borrow().stats().clone();
    info!(
        "Sent {} packets: {} delivered, {} lost, {} queue drops, {} unroutable ({} retries, {:?} airtime)",
        stats.packets_sent,
        stats.delivered,
        stats.lost,
        stats.queue_drops,
        stats.unroutable,
        stats.retries,
        network.borrow().airtime_used()
    );

    Ok(ScenarioReport {
        config: config.clone(),
        samples: sampler.samples(),
        total_bytes_received,
        average_throughput_mbps,
        network: stats,
        run,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::config::ScenarioParams;
    use std::time::Duration;

    fn short_run() -> ScenarioParams {
        ScenarioParams {
            data_rate: "1Mbps".into(),
            num_nodes: 2,
            simulation_time: 1.0,
            start_measure_time: 0.5,
            ..Default::default()
        }
    }

    #[test]
    fn repeated_runs_are_identical() {
        let params = ScenarioParams {
            shadowing_sigma: 4.0,
            seed: 7,
            ..short_run()
        };
        let config = ScenarioConfig::new(&params).unwrap();
        let first = run_scenario(&config, None).unwrap();
        let second = run_scenario(&config, None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn light_load_is_measured_end_to_end() {
        let config = ScenarioConfig::new(&short_run()).unwrap();
        let report = run_scenario(&config, None).unwrap();

        // Samples at 0.5 s, 0.6 s, ..., 1.5 s; the one at the horizon still fires.
        assert_eq!(report.samples.len(), 11);
        assert_eq!(report.samples[0].timestamp, Duration::from_millis(500));
        assert_eq!(report.samples[10].timestamp, Duration::from_millis(1_500));
        assert_eq!(report.run.final_time, Duration::from_millis(1_500));

        let sampled: u64 = report.samples.iter().map(|s| s.bytes_since_last).sum();
        assert_eq!(sampled, report.total_bytes_received);
        assert_eq!(report.network.delivered, report.network.packets_sent);
        assert_eq!(report.total_bytes_received, report.network.delivered * 1_472);
        // 94 packets from 0.4 s onward, averaged over the 1 s window.
        assert!(
            report.average_throughput_mbps > 1.0 && report.average_throughput_mbps < 1.2,
            "average {}",
            report.average_throughput_mbps
        );
    }

    #[test]
    fn observer_sees_every_sample() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_in_observer = Rc::clone(&seen);
        let config = ScenarioConfig::new(&short_run()).unwrap();
        let observer: SampleObserver = Box::new(move |sample: &ThroughputSample| seen_in_observer.borrow_mut().push(sample.to_string()));
        let report = run_scenario(&config, Some(observer)).unwrap();
        let seen = seen.borrow();
        assert_eq!(seen.len(), report.samples.len());
        assert_eq!(seen[0], report.samples[0].to_string());
    }

    #[test]
    fn out_of_range_sink_reports_zero() {
        let params = ScenarioParams {
            distance: 10_000.0,
            ..short_run()
        };
        let report = run_scenario(&ScenarioConfig::new(&params).unwrap(), None).unwrap();
        assert_eq!(report.total_bytes_received, 0);
        assert_eq!(report.average_throughput_mbps, 0.0);
        assert!(report.network.packets_sent > 0);
        assert_eq!(report.network.unroutable, report.network.packets_sent);
        assert!(report.samples.iter().all(|s| s.rate_mbps == 0.0));
    }

    #[test]
    fn pcap_writes_device_traces() {
        let dir = std::env::temp_dir().join(format!("wifi-throughput-sim-runner-{}", std::process::id()));
        let params = ScenarioParams {
            pcap: true,
            trace_dir: dir.clone(),
            ..short_run()
        };
        run_scenario(&ScenarioConfig::new(&params).unwrap(), None).unwrap();
        assert!(dir.join("Devices-1-0.jsonl").exists());
        assert!(dir.join("Devices-0-0.jsonl").exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
