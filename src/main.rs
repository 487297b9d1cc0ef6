//! WiFi UDP throughput simulator
//!
//! Streams constant-rate UDP traffic from the last node of a line of WiFi
//! nodes to node 0 and prints the throughput seen by the receiver every sample
//! interval, followed by the average over the measurement window.
//!
//! # Example
//!
//! ```bash
//! # Default scenario: 3 nodes 100 m apart, 100 Mbit/s offered, HtMcs7 cap
//! wifi-throughput-sim
//!
//! # Five nodes with multi-hop routing, traces written to ./traces
//! wifi-throughput-sim --numNodes=5 --routing=olsr --pcap --traceDir=traces
//! ```

use anyhow::Context;
use clap::{ArgAction, Parser};
use env_logger::Builder;
use log::{LevelFilter, info};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

mod network;
mod scenario;
mod simulation;

use scenario::{ScenarioConfig, ScenarioParams, ScenarioReport, run_scenario};
use simulation::{ThroughputSample, significant};

/// WiFi UDP throughput simulator
///
/// Flags override values from `--config`, which override the built-in defaults.
#[derive(Parser, Debug)]
#[command(name = "wifi-throughput-sim")]
#[command(version, about, long_about = None, allow_negative_numbers = true)]
struct Args {
    /// Scenario file (TOML, kebab-case keys)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Payload size in bytes
    #[arg(long = "payloadSize")]
    payload_size: Option<i64>,

    /// Application data rate, e.g. 100Mbps
    #[arg(long = "dataRate")]
    data_rate: Option<String>,

    /// Transport protocol name (recorded only, traffic is UDP)
    #[arg(long = "tcpVariant")]
    tcp_variant: Option<String>,

    /// Legacy PHY mode name (informational)
    #[arg(long = "phyMode")]
    phy_mode: Option<String>,

    /// Highest PHY rate: DsssRate*, OfdmRate*Mbps or HtMcs0..HtMcs7
    #[arg(long = "phyRate")]
    phy_rate: Option<String>,

    /// Measurement window in seconds
    #[arg(long = "simulationTime")]
    simulation_time: Option<f64>,

    /// Warm-up before measuring, in seconds
    #[arg(long = "startMeasureTime")]
    start_measure_time: Option<f64>,

    /// Sampling period in milliseconds
    #[arg(long = "sampleInterval")]
    sample_interval: Option<f64>,

    /// Write per-device packet traces
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::builder::BoolishValueParser::new())]
    pcap: Option<bool>,

    /// Number of nodes on the line (at least 2)
    #[arg(long = "numNodes")]
    num_nodes: Option<i64>,

    /// Distance between neighbouring nodes in meters
    #[arg(long)]
    distance: Option<f64>,

    /// Routing: static (direct) or olsr (minimum hop)
    #[arg(long)]
    routing: Option<String>,

    /// Seed for the shadowing random stream
    #[arg(long)]
    seed: Option<u64>,

    /// Log-normal shadowing standard deviation in dB
    #[arg(long = "shadowingSigma")]
    shadowing_sigma: Option<f64>,

    /// Transmit power in dBm
    #[arg(long = "txPowerDbm")]
    tx_power_dbm: Option<f64>,

    /// Receive gain in dB
    #[arg(long = "rxGainDb")]
    rx_gain_db: Option<f64>,

    /// Directory for packet traces
    #[arg(long = "traceDir")]
    trace_dir: Option<PathBuf>,

    /// Write the full report as JSON to this file
    #[arg(long)]
    json: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn set<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}

impl Args {
    /// Defaults, then the scenario file, then flags.
    fn params(&self) -> anyhow::Result<ScenarioParams> {
        let mut params = match &self.config {
            Some(path) => ScenarioParams::load(path)?,
            None => ScenarioParams::default(),
        };
        set(&mut params.payload_size, &self.payload_size);
        set(&mut params.data_rate, &self.data_rate);
        set(&mut params.tcp_variant, &self.tcp_variant);
        set(&mut params.phy_mode, &self.phy_mode);
        set(&mut params.phy_rate, &self.phy_rate);
        set(&mut params.simulation_time, &self.simulation_time);
        set(&mut params.start_measure_time, &self.start_measure_time);
        set(&mut params.sample_interval, &self.sample_interval);
        set(&mut params.pcap, &self.pcap);
        set(&mut params.num_nodes, &self.num_nodes);
        set(&mut params.distance, &self.distance);
        set(&mut params.routing, &self.routing);
        set(&mut params.seed, &self.seed);
        set(&mut params.shadowing_sigma, &self.shadowing_sigma);
        set(&mut params.tx_power_dbm, &self.tx_power_dbm);
        set(&mut params.rx_gain_db, &self.rx_gain_db);
        set(&mut params.trace_dir, &self.trace_dir);
        Ok(params)
    }
}

/// Closing line printed after the per-sample lines.
fn average_line(report: &ScenarioReport) -> String {
    format!("Average throughput: {} Mbit/s", significant(report.average_throughput_mbps))
}

/// Dump the whole report as pretty-printed JSON.
fn write_report(path: &Path, report: &ScenarioReport) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create report file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report).with_context(|| format!("Failed to write report to {}", path.display()))?;
    writer.flush().with_context(|| format!("Failed to write report to {}", path.display()))?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logging setup
    let crate_level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("wifi_throughput_sim"), crate_level)
        .parse_default_env()
        .init();

    let params = args.params()?;
    let config = ScenarioConfig::new(&params)?;
    info!("Starting up with {:?}", params);

    let report = run_scenario(&config, Some(Box::new(|sample: &ThroughputSample| println!("{}", sample))))?;

    println!();
    println!("{}", average_line(&report));

    if let Some(path) = &args.json {
        write_report(path, &report)?;
        info!("Report written to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_use_camel_case_names() {
        let args = Args::try_parse_from([
            "wifi-throughput-sim",
            "--payloadSize=1000",
            "--dataRate=5Mbps",
            "--numNodes",
            "4",
            "--sampleInterval=50",
            "--pcap",
        ])
        .unwrap();
        let params = args.params().unwrap();
        assert_eq!(params.payload_size, 1000);
        assert_eq!(params.data_rate, "5Mbps");
        assert_eq!(params.num_nodes, 4);
        assert_eq!(params.sample_interval, 50.0);
        assert!(params.pcap);
        assert_eq!(params.phy_rate, "HtMcs7");
    }

    #[test]
    fn pcap_accepts_explicit_values() {
        let off = Args::try_parse_from(["wifi-throughput-sim", "--pcap=false"]).unwrap();
        assert_eq!(off.pcap, Some(false));
        let on = Args::try_parse_from(["wifi-throughput-sim", "--pcap=1"]).unwrap();
        assert_eq!(on.pcap, Some(true));
    }

    #[test]
    fn negative_values_reach_validation() {
        let args = Args::try_parse_from(["wifi-throughput-sim", "--sampleInterval", "-100"]).unwrap();
        let params = args.params().unwrap();
        assert!(matches!(
            ScenarioConfig::new(&params),
            Err(scenario::ConfigError::InvalidConfig { field: "sampleInterval", .. })
        ));
    }

    #[test]
    fn flags_override_scenario_file() {
        let path = std::env::temp_dir().join(format!("wifi-throughput-sim-args-{}.toml", std::process::id()));
        std::fs::write(&path, "num-nodes = 6\ndistance = 50.0\n").unwrap();
        let args = Args::try_parse_from(["wifi-throughput-sim", "--config", path.to_str().unwrap(), "--distance=75"]).unwrap();
        let params = args.params().unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(params.num_nodes, 6);
        assert_eq!(params.distance, 75.0);
    }

    fn short_report() -> ScenarioReport {
        let params = ScenarioParams {
            data_rate: "1Mbps".into(),
            num_nodes: 2,
            simulation_time: 1.0,
            start_measure_time: 0.5,
            ..Default::default()
        };
        run_scenario(&ScenarioConfig::new(&params).unwrap(), None).unwrap()
    }

    #[test]
    fn average_line_is_rounded() {
        // 94 packets of 1472 bytes over a 1 s window: 1.106944 Mbit/s.
        let report = short_report();
        assert_eq!(average_line(&report), "Average throughput: 1.10694 Mbit/s");
    }

    #[test]
    fn json_report_round_trips_key_fields() {
        let report = short_report();
        let path = std::env::temp_dir().join(format!("wifi-throughput-sim-report-{}.json", std::process::id()));
        write_report(&path, &report).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["samples"].as_array().unwrap().len(), 11);
        assert_eq!(json["total_bytes_received"], report.total_bytes_received);
        assert!((json["average_throughput_mbps"].as_f64().unwrap() - report.average_throughput_mbps).abs() < 1e-12);
        assert_eq!(json["config"]["num_nodes"], 2);
        assert_eq!(json["network"]["delivered"], report.network.delivered);
    }
}
