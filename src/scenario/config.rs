//! Scenario parameters: raw values as read from a file or the command line,
//! and the validated, frozen configuration a run is built from.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::network::phy;
use crate::network::{DataRate, PhyRate, RoutingMode};
use crate::simulation::{delay_from_millis, delay_from_secs};

/// Upper bound on the number of nodes in the line topology.
pub const MAX_NODES: usize = 10_000;

/// Largest UDP payload that fits an IPv4 datagram.
pub const MAX_PAYLOAD_SIZE: u32 = 65_507;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for '{field}': {reason}")]
    InvalidConfig { field: &'static str, reason: String },
    #[error("failed to read scenario file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse scenario file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidConfig { field, reason: reason.into() }
}

/// Unvalidated scenario parameters.
///
/// Numeric fields keep wide, signed types so that nonsense such as a negative
/// sample interval reaches validation instead of failing in the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScenarioParams {
    /// Application payload in bytes
    pub payload_size: i64,
    /// Application data rate, e.g. "100Mbps"
    pub data_rate: String,
    /// Transport variant name. Recorded, never used: the traffic is UDP.
    pub tcp_variant: String,
    /// Legacy mode name, validated and otherwise informational
    pub phy_mode: String,
    /// Highest PHY rate the links may use
    pub phy_rate: String,
    /// Measurement window in seconds
    pub simulation_time: f64,
    /// Warm-up before measuring, in seconds
    pub start_measure_time: f64,
    /// Sampling period in milliseconds
    pub sample_interval: f64,
    pub pcap: bool,
    pub num_nodes: i64,
    /// Spacing between neighbouring nodes in meters
    pub distance: f64,
    pub routing: String,
    pub seed: u64,
    pub shadowing_sigma: f64,
    pub tx_power_dbm: f64,
    pub rx_gain_db: f64,
    pub trace_dir: PathBuf,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            payload_size: 1472,
            data_rate: "100Mbps".to_string(),
            tcp_variant: "TcpNewReno".to_string(),
            phy_mode: "DsssRate1Mbps".to_string(),
            phy_rate: "HtMcs7".to_string(),
            simulation_time: 10.0,
            start_measure_time: 5.0,
            sample_interval: 100.0,
            pcap: false,
            num_nodes: 3,
            distance: 100.0,
            routing: "static".to_string(),
            seed: 1,
            shadowing_sigma: 0.0,
            tx_power_dbm: 16.0206,
            rx_gain_db: -10.0,
            trace_dir: PathBuf::from("."),
        }
    }
}

impl ScenarioParams {
    /// Load parameters from a TOML scenario file. Keys left out of the file
    /// keep their defaults.
    ///
    /// # Arguments
    /// * `path` - Path to the scenario file
    ///
    /// # Returns
    /// * `Ok(ScenarioParams)` if the file was read and parsed
    /// * `Err(ConfigError::Read | ConfigError::Parse)` otherwise
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Validated scenario. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioConfig {
    payload_size: u32,
    data_rate: DataRate,
    tcp_variant: String,
    phy_mode: &'static PhyRate,
    phy_rate: &'static PhyRate,
    simulation_time: Duration,
    start_measure_time: Duration,
    sample_interval: Duration,
    pcap: bool,
    num_nodes: usize,
    distance: f64,
    routing: RoutingMode,
    seed: u64,
    shadowing_sigma: f32,
    tx_power_dbm: f32,
    rx_gain_db: f32,
    trace_dir: PathBuf,
}

fn positive_finite(field: &'static str, value: f64) -> Result<f64, ConfigError> {
    if !value.is_finite() {
        return Err(invalid(field, format!("{} is not a finite number", value)));
    }
    if value <= 0.0 {
        return Err(invalid(field, format!("must be greater than zero, got {}", value)));
    }
    Ok(value)
}

fn finite_f32(field: &'static str, value: f64) -> Result<f32, ConfigError> {
    let narrowed = value as f32;
    if !narrowed.is_finite() {
        return Err(invalid(field, format!("{} is not a finite number", value)));
    }
    Ok(narrowed)
}

fn known_rate(field: &'static str, name: &str) -> Result<&'static PhyRate, ConfigError> {
    phy::lookup(name).ok_or_else(|| invalid(field, format!("unknown PHY rate '{}'", name)))
}

impl ScenarioConfig {
    /// Validate `params`. The first offending field is reported.
    pub fn new(params: &ScenarioParams) -> Result<Self, ConfigError> {
        let payload_size = match u32::try_from(params.payload_size) {
            Ok(size) if size > 0 && size <= MAX_PAYLOAD_SIZE => size,
            _ => {
                return Err(invalid(
                    "payloadSize",
                    format!("must be between 1 and {} bytes, got {}", MAX_PAYLOAD_SIZE, params.payload_size),
                ));
            }
        };

        let data_rate: DataRate = params.data_rate.parse().map_err(|e: String| invalid("dataRate", e))?;
        if data_rate.bps() == 0 {
            return Err(invalid("dataRate", "must be greater than zero"));
        }
        if data_rate.transmission_time(u64::from(payload_size)).is_zero() {
            return Err(invalid(
                "dataRate",
                format!("{} leaves no gap between {} byte packets", data_rate, payload_size),
            ));
        }

        let phy_mode = known_rate("phyMode", &params.phy_mode)?;
        let phy_rate = known_rate("phyRate", &params.phy_rate)?;

        let simulation_time = positive_finite("simulationTime", params.simulation_time)?;
        let simulation_time = delay_from_secs(simulation_time).map_err(|e| invalid("simulationTime", e.to_string()))?;
        if simulation_time.is_zero() {
            return Err(invalid("simulationTime", format!("{} s rounds down to zero", params.simulation_time)));
        }

        if params.start_measure_time.is_nan() || params.start_measure_time < 0.0 {
            return Err(invalid(
                "startMeasureTime",
                format!("must be zero or greater, got {}", params.start_measure_time),
            ));
        }
        let start_measure_time = delay_from_secs(params.start_measure_time).map_err(|e| invalid("startMeasureTime", e.to_string()))?;

        let sample_interval = positive_finite("sampleInterval", params.sample_interval)?;
        let sample_interval = delay_from_millis(sample_interval).map_err(|e| invalid("sampleInterval", e.to_string()))?;
        if sample_interval.is_zero() {
            return Err(invalid("sampleInterval", format!("{} ms rounds down to zero", params.sample_interval)));
        }

        let num_nodes = match usize::try_from(params.num_nodes) {
            Ok(n) if (2..=MAX_NODES).contains(&n) => n,
            _ => {
                return Err(invalid(
                    "numNodes",
                    format!("must be between 2 and {}, got {}", MAX_NODES, params.num_nodes),
                ));
            }
        };

        let distance = positive_finite("distance", params.distance)?;
        let routing: RoutingMode = params.routing.parse().map_err(|e: String| invalid("routing", e))?;

        let shadowing_sigma = finite_f32("shadowingSigma", params.shadowing_sigma)?;
        if shadowing_sigma < 0.0 {
            return Err(invalid("shadowingSigma", format!("must be zero or greater, got {}", shadowing_sigma)));
        }
        let tx_power_dbm = finite_f32("txPowerDbm", params.tx_power_dbm)?;
        let rx_gain_db = finite_f32("rxGainDb", params.rx_gain_db)?;

        Ok(Self {
            payload_size,
            data_rate,
            tcp_variant: params.tcp_variant.clone(),
            phy_mode,
            phy_rate,
            simulation_time,
            start_measure_time,
            sample_interval,
            pcap: params.pcap,
            num_nodes,
            distance,
            routing,
            seed: params.seed,
            shadowing_sigma,
            tx_power_dbm,
            rx_gain_db,
            trace_dir: params.trace_dir.clone(),
        })
    }

    pub fn payload_size(&self) -> u32 {
        self.payload_size
    }

    pub fn data_rate(&self) -> DataRate {
        self.data_rate
    }

    pub fn tcp_variant(&self) -> &str {
        &self.tcp_variant
    }

    pub fn phy_mode(&self) -> &'static PhyRate {
        self.phy_mode
    }

    pub fn phy_rate(&self) -> &'static PhyRate {
        self.phy_rate
    }

    pub fn simulation_time(&self) -> Duration {
        self.simulation_time
    }

    pub fn start_measure_time(&self) -> Duration {
        self.start_measure_time
    }

    pub fn sample_interval(&self) -> Duration {
        self.sample_interval
    }

    pub fn pcap(&self) -> bool {
        self.pcap
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn routing(&self) -> RoutingMode {
        self.routing
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn shadowing_sigma(&self) -> f32 {
        self.shadowing_sigma
    }

    pub fn tx_power_dbm(&self) -> f32 {
        self.tx_power_dbm
    }

    pub fn rx_gain_db(&self) -> f32 {
        self.rx_gain_db
    }

    pub fn trace_dir(&self) -> &Path {
        &self.trace_dir
    }

    /// When the source starts: one sample interval before measuring begins,
    /// or at zero if the warm-up is shorter than that.
    pub fn source_start(&self) -> Duration {
        self.start_measure_time.saturating_sub(self.sample_interval)
    }

    /// End of the run: warm-up plus the measurement window.
    pub fn horizon(&self) -> Duration {
        self.start_measure_time.saturating_add(self.simulation_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(result: Result<ScenarioConfig, ConfigError>) -> &'static str {
        match result {
            Err(ConfigError::InvalidConfig { field, .. }) => field,
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn defaults_are_valid() {
        let config = ScenarioConfig::new(&ScenarioParams::default()).unwrap();
        assert_eq!(config.payload_size(), 1472);
        assert_eq!(config.data_rate().bps(), 100_000_000);
        assert_eq!(config.phy_rate().name, "HtMcs7");
        assert_eq!(config.sample_interval(), Duration::from_millis(100));
        assert_eq!(config.num_nodes(), 3);
        assert_eq!(config.routing(), RoutingMode::Static);
        assert_eq!(config.source_start(), Duration::from_millis(4_900));
        assert_eq!(config.horizon(), Duration::from_secs(15));
    }

    #[test]
    fn single_node_is_rejected() {
        let params = ScenarioParams { num_nodes: 1, ..Default::default() };
        assert_eq!(field_of(ScenarioConfig::new(&params)), "numNodes");
    }

    #[test]
    fn negative_sample_interval_is_rejected() {
        let params = ScenarioParams { sample_interval: -100.0, ..Default::default() };
        assert_eq!(field_of(ScenarioConfig::new(&params)), "sampleInterval");
    }

    #[test]
    fn each_bad_field_is_named() {
        let cases: Vec<(ScenarioParams, &str)> = vec![
            (ScenarioParams { payload_size: 0, ..Default::default() }, "payloadSize"),
            (ScenarioParams { payload_size: 70_000, ..Default::default() }, "payloadSize"),
            (ScenarioParams { data_rate: "fast".into(), ..Default::default() }, "dataRate"),
            (ScenarioParams { data_rate: "0Mbps".into(), ..Default::default() }, "dataRate"),
            (ScenarioParams { phy_rate: "HtMcs99".into(), ..Default::default() }, "phyRate"),
            (ScenarioParams { phy_mode: "Bogus".into(), ..Default::default() }, "phyMode"),
            (ScenarioParams { simulation_time: 0.0, ..Default::default() }, "simulationTime"),
            (ScenarioParams { simulation_time: f64::INFINITY, ..Default::default() }, "simulationTime"),
            (ScenarioParams { simulation_time: 1e-10, start_measure_time: 0.0, ..Default::default() }, "simulationTime"),
            (ScenarioParams { data_rate: "1e19bps".into(), ..Default::default() }, "dataRate"),
            (ScenarioParams { start_measure_time: -1.0, ..Default::default() }, "startMeasureTime"),
            (ScenarioParams { sample_interval: f64::NAN, ..Default::default() }, "sampleInterval"),
            (ScenarioParams { distance: 0.0, ..Default::default() }, "distance"),
            (ScenarioParams { routing: "aodv".into(), ..Default::default() }, "routing"),
            (ScenarioParams { shadowing_sigma: -2.0, ..Default::default() }, "shadowingSigma"),
            (ScenarioParams { tx_power_dbm: f64::NAN, ..Default::default() }, "txPowerDbm"),
        ];
        for (params, field) in cases {
            assert_eq!(field_of(ScenarioConfig::new(&params)), field, "{:?}", params);
        }
    }

    #[test]
    fn zero_warm_up_starts_source_at_zero() {
        let params = ScenarioParams { start_measure_time: 0.0, ..Default::default() };
        let config = ScenarioConfig::new(&params).unwrap();
        assert_eq!(config.source_start(), Duration::ZERO);
        assert_eq!(config.horizon(), Duration::from_secs(10));
    }

    #[test]
    fn tcp_variant_is_not_checked() {
        let params = ScenarioParams { tcp_variant: "TcpWhatever".into(), ..Default::default() };
        assert_eq!(ScenarioConfig::new(&params).unwrap().tcp_variant(), "TcpWhatever");
    }

    #[test]
    fn partial_scenario_file_keeps_defaults() {
        let params: ScenarioParams = toml::from_str(
            r#"
            num-nodes = 5
            routing = "olsr"
            sample-interval = 250
            "#,
        )
        .unwrap();
        assert_eq!(params.num_nodes, 5);
        assert_eq!(params.routing, "olsr");
        assert_eq!(params.sample_interval, 250.0);
        assert_eq!(params.payload_size, 1472);
        assert_eq!(params.data_rate, "100Mbps");
    }

    #[test]
    fn load_reports_missing_file() {
        let missing = std::env::temp_dir().join("wifi-throughput-sim-no-such-scenario.toml");
        assert!(matches!(ScenarioParams::load(&missing), Err(ConfigError::Read { .. })));
    }
}
