//! Bundled network model.
//!
//! A coarse stand-in for a full WiFi stack: nodes on a line, a log-distance
//! link budget, ideal rate selection, static or shortest-hop routing, one
//! shared medium, a constant-rate UDP source and a byte-counting sink. The
//! simulation core only sees the sink through `TrafficSink`.
//!
//! ## Module Organization
//!
//! - `geometry`: node positions and distances
//! - `signal_calculations`: path loss, noise floor and SNR
//! - `phy`: rate table, frame durations and MAC timing
//! - `data_rate`: parsing and arithmetic for bit rates
//! - `routing`: route computation from source to sink
//! - `channel`: medium reservation
//! - `wifi`: per-packet forwarding, retries and queue limits
//! - `application`: the source and sink endpoints
//! - `trace`: optional per-device packet traces

pub mod application;
pub mod channel;
pub mod data_rate;
pub mod geometry;
pub mod phy;
pub mod routing;
pub mod signal_calculations;
pub mod trace;
pub mod wifi;

pub use application::{OnOffSource, PacketSink};
pub use data_rate::DataRate;
pub use geometry::Topology;
pub use phy::PhyRate;
pub use routing::{RoutingMode, compute_route};
pub use signal_calculations::{LinkBudget, PathLossParameters};
pub use trace::PacketTrace;
pub use wifi::{NetworkStats, WifiNetwork};
