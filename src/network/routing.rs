//! Route computation between the traffic source and the sink.
//!
//! Two modes are offered. `Static` mirrors a hand-installed host route: the
//! source talks to the sink directly and the route only exists if that single
//! link is usable. `Olsr` stands in for a proactive link-state protocol and
//! picks a minimum-hop path over every usable link.

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use super::geometry::Topology;
use super::phy::{self, PhyRate};
use super::signal_calculations::LinkBudget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    #[default]
    Static,
    Olsr,
}

impl FromStr for RoutingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(RoutingMode::Static),
            "olsr" => Ok(RoutingMode::Olsr),
            other => Err(format!("unknown routing mode '{}', expected 'static' or 'olsr'", other)),
        }
    }
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingMode::Static => f.write_str("static"),
            RoutingMode::Olsr => f.write_str("olsr"),
        }
    }
}

/// One link of a route, with the rate chosen for it.
#[derive(Debug, Clone, Serialize)]
pub struct Hop {
    pub from: usize,
    pub to: usize,
    pub distance: f64,
    pub mean_snr_db: f32,
    pub rate: &'static PhyRate,
}

#[derive(Debug, Clone, Serialize)]
pub struct Route {
    pub hops: Vec<Hop>,
}

impl Route {
    #[cfg(test)]
    fn hop_count(&self) -> usize {
        self.hops.len()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hops.first() {
            Some(first) => write!(f, "{}", first.from)?,
            None => return f.write_str("<empty>"),
        }
        for hop in &self.hops {
            write!(f, " -[{} {:.1} dB]-> {}", hop.rate, hop.mean_snr_db, hop.to)?;
        }
        Ok(())
    }
}

/// Evaluate the link `from -> to`; `None` if no rate can be decoded on it.
fn link(topology: &Topology, budget: &LinkBudget, cap: &'static PhyRate, from: usize, to: usize) -> Option<Hop> {
    let distance = topology.distance(from, to);
    if !distance.is_finite() {
        return None;
    }
    let mean_snr_db = budget.mean_snr_db(distance);
    let rate = phy::select_rate(cap, mean_snr_db)?;
    Some(Hop {
        from,
        to,
        distance,
        mean_snr_db,
        rate,
    })
}

/// Compute the route from `source` to `sink`. `None` when the sink cannot be reached.
pub fn compute_route(
    topology: &Topology,
    budget: &LinkBudget,
    cap: &'static PhyRate,
    mode: RoutingMode,
    source: usize,
    sink: usize,
) -> Option<Route> {
    if source == sink || source >= topology.len() || sink >= topology.len() {
        return None;
    }
    match mode {
        RoutingMode::Static => link(topology, budget, cap, source, sink).map(|hop| Route { hops: vec![hop] }),
        RoutingMode::Olsr => shortest_path(topology, budget, cap, source, sink),
    }
}

/// Breadth-first search over usable links. Neighbours are visited in ascending
/// node order, so among equal-length paths the one through lower ids wins.
fn shortest_path(topology: &Topology, budget: &LinkBudget, cap: &'static PhyRate, source: usize, sink: usize) -> Option<Route> {
    let n = topology.len();
    let mut previous: Vec<Option<Hop>> = vec![None; n];
    let mut visited = vec![false; n];
    let mut frontier = VecDeque::from([source]);
    visited[source] = true;

    while let Some(node) = frontier.pop_front() {
        if node == sink {
            break;
        }
        for next in 0..n {
            if visited[next] {
                continue;
            }
            if let Some(hop) = link(topology, budget, cap, node, next) {
                visited[next] = true;
                previous[next] = Some(hop);
                frontier.push_back(next);
            }
        }
    }

    let mut hops = Vec::new();
    let mut cursor = sink;
    while cursor != source {
        let hop = previous[cursor].take()?;
        cursor = hop.from;
        hops.push(hop);
    }
    hops.reverse();
    Some(Route { hops })
}
