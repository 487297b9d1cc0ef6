//! Node placement and distances.
//!
//! Positions are static for the whole run; nodes never move.

use serde::Serialize;

/// Simple 2D point in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Squared Euclidean distance (avoids a sqrt when only comparing).
pub fn distance2(a: &Point, b: &Point) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Convert squared distance back to distance.
pub fn distance_from_d2(d2: f64) -> f64 {
    d2.sqrt()
}

/// Fixed node positions, indexed by node id.
#[derive(Debug, Clone, Serialize)]
pub struct Topology {
    positions: Vec<Point>,
}

impl Topology {
    /// `count` nodes on the x axis, `spacing` meters apart, node 0 at the origin.
    pub fn line(count: usize, spacing: f64) -> Self {
        Self {
            positions: (0..count).map(|i| Point { x: i as f64 * spacing, y: 0.0 }).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn position(&self, node: usize) -> Option<&Point> {
        self.positions.get(node)
    }

    /// Distance between two nodes in meters. Unknown nodes are infinitely far apart.
    pub fn distance(&self, a: usize, b: usize) -> f64 {
        match (self.positions.get(a), self.positions.get(b)) {
            (Some(pa), Some(pb)) => distance_from_d2(distance2(pa, pb)),
            _ => f64::INFINITY,
        }
    }
}
