//! Bit rates written the way scenario files and flags spell them ("100Mbps",
//! "5.5Mb/s", "1500kbps", "2MBps").

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DataRate {
    bits_per_second: u64,
}

impl DataRate {
    pub const fn from_bps(bits_per_second: u64) -> Self {
        Self { bits_per_second }
    }

    pub fn bps(&self) -> u64 {
        self.bits_per_second
    }

    /// Time needed to push `bytes` through a link of this rate.
    ///
    /// A zero rate never finishes and yields `Duration::MAX`.
    pub fn transmission_time(&self, bytes: u64) -> Duration {
        if self.bits_per_second == 0 {
            return Duration::MAX;
        }
        let nanos = u128::from(bytes) * 8 * 1_000_000_000 / u128::from(self.bits_per_second);
        Duration::from_nanos(nanos.min(u128::from(u64::MAX)) as u64)
    }
}

impl FromStr for DataRate {
    type Err = String;

    /// Accepts a number followed by an optional SI prefix (k/K, M, G) and a
    /// unit: `bps`/`b/s` for bits, `Bps`/`B/s` for bytes. A bare number is bits
    /// per second.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let split = text
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || c == '+' || c == '-'))
            .unwrap_or(text.len());
        let (number, unit) = text.split_at(split);
        let value: f64 = number.parse().map_err(|_| format!("'{}' does not start with a number", s))?;
        if !value.is_finite() || value < 0.0 {
            return Err(format!("'{}' is not a non-negative rate", s));
        }

        let (multiplier, rest) = match unit.chars().next() {
            Some('k') | Some('K') => (1e3, &unit[1..]),
            Some('M') => (1e6, &unit[1..]),
            Some('G') => (1e9, &unit[1..]),
            _ => (1.0, unit),
        };
        let unit_scale = match rest {
            "" | "bps" | "b/s" => 1.0,
            "Bps" | "B/s" => 8.0,
            other => return Err(format!("unknown data rate unit '{}' in '{}'", other, s)),
        };

        let bps = value * multiplier * unit_scale;
        if bps > u64::MAX as f64 {
            return Err(format!("'{}' is too large", s));
        }
        Ok(Self::from_bps(bps.round() as u64))
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bps = self.bits_per_second;
        if bps >= 1_000_000_000 && bps % 1_000_000 == 0 {
            write!(f, "{}Gbps", bps as f64 / 1e9)
        } else if bps >= 1_000_000 && bps % 1_000 == 0 {
            write!(f, "{}Mbps", bps as f64 / 1e6)
        } else if bps >= 1_000 {
            write!(f, "{}kbps", bps as f64 / 1e3)
        } else {
            write!(f, "{}bps", bps)
        }
    }
}
