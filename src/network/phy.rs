//! PHY rate table and per-family MAC timing.
//!
//! Each named mode pairs a bit rate with the minimum SNR at which frames sent at
//! that rate are considered decodable. The thresholds are coarse textbook values
//! for a 20 MHz channel, good enough to pick a plausible rate for a given link.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use super::data_rate::DataRate;

/// Modulation family. Rate selection never crosses families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PhyFamily {
    /// 802.11b DSSS/CCK
    Dsss,
    /// 802.11a OFDM
    Ofdm,
    /// 802.11n HT, 20 MHz, long guard interval, single stream
    Ht,
}

impl PhyFamily {
    pub fn slot(&self) -> Duration {
        match self {
            PhyFamily::Dsss => Duration::from_micros(20),
            PhyFamily::Ofdm | PhyFamily::Ht => Duration::from_micros(9),
        }
    }

    pub fn sifs(&self) -> Duration {
        match self {
            PhyFamily::Dsss => Duration::from_micros(10),
            PhyFamily::Ofdm | PhyFamily::Ht => Duration::from_micros(16),
        }
    }

    /// DIFS = SIFS + 2 slots.
    pub fn difs(&self) -> Duration {
        self.sifs() + 2 * self.slot()
    }

    /// Mean random backoff with the minimum contention window.
    pub fn mean_backoff(&self) -> Duration {
        let cw_min: u32 = match self {
            PhyFamily::Dsss => 31,
            PhyFamily::Ofdm | PhyFamily::Ht => 15,
        };
        self.slot() * cw_min / 2
    }

    /// Lowest mandatory rate of the family, used for control frames (ACKs).
    pub fn basic_rate(&self) -> &'static PhyRate {
        let name = match self {
            PhyFamily::Dsss => "DsssRate1Mbps",
            PhyFamily::Ofdm | PhyFamily::Ht => "OfdmRate6Mbps",
        };
        lookup(name).unwrap_or(&PHY_RATES[0])
    }

    fn preamble(&self) -> Duration {
        match self {
            PhyFamily::Dsss => Duration::from_micros(192),
            PhyFamily::Ofdm => Duration::from_micros(20),
            PhyFamily::Ht => Duration::from_micros(36),
        }
    }
}

#[derive(Debug, PartialEq, Serialize)]
pub struct PhyRate {
    pub name: &'static str,
    pub family: PhyFamily,
    /// Nominal rate in kbit/s.
    pub kbps: u32,
    /// Minimum SNR (dB) for reliable decoding at this rate.
    pub min_snr_db: f32,
}

impl PhyRate {
    pub fn rate(&self) -> DataRate {
        DataRate::from_bps(u64::from(self.kbps) * 1_000)
    }

    /// On-air duration of a PSDU of `bytes` bytes, preamble included.
    ///
    /// OFDM-based families pad to whole 4 µs symbols carrying
    /// 16 service + 6 tail bits on top of the payload.
    pub fn frame_duration(&self, bytes: u32) -> Duration {
        match self.family {
            PhyFamily::Dsss => self.family.preamble() + self.rate().transmission_time(u64::from(bytes)),
            PhyFamily::Ofdm | PhyFamily::Ht => {
                let bits = 22 + 8 * u64::from(bytes);
                let bits_per_symbol = u64::from(self.kbps) * 4 / 1_000;
                let symbols = bits.div_ceil(bits_per_symbol.max(1));
                self.family.preamble() + Duration::from_micros(4 * symbols)
            }
        }
    }
}

impl fmt::Display for PhyRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Bytes added to every UDP payload on air: UDP 8 + IPv4 20 + LLC/SNAP 8 + MAC header 24 + FCS 4.
pub const FRAME_OVERHEAD_BYTES: u32 = 64;

/// ACK frame size in bytes.
pub const ACK_BYTES: u32 = 14;

/// Known modes, ordered by family and then by ascending rate.
pub static PHY_RATES: [PhyRate; 20] = [
    PhyRate { name: "DsssRate1Mbps", family: PhyFamily::Dsss, kbps: 1_000, min_snr_db: -1.0 },
    PhyRate { name: "DsssRate2Mbps", family: PhyFamily::Dsss, kbps: 2_000, min_snr_db: 2.0 },
    PhyRate { name: "DsssRate5_5Mbps", family: PhyFamily::Dsss, kbps: 5_500, min_snr_db: 5.0 },
    PhyRate { name: "DsssRate11Mbps", family: PhyFamily::Dsss, kbps: 11_000, min_snr_db: 8.0 },
    PhyRate { name: "OfdmRate6Mbps", family: PhyFamily::Ofdm, kbps: 6_000, min_snr_db: 4.0 },
    PhyRate { name: "OfdmRate9Mbps", family: PhyFamily::Ofdm, kbps: 9_000, min_snr_db: 5.0 },
    PhyRate { name: "OfdmRate12Mbps", family: PhyFamily::Ofdm, kbps: 12_000, min_snr_db: 7.0 },
    PhyRate { name: "OfdmRate18Mbps", family: PhyFamily::Ofdm, kbps: 18_000, min_snr_db: 9.0 },
    PhyRate { name: "OfdmRate24Mbps", family: PhyFamily::Ofdm, kbps: 24_000, min_snr_db: 12.0 },
    PhyRate { name: "OfdmRate36Mbps", family: PhyFamily::Ofdm, kbps: 36_000, min_snr_db: 16.0 },
    PhyRate { name: "OfdmRate48Mbps", family: PhyFamily::Ofdm, kbps: 48_000, min_snr_db: 20.0 },
    PhyRate { name: "OfdmRate54Mbps", family: PhyFamily::Ofdm, kbps: 54_000, min_snr_db: 21.0 },
    PhyRate { name: "HtMcs0", family: PhyFamily::Ht, kbps: 6_500, min_snr_db: 4.0 },
    PhyRate { name: "HtMcs1", family: PhyFamily::Ht, kbps: 13_000, min_snr_db: 7.0 },
    PhyRate { name: "HtMcs2", family: PhyFamily::Ht, kbps: 19_500, min_snr_db: 9.0 },
    PhyRate { name: "HtMcs3", family: PhyFamily::Ht, kbps: 26_000, min_snr_db: 12.0 },
    PhyRate { name: "HtMcs4", family: PhyFamily::Ht, kbps: 39_000, min_snr_db: 16.0 },
    PhyRate { name: "HtMcs5", family: PhyFamily::Ht, kbps: 52_000, min_snr_db: 20.0 },
    PhyRate { name: "HtMcs6", family: PhyFamily::Ht, kbps: 58_500, min_snr_db: 21.0 },
    PhyRate { name: "HtMcs7", family: PhyFamily::Ht, kbps: 65_000, min_snr_db: 22.0 },
];

/// Find a mode by its name, case-insensitively.
pub fn lookup(name: &str) -> Option<&'static PhyRate> {
    PHY_RATES.iter().find(|rate| rate.name.eq_ignore_ascii_case(name))
}

/// Ideal rate selection: the fastest mode of `cap`'s family that does not
/// exceed `cap` and whose SNR threshold is met. `None` if even the most robust
/// mode cannot be decoded.
pub fn select_rate(cap: &'static PhyRate, snr_db: f32) -> Option<&'static PhyRate> {
    PHY_RATES
        .iter()
        .filter(|rate| rate.family == cap.family && rate.kbps <= cap.kbps && snr_db >= rate.min_snr_db)
        .max_by_key(|rate| rate.kbps)
}
