//! Radio link budget calculations.
//!
//! Contains helpers for:
//! - Log-distance path loss with optional log-normal shadowing
//! - Friis reference loss for a carrier frequency
//! - Thermal noise floor of a receiver
//! - Mean and sampled SNR of a link
//!
//! Units:
//! - Power: dBm, gains and losses in dB
//! - Distance: meters
//! - Frequency and bandwidth: Hz

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;

/// Speed of light in vacuum (m/s).
const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Thermal noise power density at 290 K (dBm/Hz).
const THERMAL_NOISE_DENSITY_DBM_HZ: f32 = -174.0;

/// Parameters defining the radio channel propagation model.
///
/// This struct encapsulates the constants used in the log-distance path loss model
/// with log-normal shadowing. These parameters determine how signal strength
/// decays over distance and how much random variation (shadowing) is applied.
#[derive(Debug, Clone, Serialize)]
pub struct PathLossParameters {
    /// Path loss exponent (n).
    ///
    /// Determines how quickly the signal power decays with distance.
    /// - n = 2.0: Free space (what Friis assumes)
    /// - n = 2.7 to 3.5: Urban areas
    /// - n = 3.0 to 5.0: Indoor obstructed environments
    pub path_loss_exponent: f32,

    /// Standard deviation for log-normal shadowing (σ) in dB.
    ///
    /// A value of 0.0 disables shadowing and makes every link deterministic.
    pub shadowing_sigma: f32,

    /// Path loss at the reference distance d₀ = 1 meter in dB.
    pub path_loss_at_reference_distance: f32,

    /// The noise floor of the receiver in dBm.
    pub noise_floor: f32,
}

impl PathLossParameters {
    /// Free-space propagation at `frequency_hz` for a receiver with the given
    /// bandwidth and noise figure.
    pub fn free_space(frequency_hz: f64, bandwidth_hz: f64, noise_figure_db: f32, shadowing_sigma: f32) -> Self {
        Self {
            path_loss_exponent: 2.0,
            shadowing_sigma,
            path_loss_at_reference_distance: friis_reference_loss(frequency_hz),
            noise_floor: calculate_noise_floor(bandwidth_hz, noise_figure_db),
        }
    }
}

/// Friis free-space loss at 1 meter: `20 × log₁₀(4π f / c)`.
pub fn friis_reference_loss(frequency_hz: f64) -> f32 {
    (20.0 * (4.0 * std::f64::consts::PI * frequency_hz / SPEED_OF_LIGHT).log10()) as f32
}

/// Receiver noise floor: thermal noise over the bandwidth plus the noise figure.
pub fn calculate_noise_floor(bandwidth_hz: f64, noise_figure_db: f32) -> f32 {
    THERMAL_NOISE_DENSITY_DBM_HZ + (10.0 * bandwidth_hz.log10()) as f32 + noise_figure_db
}

/// Deterministic part of the log-distance model.
///
/// ```text
/// PL(d) = PL(d₀) + 10 × n × log₁₀(d/d₀),  d₀ = 1 m
/// ```
///
/// Distances below one meter return the reference loss.
pub fn calculate_mean_path_loss(distance: f64, params: &PathLossParameters) -> f32 {
    if distance < 1.0 {
        return params.path_loss_at_reference_distance;
    }
    params.path_loss_at_reference_distance + 10.0 * params.path_loss_exponent * (distance.log10() as f32)
}

/// Path loss including a log-normal shadowing term `X_σ ~ Normal(0, σ)` drawn
/// from `rng`. With σ = 0 no random number is consumed.
pub fn calculate_path_loss<R: Rng + ?Sized>(distance: f64, params: &PathLossParameters, rng: &mut R) -> f32 {
    let path_loss = calculate_mean_path_loss(distance, params);
    let shadowing = if params.shadowing_sigma > 0.0 {
        match Normal::new(0.0_f32, params.shadowing_sigma) {
            Ok(normal) => normal.sample(rng),
            Err(e) => {
                log::warn!("Invalid shadowing sigma {}: {}", params.shadowing_sigma, e);
                0.0
            }
        }
    } else {
        0.0
    };
    path_loss + shadowing
}

/// Transmit power, receive gain and propagation model for every link in the scenario.
#[derive(Debug, Clone, Serialize)]
pub struct LinkBudget {
    pub tx_power_dbm: f32,
    pub rx_gain_db: f32,
    pub path_loss: PathLossParameters,
}

impl LinkBudget {
    /// Received power without shadowing.
    pub fn mean_rssi(&self, distance: f64) -> f32 {
        self.tx_power_dbm + self.rx_gain_db - calculate_mean_path_loss(distance, &self.path_loss)
    }

    /// Long-term SNR of a link, used for route and rate decisions.
    pub fn mean_snr_db(&self, distance: f64) -> f32 {
        self.mean_rssi(distance) - self.path_loss.noise_floor
    }

    /// SNR seen by one frame, shadowing included.
    pub fn sample_snr_db<R: Rng + ?Sized>(&self, distance: f64, rng: &mut R) -> f32 {
        self.tx_power_dbm + self.rx_gain_db - calculate_path_loss(distance, &self.path_loss, rng) - self.path_loss.noise_floor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn wifi_5ghz(sigma: f32) -> LinkBudget {
        LinkBudget {
            tx_power_dbm: 16.0206,
            rx_gain_db: -10.0,
            path_loss: PathLossParameters::free_space(5e9, 20e6, 7.0, sigma),
        }
    }

    #[test]
    fn friis_reference_at_5ghz() {
        let pl0 = friis_reference_loss(5e9);
        assert!((pl0 - 46.42).abs() < 0.05, "got {pl0}");
    }

    #[test]
    fn noise_floor_for_20mhz() {
        let nf = calculate_noise_floor(20e6, 7.0);
        assert!((nf - -93.99).abs() < 0.01, "got {nf}");
    }

    #[test]
    fn path_loss_grows_six_db_per_distance_doubling_in_free_space() {
        let params = PathLossParameters::free_space(5e9, 20e6, 7.0, 0.0);
        let a = calculate_mean_path_loss(100.0, &params);
        let b = calculate_mean_path_loss(200.0, &params);
        assert!((b - a - 6.02).abs() < 0.01);
        assert_eq!(calculate_mean_path_loss(0.5, &params), params.path_loss_at_reference_distance);
    }

    #[test]
    fn snr_at_100m_with_default_budget() {
        let snr = wifi_5ghz(0.0).mean_snr_db(100.0);
        assert!((snr - 13.6).abs() < 0.1, "got {snr}");
    }

    #[test]
    fn zero_sigma_sampling_is_deterministic() {
        let budget = wifi_5ghz(0.0);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(budget.sample_snr_db(150.0, &mut rng), budget.mean_snr_db(150.0));
    }

    #[test]
    fn shadowing_is_reproducible_per_seed() {
        let budget = wifi_5ghz(4.0);
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..16).map(|_| budget.sample_snr_db(100.0, &mut rng)).collect::<Vec<_>>()
        };
        assert_eq!(draw(7), draw(7));
        assert_ne!(draw(7), draw(8));
    }
}
