//! Free-space path-loss model.
//!
//! `FSPL_dB = 32.44 + 20*log10(f_MHz) + 10*n*log10(d_km)`
//! relates transmit and received power: `tx = rx + FSPL`, `rx = tx - FSPL`.
//! With `n = 2` this is the textbook free-space equation; larger exponents
//! approximate cluttered environments.

use serde::{Deserialize, Serialize};

use crate::constants::{
    CARRIER_FREQUENCY_MHZ, FREE_SPACE_PATH_LOSS_EXPONENT, FSPL_CONSTANT_DB, MIN_DISTANCE_M,
};

/// Path loss in dB over `distance_m` meters.
pub fn fspl_db(distance_m: f64, path_loss_exponent: f64, carrier_mhz: f64) -> f64 {
    let distance_km = distance_m.max(MIN_DISTANCE_M) / 1000.0;
    FSPL_CONSTANT_DB
        + 20.0 * carrier_mhz.log10()
        + 10.0 * path_loss_exponent * distance_km.log10()
}

/// Transmit power implied by a reception at `distance_m`.
pub fn expected_tx_power_dbm(
    rx_power_dbm: f64,
    distance_m: f64,
    path_loss_exponent: f64,
    carrier_mhz: f64,
) -> f64 {
    rx_power_dbm + fspl_db(distance_m, path_loss_exponent, carrier_mhz)
}

/// Received power predicted for a transmission at `distance_m`.
pub fn expected_rx_power_dbm(
    tx_power_dbm: f64,
    distance_m: f64,
    path_loss_exponent: f64,
    carrier_mhz: f64,
) -> f64 {
    tx_power_dbm - fspl_db(distance_m, path_loss_exponent, carrier_mhz)
}

/// A path-loss model with its exponent and carrier bound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathLossModel {
    pub exponent: f64,
    pub carrier_mhz: f64,
}

impl Default for PathLossModel {
    fn default() -> Self {
        Self {
            exponent: FREE_SPACE_PATH_LOSS_EXPONENT,
            carrier_mhz: CARRIER_FREQUENCY_MHZ,
        }
    }
}

impl PathLossModel {
    pub fn new(exponent: f64, carrier_mhz: f64) -> Self {
        Self {
            exponent,
            carrier_mhz,
        }
    }

    pub fn loss_db(&self, distance_m: f64) -> f64 {
        fspl_db(distance_m, self.exponent, self.carrier_mhz)
    }

    pub fn tx_power_dbm(&self, rx_power_dbm: f64, distance_m: f64) -> f64 {
        expected_tx_power_dbm(rx_power_dbm, distance_m, self.exponent, self.carrier_mhz)
    }

    pub fn rx_power_dbm(&self, tx_power_dbm: f64, distance_m: f64) -> f64 {
        expected_rx_power_dbm(tx_power_dbm, distance_m, self.exponent, self.carrier_mhz)
    }

    /// Derivative of the predicted received power with respect to distance,
    /// `d(rx)/d(d) = -10 n / (d ln 10)`. Zero inside the distance floor.
    pub fn rx_power_slope(&self, distance_m: f64) -> f64 {
        if distance_m <= MIN_DISTANCE_M {
            return 0.0;
        }
        -10.0 * self.exponent / (distance_m * std::f64::consts::LN_10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fspl_one_km_free_space() {
        // 32.44 + 20*log10(2400) + 0 ≈ 100.04 dB
        let loss = fspl_db(1000.0, 2.0, 2400.0);
        assert!((loss - 100.0442).abs() < 1e-3, "loss={loss}");
    }

    #[test]
    fn test_tx_rx_inverse() {
        let model = PathLossModel::default();
        for &d in &[0.5, 10.0, 70.7, 1234.0] {
            let rx = model.rx_power_dbm(14.0, d);
            let tx = model.tx_power_dbm(rx, d);
            assert!((tx - 14.0).abs() < 1e-12, "d={d} tx={tx}");
        }
    }

    #[test]
    fn test_distance_floor() {
        let at_zero = fspl_db(0.0, 2.0, 2400.0);
        let at_floor = fspl_db(MIN_DISTANCE_M, 2.0, 2400.0);
        assert!(at_zero.is_finite());
        assert_eq!(at_zero, at_floor);
    }

    #[test]
    fn test_tenfold_distance_costs_ten_n_db() {
        let model = PathLossModel::new(2.4, 2400.0);
        let delta = model.loss_db(700.0) - model.loss_db(70.0);
        assert!((delta - 24.0).abs() < 1e-9, "delta={delta}");
    }

    #[test]
    fn test_rx_slope_matches_finite_difference() {
        let model = PathLossModel::default();
        let d = 150.0;
        let h = 1e-4;
        let numeric = (model.rx_power_dbm(0.0, d + h) - model.rx_power_dbm(0.0, d - h)) / (2.0 * h);
        assert!((numeric - model.rx_power_slope(d)).abs() < 1e-6);
    }
}
