//! Joint position and transmit-power solve from RSSI.
//!
//! Minimizes `Σ [rssi_i − (P − FSPL(|p − r_i|, n))]²` over `(x, y, z, P)`
//! with Levenberg–Marquardt.
//!
//! Four federates give a square system that can have several exact roots,
//! so the solve runs from two starts: the beacon's claimed position and the
//! federate centroid. The lower cost wins; costs within [`COST_TIE`] of each
//! other resolve to the claimed-position start.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn, OMatrix, OVector, Vector3, Vector4, U4};
use tracing::debug;

use ridwatch_core::config::SolverConfig;
use ridwatch_core::constants::{MIN_DISTANCE_M, MLAT_UNKNOWNS};
use ridwatch_core::path_loss::PathLossModel;
use ridwatch_core::records::SkipReason;
use ridwatch_core::types::Position;

/// Accept a solve that did not report convergence if its cost
/// (`½‖r‖²`, dB²) is below this.
const ACCEPTABLE_COST: f64 = 100.0;

/// Solutions whose costs differ by less than this (dB²) are equally good.
pub const COST_TIE: f64 = 1e-6;

/// Singular values below this fraction of the receiver spread count as zero.
const RANK_TOLERANCE: f64 = 1e-6;

/// One federate reception.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RssiObservation {
    pub receiver_pos: Position,
    pub rssi_dbm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MlatSolution {
    pub position: Position,
    pub tx_power_dbm: f64,
    /// `½‖r‖²` at the solution (dB²).
    pub cost: f64,
    pub evaluations: usize,
}

/// Least-squares problem over `[x, y, z, P]`.
struct RssiProblem<'a> {
    receivers: Vec<Vector3<f64>>,
    rssi: &'a [f64],
    path_loss: PathLossModel,
    params: Vector4<f64>,
}

impl RssiProblem<'_> {
    fn position(&self) -> Vector3<f64> {
        Vector3::new(self.params[0], self.params[1], self.params[2])
    }
}

impl LeastSquaresProblem<f64, Dyn, U4> for RssiProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, U4>;
    type ParameterStorage = Owned<f64, U4>;

    fn set_params(&mut self, params: &Vector4<f64>) {
        self.params = *params;
    }

    fn params(&self) -> Vector4<f64> {
        self.params
    }

    fn residuals(&self) -> Option<OVector<f64, Dyn>> {
        let p = self.position();
        let tx = self.params[3];
        let r = DVector::from_iterator(
            self.receivers.len(),
            self.receivers.iter().zip(self.rssi).map(|(rx, rssi)| {
                let d = (p - rx).norm();
                rssi - self.path_loss.rx_power_dbm(tx, d)
            }),
        );
        r.iter().all(|v| v.is_finite()).then_some(r)
    }

    fn jacobian(&self) -> Option<OMatrix<f64, Dyn, U4>> {
        let p = self.position();
        let mut jac = OMatrix::<f64, Dyn, U4>::zeros(self.receivers.len());
        for (i, rx) in self.receivers.iter().enumerate() {
            let delta = p - rx;
            let d = delta.norm();
            // r = rssi − P + FSPL(d); d(FSPL)/d(d) = −slope of rx power.
            let dloss = -self.path_loss.rx_power_slope(d);
            if d > MIN_DISTANCE_M {
                for axis in 0..3 {
                    jac[(i, axis)] = dloss * delta[axis] / d;
                }
            }
            jac[(i, 3)] = -1.0;
        }
        Some(jac)
    }
}

/// Levenberg–Marquardt multilateration with fixed path-loss model.
#[derive(Debug, Clone, Copy)]
pub struct MultilaterationSolver {
    path_loss: PathLossModel,
    config: SolverConfig,
}

impl MultilaterationSolver {
    pub fn new(path_loss: PathLossModel, config: SolverConfig) -> Self {
        Self { path_loss, config }
    }

    /// Start point: receiver centroid at `altitude`, transmit power from the
    /// strongest link's path-loss inversion.
    pub fn initial_guess(&self, observations: &[RssiObservation], altitude: f64) -> Vector4<f64> {
        let n = observations.len().max(1) as f64;
        let (sx, sy) = observations
            .iter()
            .fold((0.0, 0.0), |(sx, sy), o| (sx + o.receiver_pos.x, sy + o.receiver_pos.y));
        self.guess_at(observations, Position::new(sx / n, sy / n, altitude))
    }

    /// Start point at `start`, transmit power from the strongest link.
    pub fn guess_at(&self, observations: &[RssiObservation], start: Position) -> Vector4<f64> {
        let tx = observations
            .iter()
            .max_by(|a, b| a.rssi_dbm.total_cmp(&b.rssi_dbm))
            .map(|o| {
                self.path_loss
                    .tx_power_dbm(o.rssi_dbm, start.range_to(&o.receiver_pos))
            })
            .unwrap_or(0.0);

        Vector4::new(start.x, start.y, start.z, tx)
    }

    /// Solve for the transmitter. `claimed` adds a second start at the
    /// beacon's claimed position. Fails with the reason the transmission
    /// should be skipped.
    pub fn solve(
        &self,
        observations: &[RssiObservation],
        altitude: f64,
        claimed: Option<Position>,
    ) -> Result<MlatSolution, SkipReason> {
        if observations.len() < MLAT_UNKNOWNS {
            return Err(SkipReason::InsufficientObservations);
        }
        if observations
            .iter()
            .any(|o| !o.rssi_dbm.is_finite() || !o.receiver_pos.is_finite())
            || !altitude.is_finite()
        {
            return Err(SkipReason::NonFinite);
        }
        if is_degenerate(observations) {
            return Err(SkipReason::DegenerateGeometry);
        }

        let from_centroid = self.minimize(observations, self.initial_guess(observations, altitude));
        let Some(claimed) = claimed.filter(Position::is_finite) else {
            return from_centroid;
        };
        let from_claimed = self.minimize(observations, self.guess_at(observations, claimed));

        match (from_claimed, from_centroid) {
            (Ok(a), Ok(b)) if b.cost + COST_TIE < a.cost => Ok(b),
            (Ok(a), _) => Ok(a),
            (Err(_), b) => b,
        }
    }

    /// One Levenberg–Marquardt run from `start`, with acceptance checks.
    fn minimize(
        &self,
        observations: &[RssiObservation],
        start: Vector4<f64>,
    ) -> Result<MlatSolution, SkipReason> {
        let rssi: Vec<f64> = observations.iter().map(|o| o.rssi_dbm).collect();
        let problem = RssiProblem {
            receivers: observations
                .iter()
                .map(|o| to_vector(o.receiver_pos))
                .collect(),
            rssi: &rssi,
            path_loss: self.path_loss,
            params: start,
        };

        let (problem, report) = LevenbergMarquardt::new()
            .with_ftol(self.config.ftol)
            .with_xtol(self.config.xtol)
            .with_patience(self.config.patience)
            .minimize(problem);

        let params = problem.params();
        let cost = report.objective_function;
        let accepted = report.termination.was_successful() || cost < ACCEPTABLE_COST;
        let finite = params.iter().all(|v| v.is_finite()) && cost.is_finite();
        let in_bounds =
            (self.config.tx_power_min_dbm..=self.config.tx_power_max_dbm).contains(&params[3]);

        if !(accepted && finite && in_bounds) {
            debug!(
                termination = ?report.termination,
                cost,
                tx_power = params[3],
                evaluations = report.number_of_evaluations,
                "multilateration solve rejected"
            );
            return Err(SkipReason::NonConvergence);
        }

        Ok(MlatSolution {
            position: Position::new(params[0], params[1], params[2]),
            tx_power_dbm: params[3],
            cost,
            evaluations: report.number_of_evaluations,
        })
    }
}

/// Receivers are coincident or collinear: the centered positions have rank
/// below 2.
pub fn is_degenerate(observations: &[RssiObservation]) -> bool {
    let n = observations.len();
    if n == 0 {
        return true;
    }
    let centroid = observations
        .iter()
        .fold(Vector3::<f64>::zeros(), |acc, o| acc + to_vector(o.receiver_pos))
        / n as f64;

    let centered = DMatrix::from_fn(n, 3, |i, j| {
        to_vector(observations[i].receiver_pos)[j] - centroid[j]
    });
    let spread = centered.row_iter().map(|r| r.norm()).fold(0.0, f64::max);
    if spread <= MIN_DISTANCE_M {
        return true;
    }
    centered.rank(RANK_TOLERANCE * spread) < 2
}

fn to_vector(p: Position) -> Vector3<f64> {
    Vector3::new(p.x, p.y, p.z)
}
