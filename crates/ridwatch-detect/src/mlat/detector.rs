use rayon::prelude::*;
use serde_json::json;
use tracing::{debug, warn};

use ridwatch_core::config::MultilaterationConfig;
use ridwatch_core::enums::{DetectorKind, ErrorScoreMode, Granularity};
use ridwatch_core::error::EngineResult;
use ridwatch_core::records::{DetectionRecord, RecordKey, SkipReason};
use ridwatch_core::types::TransmitterId;
use ridwatch_store::{EventStore, FederateSet, Transmission};

use super::solver::{MlatSolution, MultilaterationSolver, RssiObservation};
use crate::detector::{Detector, ScoreSet};
use crate::kalman::FilterBank;

#[derive(Debug, Clone)]
pub struct MultilaterationDetector {
    config: MultilaterationConfig,
    federates: FederateSet,
    solver: MultilaterationSolver,
    filters: FilterBank<TransmitterId>,
}

impl MultilaterationDetector {
    pub fn new(config: MultilaterationConfig, federates: FederateSet) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            solver: MultilaterationSolver::new(config.path_loss(), config.solver),
            filters: FilterBank::new(config.noise),
            config,
            federates,
        })
    }

    pub fn config(&self) -> &MultilaterationConfig {
        &self.config
    }

    pub fn federates(&self) -> &FederateSet {
        &self.federates
    }

    pub fn solver(&self) -> &MultilaterationSolver {
        &self.solver
    }

    /// Solve one transmission without touching filter state.
    pub fn solve_transmission(&self, transmission: &Transmission<'_>) -> Result<MlatSolution, SkipReason> {
        solve(&self.solver, &self.federates, transmission)
    }
}

/// Federate receptions in federate order, or a skip if any federate missed
/// the transmission.
fn federate_observations(
    federates: &FederateSet,
    transmission: &Transmission<'_>,
) -> Result<Vec<RssiObservation>, SkipReason> {
    federates
        .ids()
        .iter()
        .map(|&id| {
            transmission
                .events
                .iter()
                .find(|(_, e)| e.receiver_id == id)
                .map(|(_, e)| RssiObservation {
                    receiver_pos: e.receiver_pos,
                    rssi_dbm: e.rssi_dbm,
                })
                .ok_or(SkipReason::InsufficientObservations)
        })
        .collect()
}

fn median_claimed_altitude(transmission: &Transmission<'_>) -> f64 {
    let mut z: Vec<f64> = transmission.events.iter().map(|(_, e)| e.claimed_pos.z).collect();
    z.sort_by(f64::total_cmp);
    match z.len() {
        0 => 0.0,
        n if n % 2 == 1 => z[n / 2],
        n => 0.5 * (z[n / 2 - 1] + z[n / 2]),
    }
}

fn solve(
    solver: &MultilaterationSolver,
    federates: &FederateSet,
    transmission: &Transmission<'_>,
) -> Result<MlatSolution, SkipReason> {
    let observations = federate_observations(federates, transmission)?;
    solver.solve(
        &observations,
        median_claimed_altitude(transmission),
        transmission.claimed_pos(),
    )
}

impl Detector for MultilaterationDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Multilateration
    }

    fn granularity(&self) -> Granularity {
        Granularity::Transmission
    }

    fn params(&self) -> serde_json::Value {
        json!({
            "path_loss_exponent": self.config.path_loss_exponent,
            "carrier_mhz": self.config.carrier_mhz,
            "federates": self.federates.ids(),
            "process_noise": self.config.noise.process_noise,
            "measurement_noise": self.config.noise.measurement_noise,
            "initial_variance": self.config.noise.initial_variance,
            "score_mode": self.config.score_mode,
        })
    }

    fn score(&mut self, store: &EventStore) -> EngineResult<ScoreSet> {
        self.filters.clear();
        let mut set = ScoreSet::new(self.name(), store.scenario_id(), Granularity::Transmission);

        // Solves are independent; filter updates are not.
        let transmissions: Vec<Transmission<'_>> = store.transmissions().collect();
        let solver = &self.solver;
        let federates = &self.federates;
        let solved: Vec<Result<MlatSolution, SkipReason>> = transmissions
            .par_iter()
            .map(|t| solve(solver, federates, t))
            .collect();

        for (transmission, result) in transmissions.iter().zip(solved) {
            let solution = match result {
                Ok(solution) => solution,
                Err(reason) => {
                    match reason {
                        SkipReason::InsufficientObservations => {}
                        _ => warn!(
                            scenario = store.scenario_id(),
                            transmission = %transmission.key,
                            %reason,
                            "transmission skipped"
                        ),
                    }
                    set.skip(reason);
                    continue;
                }
            };
            let Some(claimed) = transmission.claimed_pos() else {
                set.skip(SkipReason::InsufficientObservations);
                continue;
            };

            let error = solution.position.range_to(&claimed);
            let key = transmission.key;
            let step = self.filters.observe(
                key.serial_number,
                key.rid_timestamp_ms as f64 / 1000.0,
                error,
            )?;

            let score = match self.config.score_mode {
                ErrorScoreMode::SmoothedError => step.estimate(),
                ErrorScoreMode::Nis => match step.nis() {
                    Some(nis) => nis,
                    None => {
                        set.skip(SkipReason::Bootstrap);
                        continue;
                    }
                },
            };

            set.push(DetectionRecord {
                key: RecordKey::Transmission(key),
                transmitter: key.serial_number,
                score,
                label: transmission.label(),
                time: transmission.time(),
            });
        }

        debug!(
            scenario = store.scenario_id(),
            transmissions = transmissions.len(),
            scored = set.tally.scored,
            insufficient = set.tally.skipped_for(SkipReason::InsufficientObservations),
            degenerate = set.tally.skipped_for(SkipReason::DegenerateGeometry),
            non_convergence = set.tally.skipped_for(SkipReason::NonConvergence),
            "multilateration scoring done"
        );
        Ok(set)
    }
}
