//! Train on one split, test on another, for several detectors at once.
//!
//! Configuration and federate sets are checked before anything is scored.
//! Scenarios are scored in parallel, each with a fresh detector. Training
//! picks the path-loss exponent (multilateration only) and the threshold;
//! testing reuses both verbatim.

use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use ridwatch_core::config::EvaluationConfig;
use ridwatch_core::enums::{DetectorKind, Granularity};
use ridwatch_core::error::{EngineError, EngineResult};
use ridwatch_detect::{
    Detector, ExternalScoreDetector, ExternalScores, KalmanPowerDetector, MultilaterationDetector,
    ScoreSet, SingleSampleDetector,
};
use ridwatch_store::dataset::load_dataset;
use ridwatch_store::{EventStore, FederateSet};

use crate::aggregate::{restrict_to_common, to_transmission_level};
use crate::optimize::{
    flatten, search_path_loss, OperatingPoint, PathLossSearch, Threshold, ThresholdOptimizer,
};
use crate::report::{CommonSetComparison, DetectorReport, EvaluationReport, SplitReport};
use crate::roc::auc;

/// What training fixed for one detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedDetector {
    pub kind: DetectorKind,
    pub threshold: Threshold,
    /// Multilateration only.
    pub path_loss_exponent: Option<f64>,
    pub line_search: Option<PathLossSearch>,
    /// Absent when the threshold was supplied rather than trained.
    pub train: Option<SplitReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub detectors: Vec<TrainedDetector>,
}

impl TrainedModel {
    /// A model from known thresholds, for test-only runs.
    pub fn from_thresholds(thresholds: &[(DetectorKind, f64)], path_loss_exponent: Option<f64>) -> Self {
        Self {
            detectors: thresholds
                .iter()
                .map(|&(kind, value)| TrainedDetector {
                    kind,
                    threshold: Threshold::fixed(value),
                    path_loss_exponent: (kind == DetectorKind::Multilateration)
                        .then_some(path_loss_exponent)
                        .flatten(),
                    line_search: None,
                    train: None,
                })
                .collect(),
        }
    }

    pub fn get(&self, kind: DetectorKind) -> Option<&TrainedDetector> {
        self.detectors.iter().find(|d| d.kind == kind)
    }
}

/// A dataset checked and ready for scoring.
#[derive(Debug)]
pub struct PreparedSplit<'a> {
    stores: &'a [EventStore],
    /// One per store, when any detector needs them.
    federates: Option<Vec<FederateSet>>,
}

impl PreparedSplit<'_> {
    pub fn stores(&self) -> &[EventStore] {
        self.stores
    }

    pub fn federates(&self) -> Option<&[FederateSet]> {
        self.federates.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct EvaluationPipeline {
    config: EvaluationConfig,
    detectors: Vec<DetectorKind>,
    external: Option<Arc<ExternalScores>>,
    optimizer: ThresholdOptimizer,
}

impl EvaluationPipeline {
    pub fn new(config: EvaluationConfig, detectors: &[DetectorKind]) -> EngineResult<Self> {
        config.validate()?;
        let mut kinds: Vec<DetectorKind> = Vec::new();
        for &kind in detectors {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        if kinds.is_empty() {
            return Err(EngineError::config("no detectors selected"));
        }
        Ok(Self {
            config,
            detectors: kinds,
            external: None,
            optimizer: ThresholdOptimizer::default(),
        })
    }

    /// Add an external score source as one more detector.
    pub fn with_external_scores(mut self, scores: ExternalScores) -> Self {
        self.external = Some(Arc::new(scores));
        if !self.detectors.contains(&DetectorKind::External) {
            self.detectors.push(DetectorKind::External);
        }
        self
    }

    pub fn with_operating_point(mut self, criterion: OperatingPoint) -> Self {
        self.optimizer = ThresholdOptimizer::new(criterion);
        self
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    pub fn detectors(&self) -> &[DetectorKind] {
        &self.detectors
    }

    fn needs_federates(&self) -> bool {
        self.config.transmission_level || self.detectors.contains(&DetectorKind::Multilateration)
    }

    /// Check a dataset and resolve its federate sets.
    pub fn prepare<'a>(&self, stores: &'a [EventStore]) -> EngineResult<PreparedSplit<'a>> {
        if stores.is_empty() {
            return Err(EngineError::NoScores("empty dataset".to_string()));
        }
        if self.detectors.contains(&DetectorKind::External) && self.external.is_none() {
            return Err(EngineError::config("external detector selected without a score file"));
        }
        let federates = if self.needs_federates() {
            Some(
                stores
                    .iter()
                    .map(|s| FederateSet::resolve(&self.config.federates, s))
                    .collect::<EngineResult<Vec<_>>>()?,
            )
        } else {
            None
        };
        Ok(PreparedSplit { stores, federates })
    }

    fn build_detector(
        &self,
        kind: DetectorKind,
        federates: Option<&FederateSet>,
        path_loss_exponent: Option<f64>,
    ) -> EngineResult<Box<dyn Detector>> {
        Ok(match kind {
            DetectorKind::KalmanPower => Box::new(KalmanPowerDetector::new(self.config.kalman_power)),
            DetectorKind::SingleSample => Box::new(SingleSampleDetector::new(self.config.single_sample)),
            DetectorKind::Multilateration => {
                let federates = federates
                    .ok_or_else(|| EngineError::config("multilateration needs a federate set"))?;
                let mut config = self.config.multilateration;
                if let Some(n) = path_loss_exponent {
                    config = config.with_path_loss_exponent(n);
                }
                Box::new(MultilaterationDetector::new(config, federates.clone())?)
            }
            DetectorKind::External => {
                let scores = self
                    .external
                    .clone()
                    .ok_or_else(|| EngineError::config("no external scores loaded"))?;
                Box::new(ExternalScoreDetector::new(scores))
            }
        })
    }

    /// Score every scenario of a split with one detector.
    pub fn score(
        &self,
        kind: DetectorKind,
        split: &PreparedSplit<'_>,
        path_loss_exponent: Option<f64>,
    ) -> EngineResult<Vec<ScoreSet>> {
        split
            .stores
            .par_iter()
            .enumerate()
            .map(|(i, store)| {
                let federates = split.federates.as_ref().map(|f| &f[i]);
                let mut detector = self.build_detector(kind, federates, path_loss_exponent)?;
                let set = detector.score(store)?;
                match (self.config.transmission_level, federates) {
                    (true, Some(f)) if set.granularity == Granularity::Event => {
                        Ok(to_transmission_level(&set, store, f))
                    }
                    _ => Ok(set),
                }
            })
            .collect()
    }

    fn params(
        &self,
        kind: DetectorKind,
        split: &PreparedSplit<'_>,
        path_loss_exponent: Option<f64>,
    ) -> EngineResult<serde_json::Value> {
        let federates = split.federates.as_ref().and_then(|f| f.first());
        Ok(self.build_detector(kind, federates, path_loss_exponent)?.params())
    }

    /// Fit exponent and threshold for every detector on a training split.
    pub fn train(&self, stores: &[EventStore]) -> EngineResult<TrainedModel> {
        let split = self.prepare(stores)?;
        let mut model = TrainedModel::default();

        for &kind in &self.detectors {
            let (sets, exponent, search) = if kind == DetectorKind::Multilateration {
                let mut best: Option<(f64, Vec<ScoreSet>)> = None;
                let search = search_path_loss(&self.config.path_loss_candidates, |n| {
                    let sets = self.score(kind, &split, Some(n))?;
                    let (scores, labels) = flatten(&sets);
                    let value = auc(&scores, &labels)?;
                    if best.as_ref().map_or(true, |(b, _)| value > *b) {
                        best = Some((value, sets));
                    }
                    Ok(value)
                })?;
                let sets = best.map(|(_, sets)| sets).unwrap_or_default();
                (sets, Some(search.best.exponent), Some(search))
            } else {
                (self.score(kind, &split, None)?, None, None)
            };

            let (threshold, _) = self.optimizer.fit_sets(&sets)?;
            let train = SplitReport::new(&sets, stores, threshold.value)?;
            info!(
                detector = %kind,
                threshold = threshold.value,
                auc = ?threshold.auc,
                tpr = ?threshold.tpr,
                fpr = ?threshold.fpr,
                scored = train.tally.scored,
                skipped = train.tally.skipped_total(),
                "trained detector"
            );
            model.detectors.push(TrainedDetector {
                kind,
                threshold,
                path_loss_exponent: exponent,
                line_search: search,
                train: Some(train),
            });
        }
        Ok(model)
    }

    /// Score a test split with a trained (or supplied) model.
    pub fn evaluate(&self, model: &TrainedModel, stores: &[EventStore]) -> EngineResult<EvaluationReport> {
        let split = self.prepare(stores)?;
        let mut report = EvaluationReport::default();
        let mut transmission_sets: Vec<(String, Vec<ScoreSet>)> = Vec::new();

        for &kind in &self.detectors {
            let trained = model.get(kind).ok_or_else(|| {
                EngineError::config(format!("no threshold for detector {kind}"))
            })?;
            let sets = self.score(kind, &split, trained.path_loss_exponent)?;
            let test = SplitReport::new(&sets, stores, trained.threshold.value)?;
            info!(
                detector = %kind,
                auc = test.metrics.auc,
                tpr = test.metrics.tpr,
                fpr = test.metrics.fpr,
                detected = test.metrics.time_to_detection.detected,
                not_detected = test.metrics.time_to_detection.not_detected,
                scored = test.tally.scored,
                skipped = test.tally.skipped_total(),
                dropped_rows = test.load.dropped_total(),
                "evaluated detector"
            );

            let granularity = sets.first().map_or(Granularity::Event, |s| s.granularity);
            if granularity == Granularity::Transmission {
                transmission_sets.push((kind.to_string(), sets));
            }

            report.detectors.push(DetectorReport {
                name: kind.to_string(),
                kind,
                granularity,
                params: self.params(kind, &split, trained.path_loss_exponent)?,
                threshold: trained.threshold,
                path_loss_exponent: trained.path_loss_exponent,
                line_search: trained.line_search.clone(),
                train: trained.train.clone(),
                test,
            });
        }

        if transmission_sets.len() >= 2 {
            report.common_set = Some(common_set_comparison(&transmission_sets)?);
        }
        Ok(report)
    }

    /// Train then test.
    pub fn run(&self, train: &[EventStore], test: &[EventStore]) -> EngineResult<EvaluationReport> {
        // Fail on either split's configuration before scoring anything.
        self.prepare(train)?;
        self.prepare(test)?;
        let model = self.train(train)?;
        self.evaluate(&model, test)
    }

    /// Load both directories (honouring the configured limits) and run.
    pub fn run_dirs(&self, train_dir: &Path, test_dir: &Path) -> EngineResult<EvaluationReport> {
        let train = load_dataset(train_dir, self.config.train_limit)?;
        let test = load_dataset(test_dir, self.config.test_limit)?;
        self.run(&train, &test)
    }
}

fn common_set_comparison(named: &[(String, Vec<ScoreSet>)]) -> EngineResult<CommonSetComparison> {
    let per_detector: Vec<Vec<ScoreSet>> = named.iter().map(|(_, sets)| sets.clone()).collect();
    let restricted = restrict_to_common(&per_detector);
    let mut comparison = CommonSetComparison::default();
    for ((name, _), sets) in named.iter().zip(&restricted) {
        let (scores, labels) = flatten(sets);
        comparison.transmissions = scores.len();
        if scores.is_empty() {
            continue;
        }
        comparison.auc.insert(name.clone(), auc(&scores, &labels)?);
    }
    info!(transmissions = comparison.transmissions, auc = ?comparison.auc, "common-set comparison");
    Ok(comparison)
}
