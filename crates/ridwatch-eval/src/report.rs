//! Evaluation reports: JSON output and a plain-text comparison table.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ridwatch_core::enums::{DetectorKind, Granularity};
use ridwatch_core::error::{EngineError, EngineResult};
use ridwatch_core::records::ScoreTally;
use ridwatch_detect::ScoreSet;
use ridwatch_store::dataset::combined_stats;
use ridwatch_store::reader::LoadStats;
use ridwatch_store::EventStore;

use crate::metrics::DetectionMetrics;
use crate::optimize::{flatten, PathLossSearch, Threshold, ThresholdOptimizer};

/// One detector on one split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitReport {
    pub scenarios: usize,
    pub metrics: DetectionMetrics,
    pub tally: ScoreTally,
    pub load: LoadStats,
    /// Raw scores and labels, in scenario then record order.
    pub scores: Vec<f64>,
    pub labels: Vec<bool>,
}

impl SplitReport {
    pub fn new(sets: &[ScoreSet], stores: &[EventStore], threshold: f64) -> EngineResult<Self> {
        let metrics = ThresholdOptimizer::evaluate(threshold, sets, stores)?;
        let mut tally = ScoreTally::default();
        for set in sets {
            tally.merge(&set.tally);
        }
        let (scores, labels) = flatten(sets);
        Ok(Self {
            scenarios: sets.len(),
            metrics,
            tally,
            load: combined_stats(stores),
            scores,
            labels,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorReport {
    pub name: String,
    pub kind: DetectorKind,
    pub granularity: Granularity,
    pub params: serde_json::Value,
    pub threshold: Threshold,
    pub path_loss_exponent: Option<f64>,
    pub line_search: Option<PathLossSearch>,
    pub train: Option<SplitReport>,
    pub test: SplitReport,
}

/// AUCs restricted to transmissions every transmission-level detector scored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommonSetComparison {
    pub transmissions: usize,
    pub auc: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub detectors: Vec<DetectorReport>,
    pub common_set: Option<CommonSetComparison>,
}

impl EvaluationReport {
    pub fn detector(&self, kind: DetectorKind) -> Option<&DetectorReport> {
        self.detectors.iter().find(|d| d.kind == kind)
    }

    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write `evaluation.json` plus one `<detector>_results.json` per
    /// detector into `dir`, creating it if needed. Returns the paths written.
    pub fn write_dir(&self, dir: &Path) -> EngineResult<Vec<PathBuf>> {
        fs::create_dir_all(dir).map_err(|source| EngineError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut written = Vec::new();
        let summary = dir.join("evaluation.json");
        write_file(&summary, &self.to_json()?)?;
        written.push(summary);

        for d in &self.detectors {
            let path = dir.join(format!("{}_results.json", d.kind.short_name()));
            write_file(&path, &serde_json::to_string_pretty(d)?)?;
            written.push(path);
        }
        Ok(written)
    }

    /// Train/test comparison, one row per detector.
    pub fn comparison_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<10} {:>10} {:>6} {:>8} {:>8} {:>8} {:>8} {:>8} {:>9} {:>9} {:>8}",
            "detector", "threshold", "ple", "trainAUC", "testAUC", "TPR", "FPR", "acc", "ttd_mean", "ttd_med", "missed"
        );
        for d in &self.detectors {
            let m = &d.test.metrics;
            let ttd = &m.time_to_detection;
            let _ = writeln!(
                out,
                "{:<10} {:>10} {:>6} {:>8} {:>8.4} {:>8.4} {:>8.4} {:>8.4} {:>9} {:>9} {:>8}",
                d.name,
                format!("{:.4}", d.threshold.value),
                d.path_loss_exponent.map_or("-".to_string(), |n| format!("{n:.1}")),
                d.train
                    .as_ref()
                    .map_or("-".to_string(), |t| format!("{:.4}", t.metrics.auc)),
                m.auc,
                m.tpr,
                m.fpr,
                m.accuracy,
                seconds(ttd.mean_s),
                seconds(ttd.median_s),
                ttd.not_detected,
            );
        }
        if let Some(common) = &self.common_set {
            let _ = writeln!(out, "common set: {} transmissions", common.transmissions);
            for (name, auc) in &common.auc {
                let _ = writeln!(out, "  {name:<10} AUC {auc:.4}");
            }
        }
        out
    }
}

fn seconds(value: Option<f64>) -> String {
    value.map_or("-".to_string(), |s| format!("{s:.2}s"))
}

fn write_file(path: &Path, contents: &str) -> EngineResult<()> {
    fs::write(path, contents).map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })
}
