//! Evaluation layer for ridwatch.
//!
//! Turns detector scores into calibrated classifiers: ROC/AUC, threshold
//! selection, confusion metrics, time-to-detection, and the train/test
//! pipeline that runs several detectors over scenario datasets.

pub mod aggregate;
pub mod metrics;
pub mod optimize;
pub mod pipeline;
pub mod report;
pub mod roc;

pub use metrics::{Confusion, DetectionMetrics, TimeToDetection};
pub use optimize::{OperatingPoint, Threshold, ThresholdOptimizer};
pub use pipeline::{EvaluationPipeline, TrainedModel};
pub use report::EvaluationReport;
pub use roc::RocCurve;
