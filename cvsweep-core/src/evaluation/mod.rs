//! Fold partitioning, cross-validated scoring and metrics.

pub mod cross_validation;
pub mod metrics;
pub mod partition;

pub use cross_validation::{CrossValidator, CvReport, HoldoutReport, MetricSummary};
pub use metrics::{ConfusionMatrix, Metric, MetricRegistry, MetricSet, Predictions, ProbabilityMatrix};
pub use partition::{FoldAssignment, partition};
