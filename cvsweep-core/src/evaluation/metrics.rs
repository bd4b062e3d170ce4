//! Scoring functions and the metric table.

use crate::data::Label;
use crate::error::{ModelError, SweepError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Lower clip for probabilities fed to the log loss.
const LOG_LOSS_EPS: f64 = 1e-15;

/// Class probability estimates, one row per sample, columns in `classes` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityMatrix {
    pub classes: Vec<Label>,
    pub rows: Vec<Vec<f64>>,
}

/// Model output for a block of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Predictions {
    pub labels: Vec<Label>,
    pub probabilities: Option<ProbabilityMatrix>,
}

/// A named, stateless scoring function. Higher is better for every built-in.
pub trait Metric: Send + Sync {
    fn name(&self) -> &str;

    /// Whether `score` reads `Predictions::probabilities`.
    fn needs_probabilities(&self) -> bool {
        false
    }

    fn score(&self, truth: &[Label], predictions: &Predictions) -> Result<f64, ModelError>;
}

fn check_lengths(truth: &[Label], predicted: &[Label]) -> Result<(), ModelError> {
    if truth.is_empty() {
        return Err(ModelError::scoring("no samples to score"));
    }
    if truth.len() != predicted.len() {
        return Err(ModelError::scoring(format!(
            "{} true labels but {} predictions",
            truth.len(),
            predicted.len()
        )));
    }
    Ok(())
}

/// Fraction of exact label matches.
pub struct Accuracy;

impl Metric for Accuracy {
    fn name(&self) -> &str {
        "accuracy"
    }

    fn score(&self, truth: &[Label], predictions: &Predictions) -> Result<f64, ModelError> {
        check_lengths(truth, &predictions.labels)?;
        let hits = truth
            .iter()
            .zip(&predictions.labels)
            .filter(|(t, p)| t == p)
            .count();
        Ok(hits as f64 / truth.len() as f64)
    }
}

/// Unweighted mean of per-class F1 over every label seen in truth or predictions.
/// A class with no true positives scores 0.
pub struct F1Macro;

impl Metric for F1Macro {
    fn name(&self) -> &str {
        "f1_macro"
    }

    fn score(&self, truth: &[Label], predictions: &Predictions) -> Result<f64, ModelError> {
        check_lengths(truth, &predictions.labels)?;
        let matrix = ConfusionMatrix::from_predictions(truth, &predictions.labels);
        let n = matrix.labels.len();
        let total: f64 = (0..n)
            .map(|c| {
                let tp = matrix.counts[c][c] as f64;
                let predicted: usize = (0..n).map(|r| matrix.counts[r][c]).sum();
                let actual: usize = matrix.counts[c].iter().sum();
                let denom = predicted as f64 + actual as f64;
                if tp == 0.0 || denom == 0.0 {
                    0.0
                } else {
                    2.0 * tp / denom
                }
            })
            .sum();
        Ok(total / n as f64)
    }
}

/// Mean per-class recall over the classes present in truth.
pub struct BalancedAccuracy;

impl Metric for BalancedAccuracy {
    fn name(&self) -> &str {
        "balanced_accuracy"
    }

    fn score(&self, truth: &[Label], predictions: &Predictions) -> Result<f64, ModelError> {
        check_lengths(truth, &predictions.labels)?;
        let mut per_class: BTreeMap<&Label, (usize, usize)> = BTreeMap::new();
        for (t, p) in truth.iter().zip(&predictions.labels) {
            let entry = per_class.entry(t).or_insert((0, 0));
            entry.1 += 1;
            if t == p {
                entry.0 += 1;
            }
        }
        let recall_sum: f64 = per_class
            .values()
            .map(|&(hit, total)| hit as f64 / total as f64)
            .sum();
        Ok(recall_sum / per_class.len() as f64)
    }
}

/// Negated cross-entropy of the predicted class probabilities.
pub struct NegLogLoss;

impl Metric for NegLogLoss {
    fn name(&self) -> &str {
        "neg_log_loss"
    }

    fn needs_probabilities(&self) -> bool {
        true
    }

    fn score(&self, truth: &[Label], predictions: &Predictions) -> Result<f64, ModelError> {
        check_lengths(truth, &predictions.labels)?;
        let proba = predictions.probabilities.as_ref().ok_or_else(|| {
            ModelError::Unsupported("neg_log_loss requires probability estimates".into())
        })?;
        if proba.rows.len() != truth.len() {
            return Err(ModelError::scoring(format!(
                "{} probability rows for {} samples",
                proba.rows.len(),
                truth.len()
            )));
        }
        let column: HashMap<&Label, usize> =
            proba.classes.iter().enumerate().map(|(i, c)| (c, i)).collect();

        let mut total = 0.0;
        for (label, row) in truth.iter().zip(&proba.rows) {
            let p = column
                .get(label)
                .and_then(|&c| row.get(c))
                .copied()
                .unwrap_or(0.0);
            total += p.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS).ln();
        }
        Ok(total / truth.len() as f64)
    }
}

/// Name → metric table. Shared read-only during a sweep.
#[derive(Clone, Default)]
pub struct MetricRegistry {
    metrics: BTreeMap<String, Arc<dyn Metric>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `accuracy`, `balanced_accuracy`, `f1_macro` and `neg_log_loss`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Accuracy));
        registry.register(Arc::new(BalancedAccuracy));
        registry.register(Arc::new(F1Macro));
        registry.register(Arc::new(NegLogLoss));
        registry
    }

    /// Register a metric under its own name, replacing any previous entry.
    pub fn register(&mut self, metric: Arc<dyn Metric>) {
        self.metrics.insert(metric.name().to_string(), metric);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Metric>, SweepError> {
        self.metrics
            .get(name)
            .cloned()
            .ok_or_else(|| SweepError::UnknownMetric(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.metrics.keys().map(String::as_str).collect()
    }

    /// Resolve a list of names into an ordered, de-duplicated set.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<MetricSet, SweepError> {
        let mut seen = BTreeSet::new();
        let mut metrics = Vec::new();
        for name in names {
            let name = name.as_ref();
            if seen.insert(name.to_string()) {
                metrics.push(self.resolve(name)?);
            }
        }
        if metrics.is_empty() {
            return Err(SweepError::invalid_input("at least one metric is required"));
        }
        Ok(MetricSet { metrics })
    }
}

/// The metrics one evaluation scores, in configuration order.
#[derive(Clone)]
pub struct MetricSet {
    metrics: Vec<Arc<dyn Metric>>,
}

impl MetricSet {
    pub fn names(&self) -> Vec<String> {
        self.metrics.iter().map(|m| m.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn needs_probabilities(&self) -> bool {
        self.metrics.iter().any(|m| m.needs_probabilities())
    }

    /// Score every metric, stopping at the first failure.
    pub fn score_all(
        &self,
        truth: &[Label],
        predictions: &Predictions,
    ) -> Result<Vec<(String, f64)>, ModelError> {
        self.metrics
            .iter()
            .map(|m| {
                let value = m.score(truth, predictions)?;
                if value.is_nan() {
                    return Err(ModelError::Numerical(format!("{} is NaN", m.name())));
                }
                Ok((m.name().to_string(), value))
            })
            .collect()
    }
}

impl std::fmt::Debug for MetricSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Counts of (true, predicted) label pairs; rows are true labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub labels: Vec<Label>,
    pub counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn from_predictions(truth: &[Label], predicted: &[Label]) -> Self {
        let labels: Vec<Label> = truth
            .iter()
            .chain(predicted)
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let index: HashMap<&Label, usize> =
            labels.iter().enumerate().map(|(i, l)| (l, i)).collect();
        let mut counts = vec![vec![0; labels.len()]; labels.len()];
        for (t, p) in truth.iter().zip(predicted) {
            counts[index[t]][index[p]] += 1;
        }
        Self { labels, counts }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(values: &[i64]) -> Vec<Label> {
        values.iter().map(|&v| Label::Int(v)).collect()
    }

    fn preds(values: &[i64]) -> Predictions {
        Predictions {
            labels: labels(values),
            probabilities: None,
        }
    }

    #[test]
    fn test_accuracy() {
        let score = Accuracy
            .score(&labels(&[0, 1, 1, 0]), &preds(&[0, 1, 0, 0]))
            .unwrap();
        assert!((score - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_f1_macro_matches_hand_computation() {
        // class 0: tp=2 fp=1 fn=0 -> f1 = 0.8; class 1: tp=1 fp=0 fn=1 -> f1 = 2/3
        let score = F1Macro
            .score(&labels(&[0, 1, 1, 0]), &preds(&[0, 1, 0, 0]))
            .unwrap();
        assert!((score - (0.8 + 2.0 / 3.0) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_f1_macro_counts_never_hit_classes_as_zero() {
        let score = F1Macro.score(&labels(&[0, 0, 1]), &preds(&[0, 0, 0])).unwrap();
        // class 0: tp=2 fp=1 fn=0 -> 0.8; class 1 -> 0.0
        assert!((score - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_balanced_accuracy() {
        let score = BalancedAccuracy
            .score(&labels(&[0, 0, 0, 1]), &preds(&[0, 0, 0, 0]))
            .unwrap();
        assert!((score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_neg_log_loss() {
        let predictions = Predictions {
            labels: labels(&[0, 1]),
            probabilities: Some(ProbabilityMatrix {
                classes: labels(&[0, 1]),
                rows: vec![vec![0.8, 0.2], vec![0.4, 0.6]],
            }),
        };
        let score = NegLogLoss.score(&labels(&[0, 1]), &predictions).unwrap();
        let expected = (0.8f64.ln() + 0.6f64.ln()) / 2.0;
        assert!((score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_neg_log_loss_clips_zero_probabilities() {
        let predictions = Predictions {
            labels: labels(&[1]),
            probabilities: Some(ProbabilityMatrix {
                classes: labels(&[1]),
                rows: vec![vec![0.0]],
            }),
        };
        let score = NegLogLoss.score(&labels(&[1]), &predictions).unwrap();
        assert!(score.is_finite());
        assert!((score - LOG_LOSS_EPS.ln()).abs() < 1e-9);
    }

    #[test]
    fn test_neg_log_loss_without_probabilities() {
        let err = NegLogLoss.score(&labels(&[0]), &preds(&[0])).unwrap_err();
        assert!(matches!(err, ModelError::Unsupported(_)));
    }

    #[test]
    fn test_length_mismatch_is_a_scoring_error() {
        let err = Accuracy.score(&labels(&[0, 1]), &preds(&[0])).unwrap_err();
        assert!(matches!(err, ModelError::Scoring(_)));
    }

    #[test]
    fn test_registry_select() {
        let registry = MetricRegistry::with_builtins();
        let set = registry
            .select(&["accuracy", "neg_log_loss", "accuracy"])
            .unwrap();
        assert_eq!(set.names(), vec!["accuracy", "neg_log_loss"]);
        assert!(set.needs_probabilities());
        assert!(matches!(
            registry.select(&["auc"]).unwrap_err(),
            SweepError::UnknownMetric(name) if name == "auc"
        ));
        assert!(registry.select::<&str>(&[]).is_err());
    }

    #[test]
    fn test_confusion_matrix() {
        let matrix = ConfusionMatrix::from_predictions(&labels(&[0, 1, 2, 2]), &labels(&[0, 2, 2, 1]));
        assert_eq!(matrix.labels, labels(&[0, 1, 2]));
        assert_eq!(matrix.counts, vec![vec![1, 0, 0], vec![0, 0, 1], vec![0, 1, 1]]);
        assert_eq!(matrix.total(), 4);
    }
}
