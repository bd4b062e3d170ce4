//! Cross-validation evaluator.
//!
//! Every fold gets a fresh model from the factory, is fitted on the other
//! `k - 1` folds and scored on its own samples. Folds run as blocking tasks on
//! a bounded pool; the first failing fold cancels the folds that have not
//! started and discards partial results.

use crate::data::Dataset;
use crate::error::{ModelError, SweepError};
use crate::evaluation::metrics::{ConfusionMatrix, MetricSet, Predictions};
use crate::evaluation::partition::FoldAssignment;
use crate::zoo::ModelFactory;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// One metric across all folds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub fold_scores: Vec<f64>,
    pub mean: f64,
    /// Population standard deviation of `fold_scores`.
    pub std: f64,
}

impl MetricSummary {
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n = scores.len().max(1) as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        Self {
            fold_scores: scores,
            mean,
            std: variance.sqrt(),
        }
    }
}

/// Aggregated cross-validation scores, keyed by metric name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvReport {
    pub metrics: BTreeMap<String, MetricSummary>,
}

impl CvReport {
    pub fn means(&self) -> BTreeMap<String, f64> {
        self.metrics
            .iter()
            .map(|(name, summary)| (name.clone(), summary.mean))
            .collect()
    }

    pub fn mean(&self, metric: &str) -> Option<f64> {
        self.metrics.get(metric).map(|s| s.mean)
    }
}

/// Scores from a single train/test evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldoutReport {
    pub model: String,
    pub scores: BTreeMap<String, f64>,
    pub confusion: ConfusionMatrix,
    pub n_train: usize,
    pub n_test: usize,
}

/// Runs folds on at most `fold_workers` blocking threads at a time.
#[derive(Debug, Clone)]
pub struct CrossValidator {
    fold_workers: usize,
}

impl Default for CrossValidator {
    fn default() -> Self {
        Self::new(4)
    }
}

impl CrossValidator {
    pub fn new(fold_workers: usize) -> Self {
        Self {
            fold_workers: fold_workers.max(1),
        }
    }

    pub fn fold_workers(&self) -> usize {
        self.fold_workers
    }

    /// Mean of every metric over the folds of `folds`.
    pub async fn evaluate(
        &self,
        dataset: Arc<Dataset>,
        folds: Arc<FoldAssignment>,
        factory: ModelFactory,
        metrics: MetricSet,
    ) -> Result<CvReport, SweepError> {
        if folds.n_samples() != dataset.n_samples() {
            return Err(SweepError::invalid_input(format!(
                "fold assignment covers {} samples but the dataset has {}",
                folds.n_samples(),
                dataset.n_samples()
            )));
        }

        let semaphore = Arc::new(Semaphore::new(self.fold_workers));
        let failed = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let mut fold_of_task = HashMap::new();
        for fold in 0..folds.k() {
            let semaphore = Arc::clone(&semaphore);
            let failed = failed.clone();
            let dataset = Arc::clone(&dataset);
            let folds = Arc::clone(&folds);
            let factory = factory.clone();
            let metrics = metrics.clone();
            let handle = tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| ModelError::Worker(e.to_string()))?;
                if failed.is_cancelled() {
                    return Ok(None);
                }
                let outcome = tokio::task::spawn_blocking(move || {
                    evaluate_fold(&dataset, &folds, fold, &factory, &metrics)
                })
                .await
                .map_err(|e| ModelError::Worker(e.to_string()))
                .and_then(|r| r);
                // Cancel before the permit is released so no waiting fold starts.
                if outcome.is_err() {
                    failed.cancel();
                }
                outcome.map(Some)
            });
            fold_of_task.insert(handle.id(), fold);
        }

        let mut per_fold: Vec<Option<Vec<(String, f64)>>> = vec![None; folds.k()];
        while let Some(joined) = tasks.join_next_with_id().await {
            let (fold, outcome) = match joined {
                Ok((id, outcome)) => (fold_of_task.get(&id).copied().unwrap_or(0), outcome),
                Err(e) => {
                    tasks.abort_all();
                    return Err(SweepError::Evaluation {
                        fold: fold_of_task.get(&e.id()).copied().unwrap_or(0),
                        cause: ModelError::Worker(e.to_string()),
                    });
                }
            };
            match outcome {
                Ok(Some(scores)) => {
                    tracing::debug!(fold, model = factory.name(), "Fold evaluated");
                    per_fold[fold] = Some(scores);
                }
                Ok(None) => {}
                Err(cause) => {
                    tasks.abort_all();
                    return Err(SweepError::Evaluation { fold, cause });
                }
            }
        }

        let mut collected: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for scores in per_fold.into_iter().flatten() {
            for (name, value) in scores {
                collected.entry(name).or_default().push(value);
            }
        }
        Ok(CvReport {
            metrics: collected
                .into_iter()
                .map(|(name, scores)| (name, MetricSummary::from_scores(scores)))
                .collect(),
        })
    }

    /// Fit once on `train` and score `test`.
    pub async fn evaluate_holdout(
        &self,
        train: Arc<Dataset>,
        test: Arc<Dataset>,
        factory: ModelFactory,
        metrics: MetricSet,
    ) -> Result<HoldoutReport, SweepError> {
        tokio::task::spawn_blocking(move || -> Result<HoldoutReport, ModelError> {
            let mut model = factory.create()?;
            model.fit(&train)?;
            let predictions = predict(model.as_ref(), test.features(), &metrics)?;
            let scores = metrics.score_all(test.labels(), &predictions)?;
            Ok(HoldoutReport {
                model: factory.name().to_string(),
                scores: scores.into_iter().collect(),
                confusion: ConfusionMatrix::from_predictions(test.labels(), &predictions.labels),
                n_train: train.n_samples(),
                n_test: test.n_samples(),
            })
        })
        .await
        .map_err(|e| ModelError::Worker(e.to_string()))
        .and_then(|r| r)
        .map_err(|cause| SweepError::Evaluation { fold: 0, cause })
    }
}

fn predict(
    model: &dyn crate::algorithms::Classifier,
    rows: &[Vec<f64>],
    metrics: &MetricSet,
) -> Result<Predictions, ModelError> {
    let labels = model.predict(rows)?;
    let probabilities = if metrics.needs_probabilities() {
        if !model.supports_probabilities() {
            return Err(ModelError::Unsupported(format!(
                "{} cannot produce the class probabilities required by {:?}",
                model.name(),
                metrics
            )));
        }
        Some(model.predict_proba(rows)?)
    } else {
        None
    };
    Ok(Predictions {
        labels,
        probabilities,
    })
}

fn evaluate_fold(
    dataset: &Dataset,
    folds: &FoldAssignment,
    fold: usize,
    factory: &ModelFactory,
    metrics: &MetricSet,
) -> Result<Vec<(String, f64)>, ModelError> {
    let train = dataset
        .select(&folds.train_indices(fold))
        .map_err(|_| ModelError::EmptyTrainingSet)?;
    let test = dataset
        .select(folds.test_indices(fold))
        .map_err(|e| ModelError::Fit(e.to_string()))?;

    let mut model = factory.create()?;
    model.fit(&train)?;
    let predictions = predict(model.as_ref(), test.features(), metrics)?;
    metrics.score_all(test.labels(), &predictions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::Classifier;
    use crate::data::Label;
    use crate::evaluation::metrics::MetricRegistry;
    use crate::evaluation::partition::partition;
    use crate::training::sweep::{Configuration, ParamValue};
    use crate::zoo::ModelRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn separable(n_per_class: usize) -> Dataset {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..n_per_class {
            let jitter = i as f64 * 0.01;
            features.push(vec![jitter, 1.0 - jitter]);
            labels.push(Label::from("low"));
            features.push(vec![10.0 + jitter, 9.0 - jitter]);
            labels.push(Label::from("high"));
        }
        Dataset::new(features, labels).unwrap()
    }

    fn metrics(names: &[&str]) -> MetricSet {
        MetricRegistry::with_builtins().select(names).unwrap()
    }

    #[test]
    fn test_summary_from_scores() {
        let summary = MetricSummary::from_scores(vec![0.5, 1.0]);
        assert_eq!(summary.mean, 0.75);
        assert_eq!(summary.std, 0.25);
    }

    #[tokio::test]
    async fn test_knn_scores_perfectly_on_separable_data() {
        let data = Arc::new(separable(10));
        let folds = Arc::new(partition(data.labels(), 5, 3).unwrap());
        let factory = ModelRegistry::with_builtins().resolve("knn").unwrap();
        let config: Configuration = [("n_neighbors".to_string(), ParamValue::Int(3))]
            .into_iter()
            .collect();
        let report = CrossValidator::new(2)
            .evaluate(data, folds, factory.bind(&config), metrics(&["accuracy", "f1_macro"]))
            .await
            .unwrap();
        assert_eq!(report.mean("accuracy"), Some(1.0));
        assert_eq!(report.mean("f1_macro"), Some(1.0));
        assert_eq!(report.metrics["accuracy"].fold_scores.len(), 5);
    }

    #[tokio::test]
    async fn test_fold_failure_reports_cause() {
        let data = Arc::new(separable(6));
        let folds = Arc::new(partition(data.labels(), 3, 0).unwrap());
        let factory = ModelRegistry::with_builtins()
            .resolve("nearest_centroid")
            .unwrap();
        let err = CrossValidator::default()
            .evaluate(data, folds, factory, metrics(&["neg_log_loss"]))
            .await
            .unwrap_err();
        match err {
            SweepError::Evaluation { cause, .. } => {
                assert!(matches!(cause, ModelError::Unsupported(_)))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    /// Fails its first fit; counts how many instances were built.
    struct FailsFirstFit {
        fits: Arc<AtomicUsize>,
    }

    impl Classifier for FailsFirstFit {
        fn name(&self) -> &str {
            "fails_first_fit"
        }

        fn fit(&mut self, _data: &Dataset) -> Result<(), ModelError> {
            if self.fits.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(ModelError::Fit("diverged".into()));
            }
            Ok(())
        }

        fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<Label>, ModelError> {
            Ok(vec![Label::from("low"); rows.len()])
        }

        fn classes(&self) -> Vec<Label> {
            vec![Label::from("high"), Label::from("low")]
        }
    }

    #[tokio::test]
    async fn test_first_failing_fold_cancels_unstarted_folds() {
        let data = Arc::new(separable(10));
        let folds = Arc::new(partition(data.labels(), 5, 2).unwrap());
        let created = Arc::new(AtomicUsize::new(0));
        let fits = Arc::new(AtomicUsize::new(0));
        let mut registry = ModelRegistry::new();
        {
            let created = Arc::clone(&created);
            let fits = Arc::clone(&fits);
            registry.register("fails_first_fit", move |_| {
                created.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(FailsFirstFit {
                    fits: Arc::clone(&fits),
                }) as Box<dyn Classifier>)
            });
        }

        let err = CrossValidator::new(1)
            .evaluate(
                data,
                folds,
                registry.resolve("fails_first_fit").unwrap(),
                metrics(&["accuracy"]),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SweepError::Evaluation {
                cause: ModelError::Fit(_),
                ..
            }
        ));
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(fits.load(Ordering::SeqCst), 1);
    }

    /// Panics when the first sample is missing from its training set.
    struct PanicsWithoutFirstSample;

    impl Classifier for PanicsWithoutFirstSample {
        fn name(&self) -> &str {
            "panics_without_first_sample"
        }

        fn fit(&mut self, data: &Dataset) -> Result<(), ModelError> {
            if !data.features().iter().any(|row| row[..] == [0.0, 1.0]) {
                panic!("first sample held out");
            }
            Ok(())
        }

        fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<Label>, ModelError> {
            Ok(vec![Label::from("low"); rows.len()])
        }

        fn classes(&self) -> Vec<Label> {
            vec![Label::from("high"), Label::from("low")]
        }
    }

    #[tokio::test]
    async fn test_panicking_fold_reports_its_index() {
        let data = Arc::new(separable(10));
        let folds = Arc::new(partition(data.labels(), 5, 9).unwrap());
        let expected = folds.fold_of_each_sample()[0];
        let mut registry = ModelRegistry::new();
        registry.register("panics", |_| {
            Ok(Box::new(PanicsWithoutFirstSample) as Box<dyn Classifier>)
        });

        let err = CrossValidator::new(2)
            .evaluate(
                data,
                folds,
                registry.resolve("panics").unwrap(),
                metrics(&["accuracy"]),
            )
            .await
            .unwrap_err();

        match err {
            SweepError::Evaluation { fold, cause } => {
                assert_eq!(fold, expected);
                assert!(matches!(cause, ModelError::Worker(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_same_factory_twice_gives_identical_scores() {
        let data = Arc::new(separable(8));
        let folds = Arc::new(partition(data.labels(), 4, 17).unwrap());
        let registry = ModelRegistry::with_builtins();
        let validator = CrossValidator::new(3);
        let set = metrics(&["accuracy", "neg_log_loss"]);
        let a = validator
            .evaluate(
                Arc::clone(&data),
                Arc::clone(&folds),
                registry.resolve("gaussian_nb").unwrap(),
                set.clone(),
            )
            .await
            .unwrap();
        let b = validator
            .evaluate(data, folds, registry.resolve("gaussian_nb").unwrap(), set)
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_holdout_reports_confusion() {
        let data = separable(10);
        let (train, test) = data.train_test_split(0.25, 5).unwrap();
        let report = CrossValidator::default()
            .evaluate_holdout(
                Arc::new(train),
                Arc::new(test),
                ModelRegistry::with_builtins().resolve("majority").unwrap(),
                metrics(&["accuracy"]),
            )
            .await
            .unwrap();
        assert_eq!(report.n_test, 5);
        assert_eq!(report.n_train, 15);
        assert_eq!(report.confusion.total(), 5);
        assert_eq!(report.model, "majority");
    }
}
