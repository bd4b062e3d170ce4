//! End-to-end sweeps over small synthetic datasets.

use async_trait::async_trait;
use cvsweep_core::algorithms::Classifier;
use cvsweep_core::evaluation::partition;
use cvsweep_core::training::RetryPolicy;
use cvsweep_core::training::sweep::ParamValue;
use cvsweep_core::{
    Budget, CrossValidator, Dataset, JsonlRecorder, Label, MemoryRecorder, MetricRegistry,
    ModelError, ModelRegistry, RecorderError, RunRecorder, SearchSpace, SweepConfig,
    SweepController, SweepError, SweepState, TrialResult, TrialStatus,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// Two well separated classes of 15 samples each.
fn blobs() -> Arc<Dataset> {
    let mut features = Vec::new();
    let mut labels = Vec::new();
    for i in 0..15 {
        let t = i as f64 / 15.0;
        features.push(vec![t, 1.0 - t, 0.5]);
        labels.push(Label::from("left"));
        features.push(vec![6.0 + t, 5.0 - t, 2.5]);
        labels.push(Label::from("right"));
    }
    Arc::new(Dataset::new(features, labels).unwrap())
}

/// A model whose `fit` always fails.
struct BrokenModel;

impl Classifier for BrokenModel {
    fn name(&self) -> &str {
        "broken"
    }

    fn fit(&mut self, _data: &Dataset) -> Result<(), ModelError> {
        Err(ModelError::Fit("singular matrix".into()))
    }

    fn predict(&self, _rows: &[Vec<f64>]) -> Result<Vec<Label>, ModelError> {
        Err(ModelError::NotFitted)
    }

    fn classes(&self) -> Vec<Label> {
        Vec::new()
    }
}

fn registry_with_broken() -> Arc<ModelRegistry> {
    let mut registry = ModelRegistry::with_builtins();
    registry.register("broken", |_| Ok(Box::new(BrokenModel) as Box<dyn Classifier>));
    Arc::new(registry)
}

fn fast_config(budget: Budget, search_space: SearchSpace) -> SweepConfig {
    SweepConfig {
        k: 5,
        seed: 1,
        budget,
        search_space,
        model: "knn".into(),
        metrics: vec!["accuracy".into()],
        trial_workers: 3,
        fold_workers: 2,
        recorder: RetryPolicy {
            max_attempts: 3,
            backoff_ms: 1,
            max_backoff_ms: 4,
        },
        ..SweepConfig::default()
    }
}

fn controller(recorder: Arc<dyn RunRecorder>) -> SweepController {
    SweepController::new(
        blobs(),
        registry_with_broken(),
        Arc::new(MetricRegistry::with_builtins()),
        recorder,
    )
}

/// Fails the first `failures` calls, then delegates to memory.
struct FlakyRecorder {
    failures: AtomicUsize,
    calls: AtomicUsize,
    inner: MemoryRecorder,
}

impl FlakyRecorder {
    fn new(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
            inner: MemoryRecorder::new(),
        }
    }
}

#[async_trait]
impl RunRecorder for FlakyRecorder {
    async fn record(&self, trial: &TrialResult) -> Result<(), RecorderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(RecorderError::Unavailable("connection reset".into()));
        }
        self.inner.record(trial).await
    }
}

#[tokio::test]
async fn test_failing_model_trials_are_recorded_and_sweep_completes() {
    let recorder = Arc::new(MemoryRecorder::new());
    let sweep = controller(recorder.clone());
    let config = SweepConfig {
        model: "broken".into(),
        ..fast_config(
            Budget::Trials(5),
            SearchSpace::new().categorical("n_neighbors", [3i64, 5]),
        )
    };

    let report = sweep.start(&config).await.unwrap();

    assert_eq!(report.state, SweepState::Completed);
    assert_eq!(recorder.trials().len(), 5);
    assert!(report.failed_count() >= 1);
    for trial in &report.trials {
        match &trial.status {
            TrialStatus::Failed { reason } => {
                assert!(reason.contains("singular matrix"), "{reason}")
            }
            TrialStatus::Ok => panic!("broken model produced scores"),
        }
        assert!(trial.scores.is_empty());
    }
    assert!(report.best().is_none());
}

#[tokio::test]
async fn test_mixed_grid_keeps_running_after_a_failed_trial() {
    let recorder = Arc::new(MemoryRecorder::new());
    let sweep = controller(recorder.clone());
    let space = SearchSpace::new().categorical("model", ["broken", "gaussian_nb", "svm"]);

    let report = sweep
        .start(&fast_config(Budget::Exhaustive, space))
        .await
        .unwrap();

    assert_eq!(report.state, SweepState::Completed);
    assert_eq!(report.trials.len(), 3);
    assert_eq!(report.failed_count(), 2);
    let unknown = &report.trials[2];
    assert_eq!(unknown.model, "svm");
    assert!(matches!(
        &unknown.status,
        TrialStatus::Failed { reason } if reason.contains("Unknown model")
    ));
    assert_eq!(report.best().unwrap().model, "gaussian_nb");
    assert_eq!(report.best().unwrap().score("accuracy"), Some(1.0));
}

#[tokio::test]
async fn test_majority_class_accuracy_matches_majority_share() {
    let mut features = Vec::new();
    let mut labels = Vec::new();
    for i in 0..100 {
        features.push(vec![i as f64]);
        labels.push(Label::Int(if i < 90 { 0 } else { 1 }));
    }
    let data = Arc::new(Dataset::new(features, labels).unwrap());
    let folds = Arc::new(partition(data.labels(), 5, 1).unwrap());
    let metrics = MetricRegistry::with_builtins()
        .select(&["accuracy", "balanced_accuracy"])
        .unwrap();

    let report = CrossValidator::new(2)
        .evaluate(
            data,
            folds,
            ModelRegistry::with_builtins().resolve("majority").unwrap(),
            metrics,
        )
        .await
        .unwrap();

    assert!((report.mean("accuracy").unwrap() - 0.9).abs() < 1e-12);
    assert!((report.mean("balanced_accuracy").unwrap() - 0.5).abs() < 1e-12);
    assert!(report.metrics["accuracy"].std < 1e-12);
}

#[tokio::test]
async fn test_exhaustive_grid_runs_each_configuration_once() {
    let recorder = Arc::new(MemoryRecorder::new());
    let sweep = controller(recorder.clone());
    let space = SearchSpace::new()
        .categorical("p", [1i64, 2, 3])
        .categorical("weights", ["uniform", "distance"]);

    let report = sweep
        .start(&fast_config(Budget::Exhaustive, space))
        .await
        .unwrap();

    let seen: BTreeSet<String> = recorder
        .trials()
        .iter()
        .map(|t| t.configuration.to_string())
        .collect();
    assert_eq!(report.trials.len(), 6);
    assert_eq!(seen.len(), 6);
    assert!(report.trials.iter().all(|t| t.status.is_ok()));
    assert_eq!(
        report.trials[0].configuration.get("p"),
        Some(&ParamValue::Int(1))
    );
}

#[tokio::test]
async fn test_identical_sweeps_give_identical_scores() {
    let space = SearchSpace::new()
        .categorical("n_neighbors", [1i64, 3, 7])
        .categorical("weights", ["uniform", "distance"]);
    let config = SweepConfig {
        metrics: vec!["neg_log_loss".into(), "f1_macro".into()],
        ..fast_config(Budget::Trials(4), space)
    };

    let first = controller(Arc::new(MemoryRecorder::new()))
        .start(&config)
        .await
        .unwrap();
    let second = controller(Arc::new(MemoryRecorder::new()))
        .start(&config)
        .await
        .unwrap();

    assert_eq!(first.fold_fingerprint, second.fold_fingerprint);
    let scores = |r: &cvsweep_core::SweepReport| {
        r.trials
            .iter()
            .map(|t| (t.configuration.clone(), t.scores.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(scores(&first), scores(&second));
}

#[tokio::test]
async fn test_recorder_that_never_acknowledges_aborts_the_sweep() {
    let recorder = Arc::new(FlakyRecorder::new(usize::MAX));
    let sweep = controller(recorder.clone());

    let err = sweep
        .start(&fast_config(Budget::Trials(3), SearchSpace::new()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SweepError::RecorderUnavailable { attempts: 3, .. }
    ));
    assert_eq!(sweep.state(), SweepState::Aborted);
    assert!(recorder.inner.trials().is_empty());
}

#[tokio::test]
async fn test_transient_recorder_failures_are_retried() {
    let recorder = Arc::new(FlakyRecorder::new(2));
    let sweep = controller(recorder.clone());

    let report = sweep
        .start(&fast_config(Budget::Trials(3), SearchSpace::new()))
        .await
        .unwrap();

    assert_eq!(report.state, SweepState::Completed);
    assert_eq!(recorder.inner.trials().len(), 3);
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_cancelled_before_first_trial_records_nothing() {
    let recorder = Arc::new(MemoryRecorder::new());
    let sweep = controller(recorder.clone());
    sweep.cancel();

    let report = sweep
        .start(&fast_config(Budget::Trials(10), SearchSpace::new()))
        .await
        .unwrap();

    assert_eq!(report.state, SweepState::Cancelled);
    assert!(report.trials.is_empty());
    assert!(recorder.trials().is_empty());
    assert!(sweep.fold_assignment().is_none());
}

/// Cancels the sweep as soon as the first trial is acknowledged.
struct CancelAfterFirst {
    token: CancellationToken,
    inner: MemoryRecorder,
}

#[async_trait]
impl RunRecorder for CancelAfterFirst {
    async fn record(&self, trial: &TrialResult) -> Result<(), RecorderError> {
        self.inner.record(trial).await?;
        self.token.cancel();
        Ok(())
    }
}

#[tokio::test]
async fn test_cancellation_waits_for_in_flight_trials() {
    let token = CancellationToken::new();
    let recorder = Arc::new(CancelAfterFirst {
        token: token.clone(),
        inner: MemoryRecorder::new(),
    });
    let sweep = controller(recorder.clone()).with_cancellation(token);

    let report = sweep
        .start(&fast_config(Budget::Trials(10), SearchSpace::new()))
        .await
        .unwrap();

    assert_eq!(report.state, SweepState::Cancelled);
    assert_eq!(sweep.state(), SweepState::Cancelled);
    // Three workers were busy when the token fired; none were dispatched after.
    let numbers: Vec<usize> = report.trials.iter().map(|t| t.trial_number).collect();
    assert_eq!(numbers, vec![0, 1, 2]);
    let mut recorded: Vec<usize> = recorder
        .inner
        .trials()
        .iter()
        .map(|t| t.trial_number)
        .collect();
    recorded.sort_unstable();
    assert_eq!(recorded, numbers);
    assert!(report.trials.iter().all(|t| t.status.is_ok()));
}

#[tokio::test]
async fn test_unknown_default_model_fails_every_trial() {
    let recorder = Arc::new(MemoryRecorder::new());
    let sweep = controller(recorder.clone());
    let config = SweepConfig {
        model: "xgboost".into(),
        ..fast_config(Budget::Trials(2), SearchSpace::new())
    };

    let report = sweep.start(&config).await.unwrap();

    assert_eq!(report.state, SweepState::Completed);
    assert_eq!(report.failed_count(), 2);
    assert!(report.trials.iter().all(|t| t.model == "xgboost"));
}

#[tokio::test]
async fn test_jsonl_recorder_persists_a_full_sweep() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(JsonlRecorder::new(dir.path()));
    let sweep = controller(recorder.clone());
    let space = SearchSpace::new().categorical("model", ["nearest_centroid", "majority"]);

    let report = sweep
        .start(&fast_config(Budget::Exhaustive, space))
        .await
        .unwrap();

    let mut loaded = recorder.load_trials().await.unwrap();
    loaded.sort_by_key(|t| t.trial_number);
    assert_eq!(loaded, report.trials);
    assert!(
        loaded
            .iter()
            .all(|t| t.fold_fingerprint == report.fold_fingerprint)
    );
}
