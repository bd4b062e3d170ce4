//! Sweep controller: drives sample → resolve → evaluate → record.
//!
//! State machine: `Idle -> Running -> {Completed, Aborted, Cancelled}`.
//! Trial-scoped errors become `Failed` trial results; recorder exhaustion and
//! an impossible fold partition abort the sweep.

use crate::config::SweepConfig;
use crate::data::Dataset;
use crate::error::SweepError;
use crate::evaluation::{CrossValidator, FoldAssignment, MetricRegistry, MetricSet, partition};
use crate::training::experiment::{SweepReport, TrialResult};
use crate::training::recorder::{RunRecorder, record_with_retry};
use crate::training::reproducibility::{RngStream, SeedManager};
use crate::training::sweep::{ConfigSampler, Configuration};
use crate::zoo::ModelRegistry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a [`SweepController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepState {
    Idle,
    Running,
    Completed,
    Aborted,
    Cancelled,
}

impl SweepState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Cancelled)
    }
}

impl fmt::Display for SweepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Read-only inputs shared by every trial task.
#[derive(Clone)]
struct TrialContext {
    dataset: Arc<Dataset>,
    folds: Arc<FoldAssignment>,
    models: Arc<ModelRegistry>,
    metrics: MetricSet,
    validator: CrossValidator,
    default_model: Arc<str>,
}

impl TrialContext {
    fn model_for<'a>(&'a self, configuration: &'a Configuration) -> &'a str {
        configuration
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.default_model)
    }

    /// Evaluate one configuration. Only non-trial-scoped errors escape.
    async fn run(
        self,
        trial_number: usize,
        configuration: Configuration,
    ) -> Result<TrialResult, SweepError> {
        let started = Instant::now();
        let model = self.model_for(&configuration).to_string();
        let outcome = match self.models.resolve(&model) {
            Ok(factory) => {
                self.validator
                    .evaluate(
                        Arc::clone(&self.dataset),
                        Arc::clone(&self.folds),
                        factory.bind(&configuration),
                        self.metrics.clone(),
                    )
                    .await
            }
            Err(e) => Err(e),
        };
        let elapsed = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(report) => {
                tracing::debug!(
                    trial = trial_number,
                    model = %model,
                    %configuration,
                    "Trial finished"
                );
                Ok(TrialResult::succeeded(
                    trial_number,
                    &model,
                    configuration,
                    &report,
                    self.folds.fingerprint(),
                    elapsed,
                ))
            }
            Err(e) if e.is_trial_scoped() => {
                tracing::warn!(trial = trial_number, model = %model, error = %e, "Trial failed");
                Ok(TrialResult::failed(
                    trial_number,
                    &model,
                    configuration,
                    e.to_string(),
                    Some(self.folds.fingerprint()),
                    elapsed,
                ))
            }
            Err(e) => Err(e),
        }
    }
}

/// Runs one sweep over a dataset.
///
/// The dataset, registries and recorder are injected; a controller runs at
/// most once.
pub struct SweepController {
    dataset: Arc<Dataset>,
    models: Arc<ModelRegistry>,
    metrics: Arc<MetricRegistry>,
    recorder: Arc<dyn RunRecorder>,
    state: Mutex<SweepState>,
    folds: OnceCell<Arc<FoldAssignment>>,
    cancel: CancellationToken,
}

impl SweepController {
    pub fn new(
        dataset: Arc<Dataset>,
        models: Arc<ModelRegistry>,
        metrics: Arc<MetricRegistry>,
        recorder: Arc<dyn RunRecorder>,
    ) -> Self {
        Self {
            dataset,
            models,
            metrics,
            recorder,
            state: Mutex::new(SweepState::Idle),
            folds: OnceCell::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop dispatching new trials. In-flight trials finish and are recorded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> SweepState {
        self.state.lock().map(|s| *s).unwrap_or(SweepState::Aborted)
    }

    /// The fold assignment, once the first trial has computed it.
    pub fn fold_assignment(&self) -> Option<&FoldAssignment> {
        self.folds.get().map(Arc::as_ref)
    }

    fn set_state(&self, next: SweepState) {
        if let Ok(mut state) = self.state.lock() {
            let from = *state;
            tracing::debug!(%from, to = %next, "Sweep state change");
            *state = next;
        }
    }

    fn begin(&self) -> Result<(), SweepError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| SweepError::InvalidState(SweepState::Aborted))?;
        if *state != SweepState::Idle {
            return Err(SweepError::InvalidState(*state));
        }
        *state = SweepState::Running;
        Ok(())
    }

    async fn folds_for(&self, config: &SweepConfig) -> Result<Arc<FoldAssignment>, SweepError> {
        let folds = self
            .folds
            .get_or_try_init(|| async {
                partition(self.dataset.labels(), config.k, config.seed).map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(folds))
    }

    fn abort(&self, error: SweepError) -> SweepError {
        tracing::error!(error = %error, "Sweep aborted");
        self.set_state(SweepState::Aborted);
        error
    }

    /// Run the sweep to a terminal state.
    ///
    /// Configuration errors are returned before the controller leaves `Idle`.
    pub async fn start(&self, config: &SweepConfig) -> Result<SweepReport, SweepError> {
        let metric_set = self.metrics.select(&config.metrics)?;
        let objective = config.resolved_objective();
        if !metric_set.names().contains(&objective.name) {
            return Err(SweepError::invalid_input(format!(
                "objective metric '{}' is not among the sweep metrics {:?}",
                objective.name,
                metric_set.names()
            )));
        }
        if config.k < 2 {
            return Err(SweepError::invalid_input(format!(
                "fold count must be at least 2, got {}",
                config.k
            )));
        }
        let seeds = SeedManager::new(config.seed);
        let mut sampler =
            ConfigSampler::new(&config.search_space, config.budget, seeds.rng(RngStream::Sampler))?;

        self.begin()?;
        tracing::info!(
            budget = %config.budget,
            k = config.k,
            seed = config.seed,
            model = %config.model,
            objective = %objective,
            "Sweep started"
        );

        let trial_workers = config.trial_workers.max(1);
        let validator = CrossValidator::new(config.fold_workers);
        let mut tasks: JoinSet<Result<TrialResult, SweepError>> = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, (usize, Configuration)> = HashMap::new();
        let mut results = Vec::new();
        let mut next_trial = 0;

        loop {
            while tasks.len() < trial_workers && !self.cancel.is_cancelled() {
                let Some(configuration) = sampler.next() else {
                    break;
                };
                let folds = match self.folds_for(config).await {
                    Ok(folds) => folds,
                    Err(e) => {
                        tasks.abort_all();
                        return Err(self.abort(e));
                    }
                };
                let context = TrialContext {
                    dataset: Arc::clone(&self.dataset),
                    folds,
                    models: Arc::clone(&self.models),
                    metrics: metric_set.clone(),
                    validator: validator.clone(),
                    default_model: Arc::from(config.model.as_str()),
                };
                let handle = tasks.spawn(context.run(next_trial, configuration.clone()));
                in_flight.insert(handle.id(), (next_trial, configuration));
                next_trial += 1;
            }

            let Some(joined) = tasks.join_next_with_id().await else {
                break;
            };
            let trial = match joined {
                Ok((id, Ok(trial))) => {
                    in_flight.remove(&id);
                    trial
                }
                Ok((_, Err(e))) => {
                    tasks.abort_all();
                    return Err(self.abort(e));
                }
                Err(join_error) => {
                    let Some((number, configuration)) = in_flight.remove(&join_error.id()) else {
                        continue;
                    };
                    let model = configuration
                        .get("model")
                        .and_then(|v| v.as_str())
                        .unwrap_or(&config.model)
                        .to_string();
                    tracing::warn!(trial = number, error = %join_error, "Trial task panicked");
                    TrialResult::failed(
                        number,
                        &model,
                        configuration,
                        format!("trial task failed: {join_error}"),
                        self.folds.get().map(|f| f.fingerprint()),
                        0,
                    )
                }
            };

            if let Err(e) = record_with_retry(self.recorder.as_ref(), &trial, &config.recorder).await {
                tasks.abort_all();
                return Err(self.abort(e));
            }
            results.push(trial);
        }

        let state = if sampler.remaining() > 0 && self.cancel.is_cancelled() {
            SweepState::Cancelled
        } else {
            SweepState::Completed
        };
        self.set_state(state);

        let report = SweepReport::new(
            state,
            objective,
            results,
            self.folds.get().map(|f| f.fingerprint().to_string()),
        );
        tracing::info!(
            state = %state,
            trials = report.trials.len(),
            failed = report.failed_count(),
            best = ?report.best().map(|t| t.trial_number),
            "Sweep finished"
        );
        Ok(report)
    }
}
