//! Trial results and sweep reports.

use crate::evaluation::CvReport;
use crate::training::runner::SweepState;
use crate::training::sweep::Configuration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Outcome of one trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrialStatus {
    Ok,
    Failed { reason: String },
}

impl TrialStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Direction of the sweep objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    Maximize,
    Minimize,
}

/// Metric used to rank trials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    pub name: String,
    pub goal: Goal,
}

impl Objective {
    pub fn maximize(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            goal: Goal::Maximize,
        }
    }

    pub fn minimize(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            goal: Goal::Minimize,
        }
    }

    /// Whether `candidate` beats `incumbent`. Ties keep the incumbent.
    pub fn improves(&self, candidate: f64, incumbent: f64) -> bool {
        match self.goal {
            Goal::Maximize => candidate > incumbent,
            Goal::Minimize => candidate < incumbent,
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let goal = match self.goal {
            Goal::Maximize => "maximize",
            Goal::Minimize => "minimize",
        };
        write!(f, "{goal} {}", self.name)
    }
}

/// Immutable record of a finished trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub id: uuid::Uuid,
    pub trial_number: usize,
    pub model: String,
    pub configuration: Configuration,
    /// Mean over folds, per metric. Empty for failed trials.
    pub scores: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fold_scores: BTreeMap<String, Vec<f64>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub score_std: BTreeMap<String, f64>,
    #[serde(flatten)]
    pub status: TrialStatus,
    pub fold_fingerprint: Option<String>,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl TrialResult {
    pub fn succeeded(
        trial_number: usize,
        model: &str,
        configuration: Configuration,
        report: &CvReport,
        fold_fingerprint: &str,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            trial_number,
            model: model.to_string(),
            configuration,
            scores: report.means(),
            fold_scores: report
                .metrics
                .iter()
                .map(|(name, s)| (name.clone(), s.fold_scores.clone()))
                .collect(),
            score_std: report
                .metrics
                .iter()
                .map(|(name, s)| (name.clone(), s.std))
                .collect(),
            status: TrialStatus::Ok,
            fold_fingerprint: Some(fold_fingerprint.to_string()),
            duration_ms,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(
        trial_number: usize,
        model: &str,
        configuration: Configuration,
        reason: impl Into<String>,
        fold_fingerprint: Option<&str>,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            trial_number,
            model: model.to_string(),
            configuration,
            scores: BTreeMap::new(),
            fold_scores: BTreeMap::new(),
            score_std: BTreeMap::new(),
            status: TrialStatus::Failed {
                reason: reason.into(),
            },
            fold_fingerprint: fold_fingerprint.map(str::to_string),
            duration_ms,
            finished_at: Utc::now(),
        }
    }

    pub fn score(&self, metric: &str) -> Option<f64> {
        self.scores.get(metric).copied()
    }
}

/// What a finished sweep hands back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub state: SweepState,
    pub objective: Objective,
    /// In trial-number order.
    pub trials: Vec<TrialResult>,
    /// Index into `trials`.
    pub best_trial: Option<usize>,
    pub fold_fingerprint: Option<String>,
}

impl SweepReport {
    pub fn new(
        state: SweepState,
        objective: Objective,
        mut trials: Vec<TrialResult>,
        fold_fingerprint: Option<String>,
    ) -> Self {
        trials.sort_by_key(|t| t.trial_number);
        let mut best_trial: Option<(usize, f64)> = None;
        for (i, trial) in trials.iter().enumerate() {
            let Some(score) = trial.score(&objective.name) else {
                continue;
            };
            match best_trial {
                Some((_, incumbent)) if !objective.improves(score, incumbent) => {}
                _ => best_trial = Some((i, score)),
            }
        }
        Self {
            state,
            objective,
            trials,
            best_trial: best_trial.map(|(i, _)| i),
            fold_fingerprint,
        }
    }

    pub fn best(&self) -> Option<&TrialResult> {
        self.best_trial.and_then(|i| self.trials.get(i))
    }

    pub fn failed_count(&self) -> usize {
        self.trials.iter().filter(|t| !t.status.is_ok()).count()
    }
}
