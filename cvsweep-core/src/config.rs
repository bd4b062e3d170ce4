//! Sweep configuration.
//!
//! Layering, lowest precedence first:
//! 1. Built-in defaults
//! 2. User config (`~/.config/cvsweep/config.toml`)
//! 3. Explicit config file (`--config sweep.toml`)
//! 4. Environment variables (prefixed with `CVSWEEP_`, nested keys split on `__`)
//! 5. Explicit overrides (CLI flags)

use crate::training::experiment::Objective;
use crate::training::recorder::RetryPolicy;
use crate::training::sweep::{Budget, SearchSpace};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything a sweep needs besides the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Number of folds.
    #[serde(default = "default_k")]
    pub k: usize,
    /// Seeds the fold partition and the configuration sampler.
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_metrics")]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub search_space: SearchSpace,
    #[serde(default = "default_budget")]
    pub budget: Budget,
    /// Model used when a configuration carries no `model` key.
    #[serde(default = "default_model")]
    pub model: String,
    /// Ranking metric. Defaults to maximizing the first entry of `metrics`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<Objective>,
    /// Trials evaluated concurrently.
    #[serde(default = "default_trial_workers")]
    pub trial_workers: usize,
    /// Folds evaluated concurrently within one trial.
    #[serde(default = "default_fold_workers")]
    pub fold_workers: usize,
    #[serde(default)]
    pub recorder: RetryPolicy,
}

fn default_k() -> usize {
    10
}

fn default_seed() -> u64 {
    1
}

fn default_metrics() -> Vec<String> {
    ["accuracy", "f1_macro", "neg_log_loss"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_budget() -> Budget {
    Budget::Trials(10)
}

fn default_model() -> String {
    "logistic_regression".to_string()
}

fn default_trial_workers() -> usize {
    2
}

fn default_fold_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            seed: default_seed(),
            metrics: default_metrics(),
            search_space: SearchSpace::default(),
            budget: default_budget(),
            model: default_model(),
            objective: None,
            trial_workers: default_trial_workers(),
            fold_workers: default_fold_workers(),
            recorder: RetryPolicy::default(),
        }
    }
}

impl SweepConfig {
    /// The configured objective, or maximize the first metric.
    pub fn resolved_objective(&self) -> Objective {
        self.objective.clone().unwrap_or_else(|| {
            Objective::maximize(
                self.metrics
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "accuracy".to_string()),
            )
        })
    }
}

/// Flags that override single configuration keys. Unset fields leave the
/// lower layers untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<Budget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_workers: Option<usize>,
}

/// Location of the user-level config file, if a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "cvsweep", "cvsweep")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Build the layered figment without extracting it.
pub fn figment(path: Option<&Path>, overrides: Option<&SweepOverrides>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(SweepConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(path) = path {
        figment = figment.merge(Toml::file(path));
    }

    // CVSWEEP_BUDGET, CVSWEEP_RECORDER__MAX_ATTEMPTS, ...
    figment = figment.merge(Env::prefixed("CVSWEEP_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }
    figment
}

/// Load the sweep configuration from every layer.
pub fn load_config(
    path: Option<&Path>,
    overrides: Option<&SweepOverrides>,
) -> Result<SweepConfig, Box<figment::Error>> {
    figment(path, overrides).extract().map_err(Box::new)
}
