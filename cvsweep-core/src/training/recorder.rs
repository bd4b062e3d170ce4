//! Run recorders: where finished trials and artifacts go.
//!
//! A recorder call is attempted once; retries are driven by the caller through
//! [`record_with_retry`].

use crate::error::{RecorderError, SweepError};
use crate::training::experiment::TrialResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Sink for trial results and named artifacts.
#[async_trait]
pub trait RunRecorder: Send + Sync {
    async fn record(&self, trial: &TrialResult) -> Result<(), RecorderError>;

    async fn record_artifact(&self, _name: &str, _blob: &[u8]) -> Result<(), RecorderError> {
        Ok(())
    }
}

/// Retry settings for recorder acknowledgments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.backoff_ms.saturating_mul(1u64 << attempt.min(20));
        Duration::from_millis(base.min(self.max_backoff_ms))
    }
}

/// Record `trial`, retrying with exponential backoff.
///
/// Fails with [`SweepError::RecorderUnavailable`] once `max_attempts` calls
/// have been rejected.
pub async fn record_with_retry(
    recorder: &dyn RunRecorder,
    trial: &TrialResult,
    policy: &RetryPolicy,
) -> Result<(), SweepError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match recorder.record(trial).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= max_attempts => {
                return Err(SweepError::RecorderUnavailable {
                    trial: trial.trial_number,
                    attempts: attempt,
                    cause: e,
                });
            }
            Err(e) => {
                let delay = policy.delay_for(attempt - 1);
                tracing::warn!(
                    trial = trial.trial_number,
                    attempt,
                    max = max_attempts,
                    backoff_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying trial record"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Artifact names are single path components.
fn validate_artifact_name(name: &str) -> Result<(), RecorderError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && name.chars().all(|c| !c.is_control());
    if valid {
        Ok(())
    } else {
        Err(RecorderError::InvalidArtifactName(name.to_string()))
    }
}

// ---------------------------------------------------------------------------
// MemoryRecorder
// ---------------------------------------------------------------------------

/// Keeps everything in process.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    trials: Mutex<Vec<TrialResult>>,
    artifacts: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trials(&self) -> Vec<TrialResult> {
        self.trials
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    pub fn artifact(&self, name: &str) -> Option<Vec<u8>> {
        self.artifacts
            .lock()
            .ok()
            .and_then(|a| a.get(name).cloned())
    }
}

#[async_trait]
impl RunRecorder for MemoryRecorder {
    async fn record(&self, trial: &TrialResult) -> Result<(), RecorderError> {
        self.trials
            .lock()
            .map_err(|e| RecorderError::Unavailable(e.to_string()))?
            .push(trial.clone());
        Ok(())
    }

    async fn record_artifact(&self, name: &str, blob: &[u8]) -> Result<(), RecorderError> {
        validate_artifact_name(name)?;
        self.artifacts
            .lock()
            .map_err(|e| RecorderError::Unavailable(e.to_string()))?
            .insert(name.to_string(), blob.to_vec());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JsonlRecorder
// ---------------------------------------------------------------------------

/// Appends one JSON line per trial to `<dir>/trials.jsonl` and writes
/// artifacts to `<dir>/artifacts/<name>`.
#[derive(Debug)]
pub struct JsonlRecorder {
    dir: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlRecorder {
    pub const TRIALS_FILE: &'static str = "trials.jsonl";
    pub const ARTIFACTS_DIR: &'static str = "artifacts";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn trials_path(&self) -> PathBuf {
        self.dir.join(Self::TRIALS_FILE)
    }

    /// Read back every recorded trial in file order.
    pub async fn load_trials(&self) -> Result<Vec<TrialResult>, RecorderError> {
        let content = match tokio::fs::read_to_string(self.trials_path()).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(RecorderError::from))
            .collect()
    }
}

#[async_trait]
impl RunRecorder for JsonlRecorder {
    async fn record(&self, trial: &TrialResult) -> Result<(), RecorderError> {
        let mut line = serde_json::to_string(trial)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.trials_path())
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn record_artifact(&self, name: &str, blob: &[u8]) -> Result<(), RecorderError> {
        validate_artifact_name(name)?;
        let dir = self.dir.join(Self::ARTIFACTS_DIR);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(name), blob).await?;
        tracing::debug!(artifact = name, bytes = blob.len(), "Wrote artifact");
        Ok(())
    }
}
