//! # cvsweep-core: stratified cross-validation and hyperparameter sweeps
//!
//! Partitions a labeled dataset into stratified folds once per sweep, samples
//! hyperparameter configurations from a search space, scores each one by
//! k-fold cross-validation and hands every trial to a run recorder.
//!
//! The entry point is [`SweepController`]; the pieces it composes are usable
//! on their own:
//! - [`evaluation::partition`] builds deterministic stratified folds
//! - [`CrossValidator`] scores one model over those folds
//! - [`ModelRegistry`] and [`MetricRegistry`] resolve names to models and metrics
//! - [`RunRecorder`] receives trial results and artifacts

pub mod algorithms;
pub mod config;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod training;
pub mod zoo;

pub use config::{SweepConfig, SweepOverrides, load_config};
pub use data::{Dataset, Label};
pub use error::{DatasetError, ModelError, RecorderError, SweepError};
pub use evaluation::{CrossValidator, CvReport, FoldAssignment, MetricRegistry, MetricSet};
pub use training::{
    Budget, JsonlRecorder, MemoryRecorder, Objective, RunRecorder, SearchSpace, SweepController,
    SweepReport, SweepState, TrialResult, TrialStatus,
};
pub use zoo::{ModelFactory, ModelRegistry};
