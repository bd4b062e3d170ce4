//! Sweep infrastructure: search spaces, trial results, recorders and the controller.

pub mod experiment;
pub mod recorder;
pub mod reproducibility;
pub mod runner;
pub mod sweep;

pub use experiment::{Goal, Objective, SweepReport, TrialResult, TrialStatus};
pub use recorder::{JsonlRecorder, MemoryRecorder, RetryPolicy, RunRecorder, record_with_retry};
pub use reproducibility::{RngStream, SeedManager};
pub use runner::{SweepController, SweepState};
pub use sweep::{Budget, ConfigSampler, Configuration, Domain, ParamValue, SearchSpace};
