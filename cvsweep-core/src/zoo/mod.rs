//! Model zoo: named constructors the sweep resolves model identifiers against.

pub mod registry;

pub use registry::{ModelConstructor, ModelFactory, ModelRegistry};
