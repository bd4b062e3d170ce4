//! Labeled tabular data: the immutable dataset view and its loaders.

pub mod dataset;
pub mod source;

pub use dataset::{ClassShare, Dataset, Label, class_counts};
pub use source::{CsvSource, DataSource, DataSourceInfo, JsonSource, source_for_path};
