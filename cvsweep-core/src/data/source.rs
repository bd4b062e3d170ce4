//! Dataset loaders used by the CLI glue.
//!
//! The evaluation core only ever sees a [`Dataset`]; these sources turn files on
//! disk into one.

use crate::data::dataset::{Dataset, Label};
use crate::error::DatasetError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Information about a loaded source for run provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceInfo {
    pub source_type: String,
    pub location: String,
    pub accessed_at: chrono::DateTime<chrono::Utc>,
    pub row_count: Option<usize>,
}

/// Trait for loading a labeled dataset.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn load(&self) -> Result<Dataset, DatasetError>;

    fn source_info(&self) -> DataSourceInfo;
}

/// Pick a source from the file extension: `.csv` or anything else as JSON.
pub fn source_for_path(path: &Path) -> Box<dyn DataSource> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => Box::new(CsvSource {
            path: path.to_path_buf(),
            delimiter: ',',
        }),
        _ => Box::new(JsonSource {
            path: path.to_path_buf(),
        }),
    }
}

// ---------------------------------------------------------------------------
// JsonSource
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct JsonDataset {
    features: Vec<Vec<f64>>,
    labels: Vec<Label>,
    #[serde(default)]
    feature_names: Option<Vec<String>>,
    #[serde(default)]
    target_names: Option<Vec<String>>,
}

/// JSON document `{"features": [[..]], "labels": [..]}`.
///
/// Optional `feature_names`; optional `target_names` maps integer labels to
/// names (`0 -> target_names[0]`).
pub struct JsonSource {
    pub path: PathBuf,
}

impl JsonSource {
    pub fn parse(content: &str) -> Result<Dataset, DatasetError> {
        let raw: JsonDataset = serde_json::from_str(content)?;
        let labels = match &raw.target_names {
            Some(names) => raw
                .labels
                .into_iter()
                .map(|label| match label {
                    Label::Int(i) => usize::try_from(i)
                        .ok()
                        .and_then(|i| names.get(i))
                        .map(|name| Label::Text(name.clone()))
                        .unwrap_or(Label::Int(i)),
                    other => other,
                })
                .collect(),
            None => raw.labels,
        };
        let dataset = Dataset::new(raw.features, labels)?;
        Ok(match raw.feature_names {
            Some(names) => dataset.with_feature_names(names),
            None => dataset,
        })
    }
}

#[async_trait]
impl DataSource for JsonSource {
    async fn load(&self) -> Result<Dataset, DatasetError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        Self::parse(&content)
    }

    fn source_info(&self) -> DataSourceInfo {
        DataSourceInfo {
            source_type: "json".to_string(),
            location: self.path.display().to_string(),
            accessed_at: chrono::Utc::now(),
            row_count: None,
        }
    }
}

// ---------------------------------------------------------------------------
// CsvSource
// ---------------------------------------------------------------------------

/// CSV file with a header row; the last column is the label, the rest are numeric features.
pub struct CsvSource {
    pub path: PathBuf,
    pub delimiter: char,
}

impl CsvSource {
    pub fn parse(content: &str, delimiter: char) -> Result<Dataset, DatasetError> {
        let mut lines = content.lines().filter(|l| !l.trim().is_empty());
        let header: Vec<String> = lines
            .next()
            .ok_or(DatasetError::Empty)?
            .split(delimiter)
            .map(|s| s.trim().trim_matches('"').to_string())
            .collect();
        let n_features = header.len().saturating_sub(1);

        let mut features = Vec::new();
        let mut labels = Vec::new();
        for (row, line) in lines.enumerate() {
            let cells: Vec<&str> = line
                .split(delimiter)
                .map(|s| s.trim().trim_matches('"'))
                .collect();
            let Some((label, values)) = cells.split_last() else {
                continue;
            };
            let mut parsed = Vec::with_capacity(values.len());
            for (column, cell) in values.iter().enumerate() {
                let value = cell
                    .parse::<f64>()
                    .map_err(|_| DatasetError::InvalidCell {
                        row,
                        column,
                        value: cell.to_string(),
                    })?;
                parsed.push(value);
            }
            features.push(parsed);
            labels.push(match label.parse::<i64>() {
                Ok(i) => Label::Int(i),
                Err(_) => Label::Text(label.to_string()),
            });
        }

        let dataset = Dataset::new(features, labels)?;
        Ok(dataset.with_feature_names(header.into_iter().take(n_features).collect()))
    }
}

#[async_trait]
impl DataSource for CsvSource {
    async fn load(&self) -> Result<Dataset, DatasetError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        Self::parse(&content, self.delimiter)
    }

    fn source_info(&self) -> DataSourceInfo {
        DataSourceInfo {
            source_type: "csv".to_string(),
            location: self.path.display().to_string(),
            accessed_at: chrono::Utc::now(),
            row_count: None,
        }
    }
}
