//! In-memory labeled tabular dataset.

use crate::error::DatasetError;
use crate::training::reproducibility::{RngStream, SeedManager};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A categorical class label.
///
/// Integer and string targets are both accepted so that `0` and `"setosa"`
/// load from JSON without a conversion step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Int(i64),
    Text(String),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Label {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Label {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Per-class sample count and share of the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassShare {
    pub label: Label,
    pub count: usize,
    pub proportion: f64,
}

/// Immutable feature matrix plus label vector.
///
/// Every row has the same width and there is exactly one label per row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    features: Vec<Vec<f64>>,
    labels: Vec<Label>,
    n_features: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    feature_names: Option<Vec<String>>,
}

impl Dataset {
    pub fn new(features: Vec<Vec<f64>>, labels: Vec<Label>) -> Result<Self, DatasetError> {
        if features.len() != labels.len() {
            return Err(DatasetError::LengthMismatch {
                features: features.len(),
                labels: labels.len(),
            });
        }
        let Some(first) = features.first() else {
            return Err(DatasetError::Empty);
        };
        let n_features = first.len();
        for (row, values) in features.iter().enumerate() {
            if values.len() != n_features {
                return Err(DatasetError::RaggedRow {
                    row,
                    expected: n_features,
                    found: values.len(),
                });
            }
            if let Some(column) = values.iter().position(|v| !v.is_finite()) {
                return Err(DatasetError::NonFinite { row, column });
            }
        }
        Ok(Self {
            features,
            labels,
            n_features,
            feature_names: None,
        })
    }

    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        if names.len() == self.n_features {
            self.feature_names = Some(names);
        } else {
            tracing::warn!(
                expected = self.n_features,
                found = names.len(),
                "Ignoring feature names with wrong arity"
            );
        }
        self
    }

    pub fn n_samples(&self) -> usize {
        self.labels.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    /// Sample counts per class, ordered by label.
    pub fn class_counts(&self) -> BTreeMap<Label, usize> {
        class_counts(&self.labels)
    }

    /// Class shares in label order.
    pub fn class_distribution(&self) -> Vec<ClassShare> {
        let n = self.n_samples() as f64;
        self.class_counts()
            .into_iter()
            .map(|(label, count)| ClassShare {
                label,
                count,
                proportion: count as f64 / n,
            })
            .collect()
    }

    /// Owned subset of the given rows, in the given order.
    pub fn select(&self, indices: &[usize]) -> Result<Self, DatasetError> {
        let len = self.n_samples();
        let mut features = Vec::with_capacity(indices.len());
        let mut labels = Vec::with_capacity(indices.len());
        for &index in indices {
            if index >= len {
                return Err(DatasetError::IndexOutOfRange { index, len });
            }
            features.push(self.features[index].clone());
            labels.push(self.labels[index].clone());
        }
        if labels.is_empty() {
            return Err(DatasetError::Empty);
        }
        Ok(Self {
            features,
            labels,
            n_features: self.n_features,
            feature_names: self.feature_names.clone(),
        })
    }

    /// Shuffled train/test split, `(train, test)`.
    ///
    /// The test part holds `ceil(test_fraction * n)` samples. Both parts keep the
    /// original row order.
    pub fn train_test_split(
        &self,
        test_fraction: f64,
        seed: u64,
    ) -> Result<(Self, Self), DatasetError> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(DatasetError::InvalidFraction(test_fraction));
        }
        let n = self.n_samples();
        let n_test = (test_fraction * n as f64).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return Err(DatasetError::InvalidFraction(test_fraction));
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut SeedManager::new(seed).rng(RngStream::Holdout));
        let (test, train) = order.split_at_mut(n_test);
        test.sort_unstable();
        train.sort_unstable();

        Ok((self.select(train)?, self.select(test)?))
    }
}

/// Sample counts per class, ordered by label.
pub fn class_counts(labels: &[Label]) -> BTreeMap<Label, usize> {
    let mut counts = BTreeMap::new();
    for label in labels {
        *counts.entry(label.clone()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tiny() -> Dataset {
        Dataset::new(
            vec![vec![0.0, 1.0], vec![1.0, 1.0], vec![2.0, 0.0], vec![3.0, 0.5]],
            vec![0.into(), 0.into(), 1.into(), 0.into()],
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_length_mismatch() {
        let err = Dataset::new(vec![vec![1.0]], vec![]).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::LengthMismatch {
                features: 1,
                labels: 0
            }
        ));
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let err = Dataset::new(vec![vec![1.0, 2.0], vec![1.0]], vec![0.into(), 1.into()])
            .unwrap_err();
        assert!(matches!(err, DatasetError::RaggedRow { row: 1, .. }));
    }

    #[test]
    fn test_rejects_empty_and_nan() {
        assert!(matches!(
            Dataset::new(vec![], vec![]).unwrap_err(),
            DatasetError::Empty
        ));
        assert!(matches!(
            Dataset::new(vec![vec![f64::NAN]], vec![0.into()]).unwrap_err(),
            DatasetError::NonFinite { row: 0, column: 0 }
        ));
    }

    #[test]
    fn test_class_distribution() {
        let dist = tiny().class_distribution();
        assert_eq!(dist.len(), 2);
        assert_eq!(dist[0].label, Label::Int(0));
        assert_eq!(dist[0].count, 3);
        assert!((dist[0].proportion - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_select_and_bounds() {
        let data = tiny();
        let subset = data.select(&[3, 0]).unwrap();
        assert_eq!(subset.features()[0], vec![3.0, 0.5]);
        assert_eq!(subset.labels(), &[Label::Int(0), Label::Int(0)]);
        assert!(matches!(
            data.select(&[9]).unwrap_err(),
            DatasetError::IndexOutOfRange { index: 9, len: 4 }
        ));
    }

    #[test]
    fn test_train_test_split_is_deterministic_and_disjoint() {
        let features: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let labels: Vec<Label> = (0..10).map(|i| Label::Int(i % 2)).collect();
        let data = Dataset::new(features, labels).unwrap();

        let (train, test) = data.train_test_split(0.2, 1).unwrap();
        let (train2, test2) = data.train_test_split(0.2, 1).unwrap();
        assert_eq!(train, train2);
        assert_eq!(test, test2);
        assert_eq!(test.n_samples(), 2);
        assert_eq!(train.n_samples(), 8);

        let mut all: Vec<i64> = train
            .features()
            .iter()
            .chain(test.features())
            .map(|row| row[0] as i64)
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_train_test_split_rejects_bad_fraction() {
        assert!(matches!(
            tiny().train_test_split(1.0, 0).unwrap_err(),
            DatasetError::InvalidFraction(_)
        ));
    }

    #[test]
    fn test_label_json_accepts_ints_and_strings() {
        let labels: Vec<Label> = serde_json::from_str(r#"[0, "setosa"]"#).unwrap();
        assert_eq!(labels, vec![Label::Int(0), Label::Text("setosa".into())]);
        assert_eq!(labels[1].to_string(), "setosa");
    }
}
