//! Classical classifiers evaluated natively.
//!
//! Each model is built from a sampled [`Configuration`] and exposes the
//! capability set the evaluator relies on: `fit`, `predict` and, optionally,
//! `predict_proba`.

use crate::data::{Dataset, Label, class_counts};
use crate::error::ModelError;
use crate::evaluation::metrics::ProbabilityMatrix;
use crate::training::sweep::Configuration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A trainable classifier. A fresh instance is built for every fold.
pub trait Classifier: Send {
    fn name(&self) -> &str;

    fn fit(&mut self, data: &Dataset) -> Result<(), ModelError>;

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<Label>, ModelError>;

    /// Classes seen during `fit`, in label order. Empty before fitting.
    fn classes(&self) -> Vec<Label>;

    /// Whether `predict_proba` is implemented.
    fn supports_probabilities(&self) -> bool {
        false
    }

    fn predict_proba(&self, _rows: &[Vec<f64>]) -> Result<ProbabilityMatrix, ModelError> {
        Err(ModelError::Unsupported(format!(
            "{} does not estimate class probabilities",
            self.name()
        )))
    }
}

fn check_width(rows: &[Vec<f64>], expected: usize) -> Result<(), ModelError> {
    match rows.iter().find(|row| row.len() != expected) {
        Some(row) => Err(ModelError::DimensionMismatch {
            expected,
            found: row.len(),
        }),
        None => Ok(()),
    }
}

/// Column index of the largest value; ties go to the earliest column.
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Normalized exponentials, shifted by the max for stability.
fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = scores.iter().map(|v| (v - max).exp()).collect();
    let total: f64 = exp.iter().sum();
    exp.into_iter().map(|v| v / total).collect()
}

/// Solve `a x = b` by Gaussian elimination with partial pivoting.
/// `None` when `a` is numerically singular.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    let scale = a
        .iter()
        .flatten()
        .fold(0.0f64, |m, v| m.max(v.abs()))
        .max(f64::MIN_POSITIVE);
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() <= scale * 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

fn labels_from_proba(proba: &ProbabilityMatrix) -> Vec<Label> {
    proba
        .rows
        .iter()
        .map(|row| proba.classes[argmax(row)].clone())
        .collect()
}

// ---------------------------------------------------------------------------
// k-nearest neighbours
// ---------------------------------------------------------------------------

/// Vote weighting for neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborWeights {
    Uniform,
    Distance,
}

#[derive(Debug, Clone)]
struct Fitted {
    rows: Vec<Vec<f64>>,
    labels: Vec<usize>,
    classes: Vec<Label>,
}

/// k-nearest-neighbour vote under the Minkowski distance of power `p`.
#[derive(Debug, Clone)]
pub struct KNeighborsClassifier {
    pub n_neighbors: usize,
    pub weights: NeighborWeights,
    pub p: f64,
    fitted: Option<Fitted>,
}

impl KNeighborsClassifier {
    pub fn new(n_neighbors: usize, weights: NeighborWeights, p: f64) -> Self {
        Self {
            n_neighbors,
            weights,
            p,
            fitted: None,
        }
    }

    /// Reads `n_neighbors` (default 5), `weights` (`uniform`), `p` (2).
    pub fn from_config(config: &Configuration) -> Result<Self, ModelError> {
        let n_neighbors = config.usize_or("n_neighbors", 5)?;
        if n_neighbors == 0 {
            return Err(ModelError::invalid_parameter("n_neighbors", "must be at least 1"));
        }
        let weights = match config.str_or("weights", "uniform")? {
            "uniform" => NeighborWeights::Uniform,
            "distance" => NeighborWeights::Distance,
            other => {
                return Err(ModelError::invalid_parameter(
                    "weights",
                    format!("expected 'uniform' or 'distance', got '{other}'"),
                ));
            }
        };
        let p = config.f64_or("p", 2.0)?;
        if !(p >= 1.0 && p.is_finite()) {
            return Err(ModelError::invalid_parameter("p", "must be a finite value >= 1"));
        }
        Ok(Self::new(n_neighbors, weights, p))
    }

    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        let diffs = a.iter().zip(b).map(|(x, y)| (x - y).abs());
        if self.p == 1.0 {
            diffs.sum()
        } else if self.p == 2.0 {
            diffs.map(|d| d * d).sum::<f64>().sqrt()
        } else {
            diffs.map(|d| d.powf(self.p)).sum::<f64>().powf(1.0 / self.p)
        }
    }

    fn votes(&self, fitted: &Fitted, row: &[f64]) -> Vec<f64> {
        let mut neighbours: Vec<(f64, usize)> = fitted
            .rows
            .iter()
            .enumerate()
            .map(|(i, train)| (self.distance(row, train), i))
            .collect();
        neighbours.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        neighbours.truncate(self.n_neighbors);

        let mut votes = vec![0.0; fitted.classes.len()];
        let exact = neighbours.iter().any(|(d, _)| *d == 0.0);
        for &(d, i) in &neighbours {
            let weight = match self.weights {
                NeighborWeights::Uniform => 1.0,
                // Exact matches take the whole vote.
                NeighborWeights::Distance if exact => f64::from(u8::from(d == 0.0)),
                NeighborWeights::Distance => 1.0 / d,
            };
            votes[fitted.labels[i]] += weight;
        }
        let total: f64 = votes.iter().sum();
        votes.iter_mut().for_each(|v| *v /= total);
        votes
    }
}

impl Classifier for KNeighborsClassifier {
    fn name(&self) -> &str {
        "knn"
    }

    fn fit(&mut self, data: &Dataset) -> Result<(), ModelError> {
        let classes: Vec<Label> = class_counts(data.labels()).into_keys().collect();
        let index: BTreeMap<&Label, usize> =
            classes.iter().enumerate().map(|(i, c)| (c, i)).collect();
        let labels = data.labels().iter().map(|l| index[l]).collect();
        self.fitted = Some(Fitted {
            rows: data.features().to_vec(),
            labels,
            classes,
        });
        Ok(())
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<Label>, ModelError> {
        Ok(labels_from_proba(&self.predict_proba(rows)?))
    }

    fn classes(&self) -> Vec<Label> {
        self.fitted
            .as_ref()
            .map(|f| f.classes.clone())
            .unwrap_or_default()
    }

    fn supports_probabilities(&self) -> bool {
        true
    }

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<ProbabilityMatrix, ModelError> {
        let fitted = self.fitted.as_ref().ok_or(ModelError::NotFitted)?;
        if self.n_neighbors > fitted.rows.len() {
            return Err(ModelError::invalid_parameter(
                "n_neighbors",
                format!(
                    "{} neighbours requested but only {} training samples",
                    self.n_neighbors,
                    fitted.rows.len()
                ),
            ));
        }
        check_width(rows, fitted.rows[0].len())?;
        Ok(ProbabilityMatrix {
            classes: fitted.classes.clone(),
            rows: rows.iter().map(|row| self.votes(fitted, row)).collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Gaussian naive Bayes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct ClassGaussian {
    label: Label,
    log_prior: f64,
    mean: Vec<f64>,
    var: Vec<f64>,
}

/// Gaussian naive Bayes with variance smoothing.
#[derive(Debug, Clone)]
pub struct GaussianNb {
    /// Fraction of the largest feature variance added to every variance.
    pub var_smoothing: f64,
    classes: Vec<ClassGaussian>,
}

impl GaussianNb {
    pub fn new(var_smoothing: f64) -> Self {
        Self {
            var_smoothing,
            classes: Vec::new(),
        }
    }

    pub fn from_config(config: &Configuration) -> Result<Self, ModelError> {
        let var_smoothing = config.f64_or("var_smoothing", 1e-9)?;
        if !(var_smoothing >= 0.0 && var_smoothing.is_finite()) {
            return Err(ModelError::invalid_parameter(
                "var_smoothing",
                "must be a finite, non-negative number",
            ));
        }
        Ok(Self::new(var_smoothing))
    }

    fn joint_log_likelihood(&self, row: &[f64]) -> Vec<f64> {
        self.classes
            .iter()
            .map(|c| {
                let mut ll = c.log_prior;
                for ((x, mean), var) in row.iter().zip(&c.mean).zip(&c.var) {
                    ll -= 0.5 * (2.0 * std::f64::consts::PI * var).ln();
                    ll -= 0.5 * (x - mean).powi(2) / var;
                }
                ll
            })
            .collect()
    }
}

fn mean_and_var(rows: &[&Vec<f64>], n_features: usize) -> (Vec<f64>, Vec<f64>) {
    let n = rows.len() as f64;
    let mut mean = vec![0.0; n_features];
    for row in rows {
        for (m, x) in mean.iter_mut().zip(row.iter()) {
            *m += x / n;
        }
    }
    let mut var = vec![0.0; n_features];
    for row in rows {
        for ((v, x), m) in var.iter_mut().zip(row.iter()).zip(&mean) {
            *v += (x - m).powi(2) / n;
        }
    }
    (mean, var)
}

impl Classifier for GaussianNb {
    fn name(&self) -> &str {
        "gaussian_nb"
    }

    fn fit(&mut self, data: &Dataset) -> Result<(), ModelError> {
        let all: Vec<&Vec<f64>> = data.features().iter().collect();
        let (_, total_var) = mean_and_var(&all, data.n_features());
        let epsilon = self.var_smoothing * total_var.iter().copied().fold(0.0, f64::max);

        let n = data.n_samples() as f64;
        let mut classes = Vec::new();
        for (label, count) in data.class_counts() {
            let rows: Vec<&Vec<f64>> = data
                .features()
                .iter()
                .zip(data.labels())
                .filter(|(_, l)| **l == label)
                .map(|(row, _)| row)
                .collect();
            let (mean, mut var) = mean_and_var(&rows, data.n_features());
            var.iter_mut().for_each(|v| *v += epsilon);
            if var.iter().any(|v| *v <= 0.0) {
                return Err(ModelError::Numerical(format!(
                    "zero variance feature in class '{label}'; raise var_smoothing"
                )));
            }
            classes.push(ClassGaussian {
                label,
                log_prior: (count as f64 / n).ln(),
                mean,
                var,
            });
        }
        self.classes = classes;
        Ok(())
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<Label>, ModelError> {
        Ok(labels_from_proba(&self.predict_proba(rows)?))
    }

    fn classes(&self) -> Vec<Label> {
        self.classes.iter().map(|c| c.label.clone()).collect()
    }

    fn supports_probabilities(&self) -> bool {
        true
    }

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<ProbabilityMatrix, ModelError> {
        let first = self.classes.first().ok_or(ModelError::NotFitted)?;
        check_width(rows, first.mean.len())?;
        let proba = rows
            .iter()
            .map(|row| softmax(&self.joint_log_likelihood(row)))
            .collect();
        Ok(ProbabilityMatrix {
            classes: Classifier::classes(self),
            rows: proba,
        })
    }
}

// ---------------------------------------------------------------------------
// Logistic regression (one-vs-rest)
// ---------------------------------------------------------------------------

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^z)` without overflow.
fn softplus(z: f64) -> f64 {
    z.max(0.0) + (-z.abs()).exp().ln_1p()
}

/// Weights of one binary problem; the intercept is the last entry.
#[derive(Debug, Clone)]
struct BinaryLogit {
    weights: Vec<f64>,
}

impl BinaryLogit {
    fn decision(&self, row: &[f64]) -> f64 {
        let (intercept, coef) = self.weights.split_last().map_or((0.0, &[][..]), |(b, w)| (*b, w));
        coef.iter().zip(row).map(|(w, x)| w * x).sum::<f64>() + intercept
    }
}

/// L2-regularized logistic regression, one binary model per class.
///
/// Two-class problems fit a single model for the second class in label order.
/// Fitting runs damped Newton steps; the intercept is not penalized.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    /// Inverse regularization strength.
    pub c: f64,
    pub max_iter: usize,
    pub tol: f64,
    classes: Vec<Label>,
    models: Vec<BinaryLogit>,
}

impl LogisticRegression {
    pub fn new(c: f64, max_iter: usize, tol: f64) -> Self {
        Self {
            c,
            max_iter,
            tol,
            classes: Vec::new(),
            models: Vec::new(),
        }
    }

    /// Reads `C` (default 1.0), `max_iter` (100) and `tol` (1e-4).
    pub fn from_config(config: &Configuration) -> Result<Self, ModelError> {
        let c = config.f64_or("C", 1.0)?;
        if !(c > 0.0 && c.is_finite()) {
            return Err(ModelError::invalid_parameter("C", "must be a finite value > 0"));
        }
        let max_iter = config.usize_or("max_iter", 100)?;
        if max_iter == 0 {
            return Err(ModelError::invalid_parameter("max_iter", "must be at least 1"));
        }
        let tol = config.f64_or("tol", 1e-4)?;
        if !(tol > 0.0 && tol.is_finite()) {
            return Err(ModelError::invalid_parameter("tol", "must be a finite value > 0"));
        }
        Ok(Self::new(c, max_iter, tol))
    }

    fn loss(&self, rows: &[Vec<f64>], targets: &[bool], model: &BinaryLogit) -> f64 {
        let penalty = 0.5 / self.c
            * model.weights[..model.weights.len() - 1]
                .iter()
                .map(|w| w * w)
                .sum::<f64>();
        rows.iter()
            .zip(targets)
            .map(|(row, &y)| {
                let z = model.decision(row);
                if y { softplus(-z) } else { softplus(z) }
            })
            .sum::<f64>()
            + penalty
    }

    fn fit_binary(&self, rows: &[Vec<f64>], targets: &[bool]) -> Result<BinaryLogit, ModelError> {
        let n_features = rows.first().map_or(0, Vec::len);
        let dim = n_features + 1;
        let lambda = 1.0 / self.c;
        let mut model = BinaryLogit {
            weights: vec![0.0; dim],
        };
        let mut current = self.loss(rows, targets, &model);

        for _ in 0..self.max_iter {
            let mut gradient = vec![0.0; dim];
            let mut hessian = vec![vec![0.0; dim]; dim];
            for (row, &y) in rows.iter().zip(targets) {
                let p = sigmoid(model.decision(row));
                let residual = p - f64::from(u8::from(y));
                let curvature = p * (1.0 - p);
                let x = |i: usize| if i < n_features { row[i] } else { 1.0 };
                for i in 0..dim {
                    gradient[i] += residual * x(i);
                    for j in 0..=i {
                        hessian[i][j] += curvature * x(i) * x(j);
                    }
                }
            }
            for i in 0..dim {
                for j in 0..i {
                    let mirrored = hessian[i][j];
                    hessian[j][i] = mirrored;
                }
                if i < n_features {
                    gradient[i] += lambda * model.weights[i];
                    hessian[i][i] += lambda;
                } else {
                    hessian[i][i] += 1e-8;
                }
            }

            let step = solve(hessian, gradient).ok_or_else(|| {
                ModelError::Numerical("singular Hessian in logistic regression".into())
            })?;

            // Halve the step until the penalized loss stops increasing.
            let mut scale = 1.0;
            let mut accepted = None;
            for _ in 0..30 {
                let candidate = BinaryLogit {
                    weights: model
                        .weights
                        .iter()
                        .zip(&step)
                        .map(|(w, d)| w - scale * d)
                        .collect(),
                };
                let loss = self.loss(rows, targets, &candidate);
                if loss <= current {
                    accepted = Some((candidate, loss));
                    break;
                }
                scale *= 0.5;
            }
            let Some((next, loss)) = accepted else {
                break;
            };
            let moved = step.iter().fold(0.0f64, |m, d| m.max((scale * d).abs()));
            model = next;
            current = loss;
            if moved < self.tol {
                break;
            }
        }
        if model.weights.iter().any(|w| !w.is_finite()) {
            return Err(ModelError::Numerical(
                "logistic regression diverged; lower C".into(),
            ));
        }
        Ok(model)
    }
}

impl Classifier for LogisticRegression {
    fn name(&self) -> &str {
        "logistic_regression"
    }

    fn fit(&mut self, data: &Dataset) -> Result<(), ModelError> {
        let classes: Vec<Label> = data.class_counts().into_keys().collect();
        let positives: &[Label] = match classes.len() {
            0 => return Err(ModelError::EmptyTrainingSet),
            1 | 2 => &classes[classes.len() - 1..],
            _ => &classes,
        };
        let models = positives
            .iter()
            .map(|positive| {
                let targets: Vec<bool> = data.labels().iter().map(|l| l == positive).collect();
                self.fit_binary(data.features(), &targets)
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.classes = classes;
        self.models = models;
        Ok(())
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<Label>, ModelError> {
        Ok(labels_from_proba(&self.predict_proba(rows)?))
    }

    fn classes(&self) -> Vec<Label> {
        self.classes.clone()
    }

    fn supports_probabilities(&self) -> bool {
        true
    }

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<ProbabilityMatrix, ModelError> {
        let first = self.models.first().ok_or(ModelError::NotFitted)?;
        check_width(rows, first.weights.len() - 1)?;
        let proba = rows
            .iter()
            .map(|row| {
                let scores: Vec<f64> =
                    self.models.iter().map(|m| sigmoid(m.decision(row))).collect();
                match (self.classes.len(), scores.as_slice()) {
                    (1, _) => vec![1.0],
                    (2, [p]) => vec![1.0 - p, *p],
                    _ => {
                        let total: f64 = scores.iter().sum();
                        if total > 0.0 {
                            scores.iter().map(|s| s / total).collect()
                        } else {
                            vec![1.0 / scores.len() as f64; scores.len()]
                        }
                    }
                }
            })
            .collect();
        Ok(ProbabilityMatrix {
            classes: self.classes.clone(),
            rows: proba,
        })
    }
}

// ---------------------------------------------------------------------------
// Linear discriminant analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Discriminant {
    label: Label,
    coef: Vec<f64>,
    intercept: f64,
}

/// Gaussian class model with one covariance shared by every class.
#[derive(Debug, Clone)]
pub struct LinearDiscriminant {
    /// Blend of the pooled covariance toward a scaled identity, in `[0, 1]`.
    pub shrinkage: f64,
    discriminants: Vec<Discriminant>,
}

impl LinearDiscriminant {
    pub fn new(shrinkage: f64) -> Self {
        Self {
            shrinkage,
            discriminants: Vec::new(),
        }
    }

    /// Reads `shrinkage` (default 0).
    pub fn from_config(config: &Configuration) -> Result<Self, ModelError> {
        let shrinkage = config.f64_or("shrinkage", 0.0)?;
        if !(0.0..=1.0).contains(&shrinkage) {
            return Err(ModelError::invalid_parameter("shrinkage", "must lie in [0, 1]"));
        }
        Ok(Self::new(shrinkage))
    }

    fn scores(&self, row: &[f64]) -> Vec<f64> {
        self.discriminants
            .iter()
            .map(|d| d.coef.iter().zip(row).map(|(c, x)| c * x).sum::<f64>() + d.intercept)
            .collect()
    }
}

impl Classifier for LinearDiscriminant {
    fn name(&self) -> &str {
        "lda"
    }

    fn fit(&mut self, data: &Dataset) -> Result<(), ModelError> {
        let d = data.n_features();
        let n = data.n_samples();
        let counts = data.class_counts();
        if n <= counts.len() {
            return Err(ModelError::Fit(format!(
                "{n} samples cannot estimate a covariance shared by {} classes",
                counts.len()
            )));
        }

        let mut means = Vec::with_capacity(counts.len());
        let mut covariance = vec![vec![0.0; d]; d];
        for label in counts.keys() {
            let rows: Vec<&Vec<f64>> = data
                .features()
                .iter()
                .zip(data.labels())
                .filter(|(_, l)| *l == label)
                .map(|(row, _)| row)
                .collect();
            let (mean, _) = mean_and_var(&rows, d);
            for row in rows {
                for i in 0..d {
                    for j in 0..d {
                        covariance[i][j] += (row[i] - mean[i]) * (row[j] - mean[j]);
                    }
                }
            }
            means.push(mean);
        }
        let dof = (n - counts.len()) as f64;
        covariance.iter_mut().flatten().for_each(|v| *v /= dof);
        if self.shrinkage > 0.0 {
            let average_var = (0..d).map(|i| covariance[i][i]).sum::<f64>() / d.max(1) as f64;
            for (i, row) in covariance.iter_mut().enumerate() {
                for (j, v) in row.iter_mut().enumerate() {
                    let target = if i == j { average_var } else { 0.0 };
                    *v = (1.0 - self.shrinkage) * *v + self.shrinkage * target;
                }
            }
        }

        let mut discriminants = Vec::with_capacity(means.len());
        for ((label, count), mean) in counts.into_iter().zip(means) {
            let coef = solve(covariance.clone(), mean.clone()).ok_or_else(|| {
                ModelError::Numerical(
                    "shared covariance is singular; raise shrinkage".into(),
                )
            })?;
            let quadratic: f64 = coef.iter().zip(&mean).map(|(c, m)| c * m).sum();
            discriminants.push(Discriminant {
                label,
                intercept: -0.5 * quadratic + (count as f64 / n as f64).ln(),
                coef,
            });
        }
        self.discriminants = discriminants;
        Ok(())
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<Label>, ModelError> {
        Ok(labels_from_proba(&self.predict_proba(rows)?))
    }

    fn classes(&self) -> Vec<Label> {
        self.discriminants.iter().map(|d| d.label.clone()).collect()
    }

    fn supports_probabilities(&self) -> bool {
        true
    }

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<ProbabilityMatrix, ModelError> {
        let first = self.discriminants.first().ok_or(ModelError::NotFitted)?;
        check_width(rows, first.coef.len())?;
        Ok(ProbabilityMatrix {
            classes: self.classes(),
            rows: rows.iter().map(|row| softmax(&self.scores(row))).collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Nearest centroid
// ---------------------------------------------------------------------------

/// Assigns each sample to the class with the closest (Euclidean) mean.
#[derive(Debug, Clone, Default)]
pub struct NearestCentroid {
    centroids: Vec<(Label, Vec<f64>)>,
}

impl Classifier for NearestCentroid {
    fn name(&self) -> &str {
        "nearest_centroid"
    }

    fn fit(&mut self, data: &Dataset) -> Result<(), ModelError> {
        self.centroids = data
            .class_counts()
            .into_keys()
            .map(|label| {
                let rows: Vec<&Vec<f64>> = data
                    .features()
                    .iter()
                    .zip(data.labels())
                    .filter(|(_, l)| **l == label)
                    .map(|(row, _)| row)
                    .collect();
                let (mean, _) = mean_and_var(&rows, data.n_features());
                (label, mean)
            })
            .collect();
        Ok(())
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<Label>, ModelError> {
        let (_, first) = self.centroids.first().ok_or(ModelError::NotFitted)?;
        check_width(rows, first.len())?;
        Ok(rows
            .iter()
            .map(|row| {
                let distances: Vec<f64> = self
                    .centroids
                    .iter()
                    .map(|(_, c)| -c.iter().zip(row).map(|(a, b)| (a - b).powi(2)).sum::<f64>())
                    .collect();
                self.centroids[argmax(&distances)].0.clone()
            })
            .collect())
    }

    fn classes(&self) -> Vec<Label> {
        self.centroids.iter().map(|(l, _)| l.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// Majority class
// ---------------------------------------------------------------------------

/// Baseline that always predicts the most frequent training class.
#[derive(Debug, Clone, Default)]
pub struct MajorityClass {
    priors: Vec<(Label, f64)>,
}

impl Classifier for MajorityClass {
    fn name(&self) -> &str {
        "majority"
    }

    fn fit(&mut self, data: &Dataset) -> Result<(), ModelError> {
        let n = data.n_samples() as f64;
        self.priors = data
            .class_counts()
            .into_iter()
            .map(|(label, count)| (label, count as f64 / n))
            .collect();
        Ok(())
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<Label>, ModelError> {
        Ok(labels_from_proba(&self.predict_proba(rows)?))
    }

    fn classes(&self) -> Vec<Label> {
        self.priors.iter().map(|(l, _)| l.clone()).collect()
    }

    fn supports_probabilities(&self) -> bool {
        true
    }

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<ProbabilityMatrix, ModelError> {
        if self.priors.is_empty() {
            return Err(ModelError::NotFitted);
        }
        let row: Vec<f64> = self.priors.iter().map(|(_, p)| *p).collect();
        Ok(ProbabilityMatrix {
            classes: self.classes(),
            rows: vec![row; rows.len()],
        })
    }
}
