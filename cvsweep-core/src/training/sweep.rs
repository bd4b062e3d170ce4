//! Hyperparameter search spaces and configuration sampling.
//!
//! A [`SearchSpace`] maps parameter names to [`Domain`]s. The sampler either
//! draws `N` random configurations or enumerates the full grid of discrete
//! domains. Parameters are kept in name order so that the grid order and the
//! sequence of random draws depend only on the space and the seed.

use crate::error::{ModelError, SweepError};
use rand::Rng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A concrete hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Parse a command-line literal: `true`, `3`, `0.5`, anything else is text.
    pub fn parse_literal(raw: &str) -> Self {
        if let Ok(b) = raw.parse::<bool>() {
            Self::Bool(b)
        } else if let Ok(i) = raw.parse::<i64>() {
            Self::Int(i)
        } else if let Ok(f) = raw.parse::<f64>() {
            Self::Float(f)
        } else {
            Self::Text(raw.to_string())
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// One sampled parameter assignment. Never mutated once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration(BTreeMap<String, ParamValue>);

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Positive integer parameter, `default` when absent.
    pub fn usize_or(&self, name: &str, default: usize) -> Result<usize, ModelError> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => value
                .as_i64()
                .and_then(|v| usize::try_from(v).ok())
                .ok_or_else(|| {
                    ModelError::invalid_parameter(
                        name,
                        format!("expected a non-negative integer, got {value}"),
                    )
                }),
        }
    }

    /// Numeric parameter, `default` when absent.
    pub fn f64_or(&self, name: &str, default: f64) -> Result<f64, ModelError> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => value.as_f64().ok_or_else(|| {
                ModelError::invalid_parameter(name, format!("expected a number, got {value}"))
            }),
        }
    }

    /// String parameter, `default` when absent.
    pub fn str_or<'a>(&'a self, name: &str, default: &'a str) -> Result<&'a str, ModelError> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => value.as_str().ok_or_else(|| {
                ModelError::invalid_parameter(name, format!("expected a string, got {value}"))
            }),
        }
    }
}

impl FromIterator<(String, ParamValue)> for Configuration {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Sampling domain of a single parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DomainSpec", into = "DomainSpec")]
pub enum Domain {
    /// Continuous, uniform in `[min, max]`.
    Uniform { min: f64, max: f64 },
    /// Continuous, uniform in log space within `[min, max]`, both positive.
    LogUniform { min: f64, max: f64 },
    /// Ordered integers `min..=max`.
    IntUniform { min: i64, max: i64 },
    /// Enumerated values.
    Categorical { values: Vec<ParamValue> },
}

impl Domain {
    pub fn is_continuous(&self) -> bool {
        matches!(self, Self::Uniform { .. } | Self::LogUniform { .. })
    }

    fn validate(&self, name: &str) -> Result<(), SweepError> {
        let fail = |reason: &str| {
            Err(SweepError::invalid_search_space(format!("parameter '{name}': {reason}")))
        };
        match self {
            Self::Uniform { min, max } => {
                if !min.is_finite() || !max.is_finite() {
                    return fail("bounds must be finite");
                }
                if min > max {
                    return fail("min exceeds max");
                }
                if !(max - min).is_finite() {
                    return fail("range width overflows f64");
                }
            }
            Self::LogUniform { min, max } => {
                if !(min.is_finite() && max.is_finite() && *min > 0.0) {
                    return fail("log_uniform bounds must be finite and positive");
                }
                if min > max {
                    return fail("min exceeds max");
                }
            }
            Self::IntUniform { min, max } => {
                if min > max {
                    return fail("min exceeds max");
                }
            }
            Self::Categorical { values } => {
                if values.is_empty() {
                    return fail("no values to choose from");
                }
            }
        }
        Ok(())
    }

    /// Draw one value.
    pub fn sample(&self, rng: &mut ChaCha8Rng) -> ParamValue {
        match self {
            Self::Uniform { min, max } => ParamValue::Float(rng.gen_range(*min..=*max)),
            Self::LogUniform { min, max } => {
                let v = rng.gen_range(min.ln()..=max.ln()).exp();
                ParamValue::Float(v.clamp(*min, *max))
            }
            Self::IntUniform { min, max } => ParamValue::Int(rng.gen_range(*min..=*max)),
            Self::Categorical { values } => values
                .choose(rng)
                .cloned()
                .unwrap_or(ParamValue::Bool(false)),
        }
    }

    /// The `index`-th value of a discrete domain, in declaration order.
    fn value_at(&self, index: usize) -> Option<ParamValue> {
        match self {
            Self::IntUniform { min, max } => u64::try_from(index)
                .ok()
                .and_then(|offset| min.checked_add_unsigned(offset))
                .filter(|v| v <= max)
                .map(ParamValue::Int),
            Self::Categorical { values } => values.get(index).cloned(),
            Self::Uniform { .. } | Self::LogUniform { .. } => None,
        }
    }

    fn cardinality(&self) -> Option<usize> {
        match self {
            Self::IntUniform { min, max } => usize::try_from(max.abs_diff(*min))
                .ok()
                .and_then(|n| n.checked_add(1)),
            Self::Categorical { values } => Some(values.len()),
            Self::Uniform { .. } | Self::LogUniform { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Distribution {
    Uniform,
    LogUniform,
    IntUniform,
    Categorical,
}

/// Serialized shape of a domain: `{values: [..]}`, `{min, max}` and an optional
/// `distribution`. Two integer bounds without a distribution mean an integer range.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DomainSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    distribution: Option<Distribution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    values: Option<Vec<ParamValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min: Option<ParamValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max: Option<ParamValue>,
}

impl TryFrom<DomainSpec> for Domain {
    type Error = String;

    fn try_from(spec: DomainSpec) -> Result<Self, Self::Error> {
        let distribution = match (spec.distribution, &spec.values, &spec.min, &spec.max) {
            (Some(d), ..) => d,
            (None, Some(_), _, _) => Distribution::Categorical,
            (None, None, Some(ParamValue::Int(_)), Some(ParamValue::Int(_))) => {
                Distribution::IntUniform
            }
            (None, None, Some(_), Some(_)) => Distribution::Uniform,
            _ => return Err("domain needs either `values` or both `min` and `max`".into()),
        };

        let float_bound = |bound: &Option<ParamValue>, which: &str| {
            bound
                .as_ref()
                .and_then(ParamValue::as_f64)
                .ok_or_else(|| format!("numeric `{which}` required"))
        };
        let int_bound = |bound: &Option<ParamValue>, which: &str| {
            bound
                .as_ref()
                .and_then(ParamValue::as_i64)
                .ok_or_else(|| format!("integer `{which}` required"))
        };

        Ok(match distribution {
            Distribution::Categorical => Self::Categorical {
                values: spec.values.ok_or("categorical domain needs `values`")?,
            },
            Distribution::IntUniform => Self::IntUniform {
                min: int_bound(&spec.min, "min")?,
                max: int_bound(&spec.max, "max")?,
            },
            Distribution::Uniform => Self::Uniform {
                min: float_bound(&spec.min, "min")?,
                max: float_bound(&spec.max, "max")?,
            },
            Distribution::LogUniform => Self::LogUniform {
                min: float_bound(&spec.min, "min")?,
                max: float_bound(&spec.max, "max")?,
            },
        })
    }
}

impl From<Domain> for DomainSpec {
    fn from(domain: Domain) -> Self {
        let bounds = |distribution, min, max| DomainSpec {
            distribution: Some(distribution),
            values: None,
            min: Some(min),
            max: Some(max),
        };
        match domain {
            Domain::Uniform { min, max } => bounds(Distribution::Uniform, min.into(), max.into()),
            Domain::LogUniform { min, max } => {
                bounds(Distribution::LogUniform, min.into(), max.into())
            }
            Domain::IntUniform { min, max } => {
                bounds(Distribution::IntUniform, min.into(), max.into())
            }
            Domain::Categorical { values } => DomainSpec {
                distribution: None,
                values: Some(values),
                min: None,
                max: None,
            },
        }
    }
}

/// Parameter name → domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchSpace(BTreeMap<String, Domain>);

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, domain: Domain) -> Self {
        self.0.insert(name.into(), domain);
        self
    }

    pub fn categorical<V: Into<ParamValue>>(
        self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.with(name, Domain::Categorical { values })
    }

    pub fn get(&self, name: &str) -> Option<&Domain> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Domain)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn validate(&self) -> Result<(), SweepError> {
        self.0.iter().try_for_each(|(name, domain)| domain.validate(name))
    }

    /// Number of grid points, `None` if a domain is continuous or the count overflows.
    pub fn grid_size(&self) -> Option<usize> {
        self.0
            .values()
            .try_fold(1usize, |acc, d| acc.checked_mul(d.cardinality()?))
    }
}

/// Draw one value per parameter from `rng`.
pub fn sample(space: &SearchSpace, rng: &mut ChaCha8Rng) -> Configuration {
    space
        .iter()
        .map(|(name, domain)| (name.clone(), domain.sample(rng)))
        .collect()
}

/// Trial budget: a fixed count of random draws, or the whole grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BudgetRepr", into = "BudgetRepr")]
pub enum Budget {
    Trials(usize),
    Exhaustive,
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trials(n) => write!(f, "{n}"),
            Self::Exhaustive => f.write_str("exhaustive"),
        }
    }
}

impl std::str::FromStr for Budget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("exhaustive") {
            return Ok(Self::Exhaustive);
        }
        s.parse::<usize>()
            .map(Self::Trials)
            .map_err(|_| format!("budget must be a trial count or \"exhaustive\", got '{s}'"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum BudgetRepr {
    Count(usize),
    Keyword(String),
}

impl TryFrom<BudgetRepr> for Budget {
    type Error = String;

    fn try_from(repr: BudgetRepr) -> Result<Self, Self::Error> {
        match repr {
            BudgetRepr::Count(n) => Ok(Self::Trials(n)),
            BudgetRepr::Keyword(s) => s.parse(),
        }
    }
}

impl From<Budget> for BudgetRepr {
    fn from(budget: Budget) -> Self {
        match budget {
            Budget::Trials(n) => Self::Count(n),
            Budget::Exhaustive => Self::Keyword("exhaustive".into()),
        }
    }
}

/// Pull-based configuration source for one sweep.
#[derive(Debug)]
pub enum ConfigSampler {
    /// Count-bounded random draws.
    Random {
        space: SearchSpace,
        rng: ChaCha8Rng,
        remaining: usize,
    },
    /// Cartesian product of every discrete domain, in parameter-name order.
    Grid(GridIter),
}

impl ConfigSampler {
    /// Validate `space` against `budget` and prepare the sampler.
    ///
    /// Fails with `InvalidMode` when an exhaustive budget meets a continuous domain.
    pub fn new(space: &SearchSpace, budget: Budget, rng: ChaCha8Rng) -> Result<Self, SweepError> {
        space.validate()?;
        match budget {
            Budget::Trials(remaining) => Ok(Self::Random {
                space: space.clone(),
                rng,
                remaining,
            }),
            Budget::Exhaustive => Ok(Self::Grid(grid(space)?)),
        }
    }

    /// Trials this sampler will still produce.
    pub fn remaining(&self) -> usize {
        match self {
            Self::Random { remaining, .. } => *remaining,
            Self::Grid(points) => points.len(),
        }
    }
}

impl Iterator for ConfigSampler {
    type Item = Configuration;

    fn next(&mut self) -> Option<Configuration> {
        match self {
            Self::Random {
                space,
                rng,
                remaining,
            } => {
                if *remaining == 0 {
                    return None;
                }
                *remaining -= 1;
                Some(sample(space, rng))
            }
            Self::Grid(points) => points.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

/// Lazy walk over the grid of a discrete search space.
///
/// One cursor per parameter; the last parameter in name order varies fastest.
#[derive(Debug, Clone)]
pub struct GridIter {
    axes: Vec<(String, Domain, usize)>,
    cursor: Vec<usize>,
    remaining: usize,
}

impl GridIter {
    fn advance(&mut self) {
        for (position, (_, _, len)) in self.axes.iter().enumerate().rev() {
            self.cursor[position] += 1;
            if self.cursor[position] < *len {
                return;
            }
            self.cursor[position] = 0;
        }
    }
}

impl Iterator for GridIter {
    type Item = Configuration;

    fn next(&mut self) -> Option<Configuration> {
        if self.remaining == 0 {
            return None;
        }
        let config = self
            .axes
            .iter()
            .zip(&self.cursor)
            .filter_map(|((name, domain, _), &index)| {
                domain.value_at(index).map(|value| (name.clone(), value))
            })
            .collect();
        self.remaining -= 1;
        self.advance();
        Some(config)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for GridIter {}

/// Walk the full grid of a discrete search space.
///
/// Nothing is materialized up front, so the grid may be far larger than memory.
pub fn grid(space: &SearchSpace) -> Result<GridIter, SweepError> {
    space.validate()?;
    if let Some((name, _)) = space.iter().find(|(_, domain)| domain.is_continuous()) {
        return Err(SweepError::invalid_mode(format!(
            "exhaustive grid cannot enumerate continuous parameter '{name}'"
        )));
    }
    let remaining = space
        .grid_size()
        .ok_or_else(|| SweepError::invalid_mode("grid size overflows usize"))?;
    let axes: Vec<(String, Domain, usize)> = space
        .iter()
        .filter_map(|(name, domain)| {
            domain
                .cardinality()
                .map(|len| (name.clone(), domain.clone(), len))
        })
        .collect();
    Ok(GridIter {
        cursor: vec![0; axes.len()],
        axes,
        remaining,
    })
}
