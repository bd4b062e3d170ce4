//! Model registry: maps a model identifier to a constructor.
//!
//! Registration happens up front; a sweep then shares the registry read-only.

use crate::algorithms::{
    Classifier, GaussianNb, KNeighborsClassifier, LinearDiscriminant, LogisticRegression,
    MajorityClass, NearestCentroid,
};
use crate::error::{ModelError, SweepError};
use crate::training::sweep::Configuration;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Builds a fresh, unfitted classifier from a hyperparameter configuration.
pub type ModelConstructor =
    dyn Fn(&Configuration) -> Result<Box<dyn Classifier>, ModelError> + Send + Sync;

/// A resolved model, optionally bound to a configuration.
///
/// Every [`create`](Self::create) call returns an independent instance.
#[derive(Clone)]
pub struct ModelFactory {
    name: String,
    constructor: Arc<ModelConstructor>,
    config: Configuration,
}

impl ModelFactory {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Same constructor, new hyperparameters.
    pub fn bind(&self, config: &Configuration) -> Self {
        Self {
            name: self.name.clone(),
            constructor: Arc::clone(&self.constructor),
            config: config.clone(),
        }
    }

    pub fn create(&self) -> Result<Box<dyn Classifier>, ModelError> {
        (self.constructor)(&self.config)
    }
}

impl fmt::Debug for ModelFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelFactory")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

/// Name-keyed table of model constructors.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, Arc<ModelConstructor>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in classifiers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("logistic_regression", |config| {
            Ok(Box::new(LogisticRegression::from_config(config)?) as Box<dyn Classifier>)
        });
        registry.register("lda", |config| {
            Ok(Box::new(LinearDiscriminant::from_config(config)?) as Box<dyn Classifier>)
        });
        registry.register("knn", |config| {
            Ok(Box::new(KNeighborsClassifier::from_config(config)?) as Box<dyn Classifier>)
        });
        registry.register("gaussian_nb", |config| {
            Ok(Box::new(GaussianNb::from_config(config)?) as Box<dyn Classifier>)
        });
        registry.register("nearest_centroid", |_| {
            Ok(Box::new(NearestCentroid::default()) as Box<dyn Classifier>)
        });
        registry.register("majority", |_| {
            Ok(Box::new(MajorityClass::default()) as Box<dyn Classifier>)
        });
        registry
    }

    /// Register or replace a constructor.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&Configuration) -> Result<Box<dyn Classifier>, ModelError> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.models.insert(name.clone(), Arc::new(constructor)).is_some() {
            tracing::debug!(model = %name, "Replaced registered model");
        }
    }

    pub fn resolve(&self, name: &str) -> Result<ModelFactory, SweepError> {
        let constructor = self
            .models
            .get(name)
            .ok_or_else(|| SweepError::UnknownModel(name.to_string()))?;
        Ok(ModelFactory {
            name: name.to_string(),
            constructor: Arc::clone(constructor),
            config: Configuration::new(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::sweep::ParamValue;

    #[test]
    fn test_builtins_are_listed_in_order() {
        let registry = ModelRegistry::with_builtins();
        assert_eq!(
            registry.names(),
            vec![
                "gaussian_nb",
                "knn",
                "lda",
                "logistic_regression",
                "majority",
                "nearest_centroid"
            ]
        );
    }

    #[test]
    fn test_resolve_unknown_model() {
        let err = ModelRegistry::with_builtins().resolve("svm").unwrap_err();
        assert!(matches!(err, SweepError::UnknownModel(name) if name == "svm"));
    }

    #[test]
    fn test_bind_passes_configuration() {
        let registry = ModelRegistry::with_builtins();
        let factory = registry.resolve("knn").unwrap();
        let config: Configuration = [("n_neighbors".to_string(), ParamValue::Int(0))]
            .into_iter()
            .collect();
        let err = factory.bind(&config).create().err().unwrap();
        assert!(matches!(err, ModelError::InvalidParameter { .. }));
        assert!(factory.create().is_ok());
    }

    #[test]
    fn test_register_custom_model() {
        let mut registry = ModelRegistry::new();
        registry.register("broken", |_| Err(ModelError::Fit("always".into())));
        assert!(registry.contains("broken"));
        let factory = registry.resolve("broken").unwrap();
        assert_eq!(factory.name(), "broken");
        assert_eq!(factory.create().err(), Some(ModelError::Fit("always".into())));
    }
}
