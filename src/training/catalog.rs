//! Ordered set of regression algorithms and their search spaces

use super::adaboost::AdaBoostConfig;
use super::catboost::CatBoostConfig;
use super::decision_tree::DecisionTreeConfig;
use super::gradient_boosting::GradientBoostingConfig;
use super::knn::KNNConfig;
use super::linear_models::LinearRegressionConfig;
use super::models::Estimator;
use super::params::ParamGrid;
use super::random_forest::RandomForestConfig;
use super::xgboost::XGBoostConfig;
use crate::error::{ModelError, Result};

/// One algorithm variant: a display name, its untrained specification and the grid to search
#[derive(Debug)]
pub struct CatalogEntry {
    pub name: String,
    pub estimator: Box<dyn Estimator>,
    pub grid: ParamGrid,
}

/// Read-only, insertion-ordered list of catalog entries with unique names.
/// Iteration order is the tie-break order for model selection.
#[derive(Debug, Default)]
pub struct ModelCatalog {
    entries: Vec<CatalogEntry>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry searched over the estimator's own hyperparameter space
    pub fn with_estimator<E: Estimator + 'static>(self, name: impl Into<String>, estimator: E) -> Result<Self> {
        let grid = estimator.hyperparameter_space();
        self.with_entry(name, estimator, grid)
    }

    /// Append an entry with an explicit grid
    pub fn with_entry<E: Estimator + 'static>(
        mut self,
        name: impl Into<String>,
        estimator: E,
        grid: ParamGrid,
    ) -> Result<Self> {
        let name = name.into();
        if self.get(&name).is_some() {
            return Err(ModelError::ConfigError(format!(
                "catalog entry '{}' is listed twice",
                name
            )));
        }
        grid.validate()?;
        self.entries.push(CatalogEntry {
            name,
            estimator: Box::new(estimator),
            grid,
        });
        Ok(self)
    }

    /// The eight regressors of the math-score model, in selection order
    pub fn default_regressors(random_state: u64) -> Self {
        let seed = Some(random_state);
        let entries: Vec<(&str, Box<dyn Estimator>)> = vec![
            (
                "Gradient Boosting",
                Box::new(GradientBoostingConfig {
                    random_state: seed,
                    ..Default::default()
                }),
            ),
            ("Linear Regression", Box::new(LinearRegressionConfig::default())),
            ("K-Neighbor Regressor", Box::new(KNNConfig::default())),
            (
                "Decision Tree Regressor",
                Box::new(DecisionTreeConfig::default().with_random_state(random_state)),
            ),
            (
                "Random Forest Regressor",
                Box::new(RandomForestConfig::default().with_random_state(random_state)),
            ),
            (
                "XGB Regressor",
                Box::new(XGBoostConfig {
                    random_state: seed,
                    ..Default::default()
                }),
            ),
            (
                "Cat Boost Regressor",
                Box::new(CatBoostConfig {
                    random_state: seed,
                    ..Default::default()
                }),
            ),
            (
                "AdaBoost Regressor",
                Box::new(AdaBoostConfig {
                    random_state: seed,
                    ..Default::default()
                }),
            ),
        ];

        Self {
            entries: entries
                .into_iter()
                .map(|(name, estimator)| CatalogEntry {
                    name: name.to_string(),
                    grid: estimator.hyperparameter_space(),
                    estimator,
                })
                .collect(),
        }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
