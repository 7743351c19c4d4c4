//! Model training module
//!
//! Provides the regressors of the math-score model and the machinery to pick one:
//! - Linear regression and K-Nearest Neighbors
//! - Decision trees and Random Forests
//! - Gradient boosting, XGBoost-style boosting, CatBoost-style oblivious trees
//! - AdaBoost.R2
//! - Hyperparameter grids, K-fold cross-validation and grid search
//! - The catalog of candidate algorithms and the trainer that selects and persists the best

pub mod adaboost;
pub mod catalog;
pub mod catboost;
mod config;
pub mod cross_validation;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod grid_search;
pub mod knn;
pub mod linear_models;
pub mod models;
pub mod params;
pub mod random_forest;
mod trainer;
pub mod xgboost;

pub use adaboost::{AdaBoostConfig, AdaBoostRegressor, BoostLoss};
pub use catalog::{CatalogEntry, ModelCatalog};
pub use catboost::{CatBoostConfig, CatBoostRegressor};
pub use config::TrainerConfig;
pub use cross_validation::{CVResults, CVSplit, KFold};
pub use decision_tree::{Criterion, DecisionTreeConfig, DecisionTreeRegressor, TreeNode};
pub use gradient_boosting::{GradientBoostingConfig, GradientBoostingRegressor};
pub use grid_search::{CandidateScore, GridSearch, GridSearchResult};
pub use knn::{DistanceMetric, KNNConfig, KNNRegressor, WeightScheme};
pub use linear_models::{LinearRegression, LinearRegressionConfig};
pub use models::{r2_score, Estimator, FittedModel, ModelMetrics};
pub use params::{ParamGrid, ParamSet, ParamValue};
pub use random_forest::{MaxFeatures, RandomForestConfig, RandomForestRegressor};
pub use trainer::{EvaluationReport, ModelEvaluation, ModelTrainer};
pub use xgboost::{XGBoostConfig, XGBoostRegressor};
