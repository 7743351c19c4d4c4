//! Exhaustive hyperparameter search scored by k-fold cross-validation

use super::cross_validation::{CVResults, KFold};
use super::models::{Estimator, FittedModel};
use super::params::{ParamGrid, ParamSet};
use crate::error::Result;
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use tracing::debug;

/// Cross-validated score of one grid candidate
#[derive(Debug, Clone)]
pub struct CandidateScore {
    pub params: ParamSet,
    pub cv: CVResults,
}

/// Outcome of a search: the winning assignment and the estimator refit with it
#[derive(Debug, Clone)]
pub struct GridSearchResult {
    pub best_params: ParamSet,
    /// Mean CV score of the winner; `None` when the grid had a single candidate
    pub best_cv_score: Option<f64>,
    /// Refit on the full training data
    pub model: FittedModel,
    pub candidates: Vec<CandidateScore>,
}

pub struct GridSearch<'a> {
    estimator: &'a dyn Estimator,
    grid: &'a ParamGrid,
    cv: KFold,
}

impl<'a> GridSearch<'a> {
    pub fn new(estimator: &'a dyn Estimator, grid: &'a ParamGrid, cv: KFold) -> Self {
        Self { estimator, grid, cv }
    }

    /// Score every candidate, keep the first one with the highest mean CV score
    /// and refit it on all of `(x, y)`
    pub fn run(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<GridSearchResult> {
        let mut combos = self.grid.combinations()?;

        if combos.len() == 1 {
            let params = combos.remove(0);
            let model = self.estimator.fit(x, y, &params)?;
            return Ok(GridSearchResult {
                best_params: params,
                best_cv_score: None,
                model,
                candidates: Vec::new(),
            });
        }

        let splits = self.cv.split(x.nrows())?;
        let folds: Vec<_> = splits
            .iter()
            .map(|split| {
                (
                    x.select(Axis(0), &split.train_indices),
                    y.select(Axis(0), &split.train_indices),
                    x.select(Axis(0), &split.test_indices),
                    y.select(Axis(0), &split.test_indices),
                )
            })
            .collect();

        let candidates: Vec<CandidateScore> = combos
            .into_par_iter()
            .map(|params| {
                let scores = folds
                    .iter()
                    .map(|(x_tr, y_tr, x_val, y_val)| {
                        let model = self.estimator.fit(x_tr, y_tr, &params)?;
                        self.estimator.score(&model, x_val, y_val)
                    })
                    .collect::<Result<Vec<f64>>>()?;
                let cv = CVResults::from_scores(scores);
                debug!(params = %params, cv_score = cv.mean_score, "Scored grid candidate");
                Ok(CandidateScore { params, cv })
            })
            .collect::<Result<Vec<_>>>()?;

        let best = best_candidate(&candidates);
        let best_params = candidates[best].params.clone();
        let best_cv_score = Some(candidates[best].cv.mean_score);
        let model = self.estimator.fit(x, y, &best_params)?;

        Ok(GridSearchResult {
            best_params,
            best_cv_score,
            model,
            candidates,
        })
    }
}

/// Index of the first highest mean score; NaN never wins, and index 0 is the
/// fallback when nothing is comparable
fn best_candidate(candidates: &[CandidateScore]) -> usize {
    let mut best = 0;
    let mut best_score = f64::NEG_INFINITY;
    for (i, candidate) in candidates.iter().enumerate() {
        if candidate.cv.mean_score > best_score {
            best = i;
            best_score = candidate.cv.mean_score;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::knn::KNNConfig;
    use crate::training::linear_models::LinearRegressionConfig;
    use ndarray::array;

    fn candidate(mean: f64) -> CandidateScore {
        CandidateScore {
            params: ParamSet::new(),
            cv: CVResults::from_scores(vec![mean]),
        }
    }

    #[test]
    fn test_first_maximum_wins() {
        let candidates = vec![candidate(0.2), candidate(0.9), candidate(0.9)];
        assert_eq!(best_candidate(&candidates), 1);
    }

    #[test]
    fn test_nan_never_wins() {
        let candidates = vec![candidate(f64::NAN), candidate(0.1)];
        assert_eq!(best_candidate(&candidates), 1);
    }

    #[test]
    fn test_single_candidate_skips_cv() {
        // Two rows cannot be split into three folds, so reaching CV would fail
        let x = array![[0.0], [1.0]];
        let y = array![1.0, 3.0];
        let estimator = LinearRegressionConfig::default();
        let grid = estimator.hyperparameter_space();

        let result = GridSearch::new(&estimator, &grid, KFold::new(3)).run(&x, &y).unwrap();
        assert!(result.best_params.is_empty());
        assert!(result.best_cv_score.is_none());
        assert!(result.candidates.is_empty());
    }

    #[test]
    fn test_search_picks_best_k_and_refits() {
        // On a straight line the single nearest neighbour is always closest to the truth
        let x = Array2::from_shape_fn((30, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(30, |i| i as f64);
        let estimator = KNNConfig::default();
        let grid = ParamGrid::new().axis("n_neighbors", [1usize, 9]);

        let result = GridSearch::new(&estimator, &grid, KFold::new(3)).run(&x, &y).unwrap();
        assert_eq!(result.candidates.len(), 2);
        assert_eq!(result.best_params, ParamSet::new().with("n_neighbors", 1usize));
        assert_eq!(result.model.predict(&x).unwrap(), y);
    }
}
