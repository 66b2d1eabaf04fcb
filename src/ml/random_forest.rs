/*!
 * # Random Forest Regressor
 *
 * A bagged ensemble of CART regression trees. Trees are grown on bootstrap
 * samples of the training set, split on variance reduction, and averaged at
 * prediction time. Given the same seed and data the fitted forest, and so
 * every prediction, is identical across runs.
 *
 * No feature scaling is required: splits only compare values within one
 * feature column.
 */

use rand::{rngs::StdRng, seq::index, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ForestError {
    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("feature matrix has {rows} rows but target has {targets} values")]
    DimensionMismatch { rows: usize, targets: usize },

    #[error("row {row} has {got} features, expected {expected}")]
    RaggedFeatures {
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("non-finite value in training data at row {0}")]
    NonFinite(usize),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("model has not been fitted")]
    NotFitted,
}

/// Hyperparameters for the forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestConfig {
    /// Number of trees in the ensemble
    pub n_estimators: usize,
    /// Maximum tree depth; `None` grows until leaves are pure
    pub max_depth: Option<usize>,
    /// Minimum samples a node needs before it may split
    pub min_samples_split: usize,
    /// Minimum samples on each side of a split
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` considers all of them
    pub max_features: Option<usize>,
    /// Draw a bootstrap sample per tree
    pub bootstrap: bool,
    /// Seed for bootstrap sampling and feature selection
    pub seed: u64,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
            seed: 42,
        }
    }
}

impl RandomForestConfig {
    fn validate(&self) -> Result<(), ForestError> {
        if self.n_estimators == 0 {
            return Err(ForestError::InvalidParameter(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if self.min_samples_split < 2 {
            return Err(ForestError::InvalidParameter(
                "min_samples_split must be at least 2".to_string(),
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(ForestError::InvalidParameter(
                "min_samples_leaf must be at least 1".to_string(),
            ));
        }
        if self.max_features == Some(0) {
            return Err(ForestError::InvalidParameter(
                "max_features must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone)]
struct RegressionTree {
    root: Node,
}

/// Borrowed training data shared by all trees of one fit
struct TrainingSet<'a> {
    x: &'a [Vec<f64>],
    y: &'a [f64],
    n_features: usize,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl RegressionTree {
    fn grow<R: Rng + ?Sized>(
        data: &TrainingSet<'_>,
        mut samples: Vec<usize>,
        config: &RandomForestConfig,
        rng: &mut R,
    ) -> Self {
        let root = Self::build(data, &mut samples, 0, config, rng);
        Self { root }
    }

    fn build<R: Rng + ?Sized>(
        data: &TrainingSet<'_>,
        samples: &mut [usize],
        depth: usize,
        config: &RandomForestConfig,
        rng: &mut R,
    ) -> Node {
        let (sum, sum_sq) = samples.iter().fold((0.0, 0.0), |(s, sq), &i| {
            let y = data.y[i];
            (s + y, sq + y * y)
        });
        let n = samples.len() as f64;
        let mean = sum / n;
        let impurity = sum_sq - sum * sum / n;

        let depth_exhausted = config.max_depth.map_or(false, |max| depth >= max);
        if depth_exhausted || samples.len() < config.min_samples_split || impurity <= 1e-12 {
            return Node::Leaf { value: mean };
        }

        let Some(best) = Self::best_split(data, samples, config, rng) else {
            return Node::Leaf { value: mean };
        };
        if best.impurity >= impurity {
            return Node::Leaf { value: mean };
        }

        let (mut left, mut right): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .partition(|&&i| data.x[i][best.feature] <= best.threshold);

        Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(Self::build(data, &mut left, depth + 1, config, rng)),
            right: Box::new(Self::build(data, &mut right, depth + 1, config, rng)),
        }
    }

    fn best_split<R: Rng + ?Sized>(
        data: &TrainingSet<'_>,
        samples: &mut [usize],
        config: &RandomForestConfig,
        rng: &mut R,
    ) -> Option<BestSplit> {
        let candidates: Vec<usize> = match config.max_features {
            Some(k) if k < data.n_features => index::sample(rng, data.n_features, k).into_vec(),
            _ => (0..data.n_features).collect(),
        };

        let min_leaf = config.min_samples_leaf;
        let total = samples.len();
        let mut best: Option<BestSplit> = None;

        for feature in candidates {
            samples.sort_by(|&a, &b| {
                data.x[a][feature]
                    .partial_cmp(&data.x[b][feature])
                    .unwrap_or(Ordering::Equal)
            });

            let total_sum: f64 = samples.iter().map(|&i| data.y[i]).sum();
            let total_sq: f64 = samples.iter().map(|&i| data.y[i] * data.y[i]).sum();
            let mut left_sum = 0.0;
            let mut left_sq = 0.0;

            for pos in 0..total - 1 {
                let y = data.y[samples[pos]];
                left_sum += y;
                left_sq += y * y;

                let left_n = pos + 1;
                let right_n = total - left_n;
                if left_n < min_leaf || right_n < min_leaf {
                    continue;
                }

                let here = data.x[samples[pos]][feature];
                let next = data.x[samples[pos + 1]][feature];
                if next <= here {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let impurity = (left_sq - left_sum * left_sum / left_n as f64)
                    + (right_sq - right_sum * right_sum / right_n as f64);

                if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                    let mut threshold = here + (next - here) / 2.0;
                    if threshold >= next {
                        threshold = here;
                    }
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        impurity,
                    });
                }
            }
        }

        best
    }

    fn predict(&self, features: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if features[*feature] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

/// Random forest regression model
#[derive(Debug, Clone)]
pub struct RandomForestRegressor {
    config: RandomForestConfig,
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl RandomForestRegressor {
    pub fn new(config: RandomForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    pub fn config(&self) -> &RandomForestConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Fit the forest, replacing any previously fitted trees.
    pub fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<(), ForestError> {
        self.config.validate()?;
        let n_features = validate_training_data(x, y)?;

        let data = TrainingSet { x, y, n_features };
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let n = x.len();

        let trees = (0..self.config.n_estimators)
            .map(|_| {
                let samples: Vec<usize> = if self.config.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                RegressionTree::grow(&data, samples, &self.config, &mut rng)
            })
            .collect();

        self.trees = trees;
        self.n_features = n_features;
        Ok(())
    }

    /// Predict a single observation as the mean of all tree outputs.
    pub fn predict_one(&self, features: &[f64]) -> Result<f64, ForestError> {
        if self.trees.is_empty() {
            return Err(ForestError::NotFitted);
        }
        if features.len() != self.n_features {
            return Err(ForestError::RaggedFeatures {
                row: 0,
                expected: self.n_features,
                got: features.len(),
            });
        }
        let total: f64 = self.trees.iter().map(|tree| tree.predict(features)).sum();
        Ok(total / self.trees.len() as f64)
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, ForestError> {
        x.iter()
            .enumerate()
            .map(|(row, features)| {
                self.predict_one(features).map_err(|err| match err {
                    ForestError::RaggedFeatures { expected, got, .. } => {
                        ForestError::RaggedFeatures { row, expected, got }
                    }
                    other => other,
                })
            })
            .collect()
    }

    /// Coefficient of determination of the predictions on `x` against `y`.
    pub fn score(&self, x: &[Vec<f64>], y: &[f64]) -> Result<f64, ForestError> {
        if x.len() != y.len() {
            return Err(ForestError::DimensionMismatch {
                rows: x.len(),
                targets: y.len(),
            });
        }
        let predicted = self.predict(x)?;
        Ok(r_squared(y, &predicted))
    }
}

fn validate_training_data(x: &[Vec<f64>], y: &[f64]) -> Result<usize, ForestError> {
    if x.is_empty() {
        return Err(ForestError::EmptyTrainingSet);
    }
    if x.len() != y.len() {
        return Err(ForestError::DimensionMismatch {
            rows: x.len(),
            targets: y.len(),
        });
    }

    let expected = x[0].len();
    if expected == 0 {
        return Err(ForestError::InvalidParameter(
            "rows must contain at least one feature".to_string(),
        ));
    }

    for (row, (features, target)) in x.iter().zip(y).enumerate() {
        if features.len() != expected {
            return Err(ForestError::RaggedFeatures {
                row,
                expected,
                got: features.len(),
            });
        }
        if !target.is_finite() || features.iter().any(|v| !v.is_finite()) {
            return Err(ForestError::NonFinite(row));
        }
    }

    Ok(expected)
}

/// R² of `predicted` against `actual`.
///
/// 1.0 is a perfect fit and 0.0 matches a constant mean predictor; poor fits
/// go negative. A constant `actual` scores 1.0 when matched exactly and 0.0
/// otherwise.
pub fn r_squared(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() || actual.len() != predicted.len() {
        return f64::NAN;
    }

    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();

    if ss_tot <= f64::EPSILON {
        return if ss_res <= f64::EPSILON { 1.0 } else { 0.0 };
    }

    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn small_config() -> RandomForestConfig {
        RandomForestConfig {
            n_estimators: 25,
            ..Default::default()
        }
    }

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let y: Vec<f64> = (0..40).map(|i| if i < 20 { 5.0 } else { 50.0 }).collect();
        (x, y)
    }

    #[test]
    fn constant_target_is_predicted_exactly() {
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64, 1.0]).collect();
        let y = vec![12.0; 20];
        let mut forest = RandomForestRegressor::new(small_config());
        forest.fit(&x, &y).unwrap();

        assert_eq!(forest.predict_one(&[3.0, 1.0]).unwrap(), 12.0);
        assert_eq!(forest.predict_one(&[300.0, -4.0]).unwrap(), 12.0);
        assert_eq!(forest.score(&x, &y).unwrap(), 1.0);
    }

    #[test]
    fn learns_a_step_function() {
        let (x, y) = step_data();
        let mut forest = RandomForestRegressor::new(small_config());
        forest.fit(&x, &y).unwrap();

        assert!((forest.predict_one(&[2.0, 2.0]).unwrap() - 5.0).abs() < 5.0);
        assert!((forest.predict_one(&[37.0, 1.0]).unwrap() - 50.0).abs() < 5.0);
        assert!(forest.score(&x, &y).unwrap() > 0.9);
        assert_eq!(forest.n_trees(), 25);
    }

    #[test]
    fn same_seed_gives_identical_models() {
        let (x, y) = step_data();
        let mut a = RandomForestRegressor::new(small_config());
        let mut b = RandomForestRegressor::new(small_config());
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();

        let probe: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64 * 4.5, 1.0]).collect();
        assert_eq!(a.predict(&probe).unwrap(), b.predict(&probe).unwrap());
    }

    #[test]
    fn depth_limited_trees_still_fit() {
        let (x, y) = step_data();
        let mut forest = RandomForestRegressor::new(RandomForestConfig {
            n_estimators: 5,
            max_depth: Some(1),
            max_features: Some(1),
            ..Default::default()
        });
        forest.fit(&x, &y).unwrap();
        let prediction = forest.predict_one(&[10.0, 0.0]).unwrap();
        assert!((5.0..=50.0).contains(&prediction));
    }

    #[test]
    fn rejects_invalid_training_data() {
        let mut forest = RandomForestRegressor::new(small_config());
        assert_matches!(forest.fit(&[], &[]), Err(ForestError::EmptyTrainingSet));
        assert_matches!(
            forest.fit(&[vec![1.0]], &[1.0, 2.0]),
            Err(ForestError::DimensionMismatch { rows: 1, targets: 2 })
        );
        assert_matches!(
            forest.fit(&[vec![1.0], vec![1.0, 2.0]], &[1.0, 2.0]),
            Err(ForestError::RaggedFeatures { row: 1, .. })
        );
        assert_matches!(
            forest.fit(&[vec![f64::NAN]], &[1.0]),
            Err(ForestError::NonFinite(0))
        );
    }

    #[test]
    fn rejects_invalid_parameters() {
        let mut forest = RandomForestRegressor::new(RandomForestConfig {
            n_estimators: 0,
            ..Default::default()
        });
        assert_matches!(
            forest.fit(&[vec![1.0]], &[1.0]),
            Err(ForestError::InvalidParameter(_))
        );
    }

    #[test]
    fn unfitted_model_cannot_predict() {
        let forest = RandomForestRegressor::new(small_config());
        assert_eq!(forest.predict_one(&[1.0]), Err(ForestError::NotFitted));
    }

    #[test]
    fn r_squared_edge_cases() {
        assert_eq!(r_squared(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 1.0);
        assert!(r_squared(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]) < 0.0);
        assert_eq!(r_squared(&[4.0, 4.0], &[4.0, 4.0]), 1.0);
        assert_eq!(r_squared(&[4.0, 4.0], &[3.0, 5.0]), 0.0);
        assert!(r_squared(&[], &[]).is_nan());
    }
}
