//! Random forest of regression trees

use super::{EstimatorError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Minimum impurity decrease for a split to be kept
const MIN_GAIN: f64 = 1e-12;

/// Hyperparameters for [`RandomForest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features tried per split; `None` tries all of them
    pub max_features: Option<usize>,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 50,
            max_depth: Some(12),
            min_samples_split: 2,
            min_samples_leaf: 2,
            max_features: None,
            bootstrap: true,
            seed: 42,
        }
    }
}

impl ForestParams {
    fn check(&self) -> Result<()> {
        let invalid = |name: &str, reason: &str| -> Result<()> {
            Err(EstimatorError::InvalidParameter {
                name: name.to_string(),
                reason: reason.to_string(),
            })
        };
        if self.n_estimators == 0 {
            return invalid("n_estimators", "must be at least 1");
        }
        if self.min_samples_split < 2 {
            return invalid("min_samples_split", "must be at least 2");
        }
        if self.min_samples_leaf == 0 {
            return invalid("min_samples_leaf", "must be at least 1");
        }
        if self.max_features == Some(0) {
            return invalid("max_features", "must be at least 1");
        }
        Ok(())
    }
}

/// Node of a flattened regression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Regression tree stored as a node arena; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    fn fit(
        x: &Array2<f64>,
        y: &[f64],
        indices: Vec<usize>,
        params: &ForestParams,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let n_features = x.ncols();
        let n_try = params.max_features.unwrap_or(n_features).min(n_features);

        let mut nodes = vec![TreeNode::Leaf { value: 0.0 }];
        let mut stack = vec![(0usize, indices, 0usize)];

        while let Some((slot, idx, depth)) = stack.pop() {
            let value = idx.iter().map(|&i| y[i]).sum::<f64>() / idx.len().max(1) as f64;

            let can_split = idx.len() >= params.min_samples_split
                && idx.len() >= 2 * params.min_samples_leaf
                && params.max_depth.map_or(true, |d| depth < d);

            let split = if can_split {
                let features: Vec<usize> = if n_try < n_features {
                    sample(rng, n_features, n_try).into_vec()
                } else {
                    (0..n_features).collect()
                };
                best_split(x, y, &idx, &features, params.min_samples_leaf)
            } else {
                None
            };

            let Some((feature, threshold)) = split else {
                nodes[slot] = TreeNode::Leaf { value };
                continue;
            };

            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
                idx.iter().partition(|&&i| x[[i, feature]] <= threshold);
            if left_idx.is_empty() || right_idx.is_empty() {
                nodes[slot] = TreeNode::Leaf { value };
                continue;
            }

            let left = nodes.len();
            let right = left + 1;
            nodes.push(TreeNode::Leaf { value: 0.0 });
            nodes.push(TreeNode::Leaf { value: 0.0 });
            nodes[slot] = TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            };
            stack.push((right, right_idx, depth + 1));
            stack.push((left, left_idx, depth + 1));
        }

        Self { nodes }
    }

    /// Children must point forward inside the arena and splits must read
    /// an existing column, so traversal always terminates in bounds
    pub fn check_structure(&self, n_features: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(EstimatorError::Malformed("tree has no nodes".to_string()));
        }
        let n_nodes = self.nodes.len();
        for (i, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature, left, right, ..
            } = node
            {
                if *feature >= n_features {
                    return Err(EstimatorError::Malformed(format!(
                        "node {} splits on feature {} of {}",
                        i, feature, n_features
                    )));
                }
                for child in [*left, *right] {
                    if child <= i || child >= n_nodes {
                        return Err(EstimatorError::Malformed(format!(
                            "node {} has child {} outside ({}, {})",
                            i, child, i, n_nodes
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut current = 0;
        loop {
            match &self.nodes[current] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    current = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], i: usize) -> usize {
            match &nodes[i] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
            }
        }
        walk(&self.nodes, 0)
    }
}

/// Best (feature, threshold) by variance reduction, scanning sorted values
fn best_split(
    x: &Array2<f64>,
    y: &[f64],
    idx: &[usize],
    features: &[usize],
    min_leaf: usize,
) -> Option<(usize, f64)> {
    let n = idx.len();
    let total_sum: f64 = idx.iter().map(|&i| y[i]).sum();
    let parent_score = total_sum * total_sum / n as f64;

    let mut best: Option<(usize, f64, f64)> = None;
    let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(n);

    for &feature in features {
        pairs.clear();
        pairs.extend(idx.iter().map(|&i| (x[[i, feature]], y[i])));
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut left_sum = 0.0;
        for k in 0..n - 1 {
            left_sum += pairs[k].1;
            let n_left = k + 1;
            let n_right = n - n_left;
            if n_left < min_leaf || n_right < min_leaf {
                continue;
            }
            let (lo, hi) = (pairs[k].0, pairs[k + 1].0);
            if lo >= hi {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let score =
                left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64;
            let gain = (score - parent_score) / n as f64;
            if gain > MIN_GAIN && best.map_or(true, |(_, _, g)| gain > g) {
                let mid = lo + (hi - lo) / 2.0;
                let threshold = if mid >= hi { lo } else { mid };
                best = Some((feature, threshold, gain));
            }
        }
    }

    best.map(|(feature, threshold, _)| (feature, threshold))
}

/// Bagged ensemble of regression trees; predicts the mean over trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_features: usize,
    pub trees: Vec<RegressionTree>,
}

impl RandomForest {
    /// Build every tree in parallel, each from its own seeded stream
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, params: &ForestParams) -> Result<Self> {
        params.check()?;
        let (n_samples, n_features) = x.dim();
        if n_samples != y.len() {
            return Err(EstimatorError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(EstimatorError::EmptyInput);
        }

        let targets = y.to_vec();
        let trees: Vec<RegressionTree> = (0..params.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(tree_idx as u64));
                let indices: Vec<usize> = if params.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };
                RegressionTree::fit(x, &targets, indices, params, &mut rng)
            })
            .collect();

        Ok(Self { n_features, trees })
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let total: f64 = self.trees.iter().map(|t| t.predict_row(row)).sum();
        total / self.trees.len().max(1) as f64
    }

    pub fn check_structure(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(EstimatorError::Malformed("forest has no trees".to_string()));
        }
        self.trees
            .iter()
            .try_for_each(|tree| tree.check_structure(self.n_features))
    }

    pub fn node_count(&self) -> usize {
        self.trees.iter().map(|t| t.nodes.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Array2<f64>, Array1<f64>) {
        let xs: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let y: Array1<f64> = xs.iter().map(|&v| if v < 20.0 { 100.0 } else { 300.0 }).collect();
        let x = Array2::from_shape_vec((40, 1), xs).unwrap();
        (x, y)
    }

    #[test]
    fn test_single_tree_fits_step_function() {
        let (x, y) = step_data();
        let params = ForestParams {
            n_estimators: 1,
            bootstrap: false,
            min_samples_leaf: 1,
            ..Default::default()
        };
        let forest = RandomForest::fit(&x, &y, &params).unwrap();

        assert_eq!(forest.trees[0].depth(), 1);
        assert_eq!(forest.predict_row(x.row(3)), 100.0);
        assert_eq!(forest.predict_row(x.row(35)), 300.0);
        match &forest.trees[0].nodes[0] {
            TreeNode::Split { threshold, .. } => assert_eq!(*threshold, 19.5),
            other => panic!("expected split at root, got {:?}", other),
        }
    }

    #[test]
    fn test_forest_is_deterministic_for_seed() {
        let (x, y) = step_data();
        let params = ForestParams {
            n_estimators: 8,
            ..Default::default()
        };
        let a = RandomForest::fit(&x, &y, &params).unwrap();
        let b = RandomForest::fit(&x, &y, &params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_forest_predictions_stay_within_target_range() {
        let (x, y) = step_data();
        let forest = RandomForest::fit(&x, &y, &ForestParams::default()).unwrap();
        for row in x.rows() {
            let p = forest.predict_row(row);
            assert!((100.0..=300.0).contains(&p));
        }
    }

    #[test]
    fn test_max_depth_zero_gives_mean_leaf() {
        let (x, y) = step_data();
        let params = ForestParams {
            n_estimators: 1,
            bootstrap: false,
            max_depth: Some(0),
            ..Default::default()
        };
        let forest = RandomForest::fit(&x, &y, &params).unwrap();
        assert_eq!(forest.node_count(), 1);
        assert_eq!(forest.predict_row(x.row(0)), 200.0);
    }

    #[test]
    fn test_constant_target_does_not_split() {
        let x = Array2::from_shape_vec((4, 1), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let y = Array1::from_vec(vec![7.0; 4]);
        let params = ForestParams {
            n_estimators: 1,
            bootstrap: false,
            min_samples_leaf: 1,
            ..Default::default()
        };
        let forest = RandomForest::fit(&x, &y, &params).unwrap();
        assert_eq!(forest.trees[0].nodes.len(), 1);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let (x, y) = step_data();
        let params = ForestParams {
            n_estimators: 0,
            ..Default::default()
        };
        assert!(matches!(
            RandomForest::fit(&x, &y, &params),
            Err(EstimatorError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_fitted_forest_passes_structure_check() {
        let (x, y) = step_data();
        let forest = RandomForest::fit(&x, &y, &ForestParams::default()).unwrap();
        assert!(forest.check_structure().is_ok());
    }

    #[test]
    fn test_structure_check_rejects_bad_nodes() {
        let split = |feature, left, right| TreeNode::Split {
            feature,
            threshold: 0.5,
            left,
            right,
        };
        let leaf = TreeNode::Leaf { value: 1.0 };
        let forest = |nodes: Vec<TreeNode>| RandomForest {
            n_features: 2,
            trees: vec![RegressionTree { nodes }],
        };

        assert!(forest(vec![split(0, 1, 2), leaf.clone(), leaf.clone()])
            .check_structure()
            .is_ok());
        // feature out of range
        assert!(forest(vec![split(2, 1, 2), leaf.clone(), leaf.clone()])
            .check_structure()
            .is_err());
        // child past the arena
        assert!(forest(vec![split(0, 1, 7), leaf.clone(), leaf.clone()])
            .check_structure()
            .is_err());
        // cycle back to the root
        assert!(forest(vec![split(0, 0, 1), leaf.clone()]).check_structure().is_err());
        assert!(forest(vec![]).check_structure().is_err());
        assert!(RandomForest {
            n_features: 2,
            trees: vec![]
        }
        .check_structure()
        .is_err());
    }
}
