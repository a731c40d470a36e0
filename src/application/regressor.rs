// Random forest regressor - Bagged CART trees with MSE splits
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegressorError {
    #[error("Cannot fit with zero samples")]
    Empty,
    #[error("Number of samples in X ({x}) and y ({y}) must match")]
    LengthMismatch { x: usize, y: usize },
    #[error("Expected {expected} features, got {got}")]
    FeatureCount { expected: usize, got: usize },
    #[error("Model has not been fitted")]
    NotFitted,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, features: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                } => {
                    node = if features[*feature_idx] <= *threshold { left.as_ref() } else { right.as_ref() };
                }
            }
        }
    }

    #[cfg(test)]
    fn depth(&self) -> usize {
        match self {
            Node::Leaf { .. } => 0,
            Node::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TreeParams {
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
}

/// Regression tree over a subset of rows, identified by `indices`.
#[derive(Debug, Clone)]
struct RegressionTree {
    root: Node,
}

impl RegressionTree {
    fn fit(x: &[Vec<f64>], y: &[f64], indices: &[usize], params: TreeParams) -> Self {
        Self {
            root: build_node(x, y, indices, 0, params),
        }
    }
}

fn mean(y: &[f64], indices: &[usize]) -> f64 {
    indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64
}

fn variance(y: &[f64], indices: &[usize]) -> f64 {
    if indices.len() <= 1 {
        return 0.0;
    }
    let m = mean(y, indices);
    indices.iter().map(|&i| (y[i] - m).powi(2)).sum::<f64>() / indices.len() as f64
}

/// Best `(feature_idx, threshold)` by weighted MSE reduction, if any split helps.
fn best_split(x: &[Vec<f64>], y: &[f64], indices: &[usize], params: TreeParams) -> Option<(usize, f64)> {
    let n = indices.len();
    let n_features = x[indices[0]].len();
    let current_variance = variance(y, indices);

    let mut best: Option<(usize, f64)> = None;
    let mut best_gain = 0.0;
    let mut sorted: Vec<(f64, f64)> = Vec::with_capacity(n);

    for feature_idx in 0..n_features {
        sorted.clear();
        sorted.extend(indices.iter().map(|&i| (x[i][feature_idx], y[i])));
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let total_sum: f64 = sorted.iter().map(|(_, t)| t).sum();
        let total_sq: f64 = sorted.iter().map(|(_, t)| t * t).sum();
        let mut left_sum = 0.0;
        let mut left_sq = 0.0;

        for i in 0..n - 1 {
            let (value, target) = sorted[i];
            left_sum += target;
            left_sq += target * target;

            let next_value = sorted[i + 1].0;
            if value == next_value {
                continue;
            }

            let n_left = (i + 1) as f64;
            let n_right = (n - i - 1) as f64;
            if (i + 1) < params.min_samples_leaf || (n - i - 1) < params.min_samples_leaf {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse_left = left_sq - left_sum * left_sum / n_left;
            let sse_right = right_sq - right_sum * right_sum / n_right;
            let gain = current_variance - (sse_left + sse_right) / n as f64;

            if gain > best_gain + 1e-12 {
                best_gain = gain;
                best = Some((feature_idx, (value + next_value) / 2.0));
            }
        }
    }

    best
}

fn build_node(x: &[Vec<f64>], y: &[f64], indices: &[usize], depth: usize, params: TreeParams) -> Node {
    let leaf = || Node::Leaf { value: mean(y, indices) };

    if indices.len() < params.min_samples_split
        || params.max_depth.is_some_and(|max| depth >= max)
        || variance(y, indices) < 1e-10
    {
        return leaf();
    }

    let Some((feature_idx, threshold)) = best_split(x, y, indices, params) else {
        return leaf();
    };

    let (left, right): (Vec<usize>, Vec<usize>) =
        indices.iter().partition(|&&i| x[i][feature_idx] <= threshold);

    Node::Split {
        feature_idx,
        threshold,
        left: Box::new(build_node(x, y, &left, depth + 1, params)),
        right: Box::new(build_node(x, y, &right, depth + 1, params)),
    }
}

fn bootstrap_sample(n_samples: usize, seed: u64) -> Vec<usize> {
    let dist = Uniform::from(0..n_samples);
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n_samples).map(|_| dist.sample(&mut rng)).collect()
}

/// Averages the predictions of `n_estimators` trees, each fitted on a
/// bootstrap sample drawn with seed `random_state + tree_index`.
/// Identical inputs and seed give identical predictions.
#[derive(Debug, Clone)]
pub struct RandomForestRegressor {
    trees: Vec<RegressionTree>,
    n_estimators: usize,
    max_depth: Option<usize>,
    random_state: u64,
    n_features: usize,
}

impl RandomForestRegressor {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators: n_estimators.max(1),
            max_depth: None,
            random_state: 0,
            n_features: 0,
        }
    }

    #[cfg(test)]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
        self
    }

    #[cfg(test)]
    pub fn max_tree_depth(&self) -> usize {
        self.trees.iter().map(|t| t.root.depth()).max().unwrap_or(0)
    }

    pub fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<(), RegressorError> {
        if x.len() != y.len() {
            return Err(RegressorError::LengthMismatch { x: x.len(), y: y.len() });
        }
        if x.is_empty() {
            return Err(RegressorError::Empty);
        }
        let n_features = x[0].len();
        if let Some(row) = x.iter().find(|row| row.len() != n_features) {
            return Err(RegressorError::FeatureCount {
                expected: n_features,
                got: row.len(),
            });
        }

        let params = TreeParams {
            max_depth: self.max_depth,
            min_samples_split: 2,
            min_samples_leaf: 1,
        };

        self.trees = (0..self.n_estimators)
            .map(|i| {
                let indices = bootstrap_sample(x.len(), self.random_state.wrapping_add(i as u64));
                RegressionTree::fit(x, y, &indices, params)
            })
            .collect();
        self.n_features = n_features;
        Ok(())
    }

    pub fn predict_one(&self, features: &[f64]) -> Result<f64, RegressorError> {
        if self.trees.is_empty() {
            return Err(RegressorError::NotFitted);
        }
        if features.len() != self.n_features {
            return Err(RegressorError::FeatureCount {
                expected: self.n_features,
                got: features.len(),
            });
        }

        let total: f64 = self.trees.iter().map(|t| t.root.predict(features)).sum();
        Ok(total / self.trees.len() as f64)
    }
}
