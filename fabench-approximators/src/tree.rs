use crate::{Regressor, decode, encode};
use anyhow::{Result, ensure};
use bincode::{Decode, Encode};
use fabench_core::rng::with_rng;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 15,
            min_samples_split: 20,
            min_samples_leaf: 5,
        }
    }
}

#[derive(Debug, Clone, Encode, Decode)]
enum Node {
    Leaf(f32),
    Split {
        feature: usize,
        threshold: f32,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, input: &[f32]) -> f32 {
        match self {
            Self::Leaf(value) => *value,
            Self::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if input[*feature] <= *threshold {
                    left.predict(input)
                } else {
                    right.predict(input)
                }
            }
        }
    }
}

struct BestSplit {
    feature: usize,
    threshold: f32,
    sse: f64,
}

fn sse_of(targets: &[f32], indices: &[usize]) -> f64 {
    let n = indices.len() as f64;
    let sum: f64 = indices.iter().map(|&i| targets[i] as f64).sum();
    let sum_sq: f64 = indices.iter().map(|&i| (targets[i] as f64).powi(2)).sum();
    sum_sq - sum * sum / n
}

/// CART regression tree minimising the squared error of each split.
#[derive(Debug, Clone, Encode, Decode)]
pub struct DecisionTree {
    params: TreeParams,
    root: Option<Node>,
}

impl DecisionTree {
    pub fn new(params: TreeParams) -> Self {
        Self { params, root: None }
    }

    fn find_split(
        &self,
        inputs: &[Vec<f32>],
        targets: &[f32],
        indices: &[usize],
    ) -> Option<BestSplit> {
        let n_features = inputs[indices[0]].len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let total: f64 = indices.iter().map(|&i| targets[i] as f64).sum();
        let total_sq: f64 = indices.iter().map(|&i| (targets[i] as f64).powi(2)).sum();
        let n = indices.len();
        let mut best: Option<BestSplit> = None;
        for feature in 0..n_features {
            let mut sorted = indices.to_vec();
            sorted.sort_by(|&a, &b| inputs[a][feature].total_cmp(&inputs[b][feature]));
            let (mut left_sum, mut left_sq) = (0f64, 0f64);
            for split in 1..n {
                let moved = targets[sorted[split - 1]] as f64;
                left_sum += moved;
                left_sq += moved * moved;
                let lo = inputs[sorted[split - 1]][feature];
                let hi = inputs[sorted[split]][feature];
                if split < min_leaf || n - split < min_leaf || lo == hi {
                    continue;
                }
                let (nl, nr) = (split as f64, (n - split) as f64);
                let right_sum = total - left_sum;
                let right_sq = total_sq - left_sq;
                let sse = (left_sq - left_sum * left_sum / nl)
                    + (right_sq - right_sum * right_sum / nr);
                if best.as_ref().is_none_or(|b| sse < b.sse) {
                    best = Some(BestSplit {
                        feature,
                        threshold: (lo + hi) / 2.,
                        sse,
                    });
                }
            }
        }
        best
    }

    fn grow(&self, inputs: &[Vec<f32>], targets: &[f32], indices: &[usize], depth: usize) -> Node {
        let mean = indices.iter().map(|&i| targets[i] as f64).sum::<f64>() / indices.len() as f64;
        let leaf = Node::Leaf(mean as f32);
        if depth >= self.params.max_depth || indices.len() < self.params.min_samples_split.max(2) {
            return leaf;
        }
        let parent_sse = sse_of(targets, indices);
        if parent_sse <= 1e-12 {
            return leaf;
        }
        let Some(split) = self.find_split(inputs, targets, indices) else {
            return leaf;
        };
        if split.sse >= parent_sse {
            return leaf;
        }
        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&i| inputs[i][split.feature] <= split.threshold);
        Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(self.grow(inputs, targets, &left, depth + 1)),
            right: Box::new(self.grow(inputs, targets, &right, depth + 1)),
        }
    }

    fn fit_indices(&mut self, inputs: &[Vec<f32>], targets: &[f32], indices: &[usize]) {
        self.root = Some(self.grow(inputs, targets, indices, 0));
    }
}

impl Regressor for DecisionTree {
    fn fit(&mut self, inputs: &[Vec<f32>], targets: &[f32]) -> Result<()> {
        ensure!(inputs.len() == targets.len(), "inputs and targets differ in length");
        if inputs.is_empty() {
            return Ok(());
        }
        let indices: Vec<usize> = (0..inputs.len()).collect();
        self.fit_indices(inputs, targets, &indices);
        Ok(())
    }

    fn predict(&self, inputs: &[Vec<f32>]) -> Result<Vec<f32>> {
        Ok(match &self.root {
            Some(root) => inputs.iter().map(|x| root.predict(x)).collect(),
            None => vec![0.; inputs.len()],
        })
    }

    fn is_fitted(&self) -> bool {
        self.root.is_some()
    }

    fn save(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    fn load(&mut self, bytes: &[u8]) -> Result<()> {
        *self = decode(bytes)?;
        Ok(())
    }
}

/// Bagged ensemble of regression trees, each grown on a bootstrap sample.
#[derive(Debug, Clone, Encode, Decode)]
pub struct RandomForest {
    n_estimators: usize,
    params: TreeParams,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn new(n_estimators: usize, params: TreeParams) -> Self {
        Self {
            n_estimators,
            params,
            trees: vec![],
        }
    }
}

impl Regressor for RandomForest {
    fn fit(&mut self, inputs: &[Vec<f32>], targets: &[f32]) -> Result<()> {
        ensure!(inputs.len() == targets.len(), "inputs and targets differ in length");
        ensure!(self.n_estimators > 0, "a forest needs at least one tree");
        if inputs.is_empty() {
            return Ok(());
        }
        let n = inputs.len();
        self.trees = (0..self.n_estimators)
            .map(|_| {
                let bootstrap: Vec<usize> =
                    with_rng(|rng| (0..n).map(|_| rng.random_range(0..n)).collect());
                let mut tree = DecisionTree::new(self.params);
                tree.fit_indices(inputs, targets, &bootstrap);
                tree
            })
            .collect();
        Ok(())
    }

    fn predict(&self, inputs: &[Vec<f32>]) -> Result<Vec<f32>> {
        if self.trees.is_empty() {
            return Ok(vec![0.; inputs.len()]);
        }
        let mut sums = vec![0.; inputs.len()];
        for tree in &self.trees {
            for (sum, value) in sums.iter_mut().zip(tree.predict(inputs)?) {
                *sum += value;
            }
        }
        Ok(sums
            .into_iter()
            .map(|sum| sum / self.trees.len() as f32)
            .collect())
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    fn save(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    fn load(&mut self, bytes: &[u8]) -> Result<()> {
        *self = decode(bytes)?;
        Ok(())
    }
}
