use crate::{
    Regressor, decode, encode,
    kernels::{cholesky, cholesky_solve, rbf},
};
use anyhow::{Result, ensure};
use bincode::{Decode, Encode};
use ndarray::{Array1, Array2};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode)]
pub struct GpParams {
    /// Added to the kernel diagonal
    pub alpha: f32,
    pub normalize_y: bool,
    pub length_scale: f32,
}

impl Default for GpParams {
    fn default() -> Self {
        Self {
            alpha: 1e-10,
            normalize_y: false,
            length_scale: 1.,
        }
    }
}

/// Exact gaussian process regression with a fixed RBF kernel. Only the posterior mean is kept.
#[derive(Debug, Clone, Encode, Decode)]
pub struct GaussianProcessRegressor {
    params: GpParams,
    inputs: Vec<Vec<f32>>,
    weights: Vec<f64>,
    y_mean: f64,
    y_std: f64,
}

// Identical rows would make the gram matrix singular, so each distinct input keeps the mean of its
// targets.
fn merge_duplicates(inputs: &[Vec<f32>], targets: &[f32]) -> (Vec<Vec<f32>>, Vec<f64>) {
    let mut positions: HashMap<Vec<u32>, usize> = HashMap::new();
    let mut unique: Vec<Vec<f32>> = vec![];
    let mut sums: Vec<(f64, usize)> = vec![];
    for (input, target) in inputs.iter().zip(targets) {
        let key: Vec<u32> = input.iter().map(|v| v.to_bits()).collect();
        let idx = *positions.entry(key).or_insert_with(|| {
            unique.push(input.clone());
            sums.push((0., 0));
            unique.len() - 1
        });
        sums[idx].0 += *target as f64;
        sums[idx].1 += 1;
    }
    let means = sums.into_iter().map(|(sum, n)| sum / n as f64).collect();
    (unique, means)
}

impl GaussianProcessRegressor {
    pub fn new(params: GpParams) -> Self {
        Self {
            params,
            inputs: vec![],
            weights: vec![],
            y_mean: 0.,
            y_std: 1.,
        }
    }

    fn gamma(&self) -> f32 {
        1. / (2. * self.params.length_scale.powi(2))
    }
}

impl Regressor for GaussianProcessRegressor {
    fn fit(&mut self, inputs: &[Vec<f32>], targets: &[f32]) -> Result<()> {
        ensure!(inputs.len() == targets.len(), "inputs and targets differ in length");
        ensure!(self.params.length_scale > 0., "length_scale must be positive");
        if inputs.is_empty() {
            return Ok(());
        }
        let (inputs, targets) = merge_duplicates(inputs, targets);
        let n = inputs.len();
        let (y_mean, y_std) = if self.params.normalize_y {
            let mean = targets.iter().sum::<f64>() / n as f64;
            let var = targets.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n as f64;
            (mean, if var > 0. { var.sqrt() } else { 1. })
        } else {
            (0., 1.)
        };
        let y: Array1<f64> = targets.iter().map(|t| (t - y_mean) / y_std).collect();
        let gamma = self.gamma();
        let mut gram = Array2::from_shape_fn((n, n), |(i, j)| {
            rbf(gamma, &inputs[i], &inputs[j]) as f64
        });
        let alpha = self.params.alpha as f64;
        gram.diag_mut().mapv_inplace(|v| v + alpha);
        let lower = cholesky(&gram)?;
        self.weights = cholesky_solve(&lower, &y).to_vec();
        self.inputs = inputs;
        self.y_mean = y_mean;
        self.y_std = y_std;
        Ok(())
    }

    fn predict(&self, inputs: &[Vec<f32>]) -> Result<Vec<f32>> {
        if self.inputs.is_empty() {
            return Ok(vec![0.; inputs.len()]);
        }
        let gamma = self.gamma();
        Ok(inputs
            .iter()
            .map(|x| {
                let mean: f64 = self
                    .inputs
                    .iter()
                    .zip(&self.weights)
                    .map(|(train, w)| rbf(gamma, train, x) as f64 * w)
                    .sum();
                (mean * self.y_std + self.y_mean) as f32
            })
            .collect())
    }

    fn is_fitted(&self) -> bool {
        !self.inputs.is_empty()
    }

    fn save(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    fn load(&mut self, bytes: &[u8]) -> Result<()> {
        *self = decode(bytes)?;
        Ok(())
    }
}
