use crate::{Regressor, decode, encode, kernels::Kernel};
use anyhow::{Result, ensure};
use bincode::{Decode, Encode};
use ndarray::{Array1, Array2};

#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode)]
pub struct SvrParams {
    pub kernel: Kernel,
    pub c: f32,
    pub epsilon: f32,
    pub max_iter: usize,
    pub tol: f32,
}

impl Default for SvrParams {
    fn default() -> Self {
        Self {
            kernel: Kernel::Rbf { gamma: None },
            c: 1.,
            epsilon: 0.1,
            max_iter: 200,
            tol: 1e-4,
        }
    }
}

/// Epsilon-insensitive support vector regression, trained by coordinate descent on the dual
/// with the intercept fixed to the target mean.
#[derive(Debug, Clone, Encode, Decode)]
pub struct SupportVectorRegressor {
    params: SvrParams,
    gamma: f32,
    intercept: f32,
    support_vectors: Vec<Vec<f32>>,
    coefficients: Vec<f32>,
    fitted: bool,
}

impl SupportVectorRegressor {
    pub fn new(params: SvrParams) -> Self {
        Self {
            params,
            gamma: 1.,
            intercept: 0.,
            support_vectors: vec![],
            coefficients: vec![],
            fitted: false,
        }
    }

    pub fn n_support(&self) -> usize {
        self.support_vectors.len()
    }
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    value.signum() * (value.abs() - threshold).max(0.)
}

impl Regressor for SupportVectorRegressor {
    fn fit(&mut self, inputs: &[Vec<f32>], targets: &[f32]) -> Result<()> {
        ensure!(inputs.len() == targets.len(), "inputs and targets differ in length");
        ensure!(self.params.c > 0., "C must be positive");
        if inputs.is_empty() {
            return Ok(());
        }
        let n = inputs.len();
        let kernel = self.params.kernel;
        let gamma = kernel.scaled_gamma(inputs);
        let intercept = targets.iter().sum::<f32>() / n as f32;
        let gram = Array2::from_shape_fn((n, n), |(i, j)| {
            kernel.eval(gamma, &inputs[i], &inputs[j]) as f64
        });
        let y: Array1<f64> = targets.iter().map(|t| (t - intercept) as f64).collect();
        let c = self.params.c as f64;
        let eps = self.params.epsilon as f64;

        let mut beta = Array1::<f64>::zeros(n);
        // gram * beta, kept in sync with every coordinate step
        let mut fitted_values = Array1::<f64>::zeros(n);
        for _ in 0..self.params.max_iter {
            let mut max_change = 0f64;
            for i in 0..n {
                let kii = gram[[i, i]];
                if kii <= 0. {
                    continue;
                }
                let gradient = fitted_values[i] - y[i];
                let unclipped = soft_threshold(beta[i] - gradient / kii, eps / kii);
                let updated = unclipped.clamp(-c, c);
                let delta = updated - beta[i];
                if delta != 0. {
                    beta[i] = updated;
                    fitted_values.scaled_add(delta, &gram.column(i));
                    max_change = max_change.max(delta.abs());
                }
            }
            if max_change < self.params.tol as f64 {
                break;
            }
        }

        let (support_vectors, coefficients): (Vec<Vec<f32>>, Vec<f32>) = beta
            .iter()
            .enumerate()
            .filter(|(_, b)| b.abs() > 1e-12)
            .map(|(i, b)| (inputs[i].clone(), *b as f32))
            .unzip();
        self.gamma = gamma;
        self.intercept = intercept;
        self.support_vectors = support_vectors;
        self.coefficients = coefficients;
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, inputs: &[Vec<f32>]) -> Result<Vec<f32>> {
        if !self.fitted {
            return Ok(vec![0.; inputs.len()]);
        }
        Ok(inputs
            .iter()
            .map(|x| {
                self.support_vectors
                    .iter()
                    .zip(&self.coefficients)
                    .map(|(sv, coef)| coef * self.params.kernel.eval(self.gamma, sv, x))
                    .sum::<f32>()
                    + self.intercept
            })
            .collect())
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }

    fn save(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    fn load(&mut self, bytes: &[u8]) -> Result<()> {
        *self = decode(bytes)?;
        Ok(())
    }
}
