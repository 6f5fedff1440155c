use anyhow::{Result, bail};
use bincode::{Decode, Encode};
use ndarray::{Array1, Array2, s};

#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode)]
pub enum Kernel {
    /// `exp(-gamma * |a - b|^2)`, gamma defaults to `1 / (n_features * var(X))`
    Rbf { gamma: Option<f32> },
    /// `(gamma * <a, b> + coef0)^degree`
    Poly {
        degree: i32,
        gamma: Option<f32>,
        coef0: f32,
    },
    Linear,
}

impl Kernel {
    /// Resolves the "scale" default of gamma against the training inputs.
    pub fn scaled_gamma(&self, inputs: &[Vec<f32>]) -> f32 {
        let explicit = match self {
            Self::Rbf { gamma } | Self::Poly { gamma, .. } => *gamma,
            Self::Linear => Some(1.),
        };
        explicit.unwrap_or_else(|| {
            let values: Vec<f32> = inputs.iter().flatten().copied().collect();
            let n_features = inputs.first().map_or(1, Vec::len).max(1);
            let n = values.len().max(1) as f32;
            let mean = values.iter().sum::<f32>() / n;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
            if var > 0. {
                1. / (n_features as f32 * var)
            } else {
                1.
            }
        })
    }

    pub fn eval(&self, gamma: f32, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Rbf { .. } => rbf(gamma, a, b),
            Self::Poly { degree, coef0, .. } => (gamma * dot(a, b) + coef0).powi(*degree),
            Self::Linear => dot(a, b),
        }
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

pub fn rbf(gamma: f32, a: &[f32], b: &[f32]) -> f32 {
    (-gamma * squared_distance(a, b)).exp()
}

/// Lower triangular factor of a symmetric positive definite matrix.
pub fn cholesky(matrix: &Array2<f64>) -> Result<Array2<f64>> {
    let n = matrix.nrows();
    let mut lower = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let sum = matrix[[i, j]] - lower.slice(s![i, ..j]).dot(&lower.slice(s![j, ..j]));
            if i == j {
                if sum <= 0. {
                    bail!("kernel matrix is not positive definite, try a larger alpha");
                }
                lower[[i, i]] = sum.sqrt();
            } else {
                lower[[i, j]] = sum / lower[[j, j]];
            }
        }
    }
    Ok(lower)
}

/// Solves `L L^T x = b` given the cholesky factor `L`.
pub fn cholesky_solve(lower: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = lower.nrows();
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let sum = lower.slice(s![i, ..i]).dot(&y.slice(s![..i]));
        y[i] = (b[i] - sum) / lower[[i, i]];
    }
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum = lower.slice(s![i + 1.., i]).dot(&x.slice(s![i + 1..]));
        x[i] = (y[i] - sum) / lower[[i, i]];
    }
    x
}
