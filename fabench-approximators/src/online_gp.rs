use crate::kernels::rbf;
use anyhow::{Result, ensure};
use ndarray::{Array1, Array2, Axis, array, concatenate, s};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnlineGpParams {
    /// Observation noise standard deviation
    pub sigma_0: f32,
    /// Prior mean, returned for inputs far from every basis vector
    pub init: f32,
    /// RBF gamma, defaults to `1 / n_features`
    pub gamma: Option<f32>,
    /// Novelty threshold for admitting a new basis vector
    pub epsilon_tol: f32,
    pub basis_limit: usize,
}

impl Default for OnlineGpParams {
    fn default() -> Self {
        Self {
            sigma_0: 0.5,
            init: 0.,
            gamma: None,
            epsilon_tol: 0.085,
            basis_limit: 1000,
        }
    }
}

pub trait OnlineRegressor {
    fn update(&mut self, input: &[f32], target: f32) -> Result<()>;

    fn predict(&self, inputs: &[Vec<f32>]) -> Result<Vec<f32>>;
}

/// Sparse online gaussian process: kernel recursive least squares over a dictionary grown by an
/// approximate linear dependence test.
#[derive(Debug, Clone)]
pub struct OnlineGaussianProcess {
    params: OnlineGpParams,
    gamma: f32,
    basis: Vec<Vec<f32>>,
    k_inv: Array2<f64>,
    p: Array2<f64>,
    alpha: Array1<f64>,
}

fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    a.view()
        .insert_axis(Axis(1))
        .dot(&b.view().insert_axis(Axis(0)))
}

/// Borders a symmetric `m x m` matrix with `edge` as its new last row and column.
fn grow(matrix: &Array2<f64>, edge: &Array1<f64>, corner: f64) -> Array2<f64> {
    let m = matrix.nrows();
    let mut grown = Array2::<f64>::zeros((m + 1, m + 1));
    grown.slice_mut(s![..m, ..m]).assign(matrix);
    grown.slice_mut(s![..m, m]).assign(edge);
    grown.slice_mut(s![m, ..m]).assign(edge);
    grown[[m, m]] = corner;
    grown
}

impl OnlineGaussianProcess {
    pub fn new(input_dim: usize, params: OnlineGpParams) -> Result<Self> {
        ensure!(params.basis_limit > 0, "basis_limit must be positive");
        let gamma = params.gamma.unwrap_or(1. / input_dim.max(1) as f32);
        Ok(Self {
            params,
            gamma,
            basis: vec![],
            k_inv: Array2::zeros((0, 0)),
            p: Array2::zeros((0, 0)),
            alpha: Array1::zeros(0),
        })
    }

    pub fn basis_len(&self) -> usize {
        self.basis.len()
    }

    fn kernel_vector(&self, x: &[f32]) -> Array1<f64> {
        self.basis
            .iter()
            .map(|b| rbf(self.gamma, b, x) as f64)
            .collect()
    }

    fn predict_one(&self, x: &[f32]) -> f32 {
        let k = self.kernel_vector(x);
        (k.dot(&self.alpha) + self.params.init as f64) as f32
    }
}

impl OnlineRegressor for OnlineGaussianProcess {
    fn update(&mut self, input: &[f32], target: f32) -> Result<()> {
        let noise = (self.params.sigma_0 as f64).powi(2);
        let residual_target = (target - self.params.init) as f64;
        let ktt = rbf(self.gamma, input, input) as f64;
        if self.basis.is_empty() {
            self.basis.push(input.to_vec());
            self.k_inv = array![[1. / ktt]];
            self.p = Array2::eye(1);
            self.alpha = array![residual_target / (ktt + noise)];
            return Ok(());
        }
        let m = self.basis.len();
        let k = self.kernel_vector(input);
        let a = self.k_inv.dot(&k);
        let delta = ktt - k.dot(&a);
        let error = residual_target - k.dot(&self.alpha);
        if delta > self.params.epsilon_tol as f64 && m < self.params.basis_limit {
            let k_inv = &self.k_inv + &(outer(&a, &a) / delta);
            self.k_inv = grow(&k_inv, &(-&a / delta), 1. / delta);
            self.p = grow(&self.p, &Array1::zeros(m), 1.);
            let step = error / (delta + noise);
            self.alpha.scaled_add(-step, &a);
            let alpha = concatenate(Axis(0), &[self.alpha.view(), array![step].view()])?;
            self.alpha = alpha;
            self.basis.push(input.to_vec());
        } else {
            let pa = self.p.dot(&a);
            let q = &pa / (noise + a.dot(&pa));
            // P is symmetric, so a^T P is pa^T
            self.p -= &outer(&q, &pa);
            self.alpha.scaled_add(error, &self.k_inv.dot(&q));
        }
        Ok(())
    }

    fn predict(&self, inputs: &[Vec<f32>]) -> Result<Vec<f32>> {
        Ok(inputs.iter().map(|x| self.predict_one(x)).collect())
    }
}
