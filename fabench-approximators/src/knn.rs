use crate::{Regressor, decode, encode, kernels::squared_distance};
use anyhow::{Result, ensure};
use bincode::{Decode, Encode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum Weights {
    Uniform,
    /// Inverse distance, exact matches take all the weight
    Distance,
}

#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode)]
pub struct KnnParams {
    pub n_neighbors: usize,
    pub weights: Weights,
}

impl Default for KnnParams {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            weights: Weights::Uniform,
        }
    }
}

/// Brute force k-nearest-neighbours regression.
#[derive(Debug, Clone, Encode, Decode)]
pub struct KNeighboursRegressor {
    params: KnnParams,
    inputs: Vec<Vec<f32>>,
    targets: Vec<f32>,
}

impl KNeighboursRegressor {
    pub fn new(params: KnnParams) -> Self {
        Self {
            params,
            inputs: vec![],
            targets: vec![],
        }
    }

    fn predict_one(&self, x: &[f32]) -> f32 {
        let mut distances: Vec<(f32, usize)> = self
            .inputs
            .iter()
            .enumerate()
            .map(|(i, input)| (squared_distance(input, x).sqrt(), i))
            .collect();
        let k = self.params.n_neighbors.min(distances.len());
        if k < distances.len() {
            distances.select_nth_unstable_by(k - 1, |a, b| a.0.total_cmp(&b.0));
        }
        let neighbours = &distances[..k];
        match self.params.weights {
            Weights::Uniform => {
                neighbours.iter().map(|(_, i)| self.targets[*i]).sum::<f32>() / k as f32
            }
            Weights::Distance => {
                let exact: Vec<f32> = neighbours
                    .iter()
                    .filter(|(d, _)| *d == 0.)
                    .map(|(_, i)| self.targets[*i])
                    .collect();
                if !exact.is_empty() {
                    return exact.iter().sum::<f32>() / exact.len() as f32;
                }
                let (weighted, total) = neighbours
                    .iter()
                    .fold((0., 0.), |(weighted, total), (d, i)| {
                        (weighted + self.targets[*i] / d, total + 1. / d)
                    });
                weighted / total
            }
        }
    }
}

impl Regressor for KNeighboursRegressor {
    fn fit(&mut self, inputs: &[Vec<f32>], targets: &[f32]) -> Result<()> {
        ensure!(inputs.len() == targets.len(), "inputs and targets differ in length");
        ensure!(self.params.n_neighbors > 0, "n_neighbors must be positive");
        self.inputs = inputs.to_vec();
        self.targets = targets.to_vec();
        Ok(())
    }

    fn predict(&self, inputs: &[Vec<f32>]) -> Result<Vec<f32>> {
        if self.inputs.is_empty() {
            return Ok(vec![0.; inputs.len()]);
        }
        Ok(inputs.iter().map(|x| self.predict_one(x)).collect())
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
