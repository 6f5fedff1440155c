use anyhow::{Context, Result, anyhow};
use candle_core::{DType, Device, Tensor};
use candle_nn::{Activation, Module, Sequential, VarBuilder, VarMap, linear, seq};
use fabench_core::rng::with_rng;
use itertools::Itertools;
use rand::Rng;
use std::path::Path;

/// A candle model mapping a batch of observations to one value per action.
pub trait QNetwork: Sized {
    fn forward(&self, observations: &[Vec<f32>]) -> candle_core::Result<Tensor>;

    fn varmap(&self) -> &VarMap;

    /// Builds the same architecture on a fresh varmap. Weights are not copied.
    fn fresh(&self) -> Result<Self>;

    fn duplicate(&self) -> Result<Self> {
        let copy = self.fresh()?;
        copy_weights(self.varmap(), copy.varmap())?;
        Ok(copy)
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.varmap().save(path)?;
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        let tensors = candle_core::safetensors::load(path, &Device::Cpu)?;
        let data = self
            .varmap()
            .data()
            .lock()
            .map_err(|_| anyhow!("varmap lock poisoned"))?;
        for (name, var) in data.iter() {
            let tensor = tensors
                .get(name)
                .with_context(|| format!("{} has no {name}", path.display()))?;
            var.set(tensor)?;
        }
        Ok(())
    }
}

/// Linear layers of the given sizes with ReLU between them, named `{prefix}{idx}`.
fn mlp(
    input_dim: usize,
    layers: &[usize],
    vb: &VarBuilder,
    prefix: &str,
) -> candle_core::Result<Sequential> {
    let mut nn = seq();
    let mut last_dim = input_dim;
    for (idx, &size) in layers.iter().enumerate() {
        nn = nn.add(linear(last_dim, size, vb.pp(format!("{prefix}{idx}")))?);
        if idx + 1 < layers.len() {
            nn = nn.add(Activation::Relu);
        }
        last_dim = size;
    }
    Ok(nn)
}

// candle's cpu initialisers can not be seeded, so we overwrite them from our own generator
fn seeded_init(varmap: &VarMap) -> Result<()> {
    let data = varmap
        .data()
        .lock()
        .map_err(|_| anyhow!("varmap lock poisoned"))?;
    let fan_ins: Vec<(String, usize)> = data
        .iter()
        .filter(|(name, _)| name.ends_with("weight"))
        .map(|(name, var)| (name.trim_end_matches("weight").to_owned(), var.dims()[1]))
        .collect();
    for name in data.keys().sorted() {
        let var = &data[name];
        let prefix = name
            .trim_end_matches("weight")
            .trim_end_matches("bias")
            .to_owned();
        let fan_in = fan_ins
            .iter()
            .find(|(p, _)| *p == prefix)
            .map(|(_, fan_in)| *fan_in)
            .with_context(|| format!("no weight found for {name}"))?;
        let bound = 1. / (fan_in as f32).sqrt();
        let values: Vec<f32> = with_rng(|rng| {
            (0..var.elem_count())
                .map(|_| rng.random_range(-bound..=bound))
                .collect()
        });
        var.set(&Tensor::from_vec(values, var.shape().clone(), var.device())?)?;
    }
    Ok(())
}

pub fn copy_weights(from: &VarMap, to: &VarMap) -> Result<()> {
    let from = from
        .data()
        .lock()
        .map_err(|_| anyhow!("varmap lock poisoned"))?;
    let to = to.data().lock().map_err(|_| anyhow!("varmap lock poisoned"))?;
    for (name, var) in to.iter() {
        let source = from
            .get(name)
            .with_context(|| format!("source network has no {name}"))?;
        var.set(source.as_tensor())?;
    }
    Ok(())
}

fn batch_to_tensor(
    rows: &[Vec<f32>],
    width: usize,
    device: &Device,
) -> candle_core::Result<Tensor> {
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Tensor::from_vec(flat, (rows.len(), width), device)
}

pub struct NeuralNetwork {
    net: Sequential,
    varmap: VarMap,
    input_dim: usize,
    hidden_sizes: Vec<usize>,
    output_dim: usize,
    device: Device,
}

impl NeuralNetwork {
    pub fn new(input_dim: usize, hidden_sizes: &[usize], output_dim: usize) -> Result<Self> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let layers: Vec<usize> = hidden_sizes
            .iter()
            .copied()
            .chain(std::iter::once(output_dim))
            .collect();
        let net = mlp(input_dim, &layers, &vb, "q")?;
        seeded_init(&varmap)?;
        Ok(Self {
            net,
            varmap,
            input_dim,
            hidden_sizes: hidden_sizes.to_vec(),
            output_dim,
            device,
        })
    }
}

impl QNetwork for NeuralNetwork {
    fn forward(&self, observations: &[Vec<f32>]) -> candle_core::Result<Tensor> {
        let xs = batch_to_tensor(observations, self.input_dim, &self.device)?;
        self.net.forward(&xs)
    }

    fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    fn fresh(&self) -> Result<Self> {
        Self::new(self.input_dim, &self.hidden_sizes, self.output_dim)
    }
}

/// Exponent sets of every monomial of total degree `1..=degree` over `input_dim` variables.
fn monomials(input_dim: usize, degree: usize) -> Vec<Vec<usize>> {
    (1..=degree)
        .flat_map(|d| (0..input_dim).combinations_with_replacement(d))
        .collect()
}

pub struct LinearModel {
    net: Sequential,
    varmap: VarMap,
    input_dim: usize,
    poly_degree: usize,
    monomials: Vec<Vec<usize>>,
    output_dim: usize,
    device: Device,
}

impl LinearModel {
    pub fn new(input_dim: usize, poly_degree: usize, output_dim: usize) -> Result<Self> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let monomials = monomials(input_dim, poly_degree);
        let net = mlp(monomials.len(), &[output_dim], &vb, "linear")?;
        seeded_init(&varmap)?;
        Ok(Self {
            net,
            varmap,
            input_dim,
            poly_degree,
            monomials,
            output_dim,
            device,
        })
    }

    pub fn features(&self, observation: &[f32]) -> Vec<f32> {
        self.monomials
            .iter()
            .map(|monomial| monomial.iter().map(|&i| observation[i]).product())
            .collect()
    }
}

impl QNetwork for LinearModel {
    fn forward(&self, observations: &[Vec<f32>]) -> candle_core::Result<Tensor> {
        let features: Vec<Vec<f32>> = observations.iter().map(|o| self.features(o)).collect();
        let xs = batch_to_tensor(&features, self.monomials.len(), &self.device)?;
        self.net.forward(&xs)
    }

    fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    fn fresh(&self) -> Result<Self> {
        Self::new(self.input_dim, self.poly_degree, self.output_dim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabench_core::rng::reseed;

    #[test]
    fn quadratic_features_cover_cross_terms() -> Result<()> {
        reseed(0);
        let model = LinearModel::new(2, 2, 4)?;
        // x, y, x^2, xy, y^2
        assert_eq!(model.features(&[2., 3.]), vec![2., 3., 4., 6., 9.]);
        Ok(())
    }

    #[test]
    fn seeded_networks_are_identical() -> Result<()> {
        reseed(3);
        let a = NeuralNetwork::new(2, &[8, 8], 4)?;
        reseed(3);
        let b = NeuralNetwork::new(2, &[8, 8], 4)?;
        let obs = vec![vec![0.25, 0.75]];
        let qa: Vec<Vec<f32>> = a.forward(&obs)?.to_vec2()?;
        let qb: Vec<Vec<f32>> = b.forward(&obs)?.to_vec2()?;
        assert_eq!(qa, qb);
        assert_eq!(qa[0].len(), 4);
        Ok(())
    }

    #[test]
    fn duplicate_matches_and_survives_save_load() -> Result<()> {
        reseed(1);
        let net = NeuralNetwork::new(2, &[4], 3)?;
        let copy = net.duplicate()?;
        let obs = vec![vec![0.5, 0.5], vec![1., 0.]];
        let original: Vec<Vec<f32>> = net.forward(&obs)?.to_vec2()?;
        assert_eq!(original, copy.forward(&obs)?.to_vec2::<f32>()?);

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("q.safetensors");
        net.save(&path)?;
        let mut restored = net.fresh()?;
        restored.load(&path)?;
        assert_eq!(original, restored.forward(&obs)?.to_vec2::<f32>()?);
        Ok(())
    }
}
