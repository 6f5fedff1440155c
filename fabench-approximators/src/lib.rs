pub mod gp;
pub mod kernels;
pub mod knn;
pub mod network;
pub mod online_gp;
pub mod svr;
pub mod tree;

use anyhow::{Result, bail};
use bincode::{Decode, Encode, config};
use enum_dispatch::enum_dispatch;
use gp::{GaussianProcessRegressor, GpParams};
use knn::{KNeighboursRegressor, KnnParams};
use online_gp::OnlineGpParams;
use svr::{SupportVectorRegressor, SvrParams};
use tree::{DecisionTree, RandomForest, TreeParams};

/// Batch regression models, refit from scratch on every call to `fit`. An unfitted model predicts
/// zero everywhere.
#[enum_dispatch]
pub trait Regressor {
    fn fit(&mut self, inputs: &[Vec<f32>], targets: &[f32]) -> Result<()>;

    fn predict(&self, inputs: &[Vec<f32>]) -> Result<Vec<f32>>;

    fn is_fitted(&self) -> bool;

    fn save(&self) -> Result<Vec<u8>>;

    fn load(&mut self, bytes: &[u8]) -> Result<()>;
}

#[enum_dispatch(Regressor)]
#[derive(Debug, Clone)]
pub enum RegressorKind {
    DecisionTree,
    RandomForest,
    SupportVectorRegressor,
    KNeighboursRegressor,
    GaussianProcessRegressor,
}

pub(crate) fn encode<T: Encode>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::encode_to_vec(value, config::standard())?)
}

pub(crate) fn decode<T: Decode<()>>(bytes: &[u8]) -> Result<T> {
    let (value, _) = bincode::decode_from_slice(bytes, config::standard())?;
    Ok(value)
}

/// The model families a variant can be benchmarked with, together with their parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ApproximatorSpec {
    NeuralNetwork { hidden_sizes: Vec<usize> },
    LinearModel { poly_degree: usize },
    DecisionTree(TreeParams),
    RandomForest { n_estimators: usize, tree: TreeParams },
    SupportVectorRegressor(SvrParams),
    KNeighbours(KnnParams),
    GaussianProcess(GpParams),
    OnlineGaussianProcess(OnlineGpParams),
}

impl ApproximatorSpec {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NeuralNetwork { .. } => "neural network",
            Self::LinearModel { .. } => "linear model",
            Self::DecisionTree(_) => "decision tree",
            Self::RandomForest { .. } => "random forest",
            Self::SupportVectorRegressor(_) => "support vector regressor",
            Self::KNeighbours(_) => "k-neighbours regressor",
            Self::GaussianProcess(_) => "gaussian process",
            Self::OnlineGaussianProcess(_) => "online gaussian process",
        }
    }

    /// Builds the batch regressor for this spec, if it is one.
    pub fn build_regressor(&self) -> Result<RegressorKind> {
        Ok(match self {
            Self::DecisionTree(params) => DecisionTree::new(*params).into(),
            Self::RandomForest { n_estimators, tree } => {
                RandomForest::new(*n_estimators, *tree).into()
            }
            Self::SupportVectorRegressor(params) => SupportVectorRegressor::new(*params).into(),
            Self::KNeighbours(params) => KNeighboursRegressor::new(*params).into(),
            Self::GaussianProcess(params) => GaussianProcessRegressor::new(*params).into(),
            other => bail!("{} is not a batch regressor", other.name()),
        })
    }
}
