use anyhow::{Result, bail};

#[derive(Debug, Clone, PartialEq)]
pub enum Space {
    /// Actions `0..n`
    Discrete(usize),
    /// Per dimension bounds of a real valued vector
    Box { low: Vec<f32>, high: Vec<f32> },
}

impl Space {
    pub fn unit_box(dim: usize) -> Self {
        Self::Box {
            low: vec![0.; dim],
            high: vec![1.; dim],
        }
    }

    pub fn unbounded(dim: usize) -> Self {
        Self::Box {
            low: vec![f32::NEG_INFINITY; dim],
            high: vec![f32::INFINITY; dim],
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Discrete(n) => *n,
            Self::Box { low, .. } => low.len(),
        }
    }
}

/// What an agent needs to know about an environment before its first step.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentDescription {
    pub observation_space: Space,
    pub action_space: Space,
}

impl EnvironmentDescription {
    pub fn new(observation_space: Space, action_space: Space) -> Self {
        Self {
            observation_space,
            action_space,
        }
    }

    pub fn observation_size(&self) -> usize {
        self.observation_space.size()
    }

    /// Number of actions, for environments with a discrete action space.
    pub fn n_actions(&self) -> Result<usize> {
        match self.action_space {
            Space::Discrete(n) => Ok(n),
            Space::Box { .. } => bail!("only discrete action spaces are supported"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapShot {
    pub state: Vec<f32>,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
}

impl SnapShot {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// A discrete-action environment with gym-style reset/step semantics.
pub trait Env {
    fn reset(&mut self, seed: u64) -> Result<Vec<f32>>;

    fn step(&mut self, action: usize) -> Result<SnapShot>;

    fn env_description(&self) -> EnvironmentDescription;

    fn render(&mut self) -> Result<()> {
        Ok(())
    }

    /// Releases whatever the environment holds. The environment must be usable again after the
    /// next `reset`.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
