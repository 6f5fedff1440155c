use crate::{Agent, argmax, epsilon_greedy, state_action};
use anyhow::{Result, bail, ensure};
use fabench_approximators::{Regressor, RegressorKind};
use fabench_core::{
    buffers::Transition,
    config::{Config, EpsilonSchedule},
};
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FqiParams {
    /// Number of `update` calls between refits
    pub update_freq: usize,
    /// Timesteps between model checkpoints
    pub model_save_freq: usize,
    pub model_save_capacity: usize,
}

impl Default for FqiParams {
    fn default() -> Self {
        Self {
            update_freq: 1,
            model_save_freq: 250,
            model_save_capacity: 20,
        }
    }
}

/// Fitted Q iteration over a batch regressor taking `state ++ one_hot(action)` as input.
pub struct FqiAgent {
    model: RegressorKind,
    params: FqiParams,
    exploration: EpsilonSchedule,
    epsilon: f32,
    gamma: f32,
    n_actions: usize,
    updates: usize,
    next_checkpoint: usize,
    // retained model history, newest last
    checkpoints: VecDeque<Vec<u8>>,
}

impl FqiAgent {
    pub fn new(
        model: RegressorKind,
        n_actions: usize,
        config: &Config,
        params: FqiParams,
    ) -> Result<Self> {
        ensure!(params.update_freq > 0, "update_freq must be positive");
        ensure!(params.model_save_freq > 0, "model_save_freq must be positive");
        Ok(Self {
            model,
            params,
            exploration: config.exploration,
            epsilon: config.exploration.epsilon,
            gamma: config.gamma,
            n_actions,
            updates: 0,
            next_checkpoint: params.model_save_freq,
            checkpoints: VecDeque::with_capacity(params.model_save_capacity),
        })
    }

    /// Serialised snapshots of the model, oldest first.
    pub fn checkpoints(&self) -> &VecDeque<Vec<u8>> {
        &self.checkpoints
    }

    /// Rolls the model back to the retained snapshot at `index`, counting from the oldest.
    pub fn restore_checkpoint(&mut self, index: usize) -> Result<()> {
        let Some(bytes) = self.checkpoints.get(index) else {
            bail!("no checkpoint {index}, {} are retained", self.checkpoints.len());
        };
        self.model.load(bytes)
    }

    pub fn q_values(&self, states: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        let inputs: Vec<Vec<f32>> = states
            .iter()
            .flat_map(|state| {
                (0..self.n_actions).map(move |a| state_action(state, a, self.n_actions))
            })
            .collect();
        let predictions = self.model.predict(&inputs)?;
        Ok(predictions
            .chunks(self.n_actions)
            .map(<[f32]>::to_vec)
            .collect())
    }
}

impl Agent for FqiAgent {
    fn act(&mut self, observation: &[f32], explore: bool) -> Result<usize> {
        epsilon_greedy(self.epsilon, self.n_actions, explore, || {
            let q = self.q_values(&[observation.to_vec()])?;
            Ok(q.first().map_or(0, |values| argmax(values)))
        })
    }

    fn update(&mut self, batch: &[Transition]) -> Result<()> {
        self.updates += 1;
        if batch.is_empty() || self.updates % self.params.update_freq != 0 {
            return Ok(());
        }
        let next_states: Vec<Vec<f32>> = batch.iter().map(|t| t.next_state.clone()).collect();
        let next_q = self.q_values(&next_states)?;
        let targets: Vec<f32> = batch
            .iter()
            .zip(&next_q)
            .map(|(t, q)| {
                let bootstrap = if t.done {
                    0.
                } else {
                    q.iter().copied().fold(f32::NEG_INFINITY, f32::max)
                };
                t.reward + self.gamma * bootstrap
            })
            .collect();
        let inputs: Vec<Vec<f32>> = batch
            .iter()
            .map(|t| state_action(&t.state, t.action, self.n_actions))
            .collect();
        self.model.fit(&inputs, &targets)
    }

    fn schedule_hyperparameters(&mut self, timestep: usize, max_timesteps: usize) -> Result<()> {
        self.epsilon = self.exploration.value(timestep, max_timesteps);
        if timestep >= self.next_checkpoint && self.model.is_fitted() {
            self.checkpoints.push_back(self.model.save()?);
            while self.checkpoints.len() > self.params.model_save_capacity {
                self.checkpoints.pop_front();
            }
            self.next_checkpoint = timestep + self.params.model_save_freq;
            debug!(timestep, kept = self.checkpoints.len(), "saved model checkpoint");
        }
        Ok(())
    }
}
