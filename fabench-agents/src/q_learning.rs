use crate::{Agent, argmax, epsilon_greedy};
use anyhow::{Result, ensure};
use candle_core::{Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, loss::mse};
use fabench_approximators::network::{LinearModel, NeuralNetwork, QNetwork, copy_weights};
use fabench_core::{
    buffers::Transition,
    config::{Config, EpsilonSchedule},
};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QLearningParams {
    pub learning_rate: f64,
    /// Number of updates between target network syncs
    pub target_update_freq: usize,
    /// Timesteps between learning rate decays
    pub lr_step_size: usize,
    pub lr_gamma: f64,
}

impl Default for QLearningParams {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            target_update_freq: 50,
            lr_step_size: 250,
            lr_gamma: 0.95,
        }
    }
}

/// Epsilon greedy Q-learning with a target network, over any candle backed `QNetwork`.
pub struct QLearningAgent<M: QNetwork> {
    q: M,
    target: M,
    optimizer: AdamW,
    params: QLearningParams,
    exploration: EpsilonSchedule,
    epsilon: f32,
    gamma: f32,
    n_actions: usize,
    updates: usize,
}

pub type DqnAgent = QLearningAgent<NeuralNetwork>;
pub type LinearAgent = QLearningAgent<LinearModel>;

impl<M: QNetwork> QLearningAgent<M> {
    pub fn new(q: M, n_actions: usize, config: &Config, params: QLearningParams) -> Result<Self> {
        ensure!(params.target_update_freq > 0, "target_update_freq must be positive");
        ensure!(params.lr_step_size > 0, "lr_step_size must be positive");
        let target = q.duplicate()?;
        let optimizer = AdamW::new(
            q.varmap().all_vars(),
            ParamsAdamW {
                lr: params.learning_rate,
                weight_decay: 0.,
                ..Default::default()
            },
        )?;
        Ok(Self {
            q,
            target,
            optimizer,
            params,
            exploration: config.exploration,
            epsilon: config.exploration.epsilon,
            gamma: config.gamma,
            n_actions,
            updates: 0,
        })
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    pub fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    pub fn q_values(&self, observation: &[f32]) -> Result<Vec<f32>> {
        Ok(self.q.forward(&[observation.to_vec()])?.squeeze(0)?.to_vec1()?)
    }
}

impl<M: QNetwork> Agent for QLearningAgent<M> {
    fn act(&mut self, observation: &[f32], explore: bool) -> Result<usize> {
        epsilon_greedy(self.epsilon, self.n_actions, explore, || {
            Ok(argmax(&self.q_values(observation)?))
        })
    }

    fn update(&mut self, batch: &[Transition]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let device = Device::Cpu;
        let n = batch.len();
        let states: Vec<Vec<f32>> = batch.iter().map(|t| t.state.clone()).collect();
        let next_states: Vec<Vec<f32>> = batch.iter().map(|t| t.next_state.clone()).collect();
        let actions: Vec<u32> = batch.iter().map(|t| t.action as u32).collect();
        let rewards: Vec<f32> = batch.iter().map(|t| t.reward).collect();
        let not_done: Vec<f32> = batch
            .iter()
            .map(|t| if t.done { 0. } else { 1. })
            .collect();
        let actions = Tensor::from_vec(actions, (n, 1), &device)?;
        let rewards = Tensor::from_vec(rewards, n, &device)?;
        let not_done = Tensor::from_vec(not_done, n, &device)?;

        let next_q = self.target.forward(&next_states)?.max(1)?.detach();
        let bootstrap = (next_q * not_done)?.affine(self.gamma as f64, 0.)?;
        let targets = (rewards + bootstrap)?;
        let q = self.q.forward(&states)?.gather(&actions, 1)?.squeeze(1)?;
        let loss = mse(&q, &targets)?;
        self.optimizer.backward_step(&loss)?;

        self.updates += 1;
        if self.updates % self.params.target_update_freq == 0 {
            trace!(updates = self.updates, "syncing target network");
            copy_weights(self.q.varmap(), self.target.varmap())?;
        }
        Ok(())
    }

    fn schedule_hyperparameters(&mut self, timestep: usize, max_timesteps: usize) -> Result<()> {
        self.epsilon = self.exploration.value(timestep, max_timesteps);
        let decays = (timestep / self.params.lr_step_size) as i32;
        self.optimizer
            .set_learning_rate(self.params.learning_rate * self.params.lr_gamma.powi(decays));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabench_core::rng::reseed;

    fn bandit_transition(action: usize) -> Transition {
        Transition {
            state: vec![0.5, 0.5],
            action,
            next_state: vec![0.5, 0.5],
            reward: action as f32,
            done: true,
        }
    }

    #[test]
    fn learns_the_better_arm() -> Result<()> {
        reseed(0);
        let params = QLearningParams {
            learning_rate: 0.01,
            ..Default::default()
        };
        let mut agent = DqnAgent::new(
            NeuralNetwork::new(2, &[8], 2)?,
            2,
            &Config::default(),
            params,
        )?;
        let batch = vec![bandit_transition(0), bandit_transition(1)];
        for _ in 0..500 {
            agent.update(&batch)?;
        }
        let q = agent.q_values(&[0.5, 0.5])?;
        assert!((q[1] - 1.).abs() < 0.15, "{q:?}");
        assert!(q[0].abs() < 0.15, "{q:?}");
        assert_eq!(agent.act(&[0.5, 0.5], false)?, 1);
        Ok(())
    }

    #[test]
    fn schedules_epsilon_and_learning_rate() -> Result<()> {
        reseed(0);
        let config = Config::default();
        let params = QLearningParams {
            learning_rate: 0.02,
            lr_step_size: 250,
            lr_gamma: 0.5,
            ..Default::default()
        };
        let mut agent = LinearAgent::new(LinearModel::new(2, 1, 4)?, 4, &config, params)?;
        agent.schedule_hyperparameters(500, config.max_timesteps)?;
        assert!((agent.learning_rate() - 0.005).abs() < 1e-12);
        let expected = config.exploration.value(500, config.max_timesteps);
        assert_eq!(agent.epsilon(), expected);
        Ok(())
    }

    #[test]
    fn rejects_zero_target_update_freq() -> Result<()> {
        reseed(0);
        let params = QLearningParams {
            target_update_freq: 0,
            ..Default::default()
        };
        let agent = LinearAgent::new(LinearModel::new(2, 1, 4)?, 4, &Config::default(), params);
        assert!(agent.is_err());
        Ok(())
    }
}
