use crate::{Agent, argmax, epsilon_greedy, state_action};
use anyhow::Result;
use fabench_approximators::online_gp::{OnlineGaussianProcess, OnlineRegressor};
use fabench_core::{
    buffers::Transition,
    config::{Config, EpsilonSchedule},
};

/// Q-learning where every transition is a single online gaussian process update.
pub struct OnlineGpAgent {
    model: OnlineGaussianProcess,
    exploration: EpsilonSchedule,
    epsilon: f32,
    gamma: f32,
    n_actions: usize,
}

impl OnlineGpAgent {
    pub fn new(model: OnlineGaussianProcess, n_actions: usize, config: &Config) -> Self {
        Self {
            model,
            exploration: config.exploration,
            epsilon: config.exploration.epsilon,
            gamma: config.gamma,
            n_actions,
        }
    }

    pub fn q_values(&self, state: &[f32]) -> Result<Vec<f32>> {
        let inputs: Vec<Vec<f32>> = (0..self.n_actions)
            .map(|a| state_action(state, a, self.n_actions))
            .collect();
        self.model.predict(&inputs)
    }

    pub fn basis_len(&self) -> usize {
        self.model.basis_len()
    }
}

impl Agent for OnlineGpAgent {
    fn act(&mut self, observation: &[f32], explore: bool) -> Result<usize> {
        epsilon_greedy(self.epsilon, self.n_actions, explore, || {
            Ok(argmax(&self.q_values(observation)?))
        })
    }

    fn update(&mut self, batch: &[Transition]) -> Result<()> {
        for transition in batch {
            let bootstrap = if transition.done {
                0.
            } else {
                self.q_values(&transition.next_state)?
                    .into_iter()
                    .fold(f32::NEG_INFINITY, f32::max)
            };
            let target = transition.reward + self.gamma * bootstrap;
            let input = state_action(&transition.state, transition.action, self.n_actions);
            self.model.update(&input, target)?;
        }
        Ok(())
    }

    fn schedule_hyperparameters(&mut self, timestep: usize, max_timesteps: usize) -> Result<()> {
        self.epsilon = self.exploration.value(timestep, max_timesteps);
        Ok(())
    }
}
