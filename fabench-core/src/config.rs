use anyhow::{Result, ensure};
use std::time::Duration;

/// Linear epsilon decay, reaching its floor after `decay * max_timesteps` steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpsilonSchedule {
    pub epsilon: f32,
    pub max_deduct: f32,
    pub decay: f32,
}

impl EpsilonSchedule {
    pub fn value(&self, timestep: usize, max_timesteps: usize) -> f32 {
        let horizon = self.decay * max_timesteps as f32;
        let progress = if horizon <= 0. {
            1.
        } else {
            (timestep as f32 / horizon).min(1.)
        };
        self.epsilon * (1. - progress * self.max_deduct)
    }
}

impl Default for EpsilonSchedule {
    fn default() -> Self {
        Self {
            epsilon: 1.,
            max_deduct: 0.95,
            decay: 0.3,
        }
    }
}

/// Hyperparameters every agent shares. Model and update specific knobs live in the agent and
/// approximator specs.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Step cap of a training episode
    pub episode_length: usize,
    pub max_timesteps: usize,
    pub max_episodes: usize,
    pub max_time: Duration,
    pub eval_freq: usize,
    pub eval_episodes: usize,
    /// Step cap of an evaluation episode
    pub max_steps: usize,
    pub gamma: f32,
    pub batch_size: usize,
    pub buffer_capacity: usize,
    pub exploration: EpsilonSchedule,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.episode_length > 0, "episode_length must be positive");
        ensure!(self.eval_freq > 0, "eval_freq must be positive");
        ensure!(self.eval_episodes > 0, "eval_episodes must be positive");
        ensure!(self.max_steps > 0, "max_steps must be positive");
        ensure!(self.batch_size > 0, "batch_size must be positive");
        ensure!(self.buffer_capacity > 0, "buffer_capacity must be positive");
        ensure!(
            (0. ..=1.).contains(&self.gamma),
            "gamma must be in [0, 1], got {}",
            self.gamma
        );
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            episode_length: 50,
            max_timesteps: 5000,
            max_episodes: 5000,
            max_time: Duration::from_secs(30 * 60),
            eval_freq: 250,
            eval_episodes: 10,
            max_steps: 50,
            gamma: 0.99,
            batch_size: 32,
            buffer_capacity: 1_000_000,
            exploration: EpsilonSchedule::default(),
        }
    }
}
