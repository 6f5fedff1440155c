pub mod blueprint;
pub mod fqi;
pub mod online_gp;
pub mod q_learning;

use crate::{
    fqi::FqiAgent,
    online_gp::OnlineGpAgent,
    q_learning::{DqnAgent, LinearAgent},
};
use anyhow::Result;
use enum_dispatch::enum_dispatch;
use fabench_core::{buffers::Transition, rng::with_rng};
use rand::Rng;

#[enum_dispatch]
pub trait Agent {
    /// Picks an action for `observation`. With `explore` unset the choice is greedy.
    fn act(&mut self, observation: &[f32], explore: bool) -> Result<usize>;

    fn update(&mut self, batch: &[Transition]) -> Result<()>;

    /// Called at the start of every training episode with the timesteps taken so far.
    fn schedule_hyperparameters(&mut self, _timestep: usize, _max_timesteps: usize) -> Result<()> {
        Ok(())
    }
}

#[enum_dispatch(Agent)]
pub enum AgentKind {
    Dqn(DqnAgent),
    Linear(LinearAgent),
    Fqi(FqiAgent),
    OnlineGp(OnlineGpAgent),
}

pub(crate) fn epsilon_greedy(
    epsilon: f32,
    n_actions: usize,
    explore: bool,
    greedy: impl FnOnce() -> Result<usize>,
) -> Result<usize> {
    if explore {
        let random_action =
            with_rng(|rng| (rng.random::<f32>() < epsilon).then(|| rng.random_range(0..n_actions)));
        if let Some(action) = random_action {
            return Ok(action);
        }
    }
    greedy()
}

/// Index of the largest value, the first one on ties.
pub(crate) fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, best_value), (idx, value)| {
            if *value > best_value {
                (idx, *value)
            } else {
                (best, best_value)
            }
        })
        .0
}

/// Concatenates the state with a one-hot encoding of the action.
pub(crate) fn state_action(state: &[f32], action: usize, n_actions: usize) -> Vec<f32> {
    let mut input = Vec::with_capacity(state.len() + n_actions);
    input.extend_from_slice(state);
    input.extend((0..n_actions).map(|a| if a == action { 1. } else { 0. }));
    input
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_prefers_first_tie() {
        assert_eq!(argmax(&[0., 2., 2., -1.]), 1);
        assert_eq!(argmax(&[0., 0.]), 0);
    }

    #[test]
    fn one_hot_follows_state() {
        assert_eq!(state_action(&[0.5, 0.25], 2, 4), vec![0.5, 0.25, 0., 0., 1., 0.]);
    }

    #[test]
    fn greedy_without_exploration() -> Result<()> {
        assert_eq!(epsilon_greedy(1., 4, false, || Ok(3))?, 3);
        Ok(())
    }
}
