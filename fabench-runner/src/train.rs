use anyhow::Result;
use fabench_agents::Agent;
use fabench_core::{
    buffers::{ReplayBuffer, Transition},
    config::Config,
    env::Env,
    rng::with_rng,
};
use rand::Rng;
use std::time::{Duration, Instant};
use tracing::debug;

/// How an evaluation's mean return is compared against a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Comparison {
    #[default]
    Ge,
    Gt,
    Le,
    Lt,
    Eq,
}

impl Comparison {
    pub fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Ge => lhs >= rhs,
            Self::Gt => lhs > rhs,
            Self::Le => lhs <= rhs,
            Self::Lt => lhs < rhs,
            Self::Eq => lhs == rhs,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialResult {
    /// Mean greedy return at every evaluation checkpoint
    pub eval_returns: Vec<f64>,
    /// Return of every training episode
    pub train_returns: Vec<f64>,
    pub eval_timesteps: Vec<usize>,
    /// Seconds since the start of the run at every evaluation checkpoint
    pub eval_times: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveResult {
    pub steps: usize,
    pub episodes: usize,
    pub not_solved: bool,
}

struct Outcome {
    trial: TrialResult,
    timesteps: usize,
    episodes: usize,
    solved: bool,
    elapsed: Duration,
}

fn episode_seed() -> u64 {
    with_rng(|rng| rng.random())
}

fn train_episode<E: Env, A: Agent>(
    env: &mut E,
    agent: &mut A,
    buffer: &mut ReplayBuffer,
    config: &Config,
    online: bool,
) -> Result<(f64, usize)> {
    let mut state = env.reset(episode_seed())?;
    let mut episode_return = 0.;
    let mut steps = 0;
    while steps < config.episode_length {
        let action = agent.act(&state, true)?;
        let snapshot = env.step(action)?;
        steps += 1;
        episode_return += snapshot.reward as f64;
        let transition = Transition {
            state,
            action,
            next_state: snapshot.state.clone(),
            reward: snapshot.reward,
            done: snapshot.terminated,
        };
        if online {
            agent.update(std::slice::from_ref(&transition))?;
        } else {
            buffer.push(transition);
            if buffer.len() >= config.batch_size {
                let batch = with_rng(|rng| buffer.sample(config.batch_size, rng));
                agent.update(&batch)?;
            }
        }
        state = snapshot.state;
        if snapshot.terminated || snapshot.truncated {
            break;
        }
    }
    Ok((episode_return, steps))
}

/// Mean return of `eval_episodes` greedy episodes. Nothing is learned.
fn evaluate<E: Env, A: Agent>(
    env: &mut E,
    agent: &mut A,
    config: &Config,
    render: bool,
) -> Result<f64> {
    let mut total = 0.;
    for _ in 0..config.eval_episodes {
        let mut state = env.reset(episode_seed())?;
        if render {
            env.render()?;
        }
        for _ in 0..config.max_steps {
            let action = agent.act(&state, false)?;
            let snapshot = env.step(action)?;
            if render {
                env.render()?;
            }
            total += snapshot.reward as f64;
            if snapshot.done() {
                break;
            }
            state = snapshot.state;
        }
    }
    Ok(total / config.eval_episodes as f64)
}

fn run<E: Env, A: Agent>(
    env: &mut E,
    config: &Config,
    agent: &mut A,
    online: bool,
    render: bool,
    target: Option<(f64, Comparison)>,
) -> Result<Outcome> {
    config.validate()?;
    let start = Instant::now();
    let mut buffer = ReplayBuffer::new(config.buffer_capacity);
    let mut trial = TrialResult::default();
    let (mut timesteps, mut episodes) = (0, 0);
    let mut solved = false;
    while timesteps < config.max_timesteps
        && episodes < config.max_episodes
        && start.elapsed() <= config.max_time
    {
        agent.schedule_hyperparameters(timesteps, config.max_timesteps)?;
        let (episode_return, steps) = train_episode(env, agent, &mut buffer, config, online)?;
        timesteps += steps;
        episodes += 1;
        trial.train_returns.push(episode_return);

        // an eval_freq boundary was crossed during this episode
        if timesteps % config.eval_freq < steps {
            let mean_return = evaluate(env, agent, config, render)?;
            let elapsed = start.elapsed().as_secs_f64();
            debug!(timesteps, episodes, mean_return, elapsed, "evaluation");
            trial.eval_returns.push(mean_return);
            trial.eval_timesteps.push(timesteps);
            trial.eval_times.push(elapsed);
            if let Some((target_return, comparison)) = target {
                if comparison.holds(mean_return, target_return) {
                    solved = true;
                    break;
                }
            }
        }
    }
    Ok(Outcome {
        trial,
        timesteps,
        episodes,
        solved,
        elapsed: start.elapsed(),
    })
}

/// Trains until the timestep, episode or wall time budget runs out, or until an evaluation's
/// mean return reaches `threshold`.
pub fn train<E: Env, A: Agent>(
    env: &mut E,
    config: &Config,
    agent: &mut A,
    online: bool,
    render: bool,
    threshold: Option<f64>,
) -> Result<TrialResult> {
    let target = threshold.map(|threshold| (threshold, Comparison::Ge));
    Ok(run(env, config, agent, online, render, target)?.trial)
}

/// Trains until an evaluation satisfies `comparison.holds(mean_return, target_return)`. When the
/// budget runs out first the budget limits are reported with `not_solved` set.
pub fn solve<E: Env, A: Agent>(
    env: &mut E,
    config: &Config,
    agent: &mut A,
    target_return: f64,
    comparison: Comparison,
    online: bool,
    render: bool,
) -> Result<SolveResult> {
    let outcome = run(
        env,
        config,
        agent,
        online,
        render,
        Some((target_return, comparison)),
    )?;
    Ok(if outcome.solved {
        SolveResult {
            steps: outcome.timesteps,
            episodes: outcome.episodes,
            not_solved: false,
        }
    } else {
        SolveResult {
            steps: config.max_timesteps,
            episodes: config.max_episodes,
            not_solved: true,
        }
    })
}

/// Wall clock seconds of one full training run.
pub fn train_time<E: Env, A: Agent>(
    env: &mut E,
    config: &Config,
    agent: &mut A,
    online: bool,
) -> Result<f64> {
    Ok(run(env, config, agent, online, false, None)?.elapsed.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabench_core::env::{EnvironmentDescription, SnapShot, Space};

    /// Pays 1 per step, or the action itself when `pays_action` is set, and terminates after
    /// `length` steps.
    pub struct CountingEnv {
        pub length: usize,
        pub steps: usize,
        pub closed: usize,
        pub pays_action: bool,
    }

    impl CountingEnv {
        pub fn new(length: usize) -> Self {
            Self {
                length,
                steps: 0,
                closed: 0,
                pays_action: false,
            }
        }
    }

    impl Env for CountingEnv {
        fn reset(&mut self, _seed: u64) -> Result<Vec<f32>> {
            self.steps = 0;
            Ok(vec![0.])
        }

        fn step(&mut self, action: usize) -> Result<SnapShot> {
            self.steps += 1;
            Ok(SnapShot {
                state: vec![self.steps as f32],
                reward: if self.pays_action { action as f32 } else { 1. },
                terminated: self.steps >= self.length,
                truncated: false,
            })
        }

        fn env_description(&self) -> EnvironmentDescription {
            EnvironmentDescription::new(Space::unbounded(1), Space::Discrete(2))
        }

        fn close(&mut self) -> Result<()> {
            self.closed += 1;
            Ok(())
        }
    }

    /// Always picks action 0 and counts the updates it receives.
    #[derive(Default)]
    pub struct CountingAgent {
        pub updates: usize,
        pub batch_sizes: Vec<usize>,
    }

    impl Agent for CountingAgent {
        fn act(&mut self, _observation: &[f32], _explore: bool) -> Result<usize> {
            Ok(0)
        }

        fn update(&mut self, batch: &[Transition]) -> Result<()> {
            self.updates += 1;
            self.batch_sizes.push(batch.len());
            Ok(())
        }
    }

    /// Acts greedily with action 1 once it has received `needed` updates.
    struct SlowLearner {
        updates: usize,
        needed: usize,
    }

    impl Agent for SlowLearner {
        fn act(&mut self, _observation: &[f32], explore: bool) -> Result<usize> {
            Ok(usize::from(!explore && self.updates >= self.needed))
        }

        fn update(&mut self, _batch: &[Transition]) -> Result<()> {
            self.updates += 1;
            Ok(())
        }
    }

    pub fn small_config() -> Config {
        Config {
            episode_length: 10,
            max_timesteps: 20,
            max_episodes: 4,
            eval_freq: 10,
            eval_episodes: 2,
            max_steps: 10,
            batch_size: 3,
            ..Default::default()
        }
    }

    #[test]
    fn comparison_operators() {
        assert!(Comparison::default().holds(1., 1.));
        assert!(!Comparison::Gt.holds(1., 1.));
        assert!(Comparison::Lt.holds(0., 1.));
        assert!(Comparison::Le.holds(1., 1.));
        assert!(Comparison::Eq.holds(2., 2.));
    }

    #[test]
    fn train_evaluates_at_every_crossed_boundary() -> Result<()> {
        let mut env = CountingEnv::new(5);
        let mut agent = CountingAgent::default();
        let trial = train(&mut env, &small_config(), &mut agent, false, false, None)?;
        assert_eq!(trial.train_returns, vec![5.; 4]);
        assert_eq!(trial.eval_returns, vec![5., 5.]);
        assert_eq!(trial.eval_timesteps, vec![10, 20]);
        assert_eq!(trial.eval_times.len(), 2);
        // updates start once the buffer holds a batch
        assert_eq!(agent.updates, 18);
        assert!(agent.batch_sizes.iter().all(|&size| size == 3));
        Ok(())
    }

    #[test]
    fn online_agents_learn_every_step() -> Result<()> {
        let mut env = CountingEnv::new(5);
        let mut agent = CountingAgent::default();
        train(&mut env, &small_config(), &mut agent, true, false, None)?;
        assert_eq!(agent.updates, 20);
        assert!(agent.batch_sizes.iter().all(|&size| size == 1));
        Ok(())
    }

    #[test]
    fn threshold_stops_training_early() -> Result<()> {
        let mut env = CountingEnv::new(5);
        let trial = train(
            &mut env,
            &small_config(),
            &mut CountingAgent::default(),
            false,
            false,
            Some(5.),
        )?;
        assert_eq!(trial.eval_returns, vec![5.]);
        assert_eq!(trial.train_returns.len(), 2);
        Ok(())
    }

    #[test]
    fn episodes_are_capped_by_episode_length() -> Result<()> {
        let mut env = CountingEnv::new(100);
        let config = Config {
            max_steps: 7,
            ..small_config()
        };
        let trial = train(&mut env, &config, &mut CountingAgent::default(), false, false, None)?;
        assert_eq!(trial.train_returns, vec![10., 10.]);
        assert_eq!(trial.eval_returns, vec![7., 7.]);
        Ok(())
    }

    #[test]
    fn solve_reports_first_checkpoint_meeting_target() -> Result<()> {
        let mut env = CountingEnv::new(5);
        let config = small_config();
        let solved = solve(
            &mut env,
            &config,
            &mut CountingAgent::default(),
            5.,
            Comparison::Ge,
            false,
            false,
        )?;
        assert_eq!(
            solved,
            SolveResult {
                steps: 10,
                episodes: 2,
                not_solved: false
            }
        );
        let unsolved = solve(
            &mut env,
            &config,
            &mut CountingAgent::default(),
            6.,
            Comparison::Ge,
            false,
            false,
        )?;
        assert_eq!(
            unsolved,
            SolveResult {
                steps: 20,
                episodes: 4,
                not_solved: true
            }
        );
        Ok(())
    }

    #[test]
    fn solve_counts_steps_up_to_a_later_checkpoint() -> Result<()> {
        let config = Config {
            max_timesteps: 40,
            max_episodes: 8,
            ..small_config()
        };
        let mut env = CountingEnv {
            pays_action: true,
            ..CountingEnv::new(5)
        };
        // 8, 18 and 28 updates have happened by the checkpoints at 10, 20 and 30 steps
        let trial = train(
            &mut env,
            &config,
            &mut SlowLearner { updates: 0, needed: 25 },
            false,
            false,
            None,
        )?;
        assert_eq!(trial.eval_timesteps, vec![10, 20, 30, 40]);
        assert_eq!(trial.eval_returns, vec![0., 0., 5., 5.]);

        let result = solve(
            &mut env,
            &config,
            &mut SlowLearner { updates: 0, needed: 25 },
            5.,
            Comparison::Ge,
            false,
            false,
        )?;
        assert_eq!(
            result,
            SolveResult {
                steps: 30,
                episodes: 6,
                not_solved: false
            }
        );
        Ok(())
    }

    #[test]
    fn wall_clock_budget_stops_the_run() -> Result<()> {
        let config = Config {
            max_time: Duration::ZERO,
            ..small_config()
        };
        let mut env = CountingEnv::new(5);
        let trial = train(&mut env, &config, &mut CountingAgent::default(), false, false, None)?;
        assert!(trial.eval_returns.is_empty());
        let result = solve(
            &mut env,
            &config,
            &mut CountingAgent::default(),
            5.,
            Comparison::Ge,
            false,
            false,
        )?;
        assert_eq!(
            result,
            SolveResult {
                steps: config.max_timesteps,
                episodes: config.max_episodes,
                not_solved: true
            }
        );
        Ok(())
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = Config {
            eval_freq: 0,
            ..small_config()
        };
        let mut env = CountingEnv::new(5);
        assert!(train_time(&mut env, &config, &mut CountingAgent::default(), false).is_err());
    }
}
