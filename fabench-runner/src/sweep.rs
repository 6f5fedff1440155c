use crate::{
    output::ResultWriter,
    train::{Comparison, solve, train, train_time},
};
use anyhow::Result;
use fabench_agents::blueprint::AgentBuilder;
use fabench_core::{config::Config, env::Env, rng::reseed};
use tracing::info;

/// One benchmarked configuration. `legend` names its result files.
#[derive(Debug, Clone)]
pub struct Variant<B> {
    pub legend: String,
    pub config: Config,
    pub builder: B,
    /// Learn from every transition instead of sampled batches
    pub online: bool,
}

#[derive(Debug, Clone)]
pub struct Sweep<B> {
    pub environment: String,
    pub n_seeds: usize,
    pub render: bool,
    pub target_return: f64,
    pub comparison: Comparison,
    /// Early stopping return for the training trials
    pub train_threshold: Option<f64>,
    pub variants: Vec<Variant<B>>,
}

/// Runs every variant in order and appends its results through `writer`. Returns the timing run's
/// seconds per variant, which are also appended as the last row of the times file.
///
/// Any error aborts the sweep. Rows written before it stay on disk.
pub fn run_sweep<E: Env, B: AgentBuilder>(
    sweep: &Sweep<B>,
    env: &mut E,
    writer: &ResultWriter,
) -> Result<Vec<f64>> {
    let description = env.env_description();
    let n = sweep.n_seeds;
    let mut times = Vec::with_capacity(sweep.variants.len());
    for variant in &sweep.variants {
        let legend = variant.legend.as_str();
        let config = &variant.config;
        info!(legend, n_seeds = n, "benchmarking variant");

        let mut eval_rows = Vec::with_capacity(n);
        let mut train_rows = Vec::with_capacity(2 * n);
        for seed in 0..n {
            info!(legend, run = seed + 1, "training run");
            reseed(seed as u64);
            let mut agent = variant.builder.build(config, &description)?;
            let trial = train(
                env,
                config,
                &mut agent,
                variant.online,
                sweep.render,
                sweep.train_threshold,
            )?;
            env.close()?;
            eval_rows.push(trial.eval_returns);
            train_rows.push(trial.train_returns);
            train_rows.push(trial.eval_times);
        }
        writer.append_rows(&writer.eval_path(legend), &eval_rows)?;
        writer.append_rows(&writer.train_path(legend), &train_rows)?;

        let mut episodes = Vec::with_capacity(n);
        let mut steps = Vec::with_capacity(n);
        let mut not_solved = Vec::with_capacity(n);
        for seed in 0..n {
            info!(legend, run = seed + 1, "solve run");
            reseed(seed as u64);
            let mut agent = variant.builder.build(config, &description)?;
            let result = solve(
                env,
                config,
                &mut agent,
                sweep.target_return,
                sweep.comparison,
                variant.online,
                sweep.render,
            )?;
            env.close()?;
            episodes.push(result.episodes as f64);
            steps.push(result.steps as f64);
            not_solved.push(if result.not_solved { 1. } else { 0. });
        }
        let solved = not_solved.iter().filter(|flag| **flag == 0.).count();
        info!(legend, solved, n_seeds = n, "solve runs done");
        writer.append_rows(&writer.solve_path(legend), &[episodes, steps, not_solved])?;

        reseed(n as u64);
        let mut agent = variant.builder.build(config, &description)?;
        let seconds = train_time(env, config, &mut agent, variant.online)?;
        env.close()?;
        info!(legend, seconds, "timing run done");
        times.push(seconds);
    }
    writer.append_rows(&writer.times_path(), std::slice::from_ref(&times))?;
    Ok(times)
}
