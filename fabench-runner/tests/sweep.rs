use anyhow::{Result, bail};
use fabench_agents::{Agent, blueprint::AgentBuilder};
use fabench_core::{
    buffers::Transition,
    config::Config,
    env::{Env, EnvironmentDescription, SnapShot, Space},
};
use fabench_runner::{
    output::{ResultWriter, format_value},
    sweep::{Sweep, Variant, run_sweep},
    train::Comparison,
};
use std::{fs, path::Path};

/// Pays 1 per step and terminates after five steps.
#[derive(Default)]
struct FiveStepEnv {
    steps: usize,
    closes: usize,
}

impl Env for FiveStepEnv {
    fn reset(&mut self, _seed: u64) -> Result<Vec<f32>> {
        self.steps = 0;
        Ok(vec![0.])
    }

    fn step(&mut self, _action: usize) -> Result<SnapShot> {
        self.steps += 1;
        Ok(SnapShot {
            state: vec![self.steps as f32],
            reward: 1.,
            terminated: self.steps >= 5,
            truncated: false,
        })
    }

    fn env_description(&self) -> EnvironmentDescription {
        EnvironmentDescription::new(Space::unbounded(1), Space::Discrete(2))
    }

    fn close(&mut self) -> Result<()> {
        self.closes += 1;
        Ok(())
    }
}

struct IdleAgent;

impl Agent for IdleAgent {
    fn act(&mut self, _observation: &[f32], _explore: bool) -> Result<usize> {
        Ok(0)
    }

    fn update(&mut self, _batch: &[Transition]) -> Result<()> {
        Ok(())
    }
}

struct IdleBuilder {
    fail: bool,
}

impl AgentBuilder for IdleBuilder {
    type Agent = IdleAgent;

    fn build(&self, _config: &Config, _description: &EnvironmentDescription) -> Result<IdleAgent> {
        if self.fail {
            bail!("agent construction failed");
        }
        Ok(IdleAgent)
    }
}

fn config() -> Config {
    Config {
        episode_length: 10,
        max_timesteps: 20,
        max_episodes: 4,
        eval_freq: 10,
        eval_episodes: 2,
        max_steps: 10,
        batch_size: 4,
        ..Default::default()
    }
}

fn sweep(legends: &[&str], target_return: f64) -> Sweep<IdleBuilder> {
    Sweep {
        environment: "stub".to_owned(),
        n_seeds: 2,
        render: false,
        target_return,
        comparison: Comparison::Ge,
        train_threshold: None,
        variants: legends
            .iter()
            .map(|legend| Variant {
                legend: (*legend).to_owned(),
                config: config(),
                builder: IdleBuilder {
                    fail: *legend == "Broken",
                },
                online: false,
            })
            .collect(),
    }
}

fn read_rows(path: &Path) -> Result<Vec<Vec<f64>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut rows = vec![];
    for record in reader.records() {
        let mut row = vec![];
        for value in record?.iter() {
            row.push(value.parse::<f64>()?);
        }
        rows.push(row);
    }
    Ok(rows)
}

#[test]
fn writes_every_result_file_in_layout() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let writer = ResultWriter::new(dir.path(), "stub");
    let mut env = FiveStepEnv::default();
    let times = run_sweep(&sweep(&["A", "B"], 5.), &mut env, &writer)?;
    assert_eq!(times.len(), 2);
    // two training runs, two solve runs and one timing run per variant
    assert_eq!(env.closes, 10);

    for legend in ["A", "B"] {
        let eval = read_rows(&writer.eval_path(legend))?;
        assert_eq!(eval, vec![vec![5., 5.], vec![5., 5.]]);

        let train = read_rows(&writer.train_path(legend))?;
        assert_eq!(train.len(), 4);
        assert_eq!(train[0], vec![5.; 4]);
        assert_eq!(train[1].len(), 2);
        assert_eq!(train[2], vec![5.; 4]);
        assert_eq!(train[3].len(), 2);

        let solve = read_rows(&writer.solve_path(legend))?;
        assert_eq!(solve, vec![vec![2., 2.], vec![10., 10.], vec![0., 0.]]);
    }

    let time_rows = read_rows(&writer.times_path())?;
    assert_eq!(time_rows, vec![times]);
    Ok(())
}

#[test]
fn unreachable_target_reports_budget() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let writer = ResultWriter::new(dir.path(), "stub");
    run_sweep(&sweep(&["A"], 6.), &mut FiveStepEnv::default(), &writer)?;
    let solve = read_rows(&writer.solve_path("A"))?;
    assert_eq!(solve, vec![vec![4., 4.], vec![20., 20.], vec![1., 1.]]);
    Ok(())
}

#[test]
fn reruns_append_rows() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let writer = ResultWriter::new(dir.path(), "stub");
    let sweep = sweep(&["A"], 5.);
    run_sweep(&sweep, &mut FiveStepEnv::default(), &writer)?;
    run_sweep(&sweep, &mut FiveStepEnv::default(), &writer)?;
    assert_eq!(read_rows(&writer.eval_path("A"))?.len(), 4);
    assert_eq!(read_rows(&writer.train_path("A"))?.len(), 8);
    assert_eq!(read_rows(&writer.solve_path("A"))?.len(), 6);
    assert_eq!(read_rows(&writer.times_path())?.len(), 2);

    let raw = fs::read_to_string(writer.eval_path("A"))?;
    let first = raw.lines().next().unwrap_or_default();
    assert_eq!(first, format!("{},{}", format_value(5.), format_value(5.)));
    Ok(())
}

#[test]
fn failures_abort_but_keep_earlier_rows() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let writer = ResultWriter::new(dir.path(), "stub");
    let result = run_sweep(&sweep(&["A", "Broken"], 5.), &mut FiveStepEnv::default(), &writer);
    assert!(result.is_err());
    assert_eq!(read_rows(&writer.eval_path("A"))?.len(), 2);
    assert!(!writer.eval_path("Broken").exists());
    assert!(!writer.times_path().exists());
    Ok(())
}
