use anyhow::Result;
use fabench_envs::SimpleGridworld;
use fabench_runner::{output::ResultWriter, presets::simplegrid_sweep, sweep::run_sweep};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn init_logging() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fabench=info,info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn main() -> Result<()> {
    init_logging()?;
    let sweep = simplegrid_sweep();
    let mut env = SimpleGridworld::default();
    let writer = ResultWriter::new(".", sweep.environment.clone());
    let times = run_sweep(&sweep, &mut env, &writer)?;
    info!(?times, "sweep finished");
    Ok(())
}
