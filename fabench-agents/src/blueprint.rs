use crate::{
    Agent, AgentKind,
    fqi::{FqiAgent, FqiParams},
    online_gp::OnlineGpAgent,
    q_learning::{DqnAgent, LinearAgent, QLearningParams},
};
use anyhow::{Result, bail};
use fabench_approximators::{
    ApproximatorSpec,
    network::{LinearModel, NeuralNetwork},
    online_gp::OnlineGaussianProcess,
};
use fabench_core::{config::Config, env::EnvironmentDescription};

#[derive(Debug, Clone, PartialEq)]
pub enum AgentSpec {
    Dqn(QLearningParams),
    Linear(QLearningParams),
    Fqi(FqiParams),
    OnlineGp,
}

impl AgentSpec {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dqn(_) => "dqn",
            Self::Linear(_) => "linear",
            Self::Fqi(_) => "fitted q iteration",
            Self::OnlineGp => "online gp",
        }
    }
}

/// Builds a fresh agent for every trial.
pub trait AgentBuilder {
    type Agent: Agent;

    fn build(&self, config: &Config, description: &EnvironmentDescription) -> Result<Self::Agent>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Blueprint {
    pub agent: AgentSpec,
    pub approximator: ApproximatorSpec,
}

impl Blueprint {
    pub fn new(agent: AgentSpec, approximator: ApproximatorSpec) -> Self {
        Self {
            agent,
            approximator,
        }
    }
}

impl AgentBuilder for Blueprint {
    type Agent = AgentKind;

    fn build(&self, config: &Config, description: &EnvironmentDescription) -> Result<AgentKind> {
        let n_actions = description.n_actions()?;
        let observation_size = description.observation_size();
        let agent: AgentKind = match (&self.agent, &self.approximator) {
            (AgentSpec::Dqn(params), ApproximatorSpec::NeuralNetwork { hidden_sizes }) => {
                let q = NeuralNetwork::new(observation_size, hidden_sizes, n_actions)?;
                DqnAgent::new(q, n_actions, config, *params)?.into()
            }
            (AgentSpec::Linear(params), ApproximatorSpec::LinearModel { poly_degree }) => {
                let q = LinearModel::new(observation_size, *poly_degree, n_actions)?;
                LinearAgent::new(q, n_actions, config, *params)?.into()
            }
            (AgentSpec::Fqi(params), approximator) => {
                let model = approximator.build_regressor()?;
                FqiAgent::new(model, n_actions, config, *params)?.into()
            }
            (AgentSpec::OnlineGp, ApproximatorSpec::OnlineGaussianProcess(params)) => {
                let model = OnlineGaussianProcess::new(observation_size + n_actions, *params)?;
                OnlineGpAgent::new(model, n_actions, config).into()
            }
            (agent, approximator) => bail!(
                "a {} agent can not be paired with a {}",
                agent.name(),
                approximator.name()
            ),
        };
        Ok(agent)
    }
}
