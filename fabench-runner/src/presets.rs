use crate::{
    sweep::{Sweep, Variant},
    train::Comparison,
};
use fabench_agents::{
    blueprint::{AgentSpec, Blueprint},
    fqi::FqiParams,
    q_learning::QLearningParams,
};
use fabench_approximators::{
    ApproximatorSpec,
    gp::GpParams,
    kernels::Kernel,
    knn::{KnnParams, Weights},
    online_gp::OnlineGpParams,
    svr::SvrParams,
    tree::TreeParams,
};
use fabench_core::config::{Config, EpsilonSchedule};

pub const ENVIRONMENT: &str = "simplegrid";
pub const N_SEEDS: usize = 30;
/// Greedy return of reaching the goal within eleven moves
pub const TARGET_RETURN: f64 = 0.;

fn config(batch_size: usize, buffer_capacity: usize, max_deduct: f32, decay: f32) -> Config {
    Config {
        batch_size,
        buffer_capacity,
        exploration: EpsilonSchedule {
            epsilon: 1.,
            max_deduct,
            decay,
        },
        ..Default::default()
    }
}

fn fqi(update_freq: usize) -> AgentSpec {
    AgentSpec::Fqi(FqiParams {
        update_freq,
        model_save_freq: 250,
        model_save_capacity: 20,
    })
}

fn variant(
    legend: &str,
    config: Config,
    agent: AgentSpec,
    approximator: ApproximatorSpec,
) -> Variant<Blueprint> {
    Variant {
        legend: legend.to_owned(),
        config,
        builder: Blueprint::new(agent, approximator),
        online: false,
    }
}

pub fn neural_network() -> Variant<Blueprint> {
    variant(
        "Neural Network",
        config(32, 1_000_000, 0.97, 0.25),
        AgentSpec::Dqn(QLearningParams {
            learning_rate: 0.00075,
            target_update_freq: 50,
            lr_step_size: 250,
            lr_gamma: 0.95,
        }),
        ApproximatorSpec::NeuralNetwork {
            hidden_sizes: vec![32, 32],
        },
    )
}

pub fn linear_model() -> Variant<Blueprint> {
    variant(
        "Linear Model",
        config(32, 10_000_000, 0.97, 0.5),
        AgentSpec::Linear(QLearningParams {
            learning_rate: 0.02,
            target_update_freq: 20,
            lr_step_size: 250,
            lr_gamma: 0.99,
        }),
        ApproximatorSpec::LinearModel { poly_degree: 1 },
    )
}

pub fn decision_tree() -> Variant<Blueprint> {
    variant(
        "Decision Tree",
        config(512, 1_000_000, 0.95, 0.4),
        fqi(1),
        ApproximatorSpec::DecisionTree(TreeParams {
            max_depth: 15,
            min_samples_split: 20,
            min_samples_leaf: 5,
        }),
    )
}

pub fn random_forest() -> Variant<Blueprint> {
    variant(
        "Random Forest",
        config(512, 1_000_000, 0.95, 0.2),
        fqi(5),
        ApproximatorSpec::RandomForest {
            n_estimators: 5,
            tree: TreeParams {
                max_depth: 15,
                min_samples_split: 20,
                min_samples_leaf: 5,
            },
        },
    )
}

pub fn support_vectors() -> Variant<Blueprint> {
    variant(
        "Support Vectors",
        config(256, 1_000_000, 0.95, 0.3),
        fqi(1),
        ApproximatorSpec::SupportVectorRegressor(SvrParams {
            kernel: Kernel::Rbf { gamma: None },
            c: 3.,
            ..Default::default()
        }),
    )
}

pub fn k_neighbours() -> Variant<Blueprint> {
    variant(
        "K-Neighbours",
        config(256, 1_000_000, 0.95, 0.3),
        fqi(1),
        ApproximatorSpec::KNeighbours(KnnParams {
            n_neighbors: 7,
            weights: Weights::Distance,
        }),
    )
}

pub fn gaussian_process() -> Variant<Blueprint> {
    variant(
        "Gaussian Process",
        config(512, 1_000_000, 0.95, 0.3),
        fqi(10),
        ApproximatorSpec::GaussianProcess(GpParams {
            alpha: 1e-10,
            normalize_y: false,
            length_scale: 0.5,
        }),
    )
}

pub fn gaussian_process_online() -> Variant<Blueprint> {
    Variant {
        online: true,
        ..variant(
            "Gaussian Process Online",
            config(32, 1_000_000, 0.95, 0.3),
            AgentSpec::OnlineGp,
            ApproximatorSpec::OnlineGaussianProcess(OnlineGpParams {
                sigma_0: 0.5,
                init: -10.,
                gamma: None,
                epsilon_tol: 0.085,
                basis_limit: 1000,
            }),
        )
    }
}

/// The full gridworld benchmark: every approximator family, 30 seeds each.
pub fn simplegrid_sweep() -> Sweep<Blueprint> {
    Sweep {
        environment: ENVIRONMENT.to_owned(),
        n_seeds: N_SEEDS,
        render: false,
        target_return: TARGET_RETURN,
        comparison: Comparison::Ge,
        train_threshold: None,
        variants: vec![
            neural_network(),
            linear_model(),
            decision_tree(),
            random_forest(),
            support_vectors(),
            k_neighbours(),
            gaussian_process(),
            gaussian_process_online(),
        ],
    }
}
