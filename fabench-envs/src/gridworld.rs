use anyhow::{Result, bail, ensure};
use fabench_core::env::{Env, EnvironmentDescription, SnapShot, Space};
use tracing::trace;

pub type Cell = (usize, usize);

// up, right, down, left as (row, col) offsets
const MOVES: [(isize, isize); 4] = [(-1, 0), (0, 1), (1, 0), (0, -1)];

#[derive(Debug, Clone, PartialEq)]
pub struct GridworldConfig {
    pub height: usize,
    pub width: usize,
    pub start: Cell,
    pub goal: Cell,
    pub walls: Vec<Cell>,
    pub step_reward: f32,
    pub goal_reward: f32,
}

impl Default for GridworldConfig {
    fn default() -> Self {
        Self {
            height: 5,
            width: 5,
            start: (0, 0),
            goal: (4, 4),
            walls: vec![(1, 1), (2, 3), (3, 1)],
            step_reward: -1.,
            goal_reward: 10.,
        }
    }
}

impl GridworldConfig {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.height > 1 && self.width > 1,
            "grid must be at least 2x2, got {}x{}",
            self.height,
            self.width
        );
        for (name, cell) in [("start", self.start), ("goal", self.goal)] {
            ensure!(
                cell.0 < self.height && cell.1 < self.width,
                "{name} {cell:?} is outside the grid"
            );
            ensure!(!self.walls.contains(&cell), "{name} {cell:?} is a wall");
        }
        ensure!(self.start != self.goal, "start and goal coincide");
        Ok(())
    }
}

/// Deterministic gridworld. The agent moves one cell per step, bumping into walls and borders
/// leaves it in place, and entering the goal ends the episode.
#[derive(Debug, Clone)]
pub struct SimpleGridworld {
    config: GridworldConfig,
    position: Cell,
    done: bool,
}

impl SimpleGridworld {
    pub fn new(config: GridworldConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            position: config.start,
            config,
            done: false,
        })
    }

    pub fn position(&self) -> Cell {
        self.position
    }

    fn observation(&self) -> Vec<f32> {
        vec![
            self.position.0 as f32 / (self.config.height - 1) as f32,
            self.position.1 as f32 / (self.config.width - 1) as f32,
        ]
    }

    fn target(&self, action: usize) -> Cell {
        let (dr, dc) = MOVES[action];
        let row = self.position.0 as isize + dr;
        let col = self.position.1 as isize + dc;
        if row < 0 || col < 0 {
            return self.position;
        }
        let cell = (row as usize, col as usize);
        if cell.0 >= self.config.height
            || cell.1 >= self.config.width
            || self.config.walls.contains(&cell)
        {
            self.position
        } else {
            cell
        }
    }
}

impl Default for SimpleGridworld {
    fn default() -> Self {
        let config = GridworldConfig::default();
        Self {
            position: config.start,
            config,
            done: false,
        }
    }
}

impl Env for SimpleGridworld {
    fn reset(&mut self, _seed: u64) -> Result<Vec<f32>> {
        self.position = self.config.start;
        self.done = false;
        Ok(self.observation())
    }

    fn step(&mut self, action: usize) -> Result<SnapShot> {
        if action >= MOVES.len() {
            bail!("invalid action {action}, expected one of 0..{}", MOVES.len());
        }
        ensure!(!self.done, "episode is over, reset the environment first");
        self.position = self.target(action);
        let terminated = self.position == self.config.goal;
        self.done = terminated;
        trace!(position = ?self.position, action, terminated, "gridworld step");
        Ok(SnapShot {
            state: self.observation(),
            reward: if terminated {
                self.config.goal_reward
            } else {
                self.config.step_reward
            },
            terminated,
            truncated: false,
        })
    }

    fn env_description(&self) -> EnvironmentDescription {
        EnvironmentDescription::new(Space::unit_box(2), Space::Discrete(MOVES.len()))
    }

    fn render(&mut self) -> Result<()> {
        let mut frame = String::new();
        for row in 0..self.config.height {
            for col in 0..self.config.width {
                let cell = (row, col);
                frame.push(if cell == self.position {
                    'A'
                } else if cell == self.config.goal {
                    'G'
                } else if self.config.walls.contains(&cell) {
                    '#'
                } else {
                    '.'
                });
            }
            frame.push('\n');
        }
        println!("{frame}");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.position = self.config.start;
        self.done = false;
        Ok(())
    }
}
