pub mod gridworld;

pub use gridworld::{GridworldConfig, SimpleGridworld};
