pub mod buffers;
pub mod config;
pub mod env;
pub mod rng;
