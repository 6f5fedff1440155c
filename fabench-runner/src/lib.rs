pub mod output;
pub mod presets;
pub mod sweep;
pub mod train;
