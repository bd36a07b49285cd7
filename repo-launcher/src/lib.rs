pub mod cli;
pub mod load_config;
pub mod render;
pub mod startup;
pub mod supervisor;

pub use cli::{run, Cli, Commands};
