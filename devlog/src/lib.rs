pub mod cli;
pub mod deploy;
pub mod export;
pub mod gemini;
pub mod github;
pub mod load_config;
pub mod notion;
pub mod sanitize;
pub mod wordpress;

pub use cli::{run, Cli, Commands};
