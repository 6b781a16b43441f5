//! Command-line surface: clap argument model and command execution.

pub mod args;
pub mod commands;

pub use args::{Cli, Command};
pub use commands::run_command;
