//! CLI argument definitions using clap
//!
//! Commands:
//! - oraprov principal --config <path> [--teardown] [--report <path>]
//! - oraprov tenancy --config <path> [--keep] [--report <path>]
//! - oraprov check-seed --config <path> [--report <path>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// oraprov - ephemeral Oracle accounts and pluggable databases
#[derive(Parser, Debug)]
#[command(name = "oraprov")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Diagnostic log level written to stderr (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a throwaway account, grant it, compile artifacts into it
    Principal {
        /// Path to configuration file
        #[arg(long, default_value = "./oraprov.yaml")]
        config: PathBuf,

        /// Drop the account at the end, regardless of the configuration
        #[arg(long)]
        teardown: bool,

        /// Write a JSON run report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Create, activate and (unless kept) tear down a pluggable database
    Tenancy {
        /// Path to configuration file
        #[arg(long, default_value = "./oraprov.yaml")]
        config: PathBuf,

        /// Leave the tenancy in place, regardless of the configuration
        #[arg(long)]
        keep: bool,

        /// Write a JSON run report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Only verify the root container and the seed directory layout
    CheckSeed {
        /// Path to configuration file
        #[arg(long, default_value = "./oraprov.yaml")]
        config: PathBuf,

        /// Write a JSON run report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_principal() {
        let cli = Cli::try_parse_from([
            "oraprov",
            "principal",
            "--config",
            "cfg.toml",
            "--teardown",
            "--report",
            "out.json",
        ])
        .unwrap();
        assert_eq!(cli.log_level, "warn");
        assert_eq!(
            cli.command,
            Command::Principal {
                config: PathBuf::from("cfg.toml"),
                teardown: true,
                report: Some(PathBuf::from("out.json")),
            }
        );
    }

    #[test]
    fn test_parse_tenancy_with_global_log_level() {
        let cli = Cli::try_parse_from(["oraprov", "tenancy", "--keep", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level, "debug");
        assert_eq!(
            cli.command,
            Command::Tenancy {
                config: PathBuf::from("./oraprov.yaml"),
                keep: true,
                report: None,
            }
        );
    }

    #[test]
    fn test_parse_check_seed() {
        let cli = Cli::try_parse_from(["oraprov", "check-seed", "--config", "x.yaml"]).unwrap();
        assert_eq!(
            cli.command,
            Command::CheckSeed {
                config: PathBuf::from("x.yaml"),
                report: None,
            }
        );
        assert!(Cli::try_parse_from(["oraprov", "check-seed", "--keep"]).is_err());
    }
}
