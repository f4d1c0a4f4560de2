//! CLI argument parsing using clap v4

use clap::{Parser, Subcommand};

use orra_sdk::ServiceKind;

/// Orra Worker - reference worker for the Orra platform
///
/// Registers as a service or agent, keeps a session with the platform open
/// and answers every task with an echo of its input.
#[derive(Parser, Debug)]
#[command(name = "orra-worker")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register and process tasks until interrupted
    Run {
        /// Path to configuration file
        #[arg(short, long, env = "ORRA_CONFIG")]
        config: Option<String>,

        /// Override the registered name
        #[arg(long)]
        name: Option<String>,

        /// Register as "service" or "agent"
        #[arg(long)]
        kind: Option<ServiceKind>,
    },

    /// Inspect or reset the stored service identity
    Identity {
        #[command(subcommand)]
        subcommand: IdentitySubcommand,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Display version and build information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum IdentitySubcommand {
    /// Print the stored service id
    Show {
        /// Identity file (defaults to the configured one)
        #[arg(short, long)]
        file: Option<String>,

        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Forget the stored service id so the next run registers fresh
    Clear {
        /// Identity file (defaults to the configured one)
        #[arg(short, long)]
        file: Option<String>,

        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the current configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from(["orra-worker", "run"]);
        match cli.command {
            Commands::Run { config, name, kind } => {
                assert!(config.is_none());
                assert!(name.is_none());
                assert!(kind.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_with_overrides() {
        let cli = Cli::parse_from([
            "orra-worker",
            "run",
            "--config",
            "/etc/orra/worker.toml",
            "--name",
            "echo",
            "--kind",
            "agent",
        ]);
        match cli.command {
            Commands::Run { config, name, kind } => {
                assert_eq!(config.as_deref(), Some("/etc/orra/worker.toml"));
                assert_eq!(name.as_deref(), Some("echo"));
                assert_eq!(kind, Some(ServiceKind::Agent));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["orra-worker", "run", "--kind", "robot"]).is_err());
    }

    #[test]
    fn test_identity_clear() {
        let cli = Cli::parse_from(["orra-worker", "identity", "clear", "--file", "key.json"]);
        match cli.command {
            Commands::Identity {
                subcommand: IdentitySubcommand::Clear { file, .. },
            } => assert_eq!(file.as_deref(), Some("key.json")),
            _ => panic!("Expected Identity Clear command"),
        }
    }

    #[test]
    fn test_verbose_and_quiet_flags() {
        let cli = Cli::parse_from(["orra-worker", "-vv", "version"]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);

        let cli = Cli::parse_from(["orra-worker", "--quiet", "version"]);
        assert!(cli.quiet);
    }

    #[test]
    fn test_config_init() {
        let cli = Cli::parse_from(["orra-worker", "config", "init", "--force"]);
        match cli.command {
            Commands::Config {
                subcommand: ConfigSubcommand::Init { path, force },
            } => {
                assert!(path.is_none());
                assert!(force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }
}
