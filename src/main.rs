//! Orra Worker - reference worker binary
//!
//! Registers with the Orra platform, keeps the session open and answers every
//! task with `{"echo": <input>}` until interrupted.

mod cli;

use std::time::Duration;

use clap::Parser;
use serde_json::json;
use tracing::{debug, error, info, warn};

use orra_sdk::config::{self, SdkConfig};
use orra_sdk::error::{Error, Result};
use orra_sdk::{logging, version};
use orra_sdk::{ConnectionState, FileIdentityStore, IdentityStore, OrraClient, TaskRequest};

use crate::cli::{Cli, Commands, ConfigSubcommand, IdentitySubcommand};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            return exit_on_error(handle_config_command(subcommand.clone()));
        }
        Commands::Identity { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            return exit_on_error(handle_identity_command(subcommand.clone()));
        }
        Commands::Run { .. } => {}
    }

    let Commands::Run { config, name, kind } = cli.command else {
        return Ok(());
    };

    let mut config = match SdkConfig::load(config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprint!("{}", e.format_for_terminal());
            std::process::exit(e.exit_code());
        }
    };
    if let Some(name) = name {
        config.service.name = name;
    }
    if let Some(kind) = kind {
        config.service.kind = kind;
    }

    // Keep the guards alive until the runtime has shut down
    let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

    let build = version::build_info();
    info!(
        version = %build.full_version(),
        target = %build.target,
        profile = %build.profile,
        "Starting Orra worker"
    );

    if let Err(e) = run_worker(config) {
        if e.is_fatal() {
            error!(error = %e.format_for_log(), "Worker cannot continue with this setup");
        } else {
            error!(error = %e.format_for_log(), retryable = e.is_retryable(), "Worker stopped");
        }
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
    Ok(())
}

/// Print a terminal-formatted error and exit with its code
fn exit_on_error(result: Result<()>) -> Result<()> {
    if let Err(e) = result {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
    Ok(())
}

fn run_worker(config: SdkConfig) -> Result<()> {
    info!(
        api_url = %config.platform.api_url,
        kind = %config.service.kind,
        name = %config.service.name,
        identity_file = %config.persistence.identity_file,
        "Configuration loaded"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(num_cpus::get().clamp(1, 4))
        .thread_name("orra-worker")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    runtime.block_on(async_worker_main(config))
}

async fn async_worker_main(config: SdkConfig) -> Result<()> {
    let client = OrraClient::new(
        config.platform.api_url.clone(),
        config.platform.api_key.clone(),
        config.client_options(),
    )?;

    let options = config.registration_options()?;
    let identity = client
        .register(config.service.kind, &config.service.name, options)
        .await?;
    info!(
        service_id = %identity.service_id,
        kind = %identity.kind,
        version = identity.version,
        "Worker ready, waiting for tasks"
    );

    client.start_handler(|task: TaskRequest| async move {
        debug!(task_id = %task.id, execution_id = %task.execution_id, "Echoing task input");
        Ok::<_, anyhow::Error>(json!({ "echo": task.input }))
    });

    let shutdown_signal = tokio::signal::ctrl_c();
    tokio::pin!(shutdown_signal);

    let mut status_timer = tokio::time::interval(Duration::from_secs(1));
    status_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut last_state = client.connection_state();
    let mut last_stats = client.delivery_stats();

    let outcome = loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Shutdown signal received");
                break Ok(());
            }

            _ = status_timer.tick() => {
                let state = client.connection_state();
                if state != last_state {
                    info!(from = %last_state, to = %state, "Connection state changed");
                    last_state = state;
                }

                let stats = client.delivery_stats();
                if stats != last_stats {
                    debug!(
                        queued = stats.queued,
                        in_flight = stats.in_flight,
                        sent = stats.sent_total,
                        acked = stats.acked_total,
                        requeued = stats.requeued_total,
                        "Delivery stats"
                    );
                    last_stats = stats;
                }

                if state == ConnectionState::GivingUp {
                    let reason = client
                        .session_state()
                        .last_error
                        .unwrap_or_else(|| "reconnect attempts exhausted".to_string());
                    warn!(reason = %reason, "Giving up on the platform connection");
                    break Err(Error::ConnectionLost { message: reason });
                }
            }
        }
    };

    let stats = client.delivery_stats();
    client.close().await;
    info!(
        sent = stats.sent_total,
        acked = stats.acked_total,
        unsent = stats.queued + stats.in_flight,
        "Worker shut down"
    );

    outcome
}

fn handle_identity_command(subcommand: IdentitySubcommand) -> Result<()> {
    let (file, config) = match &subcommand {
        IdentitySubcommand::Show { file, config } | IdentitySubcommand::Clear { file, config } => {
            (file.clone(), config.clone())
        }
    };

    let path = match file {
        Some(file) => file,
        None => SdkConfig::load(config.as_deref())?.persistence.identity_file,
    };
    let store = FileIdentityStore::new(shellexpand::tilde(&path).into_owned());

    match subcommand {
        IdentitySubcommand::Show { .. } => match store.load()? {
            Some(service_id) => println!("{}", service_id),
            None => println!("No identity stored in {}", store.path().display()),
        },
        IdentitySubcommand::Clear { .. } => {
            if store.clear()? {
                println!("Identity removed: {}", store.path().display());
            } else {
                println!("No identity stored in {}", store.path().display());
            }
        }
    }

    Ok(())
}

fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let mut cfg = SdkConfig::load(config.as_deref())?;
            if !cfg.platform.api_key.is_empty() {
                cfg.platform.api_key = "********".to_string();
            }
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let created = config::init_config(path.as_deref(), force)?;
            println!("Configuration file created: {}", created.display());
        }
        ConfigSubcommand::Validate { config } => match SdkConfig::load(config.as_deref()) {
            Ok(_) => println!("Configuration is valid."),
            Err(e) => {
                eprint!("{}", e.format_for_terminal());
                std::process::exit(e.exit_code());
            }
        },
    }

    Ok(())
}
