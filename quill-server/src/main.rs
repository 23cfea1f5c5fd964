use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use quill_core::config::{Config, DEFAULT_AUTH_SECRET};
use quill_core::core_access::User;
use quill_core::core_collab::CleanupScheduler;
use quill_core::logging::{init_logging_with_config, LogConfig};
use quill_core::ports::FsObjectStore;
use quill_core::shutdown::{install_signal_handlers, ShutdownCoordinator};
use quill_server::{AppState, QuillServer};

#[derive(Parser, Debug)]
#[command(name = "quill-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API, the real-time gateway and the cleanup scheduler
    Serve,
    /// Run one cleanup batch and print the report
    CleanupOnce,
    /// Print a credential pair for an email, creating the user if needed
    IssueToken {
        #[arg(long)]
        email: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.json_logs {
        config.logging.json_format = true;
    }

    init_logging_with_config(LogConfig::try_from(&config.logging)?)?;

    if config.auth.secret == DEFAULT_AUTH_SECRET {
        warn!("Using the built-in development secret; set QUILL_AUTH_SECRET");
    }

    let shutdown = Arc::new(ShutdownCoordinator::new(config.server.shutdown_timeout));
    let state = Arc::new(
        AppState::from_config(&config, shutdown.clone()).context("opening access store")?,
    );

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            install_signal_handlers(shutdown)?;
            info!("Quill server starting");
            QuillServer::new(state, config).run().await?;
        }
        Command::CleanupOnce => {
            let scheduler = CleanupScheduler::new(
                state.store.clone(),
                Arc::new(FsObjectStore::new(config.cleanup.media_root.clone())),
                shutdown,
                &config.cleanup,
            );
            let report = scheduler.run_batch().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::IssueToken { email } => {
            let user = match state.store.find_user_by_email(&email).await? {
                Some(user) => user,
                None => {
                    let user = User::stub(&email);
                    state.store.create_user(&user).await?;
                    info!(user = %user.id, "Created user");
                    user
                }
            };
            let credentials = state.issuer.issue(&user.email).await?;
            println!("{}", serde_json::to_string_pretty(&credentials)?);
        }
    }

    Ok(())
}
