/*
[INPUT]:  CLI arguments, optional YAML configuration, MOBANK_* env vars, OS signals
[OUTPUT]: Session, PIN and request operations against the configured backend
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

mod commands;
mod settings;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use commands::App;
use commands::pin::PinCommand;
use settings::CliSettings;

#[derive(Parser, Debug)]
#[command(name = "mobank", version, about = "Mobile banking session & device-security core")]
struct Cli {
    #[arg(long = "config", value_name = "PATH", global = true)]
    config_path: Option<PathBuf>,
    /// Secure store file (defaults to the user data directory)
    #[arg(long = "store", value_name = "PATH", global = true)]
    store_path: Option<PathBuf>,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: String,
    /// Write logs to this file instead of stderr
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,
    /// Pretend the device has no connectivity
    #[arg(long, global = true)]
    offline: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the issued tokens
    Login {
        #[arg(long)]
        username: Option<String>,
    },
    /// Create an account
    Register {
        #[arg(long)]
        username: Option<String>,
        /// Extra profile field, repeatable
        #[arg(long = "field", value_name = "KEY=VALUE", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
    /// Sign out and wipe the local session
    Logout,
    /// Show session and app-lock state
    Status,
    /// Mark onboarding as done
    Onboarded,
    /// Manage the app PIN
    Pin {
        #[command(subcommand)]
        action: PinCommand,
    },
    /// Send an authenticated API request
    Request {
        method: String,
        path: String,
        #[arg(long, value_name = "JSON")]
        body: Option<String>,
        /// Allow retries for a non-GET request
        #[arg(long)]
        retry_safe: bool,
    },
    /// Simulate app usage with auto-lock
    Watch,
    /// Print the effective configuration
    Config,
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    commands::session::parse_field(raw).map_err(|err| err.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let _log_guard = init_tracing(&args.log_level, args.log_file.as_deref())?;

    let settings = CliSettings::load(args.config_path.as_deref()).context("load config")?;
    if matches!(args.command, Command::Config) {
        print!("{}", settings.to_yaml()?);
        return Ok(());
    }

    let store_path = settings.resolve_store_path(args.store_path.as_deref())?;
    info!(
        store = %store_path.display(),
        offline = args.offline,
        command = ?args.command,
        "starting mobank"
    );
    let app = App::build(settings.session, store_path, args.offline).await?;

    match args.command {
        Command::Login { username } => commands::session::login(&app, username).await,
        Command::Register { username, fields } => {
            commands::session::register(&app, username, fields).await
        }
        Command::Logout => commands::session::logout(&app).await,
        Command::Status => commands::session::status(&app).await,
        Command::Onboarded => {
            app.session.mark_onboarding_complete().await?;
            println!("onboarding marked complete");
            Ok(())
        }
        Command::Pin { action } => commands::pin::run(&app, action).await,
        Command::Request {
            method,
            path,
            body,
            retry_safe,
        } => commands::request::run(&app, &method, &path, body.as_deref(), retry_safe).await,
        Command::Watch => {
            let shutdown = CancellationToken::new();
            setup_signal_handlers(shutdown.clone());
            commands::watch::run(&app, shutdown).await
        }
        Command::Config => Ok(()),
    }
}

fn init_tracing(log_level: &str, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|err| anyhow!(err))
            .context("initialize tracing subscriber")?;
        return Ok(None);
    };

    let directory = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path.file_name().context("log file path must name a file")?;
    std::fs::create_dir_all(directory).context("create log directory")?;

    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(Some(guard))
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
