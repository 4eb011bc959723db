mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[derive(Parser)]
#[command(name = "oboe")]
#[command(about = "Delegated-identity token exchange and tool broker")]
#[command(version)]
pub struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate a configuration file
    CheckConfig {
        /// Broker configuration (TOML)
        #[arg(short, long, env = "OBOE_CONFIG", default_value = "oboe.toml")]
        config: PathBuf,
    },
    /// Refresh the tool registry and print the catalog
    Tools {
        /// Broker configuration (TOML)
        #[arg(short, long, env = "OBOE_CONFIG", default_value = "oboe.toml")]
        config: PathBuf,

        /// Print the catalog and refresh report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect or change stored consent
    Consent {
        /// Broker configuration (TOML)
        #[arg(short, long, env = "OBOE_CONFIG", default_value = "oboe.toml")]
        config: PathBuf,

        #[command(subcommand)]
        action: ConsentAction,
    },
    /// Exchange a user token for one resource (diagnostic)
    Exchange {
        /// Broker configuration (TOML)
        #[arg(short, long, env = "OBOE_CONFIG", default_value = "oboe.toml")]
        config: PathBuf,

        /// Inbound user token
        #[arg(short, long, env = "OBOE_USER_TOKEN", hide_env_values = true)]
        token: String,

        /// Resource scope id
        #[arg(short, long)]
        scope: String,
    },
}

#[derive(Subcommand)]
pub enum ConsentAction {
    /// Record consent for a subject
    Grant {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        scope: String,
    },
    /// Withdraw consent for a subject
    Revoke {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        scope: String,
    },
    /// Show whether a subject has consented
    Check {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        scope: String,
    },
    /// List every stored decision for a subject
    List {
        #[arg(long)]
        subject: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.verbose, cli.json_logs, cli.log_file.as_deref())?;

    match cli.command {
        Commands::CheckConfig { config } => commands::check_config(&config),
        Commands::Tools { config, json } => commands::list_tools(&config, json).await,
        Commands::Consent { config, action } => commands::consent(&config, action).await,
        Commands::Exchange {
            config,
            token,
            scope,
        } => commands::exchange(&config, &token, &scope).await,
    }
}

fn init_logging(
    verbose: bool,
    json: bool,
    log_file: Option<&std::path::Path>,
) -> Result<Option<WorkerGuard>> {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "warn,oboe={0},oboe_common={0},oboe_auth={0},oboe_tools={0},oboe_core={0}",
            log_level
        ))
    });

    let console = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .boxed()
    };

    let (file, guard) = match log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("--log-file must name a file"))?;
            let appender = tracing_appender::rolling::never(directory, name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(filter)
        .init();

    Ok(guard)
}
