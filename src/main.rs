use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use workbit::auth::{IdentityProvider, SupabaseAuth};
use workbit::config::{Config, DatabaseBackend, LogFormat, LoggingConfig, default_libsql_path};
use workbit::db;
use workbit::settings::Settings;
use workbit::web::{AppState, start_server};

const DEFAULT_LOG_FILTER: &str = "workbit=info,tower_http=info";

#[derive(Parser, Debug)]
#[command(name = "workbit", version, about = "Issue and project tracking API")]
struct Cli {
    /// Settings file (TOML). Falls back to WORKBIT_CONFIG.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default).
    Serve,
    /// Resolve configuration, print a summary and exit.
    CheckConfig,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(logging.ansi);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn print_summary(config: &Config) {
    println!("server:   {}", config.server.bind_addr());
    println!("backend:  {}", config.database.backend.as_str());
    match config.database.backend {
        DatabaseBackend::File => {
            println!("data:     {}", config.database.data_file.display());
        }
        DatabaseBackend::LibSql => match &config.database.libsql_url {
            Some(url) => println!("libsql:   remote replica of {url}"),
            None => println!(
                "libsql:   {}",
                config
                    .database
                    .libsql_path
                    .clone()
                    .unwrap_or_else(default_libsql_path)
                    .display()
            ),
        },
        DatabaseBackend::Postgres => {
            println!("postgres: pool of {}", config.database.pool_size);
        }
    }
    println!(
        "auth:     {}",
        if config.auth.is_configured() {
            "supabase"
        } else {
            "disabled"
        }
    );
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        backend = config.database.backend.as_str(),
        "Connecting to store backend"
    );
    let backends = db::connect_from_config(&config.database)
        .await
        .context("failed to initialise the store backend")?;

    let auth = SupabaseAuth::from_config(&config.auth)
        .context("failed to build the identity provider client")?
        .map(|provider| Arc::new(provider) as Arc<dyn IdentityProvider>);
    if auth.is_none() {
        tracing::info!("Identity provider not configured, requests act as the default user");
    }

    let state = Arc::new(AppState::new(backends, auth));
    state
        .store
        .get_store()
        .await
        .context("failed to load the store")?;

    let addr: SocketAddr = config
        .server
        .bind_addr()
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind_addr()))?;
    start_server(addr, state.clone(), &config.server.allowed_origins).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    state.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings_path = Settings::path_from(cli.config);
    let config = Config::load(settings_path.as_deref()).context("invalid configuration")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::CheckConfig => {
            print_summary(&config);
            Ok(())
        }
        Command::Serve => {
            init_tracing(&config.logging);
            serve(config).await
        }
    }
}
