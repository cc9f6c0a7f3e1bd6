use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

use kudos::config::{Cli, Command, Config};
use kudos::db;
use kudos::seed::{self, Definitions};
use kudos::state::{AppState, DbPool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli)?;
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    match cli.command.clone().unwrap_or(Command::Serve) {
        Command::Seed { file } => {
            let definitions = match file {
                Some(path) => Definitions::load(&path)?,
                None => Definitions::builtin()?,
            };
            seed::seed(&pool, &definitions)?;
            Ok(())
        }
        Command::PurgeTags => {
            let state = AppState::new(pool, config)?;
            let removed = state.rewards.purge_expired_tags(chrono::Utc::now())?;
            tracing::info!("Removed {} expired tag grants", removed);
            Ok(())
        }
        Command::Serve => serve(pool, config).await,
    }
}

async fn serve(pool: DbPool, config: Config) -> anyhow::Result<()> {
    if config.rewards.seed_defaults && seed::seed_defaults_if_empty(&pool)? {
        tracing::info!("Seeded built-in reward definitions");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let app = kudos::app(AppState::new(pool, config)?);

    // Start server
    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
