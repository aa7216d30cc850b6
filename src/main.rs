//! Restaurant API server and admin CLI

use restaurant_api::{api, commands, core, db};

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = core::config::CliArgs::parse();

    // Load configuration (CLI args > env vars > config file > defaults)
    let config = match core::Config::load(&cli_args) {
        Ok(cfg) => cfg,
        Err(e) => {
            // Print error to stderr since logging isn't initialized yet
            eprintln!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let _logger = match core::Logger::init(&config.logging) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return Err(e);
        }
    };

    info!("Starting Restaurant API v{}", restaurant_api::VERSION);
    info!(path = ?config.database.path, "Opening database");

    let db = Arc::new(db::DatabaseManager::new(
        &config.database.path,
        config.database.connection_pool_size,
        std::time::Duration::from_millis(config.database.busy_timeout),
    )?);

    if let Some(command) = cli_args.command {
        let output = commands::run(command, &config, db).await?;
        println!("{}", output);
        return Ok(());
    }

    let server_url = format!("http://{}:{}", config.server.host, config.server.port);
    let server = api::ApiServer::new(config, db)?;
    info!(url = %server_url, "Server ready - starting to serve requests");

    server.serve().await?;

    Ok(())
}
