use clap::{CommandFactory, Parser, ValueEnum};
use dotenv::dotenv;
use std::io;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod board;
mod config;
mod db;
mod mastodon;
mod models;
mod rpc;
mod supervisor;

use config::Config;
use db::Database;
use mastodon::HttpConnector;
use rpc::ControlPlaneServer;
use supervisor::Supervisor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SchemaAction {
    Create,
    Drop,
}

#[derive(Debug, Parser)]
#[command(name = "web3chan", about = "like 4chan, but in web3", after_help = "BOTTOM TEXT")]
struct Cli {
    /// Run the bot daemon
    #[arg(short, long)]
    daemon: bool,

    /// Create or drop the database schema
    #[arg(long, value_enum)]
    database: Option<SchemaAction>,
}

fn init_logging(config: &Config) {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(config.log_filter())
        .filter_module("tungstenite", log::LevelFilter::Warn)
        .filter_module("tokio_tungstenite", log::LevelFilter::Warn);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

fn database(config: &Config, action: SchemaAction) -> io::Result<()> {
    let db = Database::new(&config.database_url).map_err(io::Error::other)?;
    match action {
        SchemaAction::Create => log::info!("Database schema created at {}", config.database_url),
        SchemaAction::Drop => {
            db.drop_schema().map_err(io::Error::other)?;
            log::info!("Database schema dropped at {}", config.database_url);
        }
    }
    Ok(())
}

async fn daemon(config: Config) -> io::Result<()> {
    let config = Arc::new(config);

    log::info!("Initializing database at {}", config.database_url);
    let db = Database::new(&config.database_url).map_err(|e| {
        log::error!("can't connect to the database: {}", e);
        io::Error::other(e)
    })?;

    let connector = HttpConnector::new().map_err(io::Error::other)?;
    let shutdown = CancellationToken::new();
    let supervisor = Arc::new(Supervisor::new(
        Arc::new(db),
        config.clone(),
        Arc::new(connector),
        shutdown.clone(),
    ));

    let listener = ControlPlaneServer::bind(&config.rpc_address).await.map_err(|e| {
        log::error!("can't bind JSON-RPC server to {}: {}", config.rpc_address, e);
        e
    })?;

    if let Err(e) = supervisor.start_enabled_boards().await {
        log::error!("Failed to load enabled boards: {}", e);
    }

    let server = tokio::spawn(ControlPlaneServer::new(supervisor.clone()).run(listener, shutdown.clone()));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => log::info!("Shutdown signal received"),
        _ = shutdown.cancelled() => {}
    }

    shutdown.cancel();
    if let Err(e) = server.await {
        log::error!("JSON-RPC server task failed: {}", e);
    }
    supervisor.stop_all().await;
    log::info!("web3chan stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> io::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    init_logging(&config);

    if let Some(action) = cli.database {
        database(&config, action)
    } else if cli.daemon {
        daemon(config).await
    } else {
        Cli::command().print_help()?;
        println!();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from(["web3chan", "-d"]).unwrap();
        assert!(cli.daemon);
        assert_eq!(cli.database, None);

        let cli = Cli::try_parse_from(["web3chan", "--database", "drop"]).unwrap();
        assert_eq!(cli.database, Some(SchemaAction::Drop));

        assert!(Cli::try_parse_from(["web3chan", "--database", "truncate"]).is_err());
    }

    #[test]
    fn test_drop_schema_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database_url: dir.path().join("web3chan.db").to_string_lossy().to_string(),
            ..Config::default()
        };
        database(&config, SchemaAction::Create).unwrap();
        database(&config, SchemaAction::Drop).unwrap();
        assert!(dir.path().join("web3chan.db").exists());
    }
}
