mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use quill_api::storage::AvatarStore;
use quill_api::{AppState, AppStateInner};
use quill_db::Database;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "quill", version, about = "A small blogging server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the web server (default)
    Serve,
    /// Create the database tables
    Initdb {
        /// Drop existing tables first
        #[arg(long)]
        drop: bool,
    },
    /// Drop all database tables
    Dropdb,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quill_server=debug,quill_api=debug,quill_db=info,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Initdb { drop } => {
            let db = Database::connect(&config.db_path)?;
            if drop {
                db.drop_all()?;
            }
            db.migrate()?;
            println!("Database initialized at {}", config.db_path.display());
            Ok(())
        }
        Command::Dropdb => {
            let db = Database::connect(&config.db_path)?;
            db.drop_all()?;
            println!("Database dropped at {}", config.db_path.display());
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    // Init database and avatar storage
    let db = Database::open(&config.db_path)?;
    let avatars = AvatarStore::new(config.static_dir.clone()).await?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        avatars,
        session_days: config.session_days,
        cookie_secure: config.cookie_secure,
    });

    let app = quill_api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Quill listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    info!("Received Ctrl+C, shutting down...");
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
