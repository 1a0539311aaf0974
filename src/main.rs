use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal::{self, ctrl_c};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

mod error;
mod feature;
mod models;
mod registry;
mod routes;
mod store;

use feature::SimulatedHeartRate;
use registry::ModelRegistry;
use routes::AppState;
use store::RecordStore;

#[derive(Parser, Debug)]
#[command(name = "vitals-backend")]
#[command(about = "User signup/login and vital-sign predictions over HTTP", long_about = None)]
struct Cli {
    /// Port to listen on; the server binds to all interfaces
    #[arg(long, env = "PORT", default_value_t = 5000)]
    port: u16,
    /// CSV file holding registered users
    #[arg(long, env = "USERS_FILE", default_value = "users.csv")]
    users_file: PathBuf,
    /// Directory with the exported model artifacts
    #[arg(long, env = "MODELS_DIR", default_value = "models")]
    models_dir: PathBuf,
    /// Directory with the static pages
    #[arg(long, env = "STATIC_DIR", default_value = "static")]
    static_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!(?cli, "Starting");

    let store = RecordStore::new(&cli.users_file);
    let created = store
        .initialize()
        .with_context(|| format!("failed to prepare {}", store.path().display()))?;
    if created {
        info!("Database file '{}' created.", store.path().display());
    } else {
        info!(
            "Using database file '{}' with {} users",
            store.path().display(),
            store.count()?
        );
    }

    let registry = ModelRegistry::load_all(&cli.models_dir);

    let state = Arc::new(AppState {
        store,
        registry,
        features: Box::new(SimulatedHeartRate::default()),
        static_dir: cli.static_dir,
    });
    let app = routes::router(state);

    let address = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with an error")?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
