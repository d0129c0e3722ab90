use std::process::ExitCode;
use std::sync::Arc;

use suspect::{AppState, Catalog, InMemoryRoomRepository, ServerConfig};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "suspect=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting suspect game server");

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let catalog = match &config.data_dir {
        Some(dir) => match Catalog::load(dir) {
            Ok(catalog) => catalog,
            Err(e) => {
                error!(error = %e, "Failed to load catalog");
                return ExitCode::FAILURE;
            }
        },
        None => {
            info!("No data directory configured, using built-in catalog");
            Catalog::default()
        }
    };

    info!(
        locations = catalog.locations().len(),
        challenges = catalog.challenges().len(),
        "Catalog ready"
    );

    let room_repository = Arc::new(InMemoryRoomRepository::new());
    let app_state = AppState::new(room_repository, catalog, config.room.clone());
    let app = suspect::router(app_state);

    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, addr = %config.bind_addr, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };
    info!(addr = %config.bind_addr, "Server running");

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "Server error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
