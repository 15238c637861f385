use anyhow::Result;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod config;
mod error;
mod middleware;
mod models;
mod notifications;
mod permissions;
mod registry;
mod repositories;
mod retention;
mod routes;
mod state;
mod validation;
mod websocket;

#[cfg(test)]
mod test_support;

use common::{
    database::{DatabaseConfig, init_pool},
    jwt::{JwtConfig, JwtService},
};

use crate::{config::ServerConfig, retention::RetentionSweeper, state::AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting API service");

    let server_config = ServerConfig::load()?;
    let jwt_config = JwtConfig::from_env()?;

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    // Check database connectivity
    if common::database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied");

    let app_state = AppState::new(pool, JwtService::new(&jwt_config));

    let sweeper = RetentionSweeper::new(
        app_state.order_repository.clone(),
        server_config.order_retention_days,
    );
    let _scheduler = sweeper.start(&server_config.retention_schedule).await?;

    // Start the web server
    let app = routes::create_router(app_state);

    let address = server_config.bind_address()?;
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("API service listening on {}", address);

    axum::serve(listener, app).await?;

    Ok(())
}
