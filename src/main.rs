use sea_orm::{Database, DatabaseConnection, DbErr};
use std::sync::Arc;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use pc_concept::api::create_api_router;
use pc_concept::config::{AppConfig, ConfigError};
use pc_concept::entities::setup_schema;

#[derive(Debug, Error)]
enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pc_concept=info,tower_http=info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    let db: DatabaseConnection = Database::connect(&config.database_url).await?;
    setup_schema(&db).await?;

    let shared_db = Arc::new(db);
    let app = create_api_router(shared_db);

    let listener = tokio::net::TcpListener::bind(config.bind_addr()?).await?;
    tracing::info!(addr = %listener.local_addr()?, "PC Concept backend listening");
    axum::serve(listener, app).await?;
    Ok(())
}
