use database::config::DatabaseConfig;
use sea_orm::DatabaseConnection;

/// Shared by every handler through axum's `State`
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    /// Kept for the connection check, which opens a connection of its own
    pub database: DatabaseConfig,
}
