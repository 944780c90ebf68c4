use crate::config::DatabaseConfig;
use log::debug;
use sea_orm::{Database, DatabaseConnection, DbErr};

/// Opens a connection pool for `config`
pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    debug!("Connecting to database: {}", config.redacted_url());
    Database::connect(config.connect_options()).await
}
