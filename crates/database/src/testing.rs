use crate::session::SessionFactory;
use migration::{Migrator, MigratorTrait};
use models::Mappings;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

/// A fresh in-memory database with every migration applied. A single
/// connection keeps the schema alive, so only one session may be open at a time.
pub async fn connection() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);

    let db = Database::connect(options).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}

pub async fn setup() -> SessionFactory {
    setup_with(Mappings::default()).await
}

pub async fn setup_with(mappings: Mappings) -> SessionFactory {
    SessionFactory::new(connection().await, mappings)
}
