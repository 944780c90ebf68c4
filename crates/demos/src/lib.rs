use database::{
    PersistenceError, Session, SessionFactory,
    config::{ConfigError, DatabaseConfig, mappings_from_env},
    db,
};
use env_logger::Env;
use log::{error, info};
use migration::{Migrator, MigratorTrait};
use models::GraphError;
use sea_orm::DbErr;
use std::{env, future::Future, process};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DemoError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Db(#[from] DbErr),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("usage: {0}")]
    Usage(String),
}

/// Sets up logging and runs a demo, exiting non-zero if it fails
pub async fn run<F, Fut>(demo: F)
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), DemoError>>,
{
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(e) = demo().await {
        error!("{e}");
        process::exit(1);
    }
    info!("Done");
}

/// Connects to the configured database, brings its schema up to date and
/// builds a session factory with the configured cascade mappings
pub async fn factory() -> Result<SessionFactory, DemoError> {
    let config = DatabaseConfig::from_env()?;
    let db = db::connect(&config).await?;
    Migrator::up(&db, None).await?;
    Ok(SessionFactory::new(db, mappings_from_env()?))
}

/// Reads the id passed as the first argument
pub fn id_arg(what: &str) -> Result<Uuid, DemoError> {
    let program = env::args().next().unwrap_or_default();
    let raw = env::args()
        .nth(1)
        .ok_or_else(|| DemoError::Usage(format!("{program} <{what}-id>")))?;
    raw.parse()
        .map_err(|_| DemoError::Usage(format!("{program} <{what}-id>, got {raw:?}")))
}

/// Closes a session: commits when the work succeeded, rolls back otherwise
pub async fn finish<T>(session: Session, result: Result<T, PersistenceError>) -> Result<T, DemoError> {
    match result {
        Ok(value) => {
            session.commit().await?;
            Ok(value)
        }
        Err(e) => {
            session.rollback().await?;
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use database::entities::student;
    use models::{EntityGraph, Mappings, Student};
    use sea_orm::{ConnectOptions, Database, EntityTrait, PaginatorTrait};

    async fn setup() -> SessionFactory {
        let mut options = ConnectOptions::new("sqlite::memory:");
        options.max_connections(1).sqlx_logging(false);
        let db = Database::connect(options).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        SessionFactory::new(db, Mappings::default())
    }

    async fn students(factory: &SessionFactory) -> u64 {
        student::Entity::find()
            .count(factory.connection())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_finish_commits_success() {
        let factory = setup().await;
        let mut graph = EntityGraph::new();
        let key = graph.insert(Student::new("Paul", "Doe", "paul@luv2code.com"));

        let mut session = factory.open_session().await.unwrap();
        let result = session.save(&mut graph, key).await;
        let id = finish(session, result).await.unwrap();

        assert_eq!(graph.id_of(key), Some(id));
        assert_eq!(students(&factory).await, 1);
    }

    #[tokio::test]
    async fn test_finish_rolls_back_failure() {
        let factory = setup().await;
        let mut graph = EntityGraph::new();
        let key = graph.insert(Student::new("Mary", "Public", "mary@luv2code.com"));

        let mut session = factory.open_session().await.unwrap();
        session.save(&mut graph, key).await.unwrap();
        let missing = session.load::<Student>(&mut graph, Uuid::new_v4()).await;
        let result = finish(session, missing).await;

        assert!(matches!(
            result,
            Err(DemoError::Persistence(PersistenceError::NotFound { .. }))
        ));
        assert_eq!(students(&factory).await, 0);
    }
}
