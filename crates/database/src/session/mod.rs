mod bulk;
mod delete;
mod load;
mod save;

pub use load::Loadable;

use crate::error::PersistenceError;
use log::{debug, warn};
use models::{EntityGraph, Mappings, NodeRef, SessionToken};
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use uuid::Uuid;

/// Hands out sessions over a shared connection pool. Cheap to share between
/// tasks behind an `Arc`.
pub struct SessionFactory {
    db: DatabaseConnection,
    mappings: Arc<Mappings>,
    next_session: AtomicU64,
}

impl SessionFactory {
    pub fn new(db: DatabaseConnection, mappings: Mappings) -> Self {
        Self {
            db,
            mappings: Arc::new(mappings),
            next_session: AtomicU64::new(1),
        }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn mappings(&self) -> &Mappings {
        &self.mappings
    }

    /// Begins a transaction and wraps it in a new session
    pub async fn open_session(&self) -> Result<Session, PersistenceError> {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let txn = self.db.begin().await?;
        debug!("Opened session {id}");

        Ok(Session {
            txn,
            token: SessionToken::new(id),
            mappings: Arc::clone(&self.mappings),
            failed: false,
        })
    }
}

/// A unit of work over one transaction. Collections loaded through a session
/// can only be fetched while it is open; committing, rolling back or dropping
/// it closes it. Dropping without committing rolls the transaction back.
pub struct Session {
    txn: DatabaseTransaction,
    token: SessionToken,
    mappings: Arc<Mappings>,
    failed: bool,
}

impl Session {
    pub fn id(&self) -> u64 {
        self.token.id()
    }

    pub fn mappings(&self) -> &Mappings {
        &self.mappings
    }

    /// Whether a write in this session has failed. A failed session can only
    /// be rolled back.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub async fn commit(self) -> Result<(), PersistenceError> {
        let id = self.id();
        if self.failed {
            warn!("Session {id} had a failed write, rolling back instead of committing");
            self.txn.rollback().await?;
            return Err(PersistenceError::RolledBack);
        }

        self.txn.commit().await?;
        debug!("Committed session {id}");
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), PersistenceError> {
        let id = self.id();
        self.txn.rollback().await?;
        debug!("Rolled back session {id}");
        Ok(())
    }

    /// Poisons the session when a write fails
    fn track<T>(&mut self, result: Result<T, PersistenceError>) -> Result<T, PersistenceError> {
        if let Err(e) = &result {
            warn!("Session {}: write failed: {e}", self.id());
            self.failed = true;
        }
        result
    }
}

/// Saves `root` and everything its cascades reach in a session of its own,
/// committing on success
pub async fn save_graph(
    factory: &SessionFactory,
    graph: &mut EntityGraph,
    root: impl Into<NodeRef>,
) -> Result<Uuid, PersistenceError> {
    let mut session = factory.open_session().await?;
    let id = session.save(graph, root).await?;
    session.commit().await?;
    Ok(id)
}
