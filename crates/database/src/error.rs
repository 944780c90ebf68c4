use models::{Association, GraphError};
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// A related entity reached through an association without save cascade
    /// has not been persisted
    #[error(
        "{entity} references an unsaved {related} through {association}; save it first or enable cascade"
    )]
    TransientEntity {
        entity: &'static str,
        related: &'static str,
        association: Association,
    },

    #[error("{association} was accessed after its session closed")]
    DetachedAccess { association: Association },

    #[error("{entity} has not been saved yet")]
    Unsaved { entity: &'static str },

    #[error("transaction rolled back after an earlier failure in this session")]
    RolledBack,

    #[error(transparent)]
    Graph(GraphError),

    #[error(transparent)]
    Db(#[from] DbErr),
}

impl From<GraphError> for PersistenceError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Detached { association } => Self::DetachedAccess { association },
            other => Self::Graph(other),
        }
    }
}

impl PersistenceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
