use crate::cascade::{Association, CascadePolicy};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// The collection is bound to an open session but has not been fetched yet
    #[error("{association} has not been fetched yet, fetch it through its session first")]
    NotFetched { association: Association },

    /// The collection's session is closed, so it can no longer be fetched
    #[error("{association} was not fetched before its session closed")]
    Detached { association: Association },

    /// The two sides of a bidirectional link disagree
    #[error("inconsistent {association} link: {detail}")]
    Inconsistent {
        association: Association,
        detail: String,
    },

    /// A child that can only exist inside its owner has no owner
    #[error("{node} must belong to a {owner}")]
    Unowned { node: String, owner: &'static str },

    #[error("cannot map {association} as {policy}: {reason}")]
    InvalidMapping {
        association: Association,
        policy: CascadePolicy,
        reason: &'static str,
    },

    #[error("{key} has unknown cascade policy {value:?}")]
    UnknownPolicy { key: String, value: String },
}
