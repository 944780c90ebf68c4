pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod services;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use error::PersistenceError;
pub use session::{Loadable, Session, SessionFactory, save_graph};
