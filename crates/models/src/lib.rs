pub mod binding;
pub mod cascade;
pub mod entity;
pub mod error;
pub mod graph;

pub use binding::{SessionBinding, SessionToken};
pub use cascade::{Association, CascadePolicy, Mappings};
pub use entity::{Collection, Course, Instructor, InstructorDetail, Review, Student};
pub use error::GraphError;
pub use graph::{EntityGraph, GraphNode, Key, NodeRef};
