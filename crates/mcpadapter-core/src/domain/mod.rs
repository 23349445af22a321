//! Domain entities

mod backend;

pub use backend::{BackendDefinition, BackendEntry};
