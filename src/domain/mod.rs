//! Domain layer: models and errors shared by every subsystem.

pub mod errors;
pub mod models;

pub use errors::{DomainError, DomainResult};
