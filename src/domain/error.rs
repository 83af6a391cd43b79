//! Domain-level errors (no external dependencies)

use thiserror::Error;

/// Domain errors represent structural violations of the input hierarchy.
/// Any of them aborts a run before the first export starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("cyclic hierarchy: document {id} is its own ancestor")]
    CyclicHierarchy { id: String },

    #[error("duplicate document id: {0}")]
    DuplicateId(String),

    #[error("document at input position {0} has an empty id")]
    EmptyId(usize),
}
