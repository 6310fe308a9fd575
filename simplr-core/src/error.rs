//! Error types for simplr-core.
//!
//! The engine has no I/O of its own, so the surface is narrow: strict token
//! parsing plus failures reported by the external collaborators.

/// Errors surfaced by the query engine.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// A sort token that is not one of the known policies.
    #[error("unknown sort option: {0}")]
    UnknownSortOption(String),

    /// A filter token that is not one of the known predicates.
    #[error("unknown filter: {0}")]
    UnknownFilter(String),

    /// The external task source could not produce a snapshot.
    #[error("task source error: {0}")]
    Source(String),

    /// The shared preference slot could not be read or written.
    #[error("preference storage error: {0}")]
    Storage(String),
}

/// Convenience type alias for simplr-core results.
pub type Result<T> = std::result::Result<T, QueryError>;
