// core/src/error/resolve_error.rs
use thiserror::Error;

/// Reasons an output resource request cannot be satisfied. Every variant maps
/// to a not-found response.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No output file found")]
    NoOutputFile,

    #[error("{0} not found")]
    NotFound(String),

    #[error("MathJax resources are not available")]
    MathJaxUnavailable,
}
