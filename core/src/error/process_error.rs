// core/src/error/process_error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("interpreter not found: {program}")]
    InterpreterNotFound {
        program: String,
        #[source]
        source: which::Error,
    },

    #[error("failed to spawn process: {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error while waiting for process: {program}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    /// One-line description including the underlying cause, suitable for
    /// showing to a user next to the document name.
    pub fn summary(&self) -> String {
        use std::error::Error as _;
        match self.source() {
            Some(source) => format!("{self} ({source})"),
            None => self.to_string(),
        }
    }
}
