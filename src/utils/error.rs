//! Error types for the player core
//!
//! Synchronous failures are rare in the player core: precondition violations
//! are silent no-ops and media failures are reported asynchronously through
//! listeners. The error type below covers what remains (starting without a
//! media, backend open failures, configuration and thread spawning).

use thiserror::Error;

/// Main error type for the player core
#[derive(Error, Debug)]
pub enum CoreError {
    /// An operation needed a current media and none is set
    #[error("No media set")]
    NoMedia,

    /// Media backend errors (open, demux, seek)
    #[error("Backend error: {0}")]
    Backend(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File error: {0}")]
    FileIO(#[from] std::io::Error),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Worker thread errors
    #[error("Thread error: {0}")]
    Thread(String),
}

impl CoreError {
    /// Create a backend error from string
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        CoreError::Backend(msg.into())
    }
}

/// Convenience type alias for Results in the player core
pub type Result<T> = std::result::Result<T, CoreError>;

/// Extension trait for converting other errors to CoreError
pub trait IntoCoreError<T> {
    /// Convert this error into a CoreError with the given context
    fn backend_err(self, context: &str) -> Result<T>;
    fn config_err(self, context: &str) -> Result<T>;
    fn thread_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoCoreError<T> for std::result::Result<T, E> {
    fn backend_err(self, context: &str) -> Result<T> {
        self.map_err(|e| CoreError::Backend(format!("{}: {}", context, e)))
    }

    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| CoreError::Config(format!("{}: {}", context, e)))
    }

    fn thread_err(self, context: &str) -> Result<T> {
        self.map_err(|e| CoreError::Thread(format!("{}: {}", context, e)))
    }
}
