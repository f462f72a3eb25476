//! Error types for histcard

use thiserror::Error;

/// histcard error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed selector predicate, effect-spec axis mismatch or an
    /// otherwise inconsistent model configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A systematic with the same resolved name is already attached to
    /// the target process
    #[error("duplicate systematic: {0}")]
    DuplicateSystematic(String),

    /// A required histogram path is absent from the template store
    #[error("missing template: {0}")]
    MissingTemplate(String),

    /// Efficiency denominator (pass+fail rate) is zero
    #[error("divide by zero: {0}")]
    DivideByZero(String),

    /// Datacard parsing error
    #[error("card error: {0}")]
    Card(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
