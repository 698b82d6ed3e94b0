use thiserror::Error;

/// Errors produced by model constructors and parsing routines.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("unknown log level: {0}")]
    UnknownLevel(String),

    #[error("unknown stream kind: {0}")]
    UnknownStream(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
