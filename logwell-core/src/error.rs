use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store busy")]
    StoreBusy,

    #[error("store error: {0}")]
    StoreFatal(String),

    #[error("invalid search query: {0}")]
    InvalidSearch(String),

    #[error("too many tail subscribers (limit {0})")]
    TooManySubscribers(usize),

    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Stable machine-readable kind reported to callers alongside the
    /// human message. Never a stack trace.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Io(_) => "io",
            EngineError::StoreBusy => "store_busy",
            EngineError::StoreFatal(_) => "store_error",
            EngineError::InvalidSearch(_) => "invalid_search",
            EngineError::TooManySubscribers(_) => "too_many_subscribers",
            EngineError::Config(_) => "config",
        }
    }

    /// Fatal errors terminate the process so a supervisor can restart it;
    /// everything else is retried or reported to the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::StoreFatal(_) | EngineError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
