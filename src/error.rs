//! Application-wide error types.

use thiserror::Error;

use crate::llm::CompletionError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    /// Namespace file could not be read or written. The store logs these
    /// and keeps going.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("memory error: {0}")]
    Memory(String),

    #[error("upstream error: {0}")]
    Upstream(#[from] CompletionError),

    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// User input outside the accepted set; the text is shown as is.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Upstream answered but returned nothing usable.
    #[error("empty result: {0}")]
    EmptyResult(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Text suitable for showing to the end user.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Upstream(e) => e.user_message().to_string(),
            AppError::Fetch(FetchError::Timeout) => "the source took too long to answer, try again later".into(),
            AppError::Fetch(_) => "something went wrong fetching that, try again later".into(),
            AppError::EmptyResult(_) => "nothing suitable found, try again later".into(),
            AppError::InvalidInput(msg) => msg.clone(),
            other => format!("internal error: {other}"),
        }
    }
}

/// Failure from a listing/search collaborator (Reddit, Steam, catalog).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("{0}")]
    Upstream(String),
}
