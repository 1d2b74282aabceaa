use thiserror::Error;

/// Errors raised while loading and validating declarative configuration.
///
/// Most validation problems are handled by dropping the offending entry
/// with a diagnostic; these variants cover failures of the document as a
/// whole.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration document is not valid JSON: {0}")]
    InvalidDocument(#[from] serde_json::Error),

    #[error("persisted state is not a JSON object")]
    InvalidState,

    #[error("I/O error reading configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by classification and generation backends.
///
/// Backend failures never abort a turn: the orchestrator converts them
/// into empty-result sentinels, which generators treat as retryable and
/// classifiers treat as "no labels selected".
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend returned a malformed response: {0}")]
    MalformedResponse(String),

    #[error("backend request failed: {0}")]
    Request(String),
}
