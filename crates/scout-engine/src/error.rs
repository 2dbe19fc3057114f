#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("message is empty")]
    EmptyMessage,

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("coordinator is shutting down")]
    ShuttingDown,

    #[error("{0}")]
    Internal(String),
}
