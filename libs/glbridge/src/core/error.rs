use thiserror::Error;

/// Propagated status failures.
///
/// This is the recoverable tier only: engine/graph bring-up problems and
/// ordinary misuse that a caller can report upward. Environment
/// misconfiguration discovered at first use (unsupported GPU platform,
/// GPU object creation failure, malformed buffer shape, failed mapping
/// syscalls) is a precondition violation and panics instead; there is no
/// degraded mode mid-session.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("engine error: {0}")]
    Engine(String),

    #[error("GPU context lost: {0}")]
    ContextLost(String),

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error("unsupported packet payload: {0}")]
    UnsupportedPayload(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("operation not supported: {0}")]
    NotSupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
