use thiserror::Error;

/// The error taxonomy from the design doc's error-handling section.
///
/// `UsageError` and `ConfigError` are fatal before a run starts; `SetupError`
/// aborts before any call is issued; `CallError` is tallied, never fatal by
/// itself; `AbortTriggered` stops a run early but still yields a result;
/// `SerializationError` after a successful run is fatal.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("setup error: {0}")]
    Setup(String),

    #[error("call error: {0}")]
    Call(String),

    #[error("run aborted: {0}")]
    AbortTriggered(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("histogram sample was not finite")]
    InvalidSample,

    #[error("histogram schedule mismatch: cannot merge histograms with different (offset, resolution)")]
    ScheduleMismatch,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
