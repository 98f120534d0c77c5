use thiserror::Error;

/// Errors raised by the transfer engine.
///
/// `NotFound` and `Io` are recoverable at the orchestration level. Everything
/// else means the geometry, the data, or the caller is inconsistent.
#[derive(Debug, Error)]
pub enum LodestoneError {
    #[error("Input error: {0}")]
    Input(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Source error: {0}")]
    Source(String),
    #[error("Mismatch error: {0}")]
    Mismatch(String),
    #[error("Out of range: {0}")]
    OutOfRange(String),
    #[error("Format error: {0}")]
    Format(String),
    #[error("IO error: {0}")]
    Io(String),
}

impl LodestoneError {
    /// Whether a caller may skip the failing coupling and carry on
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LodestoneError::NotFound(_) | LodestoneError::Io(_))
    }
}
