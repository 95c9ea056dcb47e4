use thiserror::Error;

/// Errors from resolving platform resources.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("path error: {0}")]
    Path(String),
}
