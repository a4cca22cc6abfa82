/// Core error types for heifkit.
use crate::format::HeifErrorCode;

/// A specialized Result type for heifkit operations.
pub type HeifkitResult<T> = Result<T, HeifkitError>;

/// Top-level error type encompassing all heifkit subsystems.
#[derive(Debug, thiserror::Error)]
pub enum HeifkitError {
    /// The one-time module setup failed; the module must not be used.
    #[error("module init error: {0}")]
    ModuleInit(String),

    /// libheif could not allocate a context, encoder or buffer.
    #[error("allocation error: {0}")]
    Allocation(String),

    #[error("libheif error: {message} (code {code}, subcode {subcode})")]
    Heif {
        code: i32,
        subcode: i32,
        message: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl HeifkitError {
    /// Build an error from a non-OK libheif `heif_error` triple.
    ///
    /// Out-of-memory reports are surfaced as [`HeifkitError::Allocation`] so
    /// callers see a single allocation failure category.
    pub fn from_heif(code: i32, subcode: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        match HeifErrorCode::from_raw(code) {
            HeifErrorCode::MemoryAllocationError => HeifkitError::Allocation(message),
            _ => HeifkitError::Heif {
                code,
                subcode,
                message,
            },
        }
    }

    /// The libheif error code, when this error came from libheif.
    pub fn heif_code(&self) -> Option<HeifErrorCode> {
        match self {
            HeifkitError::Heif { code, .. } => Some(HeifErrorCode::from_raw(*code)),
            HeifkitError::Allocation(_) => Some(HeifErrorCode::MemoryAllocationError),
            _ => None,
        }
    }
}
