//! Error types for stbplay
//!
//! This module defines the error type used throughout the engine.
//! We use thiserror for the library error type and anyhow for
//! application-level error handling in the binary.

use thiserror::Error;

use crate::backend::{BackendErrorKind, BackendVariant};

/// Main error type for stbplay
#[derive(Error, Debug)]
pub enum EngineError {
    /// Play request rejected before any backend was touched
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Backend-local failure, classified
    #[error("Backend {variant} failed ({kind:?}): {message}")]
    Backend {
        variant: BackendVariant,
        kind: BackendErrorKind,
        message: String,
    },

    /// Output surface already held by another backend
    #[error("Output surface busy: held by backend #{holder}")]
    SurfaceBusy { holder: u64 },

    /// Viewer is no longer authorized
    #[error("Access denied")]
    AccessDenied,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Coordination thread is gone
    #[error("Coordination channel closed")]
    ChannelClosed,

    /// File I/O errors
    #[error("File error: {0}")]
    FileIO(#[from] std::io::Error),

    /// Generic error for unexpected situations
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Create a backend error from string
    pub fn backend<S: Into<String>>(
        variant: BackendVariant,
        kind: BackendErrorKind,
        msg: S,
    ) -> Self {
        EngineError::Backend {
            variant,
            kind,
            message: msg.into(),
        }
    }

    /// Error kind the supervisor should act on, if this error came from a backend
    pub fn backend_kind(&self) -> Option<BackendErrorKind> {
        match self {
            EngineError::Backend { kind, .. } => Some(*kind),
            // Surface contention is never recoverable by retrying the same backend.
            EngineError::SurfaceBusy { .. } => Some(BackendErrorKind::Unknown),
            _ => None,
        }
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for EngineError {
    fn from(_: crossbeam_channel::SendError<T>) -> Self {
        EngineError::ChannelClosed
    }
}

/// Convenience type alias for Results in stbplay
pub type Result<T> = std::result::Result<T, EngineError>;

/// Extension trait for converting other errors to EngineError
pub trait IntoEngineError<T> {
    /// Convert this error into a configuration error with the given context
    fn config_err(self, context: &str) -> Result<T>;

    /// Convert this error into a backend error with the given context
    fn backend_err(
        self,
        variant: BackendVariant,
        kind: BackendErrorKind,
        context: &str,
    ) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoEngineError<T> for std::result::Result<T, E> {
    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| EngineError::Config(format!("{}: {}", context, e)))
    }

    fn backend_err(
        self,
        variant: BackendVariant,
        kind: BackendErrorKind,
        context: &str,
    ) -> Result<T> {
        self.map_err(|e| EngineError::backend(variant, kind, format!("{}: {}", context, e)))
    }
}

/// Helper macro for creating internal errors with file and line information
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::utils::error::EngineError::Internal(
            format!("{} at {}:{}", $msg, file!(), line!())
        )
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::utils::error::EngineError::Internal(
            format!("{} at {}:{}", format!($fmt, $($arg)*), file!(), line!())
        )
    };
}
