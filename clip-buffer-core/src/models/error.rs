use thiserror::Error;

/// Errors raised by the clip buffer engine and its collaborators.
///
/// Acquisition and invariant errors are fatal to the current session.
/// `InsufficientData` and `TranscodeError` only concern a single export.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClipError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("device not available")]
    DeviceUnavailable,

    #[error("out-of-order fragment: expected sequence {expected}, got {actual}")]
    OutOfOrderFragment { expected: u64, actual: u64 },

    #[error("not enough audio captured to export")]
    InsufficientData,

    #[error("transcode failed: {0}")]
    TranscodeError(String),

    #[error("write cancelled by user")]
    WriteCancelled,

    #[error("a session is already recording")]
    SessionActive,

    #[error("no active session")]
    NoActiveSession,

    #[error("invalid session state: {0}")]
    InvalidState(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),
}

