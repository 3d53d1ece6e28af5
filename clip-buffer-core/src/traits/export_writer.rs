use std::path::PathBuf;

use crate::models::error::ClipError;

/// Outcome of handing bytes to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(PathBuf),
    Cancelled,
}

/// Persists exported bytes, typically behind a save prompt.
pub trait ExportWriter: Send + Sync {
    /// Write `bytes`, offering `suggested_name` to the user.
    ///
    /// A user cancelling the prompt is `Ok(WriteOutcome::Cancelled)`. An
    /// `Err(ClipError::WriteCancelled)` is treated the same way.
    fn prompt_and_write(&self, bytes: &[u8], suggested_name: &str) -> Result<WriteOutcome, ClipError>;
}
