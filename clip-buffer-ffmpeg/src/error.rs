//! Errors raised while driving the `ffmpeg` process.

use std::io;
use std::path::{Path, PathBuf};

use clip_buffer_core::ClipError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FfmpegError {
    #[error("ffmpeg binary not found at {0}")]
    BinaryNotFound(PathBuf),

    #[error("not permitted to run {0}")]
    NotPermitted(PathBuf),

    #[error("failed to start ffmpeg: {0}")]
    Spawn(io::Error),

    #[error("ffmpeg pipe failed: {0}")]
    Pipe(io::Error),

    #[error("ffmpeg exited with {status}: {detail}")]
    Exited { status: String, detail: String },

    #[error("settings error: {0}")]
    Settings(String),
}

impl FfmpegError {
    /// Classify a spawn failure of `binary`.
    pub fn from_spawn(binary: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::BinaryNotFound(binary.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::NotPermitted(binary.to_path_buf()),
            _ => Self::Spawn(error),
        }
    }

    /// Error for a non-zero exit, using the last stderr line as detail.
    pub fn exited(status: std::process::ExitStatus, stderr: &str) -> Self {
        let detail = stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("no diagnostic output")
            .trim()
            .to_string();
        Self::Exited {
            status: status.to_string(),
            detail,
        }
    }

    /// Map into the session-level error for a capture failure.
    pub fn into_capture_error(self) -> ClipError {
        match self {
            Self::NotPermitted(_) => ClipError::PermissionDenied,
            Self::BinaryNotFound(_) | Self::Spawn(_) | Self::Pipe(_) | Self::Exited { .. } => {
                ClipError::DeviceUnavailable
            }
            Self::Settings(msg) => ClipError::ConfigurationFailed(msg),
        }
    }

    /// Map into the export-level error for a transcode failure.
    pub fn into_transcode_error(self) -> ClipError {
        ClipError::TranscodeError(self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_errors_are_classified() {
        let binary = Path::new("/opt/ffmpeg");

        let missing = FfmpegError::from_spawn(binary, io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(missing, FfmpegError::BinaryNotFound(ref p) if p == binary));
        assert_eq!(missing.into_capture_error(), ClipError::DeviceUnavailable);

        let denied = FfmpegError::from_spawn(binary, io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(denied.into_capture_error(), ClipError::PermissionDenied);
    }

    #[test]
    fn transcode_errors_keep_message() {
        let err = FfmpegError::Settings("bitrate must be positive".into());

        assert_eq!(
            err.into_transcode_error(),
            ClipError::TranscodeError("settings error: bitrate must be positive".into())
        );
    }
}
