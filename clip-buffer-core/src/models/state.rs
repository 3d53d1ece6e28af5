use super::error::ClipError;

/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → acquiring → recording → stopping → idle
///            ↓           ↓
///         errored     errored
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Acquiring,
    Recording { elapsed_secs: u64 },
    Stopping,
    Errored(ClipError),
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording { .. })
    }

    pub fn is_errored(&self) -> bool {
        matches!(self, Self::Errored(_))
    }

    /// States in which fragments are accepted from the stream.
    ///
    /// Includes `Acquiring`, so a header delivered while the stream is still
    /// opening is kept, and `Stopping`, for the trailing flush.
    pub fn accepts_fragments(&self) -> bool {
        matches!(self, Self::Acquiring | Self::Recording { .. } | Self::Stopping)
    }

    /// Short lowercase name, suitable for UI and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Acquiring => "acquiring",
            Self::Recording { .. } => "recording",
            Self::Stopping => "stopping",
            Self::Errored(_) => "errored",
        }
    }
}
