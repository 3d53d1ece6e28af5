use serde::{Deserialize, Serialize};

/// Kind of capturable audio source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioSourceKind {
    Microphone,
    /// Loopback/monitor of an output device.
    SystemOutput,
    Window,
    Screen,
}

/// An audio source available for capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSource {
    pub id: String,
    pub name: String,
    pub kind: AudioSourceKind,
    pub is_default: bool,
}

/// Event delivered by an open audio stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// One encoded fragment payload. The first delivered payload carries the container header.
    Data(Vec<u8>),
    /// Unrecoverable device failure.
    Error(super::error::ClipError),
}
