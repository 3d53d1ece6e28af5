//! Container buffers and header sniffing.
//!
//! A container buffer is the header fragment followed by data fragments,
//! concatenated. Only the header's leading bytes identify the format, so
//! sniffing looks at the first few bytes of the assembled buffer.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// EBML magic that opens every WebM/Matroska stream.
const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// Audio container formats recognised from leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    WebM,
    Ogg,
    Wav,
    Mp3,
    Mp4,
    Unknown,
}

impl ContainerFormat {
    /// Identify a container from its first bytes.
    ///
    /// Layout checks:
    /// ```text
    /// WebM  [0-3]   1A 45 DF A3
    /// Ogg   [0-3]   "OggS"
    /// WAV   [0-3]   "RIFF", [8-11] "WAVE"
    /// MP3   [0-2]   "ID3", or 11-bit frame sync FF Ex
    /// MP4   [4-7]   "ftyp"
    /// ```
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(&EBML_MAGIC) {
            Self::WebM
        } else if bytes.starts_with(b"OggS") {
            Self::Ogg
        } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
            Self::Wav
        } else if bytes.len() >= 8 && &bytes[4..8] == b"ftyp" {
            Self::Mp4
        } else if bytes.starts_with(b"ID3") || (bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0) {
            Self::Mp3
        } else {
            Self::Unknown
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::WebM => "webm",
            Self::Ogg => "ogg",
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Mp4 => "m4a",
            Self::Unknown => "bin",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::WebM => "audio/webm;codecs=opus",
            Self::Ogg => "audio/ogg",
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
            Self::Mp4 => "audio/mp4",
            Self::Unknown => "application/octet-stream",
        }
    }

    /// Demuxer name understood by ffmpeg's `-f` flag.
    pub fn ffmpeg_name(&self) -> Option<&'static str> {
        match self {
            Self::WebM => Some("webm"),
            Self::Ogg => Some("ogg"),
            Self::Wav => Some("wav"),
            Self::Mp3 => Some("mp3"),
            Self::Mp4 => Some("mp4"),
            Self::Unknown => None,
        }
    }
}

/// An assembled, independently decodable container.
///
/// Bytes are shared, so cloning is cheap and a failed export can hand the
/// buffer back to the caller without copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerBuffer {
    data: Arc<[u8]>,
    format: ContainerFormat,
    fragment_count: usize,
    first_sequence: u64,
    last_sequence: u64,
    covered: Duration,
}

impl ContainerBuffer {
    pub(crate) fn new(
        data: Vec<u8>,
        fragment_count: usize,
        first_sequence: u64,
        last_sequence: u64,
        covered: Duration,
    ) -> Self {
        let format = ContainerFormat::sniff(&data);
        Self {
            data: data.into(),
            format,
            fragment_count,
            first_sequence,
            last_sequence,
            covered,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn format(&self) -> ContainerFormat {
        self.format
    }

    /// Number of data fragments (header excluded).
    pub fn fragment_count(&self) -> usize {
        self.fragment_count
    }

    /// Sequence of the oldest data fragment included.
    pub fn first_sequence(&self) -> u64 {
        self.first_sequence
    }

    /// Sequence of the newest data fragment included.
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Time between the oldest and newest included data fragments.
    pub fn covered(&self) -> Duration {
        self.covered
    }

    pub fn checksum(&self) -> String {
        sha256_hex(&self.data)
    }
}

/// SHA-256 hex digest of a byte slice.
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
