use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::processing::container::{ContainerBuffer, ContainerFormat};

/// What an export covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportKind {
    /// Trailing clip of the requested length.
    Clip { requested_secs: u32 },
    /// Everything retained when the session stopped.
    FullSession,
}

/// Result of a successful export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportResult {
    pub file_path: PathBuf,
    pub metadata: ClipMetadata,
}

/// Outcome of an export that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    Saved(ExportResult),
    /// The user dismissed the save prompt. Not an error.
    WriteCancelled,
}

impl ExportOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved(_))
    }
}

/// Metadata describing an exported clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipMetadata {
    pub id: String,
    pub kind: ExportKind,
    pub source_format: ContainerFormat,
    pub output_extension: String,
    /// MIME type sniffed from the written bytes.
    pub mime_type: String,
    pub fragment_count: usize,
    pub covered_secs: f64,
    pub container_bytes: usize,
    pub output_bytes: usize,
    pub checksum: String,
    pub created_at: String,
}

impl ClipMetadata {
    pub fn new(
        kind: ExportKind,
        container: &ContainerBuffer,
        output_extension: &str,
        mime_type: &str,
        output_bytes: usize,
        checksum: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            source_format: container.format(),
            output_extension: output_extension.to_string(),
            mime_type: mime_type.to_string(),
            fragment_count: container.fragment_count(),
            covered_secs: container.covered().as_secs_f64(),
            container_bytes: container.len(),
            output_bytes,
            checksum: checksum.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
