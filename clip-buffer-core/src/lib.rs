//! # clip-buffer-core
//!
//! Platform-agnostic rolling audio buffer.
//!
//! Ingests a continuous stream of encoded, timestamped fragments, keeps only
//! what the look-back window needs, and assembles a standalone container
//! (header fragment first, then data fragments) for any trailing range on
//! demand, while capture continues. Platform backends implement
//! `AudioSourceProvider`, `TranscodeGateway` and `ExportWriter` and plug into
//! `SessionRegistry`.
//!
//! ## Architecture
//!
//! ```text
//! clip-buffer-core (this crate)
//! ├── traits/       ← AudioSourceProvider, StreamHandle, TranscodeGateway, ExportWriter, SessionDelegate
//! ├── models/       ← ClipError, SessionState, SessionConfig, Fragment, AudioSource, ClipMetadata
//! ├── storage/      ← FragmentStore, RetentionPolicy
//! ├── processing/   ← ClipAssembler, ContainerBuffer, ContainerFormat
//! └── session/      ← CaptureSession, Exporter, SessionRegistry
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{AudioSource, AudioSourceKind, StreamEvent};
pub use models::config::SessionConfig;
pub use models::error::ClipError;
pub use models::export_result::{ClipMetadata, ExportKind, ExportOutcome, ExportResult};
pub use models::fragment::Fragment;
pub use models::state::SessionState;
pub use processing::assembler::ClipAssembler;
pub use processing::container::{ContainerBuffer, ContainerFormat};
pub use session::capture::CaptureSession;
pub use session::export::{ExportError, ExportHandle, Exporter};
pub use session::registry::SessionRegistry;
pub use storage::fragment_store::FragmentStore;
pub use storage::retention::{retention_horizon_seconds, RetentionPolicy};
pub use traits::audio_source_provider::{AudioSourceProvider, StreamCallback, StreamHandle};
pub use traits::export_writer::{ExportWriter, WriteOutcome};
pub use traits::session_delegate::SessionDelegate;
pub use traits::transcode_gateway::{Passthrough, TranscodeGateway};
