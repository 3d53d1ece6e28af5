//! # clip-buffer-ffmpeg
//!
//! ffmpeg-backed collaborators for clip-buffer-core.
//!
//! Provides:
//! - `FfmpegCaptureProvider`: device capture to a live Opus/WebM stream, cut into fragments
//! - `FfmpegTranscoder`: container to MP3 (128 kbit/s, 44.1 kHz, stereo)
//! - `DirectoryWriter`: saves exports into a directory
//! - `RecorderSettings`: JSON settings in the platform config directory
//! - `trigger`: the line-based clip trigger used by `clip-recorder`
//!
//! ## Requirements
//! An `ffmpeg` build with libopus and libmp3lame, plus an input device
//! format for the platform (`pulse`, `avfoundation` or `dshow`).
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use clip_buffer_core::{Exporter, SessionRegistry};
//! use clip_buffer_ffmpeg::{DirectoryWriter, FfmpegCaptureProvider, FfmpegTranscoder, RecorderSettings};
//!
//! let settings = RecorderSettings::default();
//! let exporter = Exporter::new(
//!     Arc::new(FfmpegTranscoder::new(&settings)),
//!     Arc::new(DirectoryWriter::new(&settings.output_dir)),
//! );
//! let registry = SessionRegistry::new(FfmpegCaptureProvider::new(&settings), settings.session.clone(), exporter)?;
//! registry.start_session("default")?;
//! let clip = registry.trigger_clip();
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod transcode;
pub mod trigger;
pub mod writer;

#[cfg(all(test, unix))]
mod test_support;

pub use capture::FfmpegCaptureProvider;
pub use config::{RecorderSettings, TargetFormat};
pub use error::FfmpegError;
pub use transcode::FfmpegTranscoder;
pub use trigger::{TriggerCommand, TriggerEvent};
pub use writer::DirectoryWriter;
