use std::sync::Arc;

use crate::models::audio_models::{AudioSource, StreamEvent};
use crate::models::error::ClipError;

/// Callback invoked by an open stream for every fragment or device failure.
///
/// Fires on the provider's own capture thread at the fragment cadence. Keep
/// processing minimal.
pub type StreamCallback = Arc<dyn Fn(StreamEvent) + Send + Sync + 'static>;

/// Platform audio sources that produce encoded fragments.
pub trait AudioSourceProvider: Send + Sync {
    /// Sources currently available for capture.
    fn list_audio_sources(&self) -> Result<Vec<AudioSource>, ClipError>;

    /// Open `source_id` and start delivering fragments through `callback`.
    ///
    /// The first `StreamEvent::Data` must carry the container header.
    /// Fails with `PermissionDenied` or `DeviceUnavailable`.
    fn open_audio_stream(
        &self,
        source_id: &str,
        callback: StreamCallback,
    ) -> Result<Box<dyn StreamHandle>, ClipError>;
}

/// An open capture stream. Dropping it releases the device.
pub trait StreamHandle: Send {
    /// Stop delivery and return any encoded bytes not yet delivered.
    ///
    /// No callback fires after this returns.
    fn finish(&mut self) -> Result<Option<Vec<u8>>, ClipError>;
}
