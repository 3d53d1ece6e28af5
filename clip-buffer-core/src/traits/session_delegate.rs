use crate::models::error::ClipError;
use crate::models::export_result::{ExportKind, ExportResult};
use crate::models::state::SessionState;

/// Event delegate for capture session notifications.
///
/// Methods are called from capture, timer and export threads, never a UI
/// thread. Implementations should marshal to the UI thread if needed.
pub trait SessionDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: &SessionState);

    /// Called whenever the whole-second elapsed time changes while recording.
    fn on_elapsed_updated(&self, _elapsed_secs: u64) {}

    /// Called when a fatal error ends the session.
    fn on_error(&self, error: &ClipError);

    /// Called when an export has been written.
    fn on_export_finished(&self, result: &ExportResult);

    /// Called when an export failed after assembly. The raw container is
    /// returned to whoever joins the export.
    fn on_export_failed(&self, _kind: ExportKind, _error: &ClipError) {}
}
