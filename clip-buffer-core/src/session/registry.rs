use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::AudioSource;
use crate::models::config::SessionConfig;
use crate::models::error::ClipError;
use crate::models::state::SessionState;
use crate::session::capture::CaptureSession;
use crate::session::export::{ExportHandle, Exporter};
use crate::traits::audio_source_provider::AudioSourceProvider;
use crate::traits::session_delegate::SessionDelegate;

/// Owner of the single active capture session.
///
/// Every control path (UI actions, the hotkey trigger) goes through this
/// registry, which enforces that at most one session records at a time.
/// Starting while one records is rejected, not queued.
pub struct SessionRegistry<P: AudioSourceProvider> {
    provider: P,
    exporter: Exporter,
    delegate: Option<Arc<dyn SessionDelegate>>,
    config: Mutex<SessionConfig>,
    active: Mutex<Option<CaptureSession>>,
}

impl<P: AudioSourceProvider> SessionRegistry<P> {
    pub fn new(provider: P, config: SessionConfig, exporter: Exporter) -> Result<Self, ClipError> {
        config.validate().map_err(ClipError::ConfigurationFailed)?;
        Ok(Self {
            provider,
            exporter,
            delegate: None,
            config: Mutex::new(config),
            active: Mutex::new(None),
        })
    }

    /// Delegate installed on every session started from now on.
    pub fn with_delegate(mut self, delegate: Arc<dyn SessionDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> SessionConfig {
        self.config.lock().clone()
    }

    pub fn list_audio_sources(&self) -> Result<Vec<AudioSource>, ClipError> {
        self.provider.list_audio_sources()
    }

    /// Start recording `source_id` in a fresh session.
    ///
    /// Fails with `SessionActive` if a session is already running. A
    /// leftover errored session is released first.
    pub fn start_session(&self, source_id: &str) -> Result<(), ClipError> {
        let config = self.config();
        let mut active = self.active.lock();

        if let Some(current) = active.as_ref() {
            let state = current.state();
            if !state.is_errored() && !state.is_idle() {
                log::warn!("rejecting start of {}: session is {}", source_id, state.name());
                return Err(ClipError::SessionActive);
            }
        }
        if let Some(mut previous) = active.take() {
            if let Ok(Some(export)) = previous.stop() {
                // Detached; it completes on its own thread
                log::info!("releasing errored session with a {:?} export in flight", export.kind());
            }
        }

        let mut session = CaptureSession::new(config, self.exporter.clone())?;
        if let Some(ref delegate) = self.delegate {
            session.set_delegate(Arc::clone(delegate));
        }
        session.start(&self.provider, source_id)?;

        *active = Some(session);
        Ok(())
    }

    /// Stop the active session and export the whole recording.
    ///
    /// The session is retired immediately; the returned export may still be
    /// running.
    pub fn stop_session(&self) -> Result<Option<ExportHandle>, ClipError> {
        let mut session = self.active.lock().take().ok_or(ClipError::NoActiveSession)?;
        session.stop()
    }

    /// Export the trailing `duration_secs` of the active session.
    pub fn request_clip(&self, duration_secs: u32) -> Result<ExportHandle, ClipError> {
        let active = self.active.lock();
        let session = active.as_ref().ok_or(ClipError::NoActiveSession)?;
        session.request_clip(duration_secs)
    }

    /// Hotkey entry point: clip the configured duration.
    ///
    /// `None` when nothing is recording.
    pub fn trigger_clip(&self) -> Option<Result<ExportHandle, ClipError>> {
        let active = self.active.lock();
        let session = active.as_ref().filter(|s| s.state().is_recording());
        match session {
            Some(session) => Some(session.clip()),
            None => {
                log::debug!("clip trigger ignored: not recording");
                None
            }
        }
    }

    /// Change the clip duration for the active session and every later one.
    pub fn set_clip_duration(&self, seconds: u32) -> Result<(), ClipError> {
        {
            let mut config = self.config.lock();
            let updated = SessionConfig {
                clip_duration_secs: seconds,
                ..config.clone()
            };
            updated.validate().map_err(ClipError::ConfigurationFailed)?;
            *config = updated;
        }

        if let Some(session) = self.active.lock().as_ref() {
            session.set_clip_duration(seconds)?;
        }
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.active
            .lock()
            .as_ref()
            .map_or(SessionState::Idle, CaptureSession::state)
    }

    pub fn is_recording(&self) -> bool {
        self.state().is_recording()
    }

    /// Elapsed seconds of the active session, for display.
    pub fn elapsed_seconds(&self) -> u64 {
        self.active
            .lock()
            .as_ref()
            .map_or(0, CaptureSession::elapsed_seconds)
    }
}
