use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::audio_models::StreamEvent;
use crate::models::config::SessionConfig;
use crate::models::error::ClipError;
use crate::models::export_result::ExportKind;
use crate::models::fragment::Fragment;
use crate::models::state::SessionState;
use crate::processing::assembler::ClipAssembler;
use crate::session::export::{ExportHandle, Exporter};
use crate::storage::fragment_store::FragmentStore;
use crate::storage::retention::RetentionPolicy;
use crate::traits::audio_source_provider::{AudioSourceProvider, StreamCallback, StreamHandle};
use crate::traits::session_delegate::SessionDelegate;

/// Internal mutable session state, protected by `parking_lot::Mutex`.
///
/// Lock order: `SessionCore` before `FragmentStore`.
struct SessionCore {
    state: SessionState,
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
    clip_duration_secs: u32,
    error_export: Option<ExportHandle>,
}

impl SessionCore {
    fn elapsed_secs(&self) -> u64 {
        let Some(start) = self.started_at else {
            return 0;
        };
        let end = self.stopped_at.unwrap_or_else(Instant::now);
        end.saturating_duration_since(start).as_secs()
    }
}

/// Everything the capture callback needs, cloned into the stream's thread.
#[derive(Clone)]
struct Pipeline {
    core: Arc<Mutex<SessionCore>>,
    store: Arc<Mutex<FragmentStore>>,
    policy: RetentionPolicy,
    exporter: Exporter,
    delegate: Option<Arc<dyn SessionDelegate>>,
}

impl Pipeline {
    fn handle(&self, event: StreamEvent) {
        match event {
            StreamEvent::Data(payload) => {
                if let Err(e) = self.ingest(payload) {
                    self.fail(e);
                }
            }
            StreamEvent::Error(e) => self.fail(e),
        }
    }

    /// Append one payload and run the eviction pass.
    ///
    /// Returns the assigned sequence, or `None` if the payload was dropped.
    fn ingest(&self, payload: Vec<u8>) -> Result<Option<u64>, ClipError> {
        if payload.is_empty() {
            log::warn!("dropping zero-length fragment");
            return Ok(None);
        }

        let core = self.core.lock();
        if !core.state.accepts_fragments() {
            log::debug!("dropping fragment received while {}", core.state.name());
            return Ok(None);
        }

        let mut store = self.store.lock();
        let now = Instant::now();
        let sequence = store.next_sequence();
        let size = payload.len();
        store.append(Fragment::new(sequence, now, payload))?;

        let evicted = self
            .policy
            .cutoff(now, core.clip_duration_secs)
            .map_or(0, |cutoff| store.evict_older_than(cutoff));

        log::debug!(
            "fragment {} ({} bytes{}), {} buffered, {} evicted",
            sequence,
            size,
            if sequence == Fragment::HEADER_SEQUENCE { ", header" } else { "" },
            store.len(),
            evicted
        );
        Ok(Some(sequence))
    }

    /// Move to `Errored`, exporting the full session if anything usable was captured.
    fn fail(&self, error: ClipError) {
        let snapshot = {
            let mut core = self.core.lock();
            match core.state {
                SessionState::Acquiring | SessionState::Recording { .. } => {}
                SessionState::Stopping => {
                    // stop() owns the final export
                    log::warn!("stream error while stopping: {}", error);
                    return;
                }
                SessionState::Idle | SessionState::Errored(_) => {
                    log::warn!("ignoring error after session ended: {}", error);
                    return;
                }
            }
            log::error!("capture session failed while {}: {}", core.state.name(), error);
            core.state = SessionState::Errored(error.clone());
            if core.stopped_at.is_none() {
                core.stopped_at = Some(Instant::now());
            }

            let store = self.store.lock();
            (store.has_header() && store.data_len() > 0).then(|| store.snapshot_all())
        };

        self.notify(&SessionState::Errored(error.clone()));
        if let Some(ref delegate) = self.delegate {
            delegate.on_error(&error);
        }

        let Some(snapshot) = snapshot else {
            return;
        };
        let export = ClipAssembler::concatenate(snapshot)
            .and_then(|container| self.exporter.spawn(container, ExportKind::FullSession));
        match export {
            Ok(handle) => {
                log::info!("exporting captured audio after failure");
                self.core.lock().error_export = Some(handle);
            }
            Err(e) => log::error!("could not export after failure: {}", e),
        }
    }

    fn set_state(&self, state: SessionState) {
        self.core.lock().state = state.clone();
        self.notify(&state);
    }

    fn notify(&self, state: &SessionState) {
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(state);
        }
    }
}

/// One recording, from device acquisition to final export.
///
/// ```text
/// [StreamHandle] → callback → ingest → [FragmentStore] ─┬→ request_clip → [Exporter] (thread)
///                                       evict ←┘        └→ stop → assemble_all → [Exporter]
/// ```
///
/// A session instance records once. After `stop` (or an error) it is
/// discarded and a new one is created for the next recording.
pub struct CaptureSession {
    config: SessionConfig,
    pipeline: Pipeline,
    stream: Option<Box<dyn StreamHandle>>,

    // Elapsed-time ticker control
    timer_running: Arc<AtomicBool>,
    timer_handle: Option<thread::JoinHandle<()>>,
}

impl CaptureSession {
    pub fn new(config: SessionConfig, exporter: Exporter) -> Result<Self, ClipError> {
        config.validate().map_err(ClipError::ConfigurationFailed)?;
        let policy = config.retention_policy();

        let core = SessionCore {
            state: SessionState::Idle,
            started_at: None,
            stopped_at: None,
            clip_duration_secs: config.clip_duration_secs,
            error_export: None,
        };

        Ok(Self {
            config,
            pipeline: Pipeline {
                core: Arc::new(Mutex::new(core)),
                store: Arc::new(Mutex::new(FragmentStore::new())),
                policy,
                exporter,
                delegate: None,
            },
            stream: None,
            timer_running: Arc::new(AtomicBool::new(false)),
            timer_handle: None,
        })
    }

    /// Install the delegate. Must be called before `start`.
    pub fn set_delegate(&mut self, delegate: Arc<dyn SessionDelegate>) {
        self.pipeline.delegate = Some(delegate);
    }

    pub fn state(&self) -> SessionState {
        self.pipeline.core.lock().state.clone()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.pipeline.core.lock().elapsed_secs()
    }

    pub fn clip_duration_secs(&self) -> u32 {
        self.pipeline.core.lock().clip_duration_secs
    }

    pub fn retention_horizon(&self) -> Duration {
        let clip_duration_secs = self.pipeline.core.lock().clip_duration_secs;
        self.pipeline.policy.horizon(clip_duration_secs)
    }

    /// Fragments currently buffered, header included.
    pub fn buffered_fragments(&self) -> usize {
        self.pipeline.store.lock().len()
    }

    /// Acquire `source_id` and begin recording. Transitions: idle → acquiring → recording.
    ///
    /// On failure the session ends in `Errored` and the error is returned.
    pub fn start(&mut self, provider: &dyn AudioSourceProvider, source_id: &str) -> Result<(), ClipError> {
        {
            let core = self.pipeline.core.lock();
            if !core.state.is_idle() {
                return Err(ClipError::InvalidState(format!(
                    "can only start from idle state, session is {}",
                    core.state.name()
                )));
            }
        }

        log::info!("acquiring audio source {}", source_id);
        self.pipeline.store.lock().clear();
        self.pipeline.set_state(SessionState::Acquiring);

        let pipeline = self.pipeline.clone();
        let callback: StreamCallback = Arc::new(move |event: StreamEvent| pipeline.handle(event));

        let stream = match provider.open_audio_stream(source_id, callback) {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("failed to open audio source {}: {}", source_id, e);
                self.pipeline.store.lock().clear();
                self.pipeline.set_state(SessionState::Errored(e.clone()));
                if let Some(ref delegate) = self.pipeline.delegate {
                    delegate.on_error(&e);
                }
                return Err(e);
            }
        };
        self.stream = Some(stream);

        {
            let mut core = self.pipeline.core.lock();
            if let SessionState::Errored(e) = &core.state {
                // The stream failed before acquisition completed.
                return Err(e.clone());
            }
            core.started_at = Some(Instant::now());
            core.stopped_at = None;
        }
        self.pipeline.set_state(SessionState::Recording { elapsed_secs: 0 });
        self.start_elapsed_timer();

        log::info!(
            "recording {} (clip {}s, retention {}s)",
            source_id,
            self.clip_duration_secs(),
            self.retention_horizon().as_secs()
        );
        Ok(())
    }

    /// Feed one encoded payload, as the stream callback does.
    ///
    /// Zero-length payloads are dropped. An ordering failure ends the session.
    pub fn ingest(&self, payload: Vec<u8>) -> Result<Option<u64>, ClipError> {
        self.pipeline.ingest(payload).inspect_err(|e| self.pipeline.fail(e.clone()))
    }

    /// Change the clip duration. The new horizon applies on the next eviction pass.
    pub fn set_clip_duration(&self, seconds: u32) -> Result<(), ClipError> {
        if seconds == 0 {
            return Err(ClipError::ConfigurationFailed("clip duration must be positive".into()));
        }
        self.pipeline.core.lock().clip_duration_secs = seconds;
        log::info!(
            "clip duration {}s, retention {}s",
            seconds,
            self.pipeline.policy.horizon_secs(seconds)
        );
        Ok(())
    }

    /// Export the trailing `duration_secs` in the background.
    ///
    /// Assembly happens here; transcoding and writing run on the returned
    /// export thread. `InsufficientData` leaves the session recording.
    pub fn request_clip(&self, duration_secs: u32) -> Result<ExportHandle, ClipError> {
        if duration_secs == 0 {
            return Err(ClipError::ConfigurationFailed("clip duration must be positive".into()));
        }
        {
            let core = self.pipeline.core.lock();
            if !core.state.is_recording() {
                return Err(ClipError::InvalidState(format!(
                    "can only clip while recording, session is {}",
                    core.state.name()
                )));
            }
        }

        let snapshot = {
            let store = self.pipeline.store.lock();
            ClipAssembler::snapshot_for(&store, duration_secs, Instant::now())
        };
        let container = ClipAssembler::concatenate(snapshot).inspect_err(|_| {
            log::info!("no audio captured in the last {}s", duration_secs);
        })?;

        self.pipeline.exporter.spawn(
            container,
            ExportKind::Clip {
                requested_secs: duration_secs,
            },
        )
    }

    /// Export the trailing clip of the configured duration.
    pub fn clip(&self) -> Result<ExportHandle, ClipError> {
        self.request_clip(self.clip_duration_secs())
    }

    /// Stop recording and export everything captured.
    /// Transitions: recording → stopping → idle.
    ///
    /// Returns `None` if nothing beyond the header was captured. On an
    /// errored session this only releases the device and hands back the
    /// failure export, if one was started.
    pub fn stop(&mut self) -> Result<Option<ExportHandle>, ClipError> {
        let errored = {
            let core = self.pipeline.core.lock();
            match &core.state {
                SessionState::Recording { .. } => false,
                SessionState::Errored(_) => true,
                other => {
                    return Err(ClipError::InvalidState(format!(
                        "can only stop from recording state, session is {}",
                        other.name()
                    )))
                }
            }
        };
        if errored {
            self.release();
            return Ok(self.take_error_export());
        }

        self.pipeline.set_state(SessionState::Stopping);
        self.stop_elapsed_timer();

        // Flush whatever the encoder still holds, then release the device
        if let Some(mut stream) = self.stream.take() {
            match stream.finish() {
                Ok(Some(trailing)) => {
                    if let Err(e) = self.pipeline.ingest(trailing) {
                        log::error!("failed to ingest trailing fragment: {}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => log::warn!("stream did not finish cleanly: {}", e),
            }
        }

        let snapshot = {
            let mut core = self.pipeline.core.lock();
            core.stopped_at = Some(Instant::now());
            let mut store = self.pipeline.store.lock();
            let snapshot = store.snapshot_all();
            store.clear();
            snapshot
        };

        let export = match ClipAssembler::concatenate(snapshot) {
            Ok(container) => self.pipeline.exporter.spawn(container, ExportKind::FullSession).map(Some),
            Err(ClipError::InsufficientData) => {
                log::warn!("recording stopped with no audio captured");
                Ok(None)
            }
            Err(e) => Err(e),
        };

        self.pipeline.set_state(SessionState::Idle);
        log::info!("recording stopped after {}s", self.elapsed_seconds());
        export
    }

    /// Take the export started by a fatal error, if any.
    pub fn take_error_export(&self) -> Option<ExportHandle> {
        self.pipeline.core.lock().error_export.take()
    }

    /// Stop the ticker and release the device without exporting.
    fn release(&mut self) {
        self.stop_elapsed_timer();
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.finish() {
                log::warn!("stream did not finish cleanly: {}", e);
            }
        }
        self.pipeline.store.lock().clear();
    }

    /// Start the elapsed-time ticker.
    fn start_elapsed_timer(&mut self) {
        self.timer_running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.timer_running);
        let core = Arc::clone(&self.pipeline.core);
        let delegate = self.pipeline.delegate.clone();
        let tick = Duration::from_millis(self.config.tick_interval_ms);

        let spawned = thread::Builder::new()
            .name("elapsed-timer".into())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    thread::sleep(tick);

                    let mut c = core.lock();
                    let SessionState::Recording { elapsed_secs } = &c.state else {
                        continue;
                    };
                    let previous = *elapsed_secs;
                    let now_secs = c.elapsed_secs();
                    if now_secs == previous {
                        continue;
                    }
                    c.state = SessionState::Recording { elapsed_secs: now_secs };
                    drop(c);

                    if let Some(ref d) = delegate {
                        d.on_elapsed_updated(now_secs);
                    }
                }
            });

        match spawned {
            Ok(handle) => self.timer_handle = Some(handle),
            Err(e) => {
                // Elapsed time is still available on demand through elapsed_seconds()
                log::error!("failed to spawn elapsed timer: {}", e);
                self.timer_running.store(false, Ordering::SeqCst);
            }
        }
    }

    fn stop_elapsed_timer(&mut self) {
        self.timer_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.timer_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release();
    }
}
