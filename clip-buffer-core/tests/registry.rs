//! Registry-level scenarios: one active session, clip triggers, stop exports.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use clip_buffer_core::{
    AudioSource, AudioSourceKind, AudioSourceProvider, ClipError, ExportKind, ExportOutcome, ExportResult,
    ExportWriter, Exporter, Passthrough, SessionConfig, SessionDelegate, SessionRegistry, SessionState,
    StreamCallback, StreamEvent, StreamHandle, WriteOutcome,
};

const HEADER: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// Provider whose stream is driven by the test through `push`.
#[derive(Default)]
struct ScriptedProvider {
    callback: Arc<Mutex<Option<StreamCallback>>>,
    deny: bool,
}

impl ScriptedProvider {
    fn push(&self, payload: &[u8]) {
        let callback = self.callback.lock().clone().expect("stream not open");
        callback(StreamEvent::Data(payload.to_vec()));
    }
}

struct ScriptedStream {
    callback: Arc<Mutex<Option<StreamCallback>>>,
}

impl StreamHandle for ScriptedStream {
    fn finish(&mut self) -> Result<Option<Vec<u8>>, ClipError> {
        self.callback.lock().take();
        Ok(None)
    }
}

impl AudioSourceProvider for ScriptedProvider {
    fn list_audio_sources(&self) -> Result<Vec<AudioSource>, ClipError> {
        Ok(vec![
            AudioSource {
                id: "default".into(),
                name: "Built-in Microphone".into(),
                kind: AudioSourceKind::Microphone,
                is_default: true,
            },
            AudioSource {
                id: "default.monitor".into(),
                name: "Speakers (monitor)".into(),
                kind: AudioSourceKind::SystemOutput,
                is_default: false,
            },
        ])
    }

    fn open_audio_stream(&self, source_id: &str, callback: StreamCallback) -> Result<Box<dyn StreamHandle>, ClipError> {
        if self.deny {
            return Err(ClipError::PermissionDenied);
        }
        if source_id == "missing" {
            return Err(ClipError::DeviceUnavailable);
        }
        *self.callback.lock() = Some(callback);
        Ok(Box::new(ScriptedStream {
            callback: Arc::clone(&self.callback),
        }))
    }
}

#[derive(Default)]
struct MemoryWriter {
    files: Mutex<Vec<(String, Vec<u8>)>>,
}

impl ExportWriter for MemoryWriter {
    fn prompt_and_write(&self, bytes: &[u8], suggested_name: &str) -> Result<WriteOutcome, ClipError> {
        self.files.lock().push((suggested_name.into(), bytes.to_vec()));
        Ok(WriteOutcome::Written(PathBuf::from(suggested_name)))
    }
}

#[derive(Default)]
struct RecordingDelegate {
    states: Mutex<Vec<String>>,
    finished: Mutex<usize>,
}

impl SessionDelegate for RecordingDelegate {
    fn on_state_changed(&self, state: &SessionState) {
        self.states.lock().push(state.name().to_string());
    }

    fn on_error(&self, _error: &ClipError) {}

    fn on_export_finished(&self, _result: &ExportResult) {
        *self.finished.lock() += 1;
    }
}

struct Fixture {
    registry: SessionRegistry<ScriptedProvider>,
    writer: Arc<MemoryWriter>,
    delegate: Arc<RecordingDelegate>,
}

fn fixture(provider: ScriptedProvider) -> Fixture {
    let writer = Arc::new(MemoryWriter::default());
    let delegate = Arc::new(RecordingDelegate::default());
    let config = SessionConfig {
        tick_interval_ms: 10,
        file_prefix: "wire".into(),
        ..Default::default()
    };
    let exporter = Exporter::new(Arc::new(Passthrough), writer.clone())
        .with_delegate(delegate.clone())
        .with_file_prefix(config.file_prefix.clone());
    let registry = SessionRegistry::new(provider, config, exporter)
        .unwrap()
        .with_delegate(delegate.clone());
    Fixture {
        registry,
        writer,
        delegate,
    }
}

#[test]
fn lists_provider_sources() {
    let f = fixture(ScriptedProvider::default());

    let sources = f.registry.list_audio_sources().unwrap();

    assert_eq!(sources.len(), 2);
    assert_eq!(sources[1].kind, AudioSourceKind::SystemOutput);
}

#[test]
fn second_start_is_rejected_while_recording() {
    let f = fixture(ScriptedProvider::default());

    f.registry.start_session("default").unwrap();

    assert_eq!(f.registry.start_session("default"), Err(ClipError::SessionActive));
    assert!(f.registry.is_recording());
}

#[test]
fn clip_without_data_reports_insufficient_and_keeps_recording() {
    let f = fixture(ScriptedProvider::default());
    f.registry.start_session("default").unwrap();
    f.registry.provider().push(&HEADER);

    let result = f.registry.request_clip(10);

    assert!(matches!(result, Err(ClipError::InsufficientData)));
    assert!(f.registry.is_recording());
}

#[test]
fn trigger_is_noop_without_recording_session() {
    let f = fixture(ScriptedProvider::default());

    assert!(f.registry.trigger_clip().is_none());
    assert!(matches!(f.registry.request_clip(5), Err(ClipError::NoActiveSession)));
    assert!(matches!(f.registry.stop_session(), Err(ClipError::NoActiveSession)));
    assert_eq!(f.registry.state(), SessionState::Idle);
    assert_eq!(f.registry.elapsed_seconds(), 0);
}

#[test]
fn trigger_exports_configured_clip() {
    let f = fixture(ScriptedProvider::default());
    f.registry.start_session("default").unwrap();
    f.registry.provider().push(&HEADER);
    f.registry.provider().push(&[1, 2, 3]);

    let handle = f.registry.trigger_clip().expect("recording").unwrap();

    assert_eq!(handle.kind(), ExportKind::Clip { requested_secs: 10 });
    assert!(matches!(handle.join(), Ok(ExportOutcome::Saved(_))));
    let files = f.writer.files.lock();
    assert!(files[0].0.starts_with("wire-"));
    assert_eq!(files[0].1, vec![0x1A, 0x45, 0xDF, 0xA3, 1, 2, 3]);
}

#[test]
fn stop_exports_full_session_and_allows_restart() {
    let f = fixture(ScriptedProvider::default());
    f.registry.start_session("default").unwrap();
    f.registry.provider().push(&HEADER);
    f.registry.provider().push(&[1]);
    f.registry.provider().push(&[2]);

    let handle = f.registry.stop_session().unwrap().expect("full export");
    assert_eq!(handle.kind(), ExportKind::FullSession);
    assert!(handle.join().unwrap().is_saved());
    assert_eq!(f.writer.files.lock()[0].1, vec![0x1A, 0x45, 0xDF, 0xA3, 1, 2]);
    assert_eq!(*f.delegate.finished.lock(), 1);
    assert_eq!(f.registry.state(), SessionState::Idle);

    // A fresh session starts over with its own header
    f.registry.start_session("default.monitor").unwrap();
    f.registry.provider().push(&HEADER);
    f.registry.provider().push(&[7]);
    let handle = f.registry.request_clip(5).unwrap();
    handle.join().unwrap();
    assert_eq!(f.writer.files.lock()[1].1, vec![0x1A, 0x45, 0xDF, 0xA3, 7]);

    let states = f.delegate.states.lock();
    assert_eq!(
        &states[..4],
        &["acquiring", "recording", "stopping", "idle"].map(String::from)
    );
}

#[test]
fn export_outlives_stopped_session() {
    let f = fixture(ScriptedProvider::default());
    f.registry.start_session("default").unwrap();
    f.registry.provider().push(&HEADER);
    f.registry.provider().push(&[1]);

    let clip = f.registry.request_clip(30).unwrap();
    let full = f.registry.stop_session().unwrap().unwrap();

    assert!(clip.join().unwrap().is_saved());
    assert!(full.join().unwrap().is_saved());
    assert_eq!(f.writer.files.lock().len(), 2);
}

#[test]
fn failed_acquisition_leaves_registry_idle() {
    let f = fixture(ScriptedProvider {
        deny: true,
        ..Default::default()
    });

    assert_eq!(f.registry.start_session("default"), Err(ClipError::PermissionDenied));
    assert_eq!(f.registry.state(), SessionState::Idle);
    assert!(f.delegate.states.lock().contains(&"errored".to_string()));
}

#[test]
fn unavailable_device_is_reported() {
    let f = fixture(ScriptedProvider::default());

    assert_eq!(f.registry.start_session("missing"), Err(ClipError::DeviceUnavailable));
    assert!(!f.registry.is_recording());
    // The user retries explicitly
    f.registry.start_session("default").unwrap();
    assert!(f.registry.is_recording());
}

#[test]
fn clip_duration_change_applies_to_active_and_future_sessions() {
    let f = fixture(ScriptedProvider::default());
    f.registry.start_session("default").unwrap();
    f.registry.provider().push(&HEADER);
    f.registry.provider().push(&[1]);

    f.registry.set_clip_duration(45).unwrap();

    let handle = f.registry.trigger_clip().unwrap().unwrap();
    assert_eq!(handle.kind(), ExportKind::Clip { requested_secs: 45 });
    handle.join().unwrap();
    assert_eq!(f.registry.config().clip_duration_secs, 45);
    assert!(f.registry.set_clip_duration(0).is_err());
    assert_eq!(f.registry.config().clip_duration_secs, 45);
}

#[test]
fn concurrent_ingest_and_clips_stay_consistent() {
    let f = Arc::new(fixture(ScriptedProvider::default()));
    f.registry.start_session("default").unwrap();
    f.registry.provider().push(&HEADER);

    let producer = {
        let f = Arc::clone(&f);
        thread::spawn(move || {
            for i in 0..200u32 {
                f.registry.provider().push(&[(i % 251) as u8 + 1]);
                if i % 50 == 0 {
                    thread::sleep(Duration::from_millis(1));
                }
            }
        })
    };

    let mut handles = Vec::new();
    for _ in 0..10 {
        match f.registry.request_clip(60) {
            Ok(handle) => handles.push(handle),
            Err(ClipError::InsufficientData) => {}
            Err(e) => panic!("unexpected clip error: {e}"),
        }
        thread::sleep(Duration::from_millis(1));
    }
    producer.join().unwrap();

    for handle in handles {
        handle.join().unwrap();
    }
    // Every clip is a whole container: header first, no partial fragments
    for (_, bytes) in f.writer.files.lock().iter() {
        assert_eq!(&bytes[..4], &HEADER);
        assert!(bytes.len() > 4);
    }
    assert!(f.registry.is_recording());
}
