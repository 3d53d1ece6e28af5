use std::fmt;
use std::sync::Arc;
use std::thread;

use crate::models::error::ClipError;
use crate::models::export_result::{ClipMetadata, ExportKind, ExportOutcome, ExportResult};
use crate::processing::container::{sha256_hex, ContainerBuffer, ContainerFormat};
use crate::traits::export_writer::{ExportWriter, WriteOutcome};
use crate::traits::session_delegate::SessionDelegate;
use crate::traits::transcode_gateway::TranscodeGateway;

/// A failed export. The assembled container is kept so the caller can retry.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportError {
    pub kind: ExportKind,
    pub error: ClipError,
    pub container: ContainerBuffer,
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "export of {} bytes failed: {}", self.container.len(), self.error)
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Transcode-and-write pipeline shared by clip and stop exports.
///
/// Holds no reference to any session: exports run against an already
/// assembled container and may finish after the session is gone.
#[derive(Clone)]
pub struct Exporter {
    transcoder: Arc<dyn TranscodeGateway>,
    writer: Arc<dyn ExportWriter>,
    delegate: Option<Arc<dyn SessionDelegate>>,
    file_prefix: String,
}

impl Exporter {
    pub fn new(transcoder: Arc<dyn TranscodeGateway>, writer: Arc<dyn ExportWriter>) -> Self {
        Self {
            transcoder,
            writer,
            delegate: None,
            file_prefix: "clip".into(),
        }
    }

    pub fn with_delegate(mut self, delegate: Arc<dyn SessionDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    pub fn file_prefix(&self) -> &str {
        &self.file_prefix
    }

    /// Run the export on the calling thread.
    pub fn export(&self, container: ContainerBuffer, kind: ExportKind) -> Result<ExportOutcome, ExportError> {
        match self.run(&container, kind) {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                log::error!("{:?} export failed: {}", kind, error);
                if let Some(ref delegate) = self.delegate {
                    delegate.on_export_failed(kind, &error);
                }
                Err(ExportError { kind, error, container })
            }
        }
    }

    /// Retry a failed export with the container it kept.
    pub fn retry(&self, failed: ExportError) -> Result<ExportOutcome, ExportError> {
        log::info!("retrying {:?} export ({} bytes)", failed.kind, failed.container.len());
        self.export(failed.container, failed.kind)
    }

    /// Run the export on a background thread.
    pub fn spawn(&self, container: ContainerBuffer, kind: ExportKind) -> Result<ExportHandle, ClipError> {
        let exporter = self.clone();
        let fallback = container.clone();
        let handle = thread::Builder::new()
            .name("clip-export".into())
            .spawn(move || exporter.export(container, kind))
            .map_err(|e| ClipError::StorageError(format!("failed to spawn export thread: {}", e)))?;

        Ok(ExportHandle {
            kind,
            handle,
            fallback,
        })
    }

    fn run(&self, container: &ContainerBuffer, kind: ExportKind) -> Result<ExportOutcome, ClipError> {
        let source_format = container.format();
        let extension = self.transcoder.output_extension(source_format);

        log::info!(
            "exporting {:?}: {} bytes of {:?} from {} fragments",
            kind,
            container.len(),
            source_format,
            container.fragment_count()
        );

        let output = self.transcoder.transcode(container.as_bytes(), source_format)?;
        let suggested_name = self.suggested_name(&extension);

        let file_path = match self.writer.prompt_and_write(&output, &suggested_name) {
            Ok(WriteOutcome::Written(path)) => path,
            Ok(WriteOutcome::Cancelled) | Err(ClipError::WriteCancelled) => {
                log::info!("save of {} cancelled", suggested_name);
                return Ok(ExportOutcome::WriteCancelled);
            }
            Err(e) => return Err(e),
        };

        let checksum = sha256_hex(&output);
        let mime_type = ContainerFormat::sniff(&output).mime_type();
        let metadata = ClipMetadata::new(kind, container, &extension, mime_type, output.len(), &checksum);
        let result = ExportResult { file_path, metadata };

        log::info!("saved {} ({} bytes)", result.file_path.display(), output.len());
        if let Some(ref delegate) = self.delegate {
            delegate.on_export_finished(&result);
        }
        Ok(ExportOutcome::Saved(result))
    }

    fn suggested_name(&self, extension: &str) -> String {
        let stamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ");
        format!("{}-{}.{}", self.file_prefix, stamp, extension)
    }
}

/// An export running on its own thread.
pub struct ExportHandle {
    kind: ExportKind,
    handle: thread::JoinHandle<Result<ExportOutcome, ExportError>>,
    fallback: ContainerBuffer,
}

impl ExportHandle {
    pub fn kind(&self) -> ExportKind {
        self.kind
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the export to complete.
    pub fn join(self) -> Result<ExportOutcome, ExportError> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(ExportError {
                kind: self.kind,
                error: ClipError::StorageError("export thread panicked".into()),
                container: self.fallback,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Instant;

    use parking_lot::Mutex;

    use crate::models::fragment::Fragment;
    use crate::processing::assembler::ClipAssembler;
    use crate::processing::container::ContainerFormat;
    use crate::traits::transcode_gateway::Passthrough;

    #[derive(Default)]
    struct MemoryWriter {
        cancel: bool,
        cancel_as_error: bool,
        written: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl ExportWriter for MemoryWriter {
        fn prompt_and_write(&self, bytes: &[u8], suggested_name: &str) -> Result<WriteOutcome, ClipError> {
            if self.cancel {
                return Ok(WriteOutcome::Cancelled);
            }
            if self.cancel_as_error {
                return Err(ClipError::WriteCancelled);
            }
            self.written.lock().push((suggested_name.to_string(), bytes.to_vec()));
            Ok(WriteOutcome::Written(PathBuf::from("/out").join(suggested_name)))
        }
    }

    struct FlakyTranscoder {
        failures_left: Mutex<u32>,
    }

    impl TranscodeGateway for FlakyTranscoder {
        fn transcode(&self, buffer: &[u8], _source_format: ContainerFormat) -> Result<Vec<u8>, ClipError> {
            let mut left = self.failures_left.lock();
            if *left > 0 {
                *left -= 1;
                return Err(ClipError::TranscodeError("encoder crashed".into()));
            }
            Ok(buffer.iter().rev().copied().collect())
        }

        fn output_extension(&self, _source_format: ContainerFormat) -> String {
            "mp3".into()
        }
    }

    fn container() -> ContainerBuffer {
        let now = Instant::now();
        ClipAssembler::concatenate(vec![
            Fragment::new(0, now, vec![0x1A, 0x45, 0xDF, 0xA3]),
            Fragment::new(1, now, vec![1, 2, 3]),
        ])
        .unwrap()
    }

    #[test]
    fn passthrough_export_writes_container() {
        let writer = Arc::new(MemoryWriter::default());
        let exporter = Exporter::new(Arc::new(Passthrough), writer.clone()).with_file_prefix("wire");

        let outcome = exporter.export(container(), ExportKind::FullSession).unwrap();

        let ExportOutcome::Saved(result) = outcome else {
            panic!("expected saved outcome");
        };
        let written = writer.written.lock();
        assert_eq!(written.len(), 1);
        let (name, bytes) = &written[0];
        assert!(name.starts_with("wire-"));
        assert!(name.ends_with(".webm"));
        assert_eq!(bytes, &vec![0x1A, 0x45, 0xDF, 0xA3, 1, 2, 3]);
        assert_eq!(result.metadata.fragment_count, 1);
        assert_eq!(result.metadata.source_format, ContainerFormat::WebM);
        assert_eq!(result.metadata.mime_type, "audio/webm;codecs=opus");
        assert_eq!(result.metadata.checksum, sha256_hex(bytes));
    }

    #[test]
    fn cancelled_write_is_not_an_error() {
        let writer = Arc::new(MemoryWriter {
            cancel: true,
            ..Default::default()
        });
        let exporter = Exporter::new(Arc::new(Passthrough), writer);

        let outcome = exporter.export(container(), ExportKind::Clip { requested_secs: 10 });

        assert_eq!(outcome, Ok(ExportOutcome::WriteCancelled));
    }

    #[test]
    fn writer_cancel_error_is_not_a_failure() {
        let writer = Arc::new(MemoryWriter {
            cancel_as_error: true,
            ..Default::default()
        });
        let exporter = Exporter::new(Arc::new(Passthrough), writer);

        let outcome = exporter.export(container(), ExportKind::FullSession);

        assert_eq!(outcome, Ok(ExportOutcome::WriteCancelled));
    }

    #[test]
    fn transcode_failure_keeps_container_for_retry() {
        let writer = Arc::new(MemoryWriter::default());
        let transcoder = Arc::new(FlakyTranscoder {
            failures_left: Mutex::new(1),
        });
        let exporter = Exporter::new(transcoder, writer.clone());
        let original = container();

        let failed = exporter
            .export(original.clone(), ExportKind::Clip { requested_secs: 5 })
            .unwrap_err();
        assert_eq!(failed.error, ClipError::TranscodeError("encoder crashed".into()));
        assert_eq!(failed.container, original);
        assert!(writer.written.lock().is_empty());

        let outcome = exporter.retry(failed).unwrap();
        assert!(outcome.is_saved());
        let written = writer.written.lock();
        assert!(written[0].0.ends_with(".mp3"));
        assert_eq!(written[0].1, vec![3, 2, 1, 0xA3, 0xDF, 0x45, 0x1A]);
    }

    #[test]
    fn spawned_export_joins_with_result() {
        let writer = Arc::new(MemoryWriter::default());
        let exporter = Exporter::new(Arc::new(Passthrough), writer.clone());

        let handle = exporter.spawn(container(), ExportKind::FullSession).unwrap();
        assert_eq!(handle.kind(), ExportKind::FullSession);

        assert!(handle.join().unwrap().is_saved());
        assert_eq!(writer.written.lock().len(), 1);
    }
}
