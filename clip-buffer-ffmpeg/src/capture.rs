//! ffmpeg device capture provider.
//!
//! Records a device through `ffmpeg -f <input_format> -i <source>`, encodes
//! Opus into a live WebM stream on stdout, and cuts that stream into
//! fragments on cluster boundaries. The first fragment is everything before
//! the first cluster (EBML header, segment info, tracks) and becomes the
//! session's header fragment.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use clip_buffer_core::{AudioSource, AudioSourceProvider, ClipError, StreamCallback, StreamEvent, StreamHandle};

use crate::config::RecorderSettings;
use crate::error::FfmpegError;

/// Matroska Cluster element ID.
const CLUSTER_ID: [u8; 4] = [0x1F, 0x43, 0xB6, 0x75];

/// Bytes held without a cluster boundary before they are emitted anyway.
const MAX_PENDING: usize = 1 << 20;

const READ_CHUNK: usize = 16 * 1024;
const GRACEFUL_EXIT: Duration = Duration::from_secs(2);
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const STDERR_TAIL: usize = 16;

/// Accumulates encoder output and releases it on cluster boundaries.
///
/// A match of the cluster ID inside frame data only shifts a cut point;
/// bytes are never dropped or reordered.
#[derive(Debug, Default)]
struct ClusterSplitter {
    buffer: Vec<u8>,
    header_sent: bool,
}

impl ClusterSplitter {
    fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// The next payload that ends just before a cluster start.
    fn take_ready(&mut self) -> Option<Vec<u8>> {
        let boundary = if self.header_sent {
            // Hold back the newest cluster, it may still be growing
            self.buffer
                .get(1..)
                .and_then(|tail| tail.windows(CLUSTER_ID.len()).rposition(|w| w == CLUSTER_ID))
                .map(|pos| pos + 1)
        } else {
            self.buffer
                .windows(CLUSTER_ID.len())
                .position(|w| w == CLUSTER_ID)
                .filter(|&pos| pos > 0)
        };

        let cut = match boundary {
            Some(cut) => cut,
            None if self.buffer.len() >= MAX_PENDING => self.buffer.len(),
            None => return None,
        };
        self.header_sent = true;
        Some(self.buffer.drain(..cut).collect())
    }

    /// Whether the first `take_ready` will return the complete header.
    fn has_header(&self) -> bool {
        self.header_sent
            || self.buffer.len() >= MAX_PENDING
            || self.buffer.windows(CLUSTER_ID.len()).skip(1).any(|w| w == CLUSTER_ID)
    }

    fn take_rest(&mut self) -> Option<Vec<u8>> {
        if self.buffer.is_empty() {
            return None;
        }
        self.header_sent = true;
        Some(std::mem::take(&mut self.buffer))
    }
}

/// `AudioSourceProvider` backed by an ffmpeg child process per stream.
pub struct FfmpegCaptureProvider {
    ffmpeg_path: PathBuf,
    input_format: String,
    sources: Vec<AudioSource>,
    fragment_interval: Duration,
    bitrate_kbps: u32,
}

impl FfmpegCaptureProvider {
    pub fn new(settings: &RecorderSettings) -> Self {
        Self {
            ffmpeg_path: settings.ffmpeg_path.clone(),
            input_format: settings.input_format.clone(),
            sources: settings.sources.clone(),
            fragment_interval: Duration::from_millis(settings.fragment_interval_ms),
            bitrate_kbps: settings.capture_bitrate_kbps,
        }
    }

    /// Check that the configured ffmpeg binary runs.
    pub fn probe(&self) -> Result<(), FfmpegError> {
        let status = Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| FfmpegError::from_spawn(&self.ffmpeg_path, e))?;

        if !status.success() {
            return Err(FfmpegError::exited(status, ""));
        }
        log::debug!("ffmpeg at {} is usable", self.ffmpeg_path.display());
        Ok(())
    }

    fn capture_args(&self, source_id: &str) -> Vec<String> {
        let interval_ms = self.fragment_interval.as_millis().to_string();
        let bitrate = format!("{}k", self.bitrate_kbps);
        let args: [&str; 21] = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            self.input_format.as_str(),
            "-i",
            source_id,
            "-vn",
            "-c:a",
            "libopus",
            "-b:a",
            bitrate.as_str(),
            "-f",
            "webm",
            "-live",
            "1",
            "-cluster_time_limit",
            interval_ms.as_str(),
            "-flush_packets",
            "1",
            "pipe:1",
        ];
        args.iter().map(|s| s.to_string()).collect()
    }
}

impl AudioSourceProvider for FfmpegCaptureProvider {
    fn list_audio_sources(&self) -> Result<Vec<AudioSource>, ClipError> {
        Ok(self.sources.clone())
    }

    fn open_audio_stream(&self, source_id: &str, callback: StreamCallback) -> Result<Box<dyn StreamHandle>, ClipError> {
        let args = self.capture_args(source_id);
        log::info!("starting {} {}", self.ffmpeg_path.display(), args.join(" "));

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                let err = FfmpegError::from_spawn(&self.ffmpeg_path, e);
                log::error!("{}", err);
                err.into_capture_error()
            })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            log::error!("ffmpeg started without output pipes");
            return Err(ClipError::DeviceUnavailable);
        };
        let stdin = child.stdin.take();

        let running = Arc::new(AtomicBool::new(true));
        let output_closed = Arc::new(AtomicBool::new(false));
        let splitter = Arc::new(Mutex::new(ClusterSplitter::default()));
        let stderr_tail = Arc::new(Mutex::new(Vec::new()));

        let spawned = spawn_reader(stdout, Arc::clone(&splitter), Arc::clone(&output_closed))
            .and_then(|reader| Ok((reader, spawn_stderr_logger(stderr, Arc::clone(&stderr_tail))?)));
        let (reader, stderr_logger) = match spawned {
            Ok(threads) => threads,
            Err(e) => {
                log::error!("failed to spawn capture threads: {}", e);
                let _ = child.kill();
                let _ = child.wait();
                return Err(ClipError::DeviceUnavailable);
            }
        };

        if !await_header(&splitter, &output_closed) {
            if !output_closed.load(Ordering::SeqCst) {
                let _ = child.kill();
            }
            let status = child.wait();
            let _ = reader.join();
            let _ = stderr_logger.join();

            let tail = stderr_tail.lock().join("\n");
            if let Ok(status) = status {
                log::error!("ffmpeg did not start capturing {}: {}", source_id, FfmpegError::exited(status, &tail));
            }
            return Err(if tail.contains("Permission denied") {
                ClipError::PermissionDenied
            } else {
                ClipError::DeviceUnavailable
            });
        }

        let ticker = match spawn_ticker(
            self.fragment_interval,
            Arc::clone(&running),
            Arc::clone(&output_closed),
            Arc::clone(&splitter),
            callback,
        ) {
            Ok(ticker) => ticker,
            Err(e) => {
                log::error!("failed to spawn capture ticker: {}", e);
                let _ = child.kill();
                let _ = child.wait();
                let _ = reader.join();
                return Err(ClipError::DeviceUnavailable);
            }
        };

        Ok(Box::new(FfmpegStream {
            child: Some(child),
            stdin,
            running,
            splitter,
            reader: Some(reader),
            ticker: Some(ticker),
        }))
    }
}

fn spawn_reader(
    mut stdout: impl Read + Send + 'static,
    splitter: Arc<Mutex<ClusterSplitter>>,
    output_closed: Arc<AtomicBool>,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new().name("ffmpeg-capture-reader".into()).spawn(move || {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            match stdout.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => splitter.lock().push(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::error!("reading ffmpeg output failed: {}", e);
                    break;
                }
            }
        }
        output_closed.store(true, Ordering::SeqCst);
    })
}

/// Wait until the header fragment is complete.
///
/// False when ffmpeg closed its output first or nothing arrived in time.
fn await_header(splitter: &Mutex<ClusterSplitter>, output_closed: &AtomicBool) -> bool {
    let deadline = Instant::now() + ACQUIRE_TIMEOUT;
    loop {
        if splitter.lock().has_header() {
            return true;
        }
        if output_closed.load(Ordering::SeqCst) {
            return false;
        }
        if Instant::now() >= deadline {
            log::error!("no audio from ffmpeg after {:?}", ACQUIRE_TIMEOUT);
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

/// Logs ffmpeg diagnostics, keeping the last few lines in `tail`.
fn spawn_stderr_logger(
    stderr: impl Read + Send + 'static,
    tail: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new().name("ffmpeg-capture-stderr".into()).spawn(move || {
        for line in BufReader::new(stderr).lines().map_while(Result::ok) {
            log::warn!("ffmpeg: {}", line);
            let mut tail = tail.lock();
            if tail.len() == STDERR_TAIL {
                tail.remove(0);
            }
            tail.push(line);
        }
    })
}

/// Emits ready fragments every `interval` until stopped.
///
/// The only thread that invokes the stream callback, so fragments arrive in
/// stream order and an unexpected exit is reported after the last of them.
fn spawn_ticker(
    interval: Duration,
    running: Arc<AtomicBool>,
    output_closed: Arc<AtomicBool>,
    splitter: Arc<Mutex<ClusterSplitter>>,
    callback: StreamCallback,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new().name("ffmpeg-capture-ticker".into()).spawn(move || {
        while running.load(Ordering::SeqCst) {
            thread::sleep(interval);
            if !running.load(Ordering::SeqCst) {
                break;
            }

            let closed = output_closed.load(Ordering::SeqCst);
            let ready = {
                let mut splitter = splitter.lock();
                let mut ready = Vec::new();
                while let Some(payload) = splitter.take_ready() {
                    ready.push(payload);
                }
                if closed {
                    ready.extend(splitter.take_rest());
                }
                ready
            };
            for payload in ready {
                callback(StreamEvent::Data(payload));
            }

            if closed {
                log::error!("ffmpeg exited while recording");
                callback(StreamEvent::Error(ClipError::DeviceUnavailable));
                break;
            }
        }
    })
}

/// An open ffmpeg capture.
struct FfmpegStream {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    running: Arc<AtomicBool>,
    splitter: Arc<Mutex<ClusterSplitter>>,
    reader: Option<thread::JoinHandle<()>>,
    ticker: Option<thread::JoinHandle<()>>,
}

impl FfmpegStream {
    /// Ask ffmpeg to quit so the muxer flushes, killing it after a grace period.
    fn shutdown_child(&mut self) -> Result<(), ClipError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.write_all(b"q");
        }

        let deadline = Instant::now() + GRACEFUL_EXIT;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    log::debug!("ffmpeg exited with {}", status);
                    return Ok(());
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(20)),
                Ok(None) => {
                    log::warn!("ffmpeg did not exit in {:?}, killing it", GRACEFUL_EXIT);
                    let _ = child.kill();
                    let _ = child.wait();
                    return Ok(());
                }
                Err(e) => {
                    let _ = child.kill();
                    return Err(FfmpegError::Pipe(e).into_capture_error());
                }
            }
        }
    }
}

impl StreamHandle for FfmpegStream {
    fn finish(&mut self) -> Result<Option<Vec<u8>>, ClipError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(ticker) = self.ticker.take() {
            let _ = ticker.join();
        }

        let shutdown = self.shutdown_child();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        shutdown?;

        let trailing = self.splitter.lock().take_rest();
        if let Some(ref bytes) = trailing {
            log::debug!("flushing {} trailing bytes", bytes.len());
        }
        Ok(trailing)
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        if self.child.is_some() {
            let _ = self.finish();
        }
    }
}
