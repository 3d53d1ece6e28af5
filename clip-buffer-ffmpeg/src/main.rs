//! clip-recorder
//!
//! Records an audio source into a rolling buffer and saves the last few
//! seconds whenever a trigger line arrives on stdin. Stopping saves the
//! whole retained recording.

use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use parking_lot::Mutex;

use clip_buffer_core::{
    AudioSource, AudioSourceKind, AudioSourceProvider, ClipError, ExportHandle, ExportKind, ExportOutcome,
    ExportResult, ExportWriter, Exporter, Passthrough, SessionDelegate, SessionRegistry, SessionState,
    TranscodeGateway,
};
use clip_buffer_ffmpeg::trigger::spawn_line_reader;
use clip_buffer_ffmpeg::{
    DirectoryWriter, FfmpegCaptureProvider, FfmpegError, FfmpegTranscoder, RecorderSettings, TargetFormat,
    TriggerCommand, TriggerEvent,
};

/// How often the command loop collects finished exports.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Rolling audio buffer with on-demand clips
#[derive(Parser, Debug)]
#[command(name = "clip-recorder")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List capturable audio sources
    List,
    /// Record a source and save clips on demand
    Record(RecordOptions),
    /// Show or create the settings file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective settings
    Show,
    /// Print the settings file location
    Path,
    /// Write the default settings file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Parser, Debug, Clone)]
struct RecordOptions {
    /// Source ID (use 'clip-recorder list' to find)
    #[arg(short, long)]
    source: Option<String>,

    /// Length of a triggered clip in seconds
    #[arg(short, long)]
    clip_duration: Option<u32>,

    /// Directory clips are saved to
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<FormatArg>,

    /// Stop and save after this many seconds
    #[arg(long)]
    stop_after: Option<u64>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum FormatArg {
    /// MP3, 128 kbit/s
    Mp3,
    /// The captured WebM, unchanged
    Source,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Clip(#[from] ClipError),

    #[error(transparent)]
    Ffmpeg(#[from] FfmpegError),

    #[error("no source given and none is marked default; see 'clip-recorder list'")]
    NoSource,

    #[error("no config directory on this platform; pass --config")]
    NoConfigDir,

    #[error("{0} already exists; pass --force to overwrite")]
    ConfigExists(PathBuf),

    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("failed to read commands: {0}")]
    Input(#[from] io::Error),
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let settings_path = cli.config.clone().or_else(RecorderSettings::default_path);
    let settings = match settings_path {
        Some(ref path) => RecorderSettings::load_from(path)?,
        None => RecorderSettings::default(),
    };

    match cli.command {
        Commands::List => list_sources(&settings, cli.json),
        Commands::Record(options) => record(settings, options, cli.json),
        Commands::Config { action } => config(settings, settings_path, action),
    }
}

fn list_sources(settings: &RecorderSettings, json: bool) -> Result<(), CliError> {
    let sources = FfmpegCaptureProvider::new(settings).list_audio_sources()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sources)?);
        return Ok(());
    }
    if sources.is_empty() {
        println!("No sources configured.");
        return Ok(());
    }
    println!("{:<28} {:<14} NAME", "ID", "KIND");
    for source in &sources {
        println!(
            "{:<28} {:<14} {}{}",
            source.id,
            kind_label(source.kind),
            source.name,
            if source.is_default { " (default)" } else { "" }
        );
    }
    Ok(())
}

fn kind_label(kind: AudioSourceKind) -> &'static str {
    match kind {
        AudioSourceKind::Microphone => "microphone",
        AudioSourceKind::SystemOutput => "system-output",
        AudioSourceKind::Window => "window",
        AudioSourceKind::Screen => "screen",
    }
}

fn config(settings: RecorderSettings, path: Option<PathBuf>, action: ConfigAction) -> Result<(), CliError> {
    match action {
        ConfigAction::Show => println!("{}", serde_json::to_string_pretty(&settings)?),
        ConfigAction::Path => {
            let path = path.ok_or(CliError::NoConfigDir)?;
            println!("{}", path.display());
        }
        ConfigAction::Init { force } => {
            let path = path.ok_or(CliError::NoConfigDir)?;
            if path.exists() && !force {
                return Err(CliError::ConfigExists(path));
            }
            RecorderSettings::default().save_to(&path)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

/// Prints session events and wakes the command loop when the session dies.
struct ConsoleDelegate {
    events: Mutex<Sender<TriggerEvent>>,
    json: bool,
}

impl SessionDelegate for ConsoleDelegate {
    fn on_state_changed(&self, state: &SessionState) {
        log::debug!("session {}", state.name());
        if !self.json && state.is_recording() {
            println!("Recording. Enter = clip, 'c <secs>' = clip span, 'd <secs>' = set duration, 's' = status, 'q' = stop");
        }
    }

    fn on_elapsed_updated(&self, elapsed_secs: u64) {
        log::trace!("elapsed {}s", elapsed_secs);
    }

    fn on_error(&self, error: &ClipError) {
        eprintln!("Recording failed: {}", error);
        let _ = self.events.lock().send(TriggerEvent::SessionEnded);
    }

    fn on_export_finished(&self, result: &ExportResult) {
        if self.json {
            let line = serde_json::json!({
                "file": result.file_path,
                "metadata": result.metadata,
            });
            println!("{}", line);
        } else {
            println!(
                "Saved {} ({:.1}s, {} bytes)",
                result.file_path.display(),
                result.metadata.covered_secs,
                result.metadata.output_bytes
            );
        }
    }

    fn on_export_failed(&self, kind: ExportKind, error: &ClipError) {
        eprintln!("{} export failed: {}", export_label(kind), error);
    }
}

fn export_label(kind: ExportKind) -> String {
    match kind {
        ExportKind::Clip { requested_secs } => format!("{}s clip", requested_secs),
        ExportKind::FullSession => "Recording".into(),
    }
}

fn pick_source(settings: &RecorderSettings, requested: Option<String>) -> Result<String, CliError> {
    if let Some(id) = requested {
        return Ok(id);
    }
    settings
        .sources
        .iter()
        .find(|s| s.is_default)
        .or_else(|| settings.sources.first())
        .map(|s: &AudioSource| s.id.clone())
        .ok_or(CliError::NoSource)
}

fn record(mut settings: RecorderSettings, options: RecordOptions, json: bool) -> Result<(), CliError> {
    if let Some(secs) = options.clip_duration {
        settings.session.clip_duration_secs = secs;
    }
    if let Some(dir) = options.output {
        settings.output_dir = dir;
    }
    if let Some(format) = options.format {
        settings.target_format = match format {
            FormatArg::Mp3 => TargetFormat::Mp3,
            FormatArg::Source => TargetFormat::Source,
        };
    }
    settings.validate()?;

    let provider = FfmpegCaptureProvider::new(&settings);
    provider.probe()?;
    let source = pick_source(&settings, options.source)?;

    let (tx, rx) = mpsc::channel();
    let delegate = Arc::new(ConsoleDelegate {
        events: Mutex::new(tx.clone()),
        json,
    });

    let writer: Arc<dyn ExportWriter> = Arc::new(DirectoryWriter::new(&settings.output_dir));
    let transcoder: Arc<dyn TranscodeGateway> = match settings.target_format {
        TargetFormat::Mp3 => Arc::new(FfmpegTranscoder::new(&settings)),
        TargetFormat::Source => Arc::new(Passthrough),
    };
    let exporter = Exporter::new(transcoder, Arc::clone(&writer))
        .with_delegate(delegate.clone())
        .with_file_prefix(settings.session.file_prefix.clone());
    // Saves the raw container when transcoding fails
    let raw_exporter = Exporter::new(Arc::new(Passthrough), writer)
        .with_delegate(delegate.clone())
        .with_file_prefix(settings.session.file_prefix.clone());

    let registry = SessionRegistry::new(provider, settings.session.clone(), exporter)?.with_delegate(delegate);
    registry.start_session(&source)?;
    log::info!("saving to {}", settings.output_dir.display());

    spawn_line_reader(BufReader::new(io::stdin()), tx)?;
    let deadline = options.stop_after.map(|secs| Instant::now() + Duration::from_secs(secs));

    let mut exports: Vec<ExportHandle> = Vec::new();
    let mut failures = 0;
    loop {
        failures += settle_finished(&mut exports, &raw_exporter);

        let wait = deadline.map_or(POLL_INTERVAL, |d| d.saturating_duration_since(Instant::now()).min(POLL_INTERVAL));
        let event = match rx.recv_timeout(wait) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) if deadline.map_or(true, |d| Instant::now() < d) => continue,
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => TriggerEvent::Command(TriggerCommand::Stop),
        };

        match event {
            TriggerEvent::Command(TriggerCommand::Clip) => match registry.trigger_clip() {
                Some(result) => track(&mut exports, result),
                None => println!("Not recording."),
            },
            TriggerEvent::Command(TriggerCommand::ClipLast(secs)) => track(&mut exports, registry.request_clip(secs)),
            TriggerEvent::Command(TriggerCommand::SetDuration(secs)) => match registry.set_clip_duration(secs) {
                Ok(()) => println!("Clip duration {}s", secs),
                Err(e) => eprintln!("{}", e),
            },
            TriggerEvent::Command(TriggerCommand::Status) => println!(
                "{} for {}, clip {}s, {} export(s) pending",
                registry.state().name(),
                format_elapsed(registry.elapsed_seconds()),
                registry.config().clip_duration_secs,
                exports.iter().filter(|h| !h.is_finished()).count()
            ),
            TriggerEvent::Command(TriggerCommand::Stop) | TriggerEvent::SessionEnded => break,
            TriggerEvent::Invalid(msg) => eprintln!("{}", msg),
        }
    }

    match registry.stop_session() {
        Ok(Some(handle)) => exports.push(handle),
        Ok(None) => println!("Nothing recorded."),
        Err(ClipError::NoActiveSession) => {}
        Err(e) => eprintln!("Stopping failed: {}", e),
    }

    for handle in exports {
        if !settle(handle, &raw_exporter) {
            failures += 1;
        }
    }

    if failures > 0 {
        return Err(ClipError::StorageError(format!("{} export(s) could not be saved", failures)).into());
    }
    Ok(())
}

/// Join the exports that are done, keeping the rest. Returns how many could not be saved.
fn settle_finished(exports: &mut Vec<ExportHandle>, raw_exporter: &Exporter) -> usize {
    let (finished, pending): (Vec<_>, Vec<_>) =
        std::mem::take(exports).into_iter().partition(ExportHandle::is_finished);
    *exports = pending;
    finished.into_iter().map(|h| settle(h, raw_exporter)).filter(|saved| !saved).count()
}

/// Wait for one export, retrying a failed one without transcoding.
fn settle(handle: ExportHandle, raw_exporter: &Exporter) -> bool {
    match handle.join() {
        Ok(ExportOutcome::Saved(_)) => true,
        Ok(ExportOutcome::WriteCancelled) => {
            println!("Save cancelled.");
            true
        }
        Err(failed) => {
            eprintln!("Saving the unconverted recording instead");
            raw_exporter.retry(failed).is_ok()
        }
    }
}

/// Elapsed seconds as `HH:MM:SS`.
fn format_elapsed(secs: u64) -> String {
    format!("{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

fn track(exports: &mut Vec<ExportHandle>, result: Result<ExportHandle, ClipError>) {
    match result {
        Ok(handle) => exports.push(handle),
        Err(ClipError::InsufficientData) => println!("Nothing captured in that span yet."),
        Err(e) => eprintln!("Clip failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clip_buffer_core::{ClipAssembler, Fragment};

    #[test]
    fn elapsed_is_hours_minutes_seconds() {
        assert_eq!(format_elapsed(0), "00:00:00");
        assert_eq!(format_elapsed(59), "00:00:59");
        assert_eq!(format_elapsed(3_725), "01:02:05");
        assert_eq!(format_elapsed(100 * 3600), "100:00:00");
    }

    #[test]
    fn finished_exports_are_settled_and_failures_retried_raw() {
        let dir = tempfile::tempdir().unwrap();
        let writer: Arc<dyn ExportWriter> = Arc::new(DirectoryWriter::new(dir.path()));
        // A prefix with a directory part is rejected by the writer
        let failing = Exporter::new(Arc::new(Passthrough), Arc::clone(&writer)).with_file_prefix("nested/clip");
        let raw_exporter = Exporter::new(Arc::new(Passthrough), writer);
        let now = Instant::now();
        let clip = || {
            ClipAssembler::concatenate(vec![
                Fragment::new(0, now, vec![0x1A, 0x45, 0xDF, 0xA3]),
                Fragment::new(1, now, vec![1, 2, 3]),
            ])
            .unwrap()
        };

        let mut exports = vec![
            raw_exporter.spawn(clip(), ExportKind::FullSession).unwrap(),
            failing.spawn(clip(), ExportKind::Clip { requested_secs: 5 }).unwrap(),
        ];
        while !exports.iter().all(ExportHandle::is_finished) {
            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(settle_finished(&mut exports, &raw_exporter), 0);
        assert!(exports.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn record_options_parse() {
        let cli = Cli::try_parse_from(["clip-recorder", "record", "-c", "30", "--stop-after", "5"]).unwrap();

        let Commands::Record(options) = cli.command else {
            panic!("expected record command");
        };
        assert_eq!(options.clip_duration, Some(30));
        assert_eq!(options.stop_after, Some(5));
    }
}
