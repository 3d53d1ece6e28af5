//! MP3 transcoding through an ffmpeg child process.
//!
//! The container is piped to stdin and the MP3 read back from stdout, so
//! nothing touches the filesystem until the writer stores the result.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;

use clip_buffer_core::{ClipError, ContainerFormat, TranscodeGateway};

use crate::config::RecorderSettings;
use crate::error::FfmpegError;

/// `TranscodeGateway` producing MP3 with libmp3lame.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: PathBuf,
    bitrate_kbps: u32,
    sample_rate: u32,
    channels: u32,
}

impl FfmpegTranscoder {
    pub fn new(settings: &RecorderSettings) -> Self {
        Self {
            ffmpeg_path: settings.ffmpeg_path.clone(),
            bitrate_kbps: settings.mp3_bitrate_kbps,
            sample_rate: settings.mp3_sample_rate,
            channels: settings.mp3_channels,
        }
    }

    fn args(&self, source_format: ContainerFormat) -> Vec<String> {
        let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];
        // Unknown input is left to ffmpeg's probing
        if let Some(name) = source_format.ffmpeg_name() {
            args.extend(["-f".into(), name.into()]);
        }
        args.extend(
            [
                "-i".to_string(),
                "pipe:0".into(),
                "-vn".into(),
                "-acodec".into(),
                "libmp3lame".into(),
                "-ab".into(),
                format!("{}k", self.bitrate_kbps),
                "-ar".into(),
                self.sample_rate.to_string(),
                "-ac".into(),
                self.channels.to_string(),
                "-f".into(),
                "mp3".into(),
                "pipe:1".into(),
            ],
        );
        args
    }

    fn run(&self, buffer: &[u8], source_format: ContainerFormat) -> Result<Vec<u8>, FfmpegError> {
        let mut child = Command::new(&self.ffmpeg_path)
            .args(self.args(source_format))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| FfmpegError::from_spawn(&self.ffmpeg_path, e))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // stdin is fed on its own thread so a full stdout pipe cannot stall the write
        let (written, output, diagnostics) = thread::scope(|scope| {
            let writer = scope.spawn(move || -> std::io::Result<()> {
                if let Some(mut stdin) = stdin {
                    stdin.write_all(buffer)?;
                }
                Ok(())
            });
            let errors = scope.spawn(move || {
                let mut text = String::new();
                if let Some(mut stderr) = stderr {
                    let _ = stderr.read_to_string(&mut text);
                }
                text
            });

            let mut output = Vec::new();
            let read = match stdout {
                Some(mut stdout) => stdout.read_to_end(&mut output).map(|_| output),
                None => Ok(output),
            };

            let written = writer.join().unwrap_or_else(|_| {
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdin writer panicked"))
            });
            let diagnostics = errors.join().unwrap_or_default();
            (written, read, diagnostics)
        });

        let status = child.wait().map_err(FfmpegError::Pipe)?;
        if !status.success() {
            return Err(FfmpegError::exited(status, &diagnostics));
        }
        // A decoder may stop reading early on success; only a failed exit matters
        if let Err(e) = written {
            log::debug!("ffmpeg closed stdin early: {}", e);
        }

        let output = output.map_err(FfmpegError::Pipe)?;
        if output.is_empty() {
            return Err(FfmpegError::Exited {
                status: status.to_string(),
                detail: "no audio produced".into(),
            });
        }
        Ok(output)
    }
}

impl TranscodeGateway for FfmpegTranscoder {
    fn transcode(&self, buffer: &[u8], source_format: ContainerFormat) -> Result<Vec<u8>, ClipError> {
        log::debug!("transcoding {} bytes of {:?} to mp3", buffer.len(), source_format);
        let mp3 = self.run(buffer, source_format).map_err(|e| {
            log::error!("transcode failed: {}", e);
            e.into_transcode_error()
        })?;
        log::info!("transcoded {} bytes to {} bytes of mp3", buffer.len(), mp3.len());
        Ok(mp3)
    }

    fn output_extension(&self, _source_format: ContainerFormat) -> String {
        "mp3".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(unix)]
    use crate::test_support::fake_ffmpeg;

    fn transcoder(ffmpeg_path: PathBuf) -> FfmpegTranscoder {
        FfmpegTranscoder::new(&RecorderSettings {
            ffmpeg_path,
            ..Default::default()
        })
    }

    #[test]
    fn args_convert_to_stereo_mp3() {
        let args = transcoder(PathBuf::from("ffmpeg")).args(ContainerFormat::WebM).join(" ");

        assert!(args.contains("-f webm -i pipe:0"));
        assert!(args.contains("-acodec libmp3lame -ab 128k -ar 44100 -ac 2 -f mp3 pipe:1"));
    }

    #[test]
    fn unknown_input_is_probed() {
        let args = transcoder(PathBuf::from("ffmpeg")).args(ContainerFormat::Unknown);

        assert_eq!(args[3], "-i");
    }

    #[test]
    fn missing_binary_is_transcode_error() {
        let t = transcoder(PathBuf::from("/nonexistent/ffmpeg-for-clip-tests"));

        let err = t.transcode(&[1, 2, 3], ContainerFormat::WebM).unwrap_err();

        assert!(matches!(err, ClipError::TranscodeError(ref msg) if msg.contains("not found")));
    }

    #[cfg(unix)]
    #[test]
    fn pipes_container_through_process() {
        let dir = tempfile::tempdir().unwrap();
        let t = transcoder(fake_ffmpeg(dir.path(), "cat"));
        let input: Vec<u8> = (0..200_000u32).map(|i| (i % 256) as u8).collect();

        let output = t.transcode(&input, ContainerFormat::WebM).unwrap();

        assert_eq!(output, input);
    }

    #[cfg(unix)]
    #[test]
    fn failed_exit_reports_last_stderr_line() {
        let dir = tempfile::tempdir().unwrap();
        let t = transcoder(fake_ffmpeg(
            dir.path(),
            "cat > /dev/null\necho 'pipe:0: Invalid data found when processing input' >&2\nexit 1",
        ));

        let err = t.transcode(&[0x1A, 0x45, 0xDF, 0xA3], ContainerFormat::WebM).unwrap_err();

        assert!(matches!(err, ClipError::TranscodeError(ref msg) if msg.contains("Invalid data found")));
    }
}
