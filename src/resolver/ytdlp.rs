//! `yt-dlp` subprocess driver

use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use tracing::{debug, warn};

use super::{
    DownloadError, DownloadRequest, OutputKind, RawInfo, ResolveError, Resolver, STREAM_SELECTOR,
    TransferEvent,
};
use crate::config::{ResolverConfig, TranscoderConfig};

const PROGRESS_PREFIX: &str = "mf-progress|";
const ARTIFACT_PREFIX: &str = "mf-file|";

/// One line per progress hook: status, downloaded, total, estimate, speed, eta
const PROGRESS_TEMPLATE: &str = "download:mf-progress|%(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress._speed_str)s|%(progress._eta_str)s";

/// Printed once the file has reached its final location
const ARTIFACT_TEMPLATE: &str = "after_move:mf-file|%(filepath)s";

/// Structured line recognised on the downloader's stdout
#[derive(Debug, Clone, PartialEq)]
pub enum OutputLine {
    Progress(TransferEvent),
    Artifact(PathBuf),
}

/// Parse one stdout line produced by the templates above.
pub fn parse_output_line(line: &str) -> Option<OutputLine> {
    let line = line.trim();

    if let Some(path) = line.strip_prefix(ARTIFACT_PREFIX) {
        let path = path.trim();
        return (!path.is_empty() && path != "NA").then(|| OutputLine::Artifact(PathBuf::from(path)));
    }

    let fields: Vec<&str> = line.strip_prefix(PROGRESS_PREFIX)?.split('|').collect();
    let [status, downloaded, total, estimate, speed, eta] = fields.as_slice() else {
        return None;
    };

    match *status {
        "finished" => Some(OutputLine::Progress(TransferEvent::Finished)),
        "downloading" => Some(OutputLine::Progress(TransferEvent::Downloading {
            downloaded_bytes: number(downloaded).unwrap_or(0),
            total_bytes: number(total).or_else(|| number(estimate)),
            speed: text(speed),
            eta: text(eta),
        })),
        _ => None,
    }
}

fn number(field: &str) -> Option<u64> {
    field
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| n as u64)
}

fn text(field: &str) -> Option<String> {
    let field = field.trim();
    match field {
        "" | "NA" | "None" | "Unknown" => None,
        other => Some(other.to_string()),
    }
}

/// Resolver backed by the `yt-dlp` executable
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: String,
    socket_timeout_secs: u64,
    concurrent_fragments: u32,
    buffer_size: u64,
    user_agent: String,
    ffmpeg: String,
    audio_codec: String,
    audio_bitrate_kbps: u32,
}

impl YtDlp {
    pub fn new(resolver: &ResolverConfig, transcoder: &TranscoderConfig) -> Self {
        Self {
            binary: resolver.binary.clone(),
            socket_timeout_secs: resolver.socket_timeout_secs,
            concurrent_fragments: resolver.concurrent_fragments,
            buffer_size: resolver.buffer_size.0,
            user_agent: resolver.user_agent.clone(),
            ffmpeg: transcoder.binary.clone(),
            audio_codec: transcoder.audio_codec.clone(),
            audio_bitrate_kbps: transcoder.audio_bitrate_kbps,
        }
    }

    fn common_args(&self) -> Vec<String> {
        vec![
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.socket_timeout_secs.to_string(),
            "--user-agent".to_string(),
            self.user_agent.clone(),
        ]
    }

    pub(crate) fn probe_args(&self, url: &str) -> Vec<String> {
        let mut args = self.common_args();
        args.extend(["-J".to_string(), "--flat-playlist".to_string()]);
        args.push(url.to_string());
        args
    }

    pub(crate) fn stream_args(&self, url: &str) -> Vec<String> {
        let mut args = self.common_args();
        args.extend([
            "-f".to_string(),
            STREAM_SELECTOR.to_string(),
            "--get-url".to_string(),
            "--no-playlist".to_string(),
        ]);
        args.push(url.to_string());
        args
    }

    /// Run a metadata-only invocation and return its stdout.
    fn query(&self, url: &str, args: Vec<String>) -> Result<Vec<u8>, ResolveError> {
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(ResolveError::Spawn)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_drm(&stderr) {
                return Err(ResolveError::Drm);
            }
            if stderr.contains("Unsupported URL") {
                return Err(ResolveError::Unsupported(url.to_string()));
            }
            return Err(ResolveError::Failed(error_message(&stderr)));
        }

        Ok(output.stdout)
    }

    pub(crate) fn download_args(&self, request: &DownloadRequest) -> Vec<String> {
        let mut args = self.common_args();

        let template = request
            .output_dir
            .join(format!("{}_%(title)s.%(ext)s", request.job_id));

        args.extend([
            "--no-playlist".to_string(),
            "--newline".to_string(),
            "--progress".to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string(),
            "--print".to_string(),
            ARTIFACT_TEMPLATE.to_string(),
            "--concurrent-fragments".to_string(),
            self.concurrent_fragments.to_string(),
            "--buffer-size".to_string(),
            self.buffer_size.to_string(),
            "-f".to_string(),
            request.selector.clone(),
            "-o".to_string(),
            template.to_string_lossy().into_owned(),
        ]);

        // A bare program name is looked up on PATH by yt-dlp itself
        if self.ffmpeg.contains(std::path::MAIN_SEPARATOR) {
            args.extend(["--ffmpeg-location".to_string(), self.ffmpeg.clone()]);
        }

        match request.kind {
            OutputKind::Audio => args.extend([
                "-x".to_string(),
                "--audio-format".to_string(),
                self.audio_codec.clone(),
                "--audio-quality".to_string(),
                format!("{}K", self.audio_bitrate_kbps),
            ]),
            OutputKind::Video | OutputKind::Gif => args.extend([
                "--merge-output-format".to_string(),
                "mp4".to_string(),
            ]),
        }

        if request.range.is_trimmed() {
            args.extend([
                "--download-sections".to_string(),
                request.range.section_spec(),
                "--force-keyframes-at-cuts".to_string(),
            ]);
        }

        args.push(request.url.clone());
        args
    }
}

/// Last `ERROR:` line of the downloader's stderr, or the whole tail.
fn error_message(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix("ERROR:"))
        .map(|msg| msg.trim().to_string())
        .unwrap_or_else(|| {
            let trimmed = stderr.trim();
            if trimmed.is_empty() {
                "process exited unsuccessfully".to_string()
            } else {
                trimmed.lines().last().unwrap_or(trimmed).to_string()
            }
        })
}

fn is_drm(stderr: &str) -> bool {
    stderr.contains("DRM")
}

enum Stream {
    Stdout(String),
    Stderr(String),
}

fn pump<R: Read + Send + 'static>(
    reader: R,
    tx: mpsc::Sender<Stream>,
    wrap: fn(String) -> Stream,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for line in BufReader::new(reader).lines() {
            let Ok(line) = line else { break };
            if tx.send(wrap(line)).is_err() {
                break;
            }
        }
    })
}

impl Resolver for YtDlp {
    fn probe(&self, url: &str) -> Result<RawInfo, ResolveError> {
        debug!(url, "Probing URL");
        let stdout = self.query(url, self.probe_args(url))?;
        Ok(serde_json::from_slice(&stdout)?)
    }

    fn stream_url(&self, url: &str) -> Result<String, ResolveError> {
        debug!(url, "Resolving stream URL");
        let stdout = self.query(url, self.stream_args(url))?;

        // Merged selections print one line per stream; the first is video
        String::from_utf8_lossy(&stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ResolveError::NoStream(url.to_string()))
    }

    fn download(
        &self,
        request: &DownloadRequest,
        on_progress: &mut dyn FnMut(TransferEvent),
    ) -> Result<PathBuf, DownloadError> {
        let args = self.download_args(request);
        debug!(job_id = %request.job_id, ?args, "Starting downloader");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(DownloadError::Spawn)?;

        let (tx, rx) = mpsc::channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(pump(stdout, tx.clone(), Stream::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(pump(stderr, tx.clone(), Stream::Stderr));
        }
        drop(tx);

        let mut artifact = None;
        let mut stderr = String::new();

        // Ends once both pipes are closed
        for message in rx {
            match message {
                Stream::Stdout(line) => match parse_output_line(&line) {
                    Some(OutputLine::Progress(event)) => on_progress(event),
                    Some(OutputLine::Artifact(path)) => artifact = Some(path),
                    None => {}
                },
                Stream::Stderr(line) => {
                    stderr.push_str(&line);
                    stderr.push('\n');
                }
            }
        }

        for reader in readers {
            if reader.join().is_err() {
                warn!(job_id = %request.job_id, "Output reader thread panicked");
            }
        }

        let status = child.wait().map_err(DownloadError::Spawn)?;
        if !status.success() {
            if is_drm(&stderr) {
                return Err(DownloadError::Drm);
            }
            return Err(DownloadError::Failed(error_message(&stderr)));
        }

        artifact.ok_or(DownloadError::MissingArtifact)
    }
}
