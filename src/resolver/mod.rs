//! URL resolution and download
//!
//! The [`Resolver`] trait is the narrow contract the rest of the service
//! consumes: probe a URL for metadata, or download one variant while
//! reporting transfer progress. Both calls block; callers run them on a
//! worker thread or the blocking pool.
//!
//! [`YtDlp`] implements it by driving the `yt-dlp` executable.

pub mod metadata;
mod ytdlp;

pub use metadata::{
    FormatOption, Metadata, Orientation, PlaylistEntry, PlaylistMetadata, RawFormat, RawInfo,
    VideoMetadata,
};
pub use ytdlp::{YtDlp, parse_output_line, OutputLine};

use std::path::PathBuf;
use thiserror::Error;

/// Selector for the synthesized audio-only option.
pub const AUDIO_SELECTOR: &str = "bestaudio/best";

/// Single progressive variant played back through the stream relay.
pub const STREAM_SELECTOR: &str = "best[ext=mp4]/best";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unsupported URL: {0}")]
    Unsupported(String),

    #[error("this content is DRM protected and cannot be downloaded")]
    Drm,

    #[error("resolver failed: {0}")]
    Failed(String),

    #[error("invalid resolver output: {0}")]
    InvalidOutput(#[from] serde_json::Error),

    #[error("no direct stream for {0}")]
    NoStream(String),

    #[error("failed to run resolver: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to run downloader: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("this content is DRM protected and cannot be downloaded")]
    Drm,

    #[error("download failed: {0}")]
    Failed(String),

    #[error("downloader finished without reporting an output file")]
    MissingArtifact,
}

/// What the worker turns the downloaded stream into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Video variant merged into an mp4 container
    Video,
    /// Audio extracted to the configured codec and bitrate
    Audio,
    /// Video re-encoded to an animated GIF after download
    Gif,
}

impl OutputKind {
    pub fn for_selector(selector: &str, gif: bool) -> Self {
        if selector == AUDIO_SELECTOR {
            OutputKind::Audio
        } else if gif {
            OutputKind::Gif
        } else {
            OutputKind::Video
        }
    }
}

/// Optional trim window in seconds; `end == 0` means "until the end".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: u64,
    pub end: u64,
}

impl TimeRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn is_trimmed(&self) -> bool {
        self.start > 0 || self.end > 0
    }

    /// Section spec in yt-dlp's `--download-sections` syntax.
    pub fn section_spec(&self) -> String {
        if self.end > 0 {
            format!("*{}-{}", self.start, self.end)
        } else {
            format!("*{}-inf", self.start)
        }
    }
}

/// One download as handed to the resolver.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub job_id: String,
    pub url: String,
    pub selector: String,
    pub output_dir: PathBuf,
    pub kind: OutputKind,
    pub range: TimeRange,
}

/// Progress callback payload.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    Downloading {
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
        speed: Option<String>,
        eta: Option<String>,
    },
    /// Raw transfer complete; post-processing may follow
    Finished,
}

pub trait Resolver: Send + Sync {
    /// Fetch metadata for `url` without downloading.
    fn probe(&self, url: &str) -> Result<RawInfo, ResolveError>;

    /// Download the requested variant, invoking `on_progress` on the
    /// calling thread. Returns the final artifact path.
    fn download(
        &self,
        request: &DownloadRequest,
        on_progress: &mut dyn FnMut(TransferEvent),
    ) -> Result<PathBuf, DownloadError>;

    /// Direct media URL of a single playable variant of `url`.
    fn stream_url(&self, url: &str) -> Result<String, ResolveError> {
        self.probe(url)?
            .url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ResolveError::NoStream(url.to_string()))
    }
}

/// Probe `url` and shape the result for clients.
pub fn resolve(resolver: &dyn Resolver, url: &str) -> Result<Metadata, ResolveError> {
    let raw = resolver.probe(url)?;
    Ok(Metadata::from_raw(url, raw))
}
