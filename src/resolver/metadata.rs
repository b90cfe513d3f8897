//! Resolver metadata and the format options offered to clients

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::AUDIO_SELECTOR;
use crate::humanize::{clock, megabytes};

/// Pixel height to display label. Portrait sources report their long edge,
/// so 1280 and 1920 land in the 720p/1080p buckets.
const RESOLUTION_BUCKETS: &[(u32, &str, u32)] = &[
    (480, "480p", 480),
    (720, "720p", 720),
    (1080, "1080p", 1080),
    (1280, "720p", 720),
    (1920, "1080p", 1080),
    (1440, "2K", 1440),
    (2160, "4K", 2160),
];

/// Fallback estimate when neither size nor bitrate is known.
const BYTES_PER_MINUTE: f64 = 1.5 * 1024.0 * 1024.0;
/// Assumed audio-only rate in MB per second of media.
const AUDIO_MB_PER_SECOND: f64 = 24.0 / 1024.0;

/// The subset of yt-dlp's info JSON this service reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawInfo {
    #[serde(rename = "_type")]
    pub kind: Option<String>,
    pub id: Option<String>,
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub uploader_url: Option<String>,
    pub url: Option<String>,
    pub duration: Option<f64>,
    pub view_count: Option<u64>,
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub thumbnails: Vec<RawThumbnail>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    #[serde(default)]
    pub formats: Vec<RawFormat>,
    #[serde(default)]
    pub entries: Vec<Option<RawInfo>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawThumbnail {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFormat {
    pub format_id: String,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub height: Option<u32>,
    pub filesize: Option<u64>,
    pub filesize_approx: Option<u64>,
    /// Total bitrate, kbit/s
    pub tbr: Option<f64>,
    pub vbr: Option<f64>,
    pub abr: Option<f64>,
}

impl RawFormat {
    fn has_video(&self) -> bool {
        self.vcodec.as_deref() != Some("none") && self.height.is_some()
    }

    fn has_audio(&self) -> bool {
        self.acodec.as_deref() != Some("none")
    }

    fn bitrate(&self) -> f64 {
        self.tbr
            .filter(|tbr| *tbr > 0.0)
            .unwrap_or_else(|| self.vbr.unwrap_or(0.0) + self.abr.unwrap_or(0.0))
    }

    /// Variant selector echoed back on submit. Video-only streams get the
    /// best audio merged in.
    fn selector(&self) -> String {
        if self.has_audio() {
            self.format_id.clone()
        } else {
            format!("{}+bestaudio/best", self.format_id)
        }
    }

    /// Best-effort size: reported size, then bitrate x duration, then a
    /// per-minute constant.
    fn estimated_bytes(&self, duration: Option<f64>) -> Option<f64> {
        if let Some(size) = self.filesize.or(self.filesize_approx) {
            return Some(size as f64);
        }
        let duration = duration.filter(|d| *d > 0.0)?;
        let bitrate = self.bitrate();
        if bitrate > 0.0 {
            Some(bitrate * 1024.0 / 8.0 * duration)
        } else {
            Some(BYTES_PER_MINUTE * duration / 60.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
    Square,
}

impl Orientation {
    fn detect(url: &str, width: Option<u32>, height: Option<u32>) -> Self {
        match (width, height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => match h.cmp(&w) {
                std::cmp::Ordering::Greater => Orientation::Portrait,
                std::cmp::Ordering::Equal => Orientation::Square,
                std::cmp::Ordering::Less => Orientation::Landscape,
            },
            _ if is_vertical_url(url) => Orientation::Portrait,
            _ => Orientation::Landscape,
        }
    }
}

fn is_vertical_url(url: &str) -> bool {
    let url = url.to_lowercase();
    url.contains("tiktok.com") || url.contains("/shorts/") || url.contains("/reel/")
}

/// One downloadable quality.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatOption {
    pub id: String,
    pub height: u32,
    pub label: String,
    pub ext: String,
    pub size: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Metadata {
    Video(VideoMetadata),
    Playlist(PlaylistMetadata),
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoMetadata {
    pub title: String,
    pub uploader: String,
    pub duration: String,
    pub views: Option<u64>,
    pub thumbnail: Option<String>,
    pub original_url: String,
    pub formats: Vec<FormatOption>,
    pub is_vertical: bool,
    pub orientation: Orientation,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaylistMetadata {
    pub title: String,
    pub uploader: String,
    pub thumbnail: String,
    pub original_url: String,
    pub entries: Vec<PlaylistEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaylistEntry {
    pub id: Option<String>,
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub duration: String,
    pub thumbnail: String,
    pub url: String,
}

impl Metadata {
    pub fn from_raw(url: &str, raw: RawInfo) -> Self {
        if raw.kind.as_deref() == Some("playlist") {
            Metadata::Playlist(playlist(url, raw))
        } else {
            Metadata::Video(video(url, raw))
        }
    }
}

fn playlist(url: &str, raw: RawInfo) -> PlaylistMetadata {
    let entries: Vec<PlaylistEntry> = raw
        .entries
        .into_iter()
        .flatten()
        .map(|entry| {
            let thumbnail = entry
                .thumbnails
                .first()
                .and_then(|t| t.url.clone())
                .unwrap_or_default();
            let entry_url = entry.url.clone().unwrap_or_else(|| {
                format!(
                    "https://www.youtube.com/watch?v={}",
                    entry.id.as_deref().unwrap_or_default()
                )
            });
            PlaylistEntry {
                duration: clock(entry.duration),
                id: entry.id,
                title: entry.title,
                uploader: entry.uploader,
                thumbnail,
                url: entry_url,
            }
        })
        .collect();

    PlaylistMetadata {
        title: raw.title.unwrap_or_else(|| "Unknown Playlist".to_string()),
        uploader: raw.uploader.unwrap_or_else(|| "Unknown Uploader".to_string()),
        thumbnail: entries
            .first()
            .map(|e| e.thumbnail.clone())
            .unwrap_or_default(),
        original_url: url.to_string(),
        entries,
    }
}

fn video(url: &str, raw: RawInfo) -> VideoMetadata {
    let orientation = Orientation::detect(url, raw.width, raw.height);
    let formats = format_options(&raw.formats, raw.duration);

    VideoMetadata {
        title: raw.title.unwrap_or_else(|| "Unknown Title".to_string()),
        uploader: raw.uploader.unwrap_or_else(|| "Unknown Uploader".to_string()),
        duration: clock(raw.duration),
        views: raw.view_count,
        thumbnail: raw.thumbnail,
        original_url: url.to_string(),
        formats,
        is_vertical: orientation == Orientation::Portrait,
        orientation,
        avatar: raw.uploader_url,
    }
}

/// Deduplicated, quality-descending options plus one audio-only entry.
///
/// Each resolution bucket keeps its highest-bitrate variant; on equal
/// bitrate the later (better-ranked) format wins. Without any bucketed
/// variant the single best video stream is offered under its raw height.
pub fn format_options(formats: &[RawFormat], duration: Option<f64>) -> Vec<FormatOption> {
    let mut best: HashMap<&'static str, (u32, &RawFormat)> = HashMap::new();

    for format in formats.iter().rev().filter(|f| f.has_video()) {
        let Some(height) = format.height else { continue };
        let Some(&(_, label, rank)) = RESOLUTION_BUCKETS.iter().find(|(h, _, _)| *h == height)
        else {
            continue;
        };

        match best.get(label) {
            Some((_, kept)) if kept.bitrate() >= format.bitrate() => {}
            _ => {
                best.insert(label, (rank, format));
            }
        }
    }

    let mut ranked: Vec<(u32, &str, &RawFormat)> = best
        .into_iter()
        .map(|(label, (rank, format))| (rank, label, format))
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0));

    let mut options: Vec<FormatOption> = ranked
        .into_iter()
        .map(|(_, label, format)| video_option(format, label.to_string(), duration))
        .collect();

    if options.is_empty() {
        if let Some(format) = formats.iter().rev().find(|f| f.has_video()) {
            let label = format!("{}p", format.height.unwrap_or_default());
            options.push(video_option(format, label, duration));
        }
    }

    options.push(audio_option(duration));
    options
}

fn video_option(format: &RawFormat, label: String, duration: Option<f64>) -> FormatOption {
    FormatOption {
        id: format.selector(),
        height: format.height.unwrap_or_default(),
        label,
        ext: "mp4".to_string(),
        size: format
            .estimated_bytes(duration)
            .map(megabytes)
            .unwrap_or_else(|| "N/A".to_string()),
    }
}

fn audio_option(duration: Option<f64>) -> FormatOption {
    let size = match duration.filter(|d| *d > 0.0) {
        Some(secs) => format!("{:.1} MB", secs * AUDIO_MB_PER_SECOND),
        None => "N/A".to_string(),
    };

    FormatOption {
        id: AUDIO_SELECTOR.to_string(),
        height: 0,
        label: "Audio (MP3)".to_string(),
        ext: "mp3".to_string(),
        size,
    }
}
