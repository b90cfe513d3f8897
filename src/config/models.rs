use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub transcoder: TranscoderConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Directory every artifact is written to
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            download_dir: default_download_dir(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

/// Job lifecycle limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobsConfig {
    /// Age after which a job becomes eligible for eviction
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
    #[serde(default = "default_max_title_chars")]
    pub max_title_chars: usize,
}

impl JobsConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_max_age_secs(),
            max_title_chars: default_max_title_chars(),
        }
    }
}

fn default_max_age_secs() -> u64 {
    3600
}

fn default_max_title_chars() -> usize {
    200
}

/// Extraction/download binary settings (yt-dlp)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverConfig {
    #[serde(default = "default_resolver_binary")]
    pub binary: String,
    #[serde(default = "default_socket_timeout_secs")]
    pub socket_timeout_secs: u64,
    #[serde(default = "default_concurrent_fragments")]
    pub concurrent_fragments: u32,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: ByteSize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            binary: default_resolver_binary(),
            socket_timeout_secs: default_socket_timeout_secs(),
            concurrent_fragments: default_concurrent_fragments(),
            buffer_size: default_buffer_size(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_resolver_binary() -> String {
    "yt-dlp".to_string()
}

fn default_socket_timeout_secs() -> u64 {
    15
}

fn default_concurrent_fragments() -> u32 {
    8
}

fn default_buffer_size() -> ByteSize {
    ByteSize(1024 * 1024) // 1 MB
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

/// Transcoder binary settings (ffmpeg)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscoderConfig {
    #[serde(default = "default_transcoder_binary")]
    pub binary: String,
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
    #[serde(default = "default_audio_bitrate_kbps")]
    pub audio_bitrate_kbps: u32,
    #[serde(default = "default_gif_fps")]
    pub gif_fps: u32,
    #[serde(default = "default_gif_width")]
    pub gif_width: u32,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            binary: default_transcoder_binary(),
            audio_codec: default_audio_codec(),
            audio_bitrate_kbps: default_audio_bitrate_kbps(),
            gif_fps: default_gif_fps(),
            gif_width: default_gif_width(),
        }
    }
}

fn default_transcoder_binary() -> String {
    "ffmpeg".to_string()
}

fn default_audio_codec() -> String {
    "mp3".to_string()
}

fn default_audio_bitrate_kbps() -> u32 {
    192
}

fn default_gif_fps() -> u32 {
    10
}

fn default_gif_width() -> u32 {
    480
}

/// Upstream HTTP relay for thumbnails and direct streams
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Whole-request limit for thumbnails; media streams have none
    #[serde(default = "default_image_timeout_secs")]
    pub image_timeout_secs: u64,
}

impl RelayConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            image_timeout_secs: default_image_timeout_secs(),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_image_timeout_secs() -> u64 {
    10
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Fallback tracing filter when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8000");
        assert_eq!(config.server.download_dir, PathBuf::from("downloads"));
        assert_eq!(config.jobs.max_age(), Duration::from_secs(3600));
        assert_eq!(config.resolver.binary, "yt-dlp");
        assert_eq!(config.resolver.buffer_size.as_u64(), 1024 * 1024);
        assert_eq!(config.transcoder.audio_bitrate_kbps, 192);
        assert_eq!(config.relay.image_timeout(), Duration::from_secs(10));
        assert_eq!(config.telemetry.log_filter, "info");
    }
}
