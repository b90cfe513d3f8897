//! Post-download transcoding
//!
//! Only GIF conversion runs as a separate step; audio extraction and
//! container merging are delegated to the downloader, which invokes the same
//! `ffmpeg` binary itself.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::TranscoderConfig;

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("failed to run transcoder: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("transcoder {stage} pass failed: {detail}")]
    Failed { stage: &'static str, detail: String },

    #[error("transcoder produced no output at {0}")]
    MissingOutput(PathBuf),
}

pub trait Transcoder: Send + Sync {
    /// Re-encode `input` as an animated GIF written to `output`.
    fn to_gif(&self, input: &Path, output: &Path) -> Result<(), ProcessingError>;
}

/// Removes the wrapped file when dropped.
struct TempArtifact(PathBuf);

impl TempArtifact {
    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.0) {
            Ok(()) => debug!(path = %self.0.display(), "Temporary file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.0.display(), error = %e, "Failed to remove temporary file"),
        }
    }
}

/// GIF encoder backed by the `ffmpeg` executable
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    binary: String,
    fps: u32,
    width: u32,
}

impl Ffmpeg {
    pub fn new(config: &TranscoderConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            fps: config.gif_fps,
            width: config.gif_width,
        }
    }

    fn scale_filter(&self) -> String {
        format!("fps={},scale={}:-1:flags=lanczos", self.fps, self.width)
    }

    pub(crate) fn palette_args(&self, input: &Path, palette: &Path) -> Vec<OsString> {
        vec![
            "-y".into(),
            "-i".into(),
            input.into(),
            "-vf".into(),
            format!("{},palettegen", self.scale_filter()).into(),
            palette.into(),
        ]
    }

    pub(crate) fn encode_args(&self, input: &Path, palette: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-y".into(),
            "-i".into(),
            input.into(),
            "-i".into(),
            palette.into(),
            "-filter_complex".into(),
            format!("{} [x]; [x][1:v] paletteuse", self.scale_filter()).into(),
            output.into(),
        ]
    }

    fn run(&self, stage: &'static str, args: Vec<OsString>) -> Result<(), ProcessingError> {
        let output = Command::new(&self.binary)
            .arg("-hide_banner")
            .args(["-loglevel", "error"])
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(ProcessingError::Spawn)?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("process exited unsuccessfully")
            .trim()
            .to_string();
        Err(ProcessingError::Failed { stage, detail })
    }
}

impl Transcoder for Ffmpeg {
    fn to_gif(&self, input: &Path, output: &Path) -> Result<(), ProcessingError> {
        let palette = TempArtifact(palette_path(output));
        debug!(input = %input.display(), output = %output.display(), "Encoding GIF");

        self.run("palette", self.palette_args(input, palette.path()))?;
        self.run("encode", self.encode_args(input, palette.path(), output))?;

        if !output.exists() {
            return Err(ProcessingError::MissingOutput(output.to_path_buf()));
        }
        Ok(())
    }
}

fn palette_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "gif".to_string());
    output.with_file_name(format!("{stem}.palette.png"))
}
