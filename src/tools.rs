//! Presence checks for the external binaries

use std::process::{Command, Stdio};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{binary} not found or not executable: {source}")]
    Missing {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{binary} exited with {status}")]
    Failed { binary: String, status: String },
}

/// First line of `binary <version_flag>`, e.g. `2024.08.06` for yt-dlp.
pub fn version(binary: &str, version_flag: &str) -> Result<String, ToolError> {
    let output = Command::new(binary)
        .arg(version_flag)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| ToolError::Missing {
            binary: binary.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(ToolError::Failed {
            binary: binary.to_string(),
            status: output.status.to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string())
}

pub fn resolver_version(binary: &str) -> Result<String, ToolError> {
    version(binary, "--version")
}

pub fn transcoder_version(binary: &str) -> Result<String, ToolError> {
    version(binary, "-version")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary() {
        let err = resolver_version("/nonexistent/yt-dlp").unwrap_err();
        assert!(matches!(err, ToolError::Missing { .. }));
        assert!(err.to_string().contains("/nonexistent/yt-dlp"));
    }

    #[cfg(unix)]
    #[test]
    fn test_reports_first_line() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake-ffmpeg");
        std::fs::write(&path, "#!/bin/sh\necho 'ffmpeg version 7.0 Copyright'\necho 'built with gcc'\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let version = transcoder_version(path.to_str().unwrap()).unwrap();
        assert_eq!(version, "ffmpeg version 7.0 Copyright");
    }
}
