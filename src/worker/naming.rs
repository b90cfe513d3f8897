//! Final artifact naming

use chrono::Utc;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Keep only letters, digits, spaces, dot, underscore and hyphen.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Name offered to clients for an artifact that keeps its downloaded name.
///
/// Drops the `{job_id}_` prefix the download template adds.
pub fn display_name(path: &Path, job_id: &str) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    match name.strip_prefix(&format!("{job_id}_")) {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => name,
    }
}

/// Title derived from the artifact when the caller supplied none.
pub fn title_from_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

/// Longest base name kept, in bytes, leaving room for a collision suffix
/// and the extension within the usual 255-byte file name limit.
const MAX_BASE_BYTES: usize = 200;

/// Cut `base` to at most [`MAX_BASE_BYTES`] on a char boundary.
fn truncate_base(base: &str) -> &str {
    if base.len() <= MAX_BASE_BYTES {
        return base;
    }
    let cut = (0..=MAX_BASE_BYTES)
        .rev()
        .find(|i| base.is_char_boundary(*i))
        .unwrap_or(0);
    base[..cut].trim_end()
}

/// Reserve the first free name among `{base}{ext}`, `{base}_{unix secs}{ext}`
/// and `{base}_{unix secs}_{n}{ext}` in `dir`.
///
/// The name is claimed by creating an empty placeholder with
/// `create_new`, so two jobs finishing together never get the same path.
/// The placeholder is then replaced by the rename.
fn claim_destination(dir: &Path, base: &str, ext: &str, source: &Path) -> io::Result<PathBuf> {
    let stamped = format!("{base}_{}", Utc::now().timestamp());
    let candidates = std::iter::once(format!("{base}{ext}"))
        .chain(std::iter::once(format!("{stamped}{ext}")))
        .chain((1u32..=u32::MAX).map(|n| format!("{stamped}_{n}{ext}")));

    for name in candidates {
        let candidate = dir.join(name);
        if candidate == source {
            return Ok(candidate);
        }
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free file name for {base}{ext}"),
    ))
}

/// Move `source` to the caller's title, keeping its extension.
///
/// Returns the final path and file name. Without a usable title the file
/// stays where it is. Must only run once nothing writes to `source`
/// any more.
pub fn finalize(
    source: &Path,
    job_id: &str,
    custom_title: Option<&str>,
) -> io::Result<(PathBuf, String)> {
    let sanitized = custom_title.map(sanitize_file_name).unwrap_or_default();
    if sanitized.is_empty() {
        return Ok((source.to_path_buf(), display_name(source, job_id)));
    }

    let ext = extension_of(source);
    let base = match sanitized.len().checked_sub(ext.len()) {
        Some(cut)
            if !ext.is_empty()
                && sanitized.is_char_boundary(cut)
                && sanitized[cut..].eq_ignore_ascii_case(&ext) =>
        {
            &sanitized[..cut]
        }
        _ => sanitized.as_str(),
    };
    let base = truncate_base(base);

    let dir = source.parent().unwrap_or_else(|| Path::new("."));
    let destination = claim_destination(dir, base, &ext, source)?;

    if destination != source {
        if let Err(e) = std::fs::rename(source, &destination) {
            let _ = std::fs::remove_file(&destination);
            return Err(e);
        }
        debug!(from = %source.display(), to = %destination.display(), "Artifact renamed");
    }

    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{base}{ext}"));
    Ok((destination, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::write(path, b"media").unwrap();
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_file_name("My/Video:Name*?"), "MyVideoName");
        assert_eq!(sanitize_file_name("  a b_c-d.e  "), "a b_c-d.e");
        assert_eq!(sanitize_file_name("Überfahrt 2024"), "Überfahrt 2024");
        assert_eq!(sanitize_file_name("<>|\"*"), "");
    }

    #[test]
    fn test_display_name_strips_job_prefix() {
        assert_eq!(display_name(Path::new("/d/abc_Some clip.mp4"), "abc"), "Some clip.mp4");
        assert_eq!(display_name(Path::new("/d/other.mp4"), "abc"), "other.mp4");
        assert_eq!(title_from_name("Some clip.mp4"), "Some clip");
    }

    #[test]
    fn test_finalize_renames_and_keeps_extension() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("job_original.mp4");
        touch(&source);

        let (path, name) = finalize(&source, "job", Some("My/Video:Name*?")).unwrap();

        assert_eq!(name, "MyVideoName.mp4");
        assert_eq!(path, dir.path().join("MyVideoName.mp4"));
        assert!(path.exists());
        assert!(!source.exists());
    }

    #[test]
    fn test_finalize_without_title_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("job_original.mp3");
        touch(&source);

        for title in [None, Some(""), Some("///")] {
            let (path, name) = finalize(&source, "job", title).unwrap();
            assert_eq!(path, source);
            assert_eq!(name, "original.mp3");
        }
    }

    #[test]
    fn test_finalize_does_not_double_extension() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("job_x.mp4");
        touch(&source);

        let (_, name) = finalize(&source, "job", Some("clip.MP4")).unwrap();
        assert_eq!(name, "clip.mp4");
    }

    #[test]
    fn test_collision_appends_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a_first.mp4");
        let second = dir.path().join("b_second.mp4");
        touch(&first);
        touch(&second);

        let before = Utc::now().timestamp();
        let (path_a, name_a) = finalize(&first, "a", Some("Same Name")).unwrap();
        let (path_b, name_b) = finalize(&second, "b", Some("Same Name")).unwrap();
        let after = Utc::now().timestamp();

        assert_eq!(name_a, "Same Name.mp4");
        assert_ne!(path_a, path_b);
        assert!(path_a.exists() && path_b.exists());

        let stamp: i64 = name_b
            .strip_prefix("Same Name_")
            .and_then(|rest| rest.strip_suffix(".mp4"))
            .and_then(|s| s.parse().ok())
            .unwrap();
        assert!((before..=after).contains(&stamp));
    }

    #[test]
    fn test_repeated_collision_adds_counter() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("clip.mp4"));

        let sources: Vec<PathBuf> = (0..3)
            .map(|i| {
                let path = dir.path().join(format!("job{i}_x.mp4"));
                touch(&path);
                path
            })
            .collect();

        let names: Vec<String> = sources
            .iter()
            .map(|source| finalize(source, "job", Some("clip")).unwrap().1)
            .collect();

        let mut unique = names.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3);
        assert!(names.iter().all(|n| n.starts_with("clip_") && n.ends_with(".mp4")));
    }

    #[test]
    fn test_concurrent_same_title_gets_distinct_files() {
        use std::sync::{Arc, Barrier};

        for round in 0..50 {
            let dir = tempfile::tempdir().unwrap();
            let barrier = Arc::new(Barrier::new(2));

            let handles: Vec<_> = (0..2)
                .map(|i| {
                    let job_id = format!("job{i}");
                    let source = dir.path().join(format!("{job_id}_x.mp4"));
                    std::fs::write(&source, format!("media {i}")).unwrap();
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        finalize(&source, &job_id, Some("Same")).unwrap().0
                    })
                })
                .collect();

            let paths: Vec<PathBuf> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            assert_ne!(paths[0], paths[1], "round {round}");

            let mut contents: Vec<String> = paths
                .iter()
                .map(|p| std::fs::read_to_string(p).unwrap())
                .collect();
            contents.sort();
            assert_eq!(contents, vec!["media 0", "media 1"], "round {round}");
        }
    }

    #[test]
    fn test_long_multibyte_title_fits_file_name_limit() {
        let dir = tempfile::tempdir().unwrap();
        let title = "\u{20000}".repeat(200);

        for i in 0..2 {
            let source = dir.path().join(format!("job{i}_x.mp4"));
            touch(&source);

            let (path, name) = finalize(&source, &format!("job{i}"), Some(&title)).unwrap();
            assert!(name.len() <= 255, "{} bytes", name.len());
            assert!(name.ends_with(".mp4"));
            assert!(path.exists());
        }
    }

    #[test]
    fn test_truncate_base_respects_char_boundaries() {
        let base = "é".repeat(150);
        let cut = truncate_base(&base);
        assert_eq!(cut.len(), MAX_BASE_BYTES);
        assert!(cut.chars().all(|c| c == 'é'));
        assert_eq!(truncate_base("short"), "short");
    }
}
