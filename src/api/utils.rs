//! API utility functions
//!
//! Pure helpers for building artifact responses.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::path::Path;

/// RFC 5987 `attr-char` minus the alphanumerics.
const FILENAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'-')
    .remove(b'_')
    .remove(b'~');

/// `Content-Disposition` value offering `name` as a download.
///
/// The plain `filename` parameter is reduced to printable ASCII; the full
/// name travels percent-encoded in `filename*`.
pub fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if fallback == name {
        format!("attachment; filename=\"{name}\"")
    } else {
        format!(
            "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
            utf8_percent_encode(name, FILENAME_ENCODE_SET)
        )
    }
}

/// Content type guessed from the artifact's extension.
pub fn content_type_for(path: &Path) -> mime::Mime {
    mime_guess::from_path(path).first_or_octet_stream()
}
