use thiserror::Error;

use super::models::SubmitParams;

#[derive(Debug, Error, PartialEq)]
pub enum SubmitValidationError {
    #[error("url must be an http/https URL")]
    InvalidUrl,
    #[error("format_id must not be empty")]
    MissingFormat,
    #[error("end ({end}) must be 0 or greater than start ({start})")]
    InvalidRange { start: u64, end: u64 },
    #[error("title exceeds {0} characters")]
    TitleTooLong(usize),
}

/// `url` is an absolute http(s) URL with something after the scheme.
pub fn is_http_url(url: &str) -> bool {
    ["http://", "https://"]
        .iter()
        .filter_map(|scheme| url.strip_prefix(scheme))
        .any(|rest| !rest.is_empty())
}

pub fn validate_submit(
    params: &SubmitParams,
    max_title_chars: usize,
) -> Result<(), SubmitValidationError> {
    if !is_http_url(params.url.trim()) {
        return Err(SubmitValidationError::InvalidUrl);
    }

    if params.format_id.trim().is_empty() {
        return Err(SubmitValidationError::MissingFormat);
    }

    if params.end != 0 && params.end <= params.start {
        return Err(SubmitValidationError::InvalidRange {
            start: params.start,
            end: params.end,
        });
    }

    if let Some(title) = &params.title {
        if title.chars().count() > max_title_chars {
            return Err(SubmitValidationError::TitleTooLong(max_title_chars));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SubmitParams {
        SubmitParams {
            url: "https://example.com/watch?v=1".to_string(),
            format_id: "137+bestaudio/best".to_string(),
            title: None,
            start: 0,
            end: 0,
            gif: false,
        }
    }

    #[test]
    fn test_valid() {
        assert!(validate_submit(&params(), 200).is_ok());

        let mut trimmed = params();
        trimmed.start = 10;
        trimmed.end = 20;
        assert!(validate_submit(&trimmed, 200).is_ok());

        let mut open_ended = params();
        open_ended.start = 10;
        assert!(validate_submit(&open_ended, 200).is_ok());
    }

    #[test]
    fn test_invalid_url() {
        for url in ["", "ftp://example.com/a", "example.com", "https://"] {
            let mut p = params();
            p.url = url.to_string();
            assert_eq!(validate_submit(&p, 200), Err(SubmitValidationError::InvalidUrl));
        }
    }

    #[test]
    fn test_missing_format() {
        let mut p = params();
        p.format_id = "  ".to_string();
        assert_eq!(validate_submit(&p, 200), Err(SubmitValidationError::MissingFormat));
    }

    #[test]
    fn test_invalid_range() {
        let mut p = params();
        p.start = 30;
        p.end = 30;
        assert_eq!(
            validate_submit(&p, 200),
            Err(SubmitValidationError::InvalidRange { start: 30, end: 30 })
        );
    }

    #[test]
    fn test_title_limit_counts_chars() {
        let mut p = params();
        p.title = Some("é".repeat(5));
        assert!(validate_submit(&p, 5).is_ok());
        p.title = Some("é".repeat(6));
        assert_eq!(validate_submit(&p, 5), Err(SubmitValidationError::TitleTooLong(5)));
    }
}
