//! Request and response shapes of the HTTP surface.
//!
//! Job snapshots are served as [`crate::jobs::Job`] directly and metadata as
//! [`crate::resolver::Metadata`]; this module only holds the envelopes
//! around them.
//!
//! # Submission
//!
//! ```text
//! POST /api/prepare?url=https://example.com/watch?v=1&format_id=137%2Bbestaudio%2Fbest&title=Clip&start=5&end=20
//! 202 {"job_id": "6f1c..."}
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::observability::MetricsSnapshot;

#[derive(Debug, Deserialize, Clone)]
pub struct InfoParams {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SubmitParams {
    pub url: String,
    pub format_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub start: u64,
    #[serde(default)]
    pub end: u64,
    #[serde(default)]
    pub gif: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobAcceptedResponse {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
    pub metrics: MetricsSnapshot,
}
