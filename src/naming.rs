//! Names for files entering and leaving the pipeline.
//!
//! Two concerns:
//! - Accepting input: only files whose extension the image backend can decode
//!   are allowed into a session.
//! - Naming output: every upload gets a generated storage name of the form
//!   `<owner>/<millis>-<uuid>.jpg`. The owner segment is sanitized so a user
//!   id can never escape its directory; the timestamp keeps a user's uploads
//!   roughly ordered, and the uuid makes collisions practically impossible.
//!
//! ```text
//! "alice"        → alice/1767225600000-6f1c0c9e2b6d4a8f9a0e8d3b1c2a4f5e.jpg
//! "../../etc"    → etc/1767225600000-....jpg
//! "Bob Smith!"   → bob-smith/1767225600000-....jpg
//! ```

use chrono::{DateTime, Utc};
use std::path::Path;

/// Extensions accepted on file selection, lowercase.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Lowercased extension of `name`, if any.
pub fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// True if `name` has an extension the pipeline accepts.
pub fn is_supported_image(name: &str) -> bool {
    extension(name).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Reduce an owner id to a single safe path segment.
///
/// Keeps ASCII alphanumerics, `_` and `-`; everything else becomes `-`.
/// Runs of dashes collapse and leading/trailing dashes are trimmed. Returns
/// `None` when nothing usable is left.
pub fn sanitize_segment(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        let mapped = if c.is_ascii_alphanumeric() || c == '_' {
            c.to_ascii_lowercase()
        } else {
            '-'
        };
        if mapped == '-' && out.ends_with('-') {
            continue;
        }
        out.push(mapped);
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Generated storage name for an upload by `owner` at `now`.
pub fn upload_name(owner: &str, now: DateTime<Utc>) -> String {
    let owner = sanitize_segment(owner).unwrap_or_else(|| "anonymous".to_string());
    format!(
        "{}/{}-{}.jpg",
        owner,
        now.timestamp_millis(),
        uuid::Uuid::new_v4().simple()
    )
}
