//! CLI output formatting for the upload commands.
//!
//! Output leads with what the user cares about (the post, the crop, the
//! preset) and puts storage details on indented context lines underneath,
//! so a run reads as a short report rather than a file listing.
//!
//! # Output Format
//!
//! ## Presets
//!
//! ```text
//! square     1:1     1080x1080
//! portrait   4:5     1080x1350
//! landscape  1.91:1  1080x566
//! story      9:16    1080x1920
//! profile    1:1     400x400  (circle)
//! ```
//!
//! ## Crop
//!
//! ```text
//! portrait 1080x1350 (143 KB)
//!     Source: 2000x1000 @ (412, 0) 800x1000
//!     Zoom: 1.00 (min 1.00, max 3.00)
//!     Saved: dunes-portrait.jpg
//! ```
//!
//! ## Upload
//!
//! ```text
//! dunes.jpg: compressed 3.2 MB → 812 KB
//! Uploading [#####-----]  50%
//! Posted rec-1
//!     URL: /storage/alice/1700000000000-3f2a….jpg
//!     Caption: windy
//!     Image: portrait 1080x1350 (143 KB)
//!     Digest: 9c1d…
//! ```
//!
//! # Architecture
//!
//! Every report has a `format_*` function (returns `Vec<String>` or `String`)
//! for testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure. [`follow_progress`] is the one async piece: it turns
//! the session's progress channel into lines.

use crate::artifact::ArtifactView;
use crate::draft::SessionSnapshot;
use crate::imaging::{CompressStatus, SourceRect};
use crate::types::AspectPreset;
use crate::upload::{PersistedPost, UploadError};
use tokio::sync::watch;

// ============================================================================
// Shared helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte count: `512 B`, `143 KB`, `3.2 MB`.
fn format_size(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    let b = bytes as f64;
    if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= KB {
        format!("{:.0} KB", b / KB)
    } else {
        format!("{bytes} B")
    }
}

/// Preset geometry as `name WxH`.
fn preset_line(preset: AspectPreset, width: u32, height: u32, size: usize) -> String {
    format!("{preset} {width}x{height} ({})", format_size(size))
}

/// Shorten a hex digest to its first 12 characters.
fn short_digest(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}

/// Ratio label for the presets table.
fn ratio_label(preset: AspectPreset) -> &'static str {
    match preset {
        AspectPreset::Square | AspectPreset::Profile => "1:1",
        AspectPreset::Portrait => "4:5",
        AspectPreset::Landscape => "1.91:1",
        AspectPreset::Story => "9:16",
    }
}

// ============================================================================
// Presets
// ============================================================================

pub fn format_presets() -> Vec<String> {
    AspectPreset::ALL
        .iter()
        .map(|&preset| {
            let spec = preset.spec();
            let size = format!("{}x{}", spec.output_width, spec.output_height);
            let line = format!("{:<10} {:<7} {:<8}", spec.name, ratio_label(preset), size);
            if spec.circular {
                format!("{line} (circle)")
            } else {
                line.trim_end().to_string()
            }
        })
        .collect()
}

pub fn print_presets() {
    for line in format_presets() {
        println!("{}", line);
    }
}

// ============================================================================
// Compression
// ============================================================================

/// One line describing what the compressor did with `name`.
pub fn format_compress_status(name: &str, status: &CompressStatus, final_len: usize) -> String {
    match status {
        CompressStatus::UnderThreshold => {
            format!("{name}: {} (under threshold)", format_size(final_len))
        }
        CompressStatus::Compressed { original_len } => format!(
            "{name}: compressed {} → {}",
            format_size(*original_len),
            format_size(final_len)
        ),
        CompressStatus::NotSmaller { attempted_len } => format!(
            "{name}: kept original {} (re-encode was {})",
            format_size(final_len),
            format_size(*attempted_len)
        ),
        CompressStatus::FellBack => format!(
            "{name}: kept original {} (compression failed)",
            format_size(final_len)
        ),
    }
}

pub fn print_compress_status(name: &str, status: &CompressStatus, final_len: usize) {
    println!("{}", format_compress_status(name, status, final_len));
}

// ============================================================================
// Crop
// ============================================================================

/// Everything the crop report shows besides the artifact itself.
#[derive(Debug, Clone, Copy)]
pub struct CropContext<'a> {
    pub natural: (u32, u32),
    pub rect: SourceRect,
    pub zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub saved_to: Option<&'a str>,
}

pub fn format_crop_result(artifact: &ArtifactView, ctx: &CropContext<'_>) -> Vec<String> {
    let mut lines = vec![preset_line(
        artifact.preset,
        artifact.width,
        artifact.height,
        artifact.bytes.len(),
    )];
    let i = indent(1);
    lines.push(format!(
        "{i}Source: {}x{} @ ({:.0}, {:.0}) {:.0}x{:.0}",
        ctx.natural.0, ctx.natural.1, ctx.rect.x, ctx.rect.y, ctx.rect.width, ctx.rect.height
    ));
    lines.push(format!(
        "{i}Zoom: {:.2} (min {:.2}, max {:.2})",
        ctx.zoom, ctx.min_zoom, ctx.max_zoom
    ));
    if let Some(path) = ctx.saved_to {
        lines.push(format!("{i}Saved: {path}"));
    }
    lines
}

pub fn print_crop_result(artifact: &ArtifactView, ctx: &CropContext<'_>) {
    for line in format_crop_result(artifact, ctx) {
        println!("{}", line);
    }
}

// ============================================================================
// Upload
// ============================================================================

const PROGRESS_WIDTH: usize = 10;

/// `Uploading [#####-----]  50%`
pub fn format_progress(percent: u8) -> String {
    let percent = percent.min(100);
    let filled = percent as usize * PROGRESS_WIDTH / 100;
    format!(
        "Uploading [{}{}] {:>3}%",
        "#".repeat(filled),
        "-".repeat(PROGRESS_WIDTH - filled),
        percent
    )
}

/// Emit a progress line for every update until 100% is shown or the
/// sender goes away.
pub async fn follow_progress(mut progress: watch::Receiver<u8>, mut emit: impl FnMut(String)) {
    while progress.changed().await.is_ok() {
        let percent = *progress.borrow_and_update();
        emit(format_progress(percent));
        if percent >= 100 {
            break;
        }
    }
}

pub fn format_post(post: &PersistedPost) -> Vec<String> {
    let i = indent(1);
    let mut lines = vec![
        format!("Posted {}", post.record_id),
        format!("{i}URL: {}", post.public_url),
    ];
    if !post.caption.is_empty() {
        lines.push(format!("{i}Caption: {}", post.caption));
    }
    lines.push(format!(
        "{i}Image: {}",
        preset_line(post.preset, post.width, post.height, post.size_bytes)
    ));
    lines.push(format!("{i}Digest: {}", short_digest(&post.digest)));
    lines
}

pub fn print_post(post: &PersistedPost) {
    for line in format_post(post) {
        println!("{}", line);
    }
}

/// Error report for a failed submit, with a hint about what to do next.
pub fn format_upload_error(error: &UploadError) -> Vec<String> {
    let mut lines = vec![format!("Error: {error}")];
    let i = indent(1);
    match error {
        UploadError::Cancelled {
            orphaned_url: Some(url),
        } => lines.push(format!("{i}Stored but not posted: {url}")),
        e if e.is_retryable() => lines.push(format!("{i}The draft was kept; run again to retry")),
        _ => {}
    }
    lines
}

pub fn print_upload_error(error: &UploadError) {
    for line in format_upload_error(error) {
        eprintln!("{}", line);
    }
}

// ============================================================================
// Drafts
// ============================================================================

pub fn format_draft(snapshot: &SessionSnapshot) -> Vec<String> {
    let i = indent(1);
    let mut lines = vec![format!(
        "Draft for {} ({})",
        snapshot.owner_id, snapshot.phase
    )];
    lines.push(format!(
        "{i}Saved: {}",
        snapshot.saved_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if let Some(name) = &snapshot.file_name {
        lines.push(format!("{i}File: {name}"));
    }
    lines.push(format!("{i}Preset: {}", snapshot.preset));
    lines.push(format!(
        "{i}Viewport: zoom {:.2}, offset ({:.1}, {:.1})",
        snapshot.viewport.zoom, snapshot.viewport.offset_x, snapshot.viewport.offset_y
    ));
    if !snapshot.caption.is_empty() {
        lines.push(format!("{i}Caption: {}", snapshot.caption));
    }
    lines
}

pub fn print_draft(snapshot: &SessionSnapshot) {
    for line in format_draft(snapshot) {
        println!("{}", line);
    }
}
