//! The upload session: one user's pass through select → crop → submit.
//!
//! ```text
//! idle ─open─▶ selecting ─file─▶ compressing ─done─▶ ready-to-crop
//!                  ▲                  │                   │ crop
//!                  └─────rejected─────┘                   ▼
//!                                   ready-to-submit ◀─ cropping (live)
//!                                        │ submit
//!                                        ▼
//!                                    uploading ──▶ done | failed | cancelled
//! ```
//!
//! Every state change goes through [`UploadSession::dispatch`], which checks
//! the transition table in [`Phase::next`]. The convenience methods
//! (`choose_file`, `set_zoom`, ...) update the session's data and dispatch
//! the matching event; viewport changes hand back a [`CropRequest`] for the
//! live cropper to render.
//!
//! `failed` is not terminal: the user may edit and resubmit. `done` and
//! `cancelled` are; the session is dropped afterwards, which releases every
//! preview it still holds.

use crate::artifact::{ArtifactView, SourceImage};
use crate::cropper::{ArtifactSlot, CropError, CropRequest};
use crate::naming::{is_supported_image, sanitize_segment};
use crate::types::AspectPreset;
use crate::viewport::{Viewport, ViewportState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Idle,
    Selecting,
    Compressing,
    ReadyToCrop,
    Cropping,
    ReadyToSubmit,
    Uploading,
    Done,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Open,
    FileChosen,
    CompressionFinished,
    SourceRejected,
    CropRequested,
    CropCommitted,
    CropFailed,
    Submit,
    UploadResolved,
    UploadRejected,
    Cancel,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Selecting => "selecting",
            Phase::Compressing => "compressing",
            Phase::ReadyToCrop => "ready-to-crop",
            Phase::Cropping => "cropping",
            Phase::ReadyToSubmit => "ready-to-submit",
            Phase::Uploading => "uploading",
            Phase::Done => "done",
            Phase::Failed => "failed",
            Phase::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Cancelled)
    }

    /// Phases in which the crop editor is on screen.
    pub fn is_editing(self) -> bool {
        matches!(
            self,
            Phase::ReadyToCrop | Phase::Cropping | Phase::ReadyToSubmit | Phase::Failed
        )
    }

    /// Transition table. `None` means the event is not valid here.
    pub fn next(self, event: SessionEvent) -> Option<Phase> {
        use Phase::*;
        use SessionEvent::*;

        match (self, event) {
            (Idle, Open) => Some(Selecting),
            (p, FileChosen) if p == Selecting || p.is_editing() => Some(Compressing),
            (Compressing, CompressionFinished) => Some(ReadyToCrop),
            (Compressing, SourceRejected) => Some(Selecting),
            (p, CropRequested) if p.is_editing() => Some(Cropping),
            (Cropping | ReadyToSubmit, CropCommitted) => Some(ReadyToSubmit),
            (Cropping, CropFailed) => Some(ReadyToCrop),
            (ReadyToSubmit | Failed, Submit) => Some(Uploading),
            (Uploading, UploadResolved) => Some(Done),
            (Uploading, UploadRejected) => Some(Failed),
            (p, Cancel) if !p.is_terminal() => Some(Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Problems the user can fix; reported inline, never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("No file selected")]
    NoFile,
    #[error("Unsupported file type: {0} (expected jpg, jpeg, png or webp)")]
    UnsupportedType(String),
    #[error("Could not read image: {0}")]
    UnreadableImage(String),
    #[error("Caption must be at least {min} characters (got {actual})")]
    CaptionTooShort { min: usize, actual: usize },
    #[error("The cropped image is not ready yet")]
    ArtifactNotReady,
    #[error("Missing or invalid owner id")]
    MissingOwner,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Cannot {event} while {from}")]
    InvalidTransition { from: Phase, event: SessionEvent },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Cooperative cancellation flag, shared with in-flight work.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Everything the orchestrator needs for one submit attempt.
#[derive(Debug, Clone)]
pub struct SubmitTicket {
    pub owner_id: String,
    pub caption: String,
    pub artifact: ArtifactView,
    pub cancel: CancelFlag,
}

pub struct UploadSession {
    id: Uuid,
    owner_id: String,
    opened_at: DateTime<Utc>,
    phase: Phase,
    file_name: Option<String>,
    source: Option<Arc<SourceImage>>,
    viewport: Viewport,
    preset: AspectPreset,
    caption: String,
    slot: Arc<ArtifactSlot>,
    cancel: CancelFlag,
    progress: Arc<watch::Sender<u8>>,
}

impl fmt::Debug for UploadSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadSession")
            .field("id", &self.id)
            .field("owner_id", &self.owner_id)
            .field("phase", &self.phase)
            .field("file_name", &self.file_name)
            .field("preset", &self.preset)
            .field("viewport", &self.viewport.state())
            .finish_non_exhaustive()
    }
}

impl UploadSession {
    /// Open a session for `owner_id`. The session starts in `selecting`.
    pub fn open(
        owner_id: &str,
        preset: AspectPreset,
        max_zoom: f64,
    ) -> Result<Self, SessionError> {
        if sanitize_segment(owner_id).is_none() {
            return Err(ValidationError::MissingOwner.into());
        }
        let (progress, _) = watch::channel(0);
        let mut session = Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.trim().to_string(),
            opened_at: Utc::now(),
            phase: Phase::Idle,
            file_name: None,
            source: None,
            viewport: Viewport::new(preset.ratio(), max_zoom),
            preset,
            caption: String::new(),
            slot: Arc::new(ArtifactSlot::new()),
            cancel: CancelFlag::new(),
            progress: Arc::new(progress),
        };
        session.dispatch(SessionEvent::Open)?;
        Ok(session)
    }

    /// Apply `event`, or fail without changing anything.
    pub fn dispatch(&mut self, event: SessionEvent) -> Result<Phase, SessionError> {
        let next = self
            .phase
            .next(event)
            .ok_or(SessionError::InvalidTransition {
                from: self.phase,
                event,
            })?;
        if next != self.phase {
            log::debug!("session {}: {} -> {} ({event})", self.id, self.phase, next);
        }
        self.phase = next;
        Ok(next)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn source(&self) -> Option<&Arc<SourceImage>> {
        self.source.as_ref()
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn preset(&self) -> AspectPreset {
        self.preset
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    pub fn slot(&self) -> &Arc<ArtifactSlot> {
        &self.slot
    }

    /// Current artifact, if it matches the latest viewport.
    pub fn artifact(&self) -> Option<ArtifactView> {
        self.slot.current()
    }

    /// Handle for cancelling from outside, e.g. while a submit is awaited.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Upload progress in percent.
    pub fn progress(&self) -> watch::Receiver<u8> {
        self.progress.subscribe()
    }

    pub(crate) fn progress_sender(&self) -> Arc<watch::Sender<u8>> {
        Arc::clone(&self.progress)
    }

    // =========================================================================
    // File selection
    // =========================================================================

    /// Accept a file by name. Bytes follow via [`source_loaded`](Self::source_loaded).
    pub fn choose_file(&mut self, name: &str) -> Result<(), SessionError> {
        if name.trim().is_empty() {
            return Err(ValidationError::NoFile.into());
        }
        if !is_supported_image(name) {
            return Err(ValidationError::UnsupportedType(name.to_string()).into());
        }
        self.dispatch(SessionEvent::FileChosen)?;
        self.file_name = Some(name.to_string());
        self.source = None;
        self.slot.clear();
        self.viewport.clear_natural();
        Ok(())
    }

    /// The (possibly compressed) file is decoded and sized. Starts the first crop.
    pub fn source_loaded(&mut self, source: SourceImage) -> Result<CropRequest, SessionError> {
        self.dispatch(SessionEvent::CompressionFinished)?;
        self.viewport.set_natural(source.natural());
        self.viewport.reset();
        self.source = Some(Arc::new(source));
        self.request_crop()?
            .ok_or_else(|| ValidationError::UnreadableImage("image has no pixels".into()).into())
    }

    /// The chosen file could not be decoded; back to selection.
    pub fn source_rejected(&mut self, reason: &str) -> Result<ValidationError, SessionError> {
        self.dispatch(SessionEvent::SourceRejected)?;
        self.file_name = None;
        self.viewport.clear_natural();
        Ok(ValidationError::UnreadableImage(reason.to_string()))
    }

    // =========================================================================
    // Viewport and preset
    // =========================================================================

    pub fn set_preset(&mut self, preset: AspectPreset) -> Result<Option<CropRequest>, SessionError> {
        self.ensure_adjustable()?;
        self.preset = preset;
        self.viewport.set_target_aspect(preset.ratio());
        self.request_crop()
    }

    pub fn set_zoom(&mut self, zoom: f64) -> Result<Option<CropRequest>, SessionError> {
        self.ensure_adjustable()?;
        self.viewport.set_zoom(zoom);
        self.request_crop()
    }

    pub fn zoom_by_wheel(&mut self, delta_y: f64) -> Result<Option<CropRequest>, SessionError> {
        self.ensure_adjustable()?;
        self.viewport.zoom_by_wheel(delta_y);
        self.request_crop()
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) -> Result<Option<CropRequest>, SessionError> {
        self.ensure_adjustable()?;
        self.viewport.pan_by(dx, dy);
        self.request_crop()
    }

    pub fn set_offset(&mut self, x: f64, y: f64) -> Result<Option<CropRequest>, SessionError> {
        self.ensure_adjustable()?;
        self.viewport.set_offset(x, y);
        self.request_crop()
    }

    /// Apply a saved viewport (drafts), clamped to the current image.
    pub fn restore_viewport(
        &mut self,
        state: ViewportState,
    ) -> Result<Option<CropRequest>, SessionError> {
        self.ensure_adjustable()?;
        self.viewport.restore(state);
        self.request_crop()
    }

    /// Reflect the cropper's result for the latest request in the phase.
    pub fn crop_settled(&mut self, result: &Result<(), CropError>) -> Result<Phase, SessionError> {
        if self.phase != Phase::Cropping {
            return Ok(self.phase);
        }
        match result {
            Ok(()) if self.slot.current().is_some() => self.dispatch(SessionEvent::CropCommitted),
            Ok(()) => Ok(self.phase),
            Err(_) => self.dispatch(SessionEvent::CropFailed),
        }
    }

    fn ensure_adjustable(&self) -> Result<(), SessionError> {
        match self.phase {
            Phase::Uploading | Phase::Done | Phase::Cancelled | Phase::Idle => {
                Err(SessionError::InvalidTransition {
                    from: self.phase,
                    event: SessionEvent::CropRequested,
                })
            }
            _ => Ok(()),
        }
    }

    /// New crop request for the current viewport, once the image is loaded.
    fn request_crop(&mut self) -> Result<Option<CropRequest>, SessionError> {
        let (Some(source), Some(rect)) = (self.source.as_ref(), self.viewport.source_rect()) else {
            return Ok(None);
        };
        let source = Arc::clone(source);
        self.dispatch(SessionEvent::CropRequested)?;
        Ok(Some(CropRequest {
            generation: self.slot.begin(),
            source,
            rect,
            preset: self.preset,
        }))
    }

    // =========================================================================
    // Caption and submit
    // =========================================================================

    pub fn set_caption(&mut self, caption: impl Into<String>) {
        self.caption = caption.into();
    }

    /// Check everything a submit needs, without touching the phase.
    pub fn validate_submit(&self, caption_min_len: usize) -> Result<ArtifactView, ValidationError> {
        if self.file_name.is_none() || self.source.is_none() {
            return Err(ValidationError::NoFile);
        }
        let actual = self.caption.trim().chars().count();
        if actual < caption_min_len {
            return Err(ValidationError::CaptionTooShort {
                min: caption_min_len,
                actual,
            });
        }
        self.slot.current().ok_or(ValidationError::ArtifactNotReady)
    }

    /// Validate and enter `uploading`.
    pub fn begin_submit(&mut self, caption_min_len: usize) -> Result<SubmitTicket, SessionError> {
        let artifact = self.validate_submit(caption_min_len)?;
        if self.phase == Phase::Cropping {
            // Render landed but nobody synced the phase yet
            self.dispatch(SessionEvent::CropCommitted)?;
        }
        self.dispatch(SessionEvent::Submit)?;
        self.cancel.reset();
        self.progress.send_replace(0);
        Ok(SubmitTicket {
            owner_id: self.owner_id.clone(),
            caption: self.caption.trim().to_string(),
            artifact,
            cancel: self.cancel.clone(),
        })
    }

    /// Record how the upload attempt ended.
    pub fn finish_upload(&mut self, outcome: UploadOutcome) -> Result<Phase, SessionError> {
        let event = match outcome {
            UploadOutcome::Persisted => SessionEvent::UploadResolved,
            UploadOutcome::Rejected => SessionEvent::UploadRejected,
            UploadOutcome::Cancelled => SessionEvent::Cancel,
        };
        let phase = self.dispatch(event)?;
        if phase.is_terminal() {
            self.release();
        }
        Ok(phase)
    }

    /// Cancel the session.
    ///
    /// Outside an upload this ends the session at once. During an upload only
    /// the flag is set; the orchestrator observes it at its next checkpoint.
    pub fn cancel(&mut self) -> Result<Phase, SessionError> {
        self.cancel.set();
        if self.phase == Phase::Uploading {
            return Ok(self.phase);
        }
        let phase = self.dispatch(SessionEvent::Cancel)?;
        self.release();
        Ok(phase)
    }

    /// Drop binary state; previews go with it.
    fn release(&mut self) {
        self.slot.clear();
        self.source = None;
    }
}

/// How an upload attempt ended, from the session's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Persisted,
    Rejected,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{CroppedArtifact, PreviewRegistry};
    use crate::imaging::Dimensions;
    use crate::imaging::calculations::DEFAULT_MAX_ZOOM;

    fn session() -> UploadSession {
        UploadSession::open("alice", AspectPreset::Square, DEFAULT_MAX_ZOOM).unwrap()
    }

    fn source(width: u32, height: u32, registry: &PreviewRegistry) -> SourceImage {
        SourceImage::new("photo.jpg", Arc::new(vec![0; 16]), Dimensions { width, height })
            .with_preview(registry)
    }

    /// Session in ready-to-submit with a committed artifact.
    fn ready(registry: &PreviewRegistry) -> UploadSession {
        let mut s = session();
        s.choose_file("photo.jpg").unwrap();
        let req = s.source_loaded(source(2000, 1000, registry)).unwrap();
        s.slot()
            .commit(CroppedArtifact::new(req.generation, req.preset, vec![1], registry));
        s.crop_settled(&Ok(())).unwrap();
        s.set_caption("sunset");
        s
    }

    // =========================================================================
    // Transition table
    // =========================================================================

    #[test]
    fn happy_path_transitions() {
        use SessionEvent::*;
        let steps = [
            (Open, Phase::Selecting),
            (FileChosen, Phase::Compressing),
            (CompressionFinished, Phase::ReadyToCrop),
            (CropRequested, Phase::Cropping),
            (CropRequested, Phase::Cropping),
            (CropCommitted, Phase::ReadyToSubmit),
            (Submit, Phase::Uploading),
            (UploadResolved, Phase::Done),
        ];
        let mut phase = Phase::Idle;
        for (event, expected) in steps {
            phase = phase.next(event).unwrap();
            assert_eq!(phase, expected, "after {event}");
        }
    }

    #[test]
    fn failed_allows_resubmit_and_editing() {
        assert_eq!(
            Phase::Failed.next(SessionEvent::Submit),
            Some(Phase::Uploading)
        );
        assert_eq!(
            Phase::Failed.next(SessionEvent::CropRequested),
            Some(Phase::Cropping)
        );
        assert_eq!(
            Phase::Failed.next(SessionEvent::FileChosen),
            Some(Phase::Compressing)
        );
    }

    #[test]
    fn terminal_phases_reject_everything() {
        for phase in [Phase::Done, Phase::Cancelled] {
            assert_eq!(phase.next(SessionEvent::Cancel), None);
            assert_eq!(phase.next(SessionEvent::Submit), None);
            assert_eq!(phase.next(SessionEvent::FileChosen), None);
        }
    }

    #[test]
    fn cannot_submit_while_cropping() {
        assert_eq!(Phase::Cropping.next(SessionEvent::Submit), None);
        assert_eq!(Phase::Uploading.next(SessionEvent::FileChosen), None);
    }

    #[test]
    fn phase_labels_are_kebab_case() {
        assert_eq!(Phase::ReadyToSubmit.to_string(), "ready-to-submit");
        assert_eq!(
            serde_json::to_string(&Phase::ReadyToCrop).unwrap(),
            "\"ready-to-crop\""
        );
    }

    // =========================================================================
    // Session operations
    // =========================================================================

    #[test]
    fn open_requires_owner() {
        let err = UploadSession::open("  ", AspectPreset::Square, 3.0).unwrap_err();
        assert_eq!(err, SessionError::Validation(ValidationError::MissingOwner));
    }

    #[test]
    fn unsupported_file_is_rejected_without_transition() {
        let mut s = session();
        let err = s.choose_file("notes.txt").unwrap_err();
        assert!(matches!(
            err,
            SessionError::Validation(ValidationError::UnsupportedType(_))
        ));
        assert_eq!(s.phase(), Phase::Selecting);
    }

    #[test]
    fn loading_source_starts_first_crop() {
        let registry = PreviewRegistry::new();
        let mut s = session();
        s.choose_file("photo.jpg").unwrap();
        let req = s.source_loaded(source(1000, 2000, &registry)).unwrap();

        assert_eq!(s.phase(), Phase::Cropping);
        assert_eq!(s.viewport().zoom(), 2.0);
        assert_eq!(req.generation, s.slot().latest());
        assert!(req.rect.fits_within((1000, 2000)));
    }

    #[test]
    fn viewport_changes_before_load_request_nothing() {
        let mut s = session();
        assert!(s.set_zoom(2.0).unwrap().is_none());
        assert_eq!(s.phase(), Phase::Selecting);
    }

    #[test]
    fn each_gesture_gets_a_newer_generation() {
        let registry = PreviewRegistry::new();
        let mut s = session();
        s.choose_file("photo.jpg").unwrap();
        let first = s.source_loaded(source(2000, 1000, &registry)).unwrap();
        let second = s.set_zoom(2.0).unwrap().unwrap();
        let third = s.pan_by(10.0, 0.0).unwrap().unwrap();
        assert!(first.generation < second.generation);
        assert!(second.generation < third.generation);
        assert!(third.rect.x > second.rect.x);
    }

    #[test]
    fn preset_switch_reclamps_viewport() {
        let registry = PreviewRegistry::new();
        let mut s = session();
        s.choose_file("photo.jpg").unwrap();
        s.source_loaded(source(1080, 1080, &registry)).unwrap();
        let req = s.set_preset(AspectPreset::Landscape).unwrap().unwrap();
        assert_eq!(req.preset, AspectPreset::Landscape);
        assert!((s.viewport().zoom() - 1.91).abs() < 1e-9);
        assert!(req.rect.fits_within((1080, 1080)));
    }

    #[test]
    fn unreadable_source_returns_to_selection() {
        let mut s = session();
        s.choose_file("broken.jpg").unwrap();
        let err = s.source_rejected("truncated").unwrap();
        assert_eq!(err, ValidationError::UnreadableImage("truncated".into()));
        assert_eq!(s.phase(), Phase::Selecting);
        assert!(s.file_name().is_none());
    }

    #[test]
    fn submit_without_artifact_is_validation_error() {
        let registry = PreviewRegistry::new();
        let mut s = session();
        s.choose_file("photo.jpg").unwrap();
        s.source_loaded(source(2000, 1000, &registry)).unwrap();
        s.set_caption("hello");

        let err = s.begin_submit(1).unwrap_err();
        assert_eq!(
            err,
            SessionError::Validation(ValidationError::ArtifactNotReady)
        );
        assert_eq!(s.phase(), Phase::Cropping);
    }

    #[test]
    fn submit_without_file_is_validation_error() {
        let mut s = session();
        assert_eq!(
            s.begin_submit(0).unwrap_err(),
            SessionError::Validation(ValidationError::NoFile)
        );
    }

    #[test]
    fn short_caption_blocks_submit() {
        let registry = PreviewRegistry::new();
        let mut s = ready(&registry);
        s.set_caption("   ");
        assert_eq!(
            s.begin_submit(1).unwrap_err(),
            SessionError::Validation(ValidationError::CaptionTooShort { min: 1, actual: 0 })
        );
        assert_eq!(s.phase(), Phase::ReadyToSubmit);
    }

    #[test]
    fn begin_submit_hands_out_trimmed_ticket() {
        let registry = PreviewRegistry::new();
        let mut s = ready(&registry);
        s.set_caption("  golden hour ");
        let ticket = s.begin_submit(1).unwrap();
        assert_eq!(ticket.caption, "golden hour");
        assert_eq!(ticket.owner_id, "alice");
        assert_eq!(s.phase(), Phase::Uploading);
    }

    #[test]
    fn failed_upload_can_be_resubmitted() {
        let registry = PreviewRegistry::new();
        let mut s = ready(&registry);
        s.begin_submit(1).unwrap();
        assert_eq!(s.finish_upload(UploadOutcome::Rejected).unwrap(), Phase::Failed);
        assert!(s.artifact().is_some());
        s.begin_submit(1).unwrap();
        assert_eq!(s.finish_upload(UploadOutcome::Persisted).unwrap(), Phase::Done);
    }

    #[test]
    fn cancel_outside_upload_releases_previews() {
        let registry = PreviewRegistry::new();
        let mut s = ready(&registry);
        assert_eq!(registry.live(), 2);

        assert_eq!(s.cancel().unwrap(), Phase::Cancelled);
        assert_eq!(registry.live(), 0);
        assert!(s.cancel().is_err());
    }

    #[test]
    fn cancel_during_upload_only_sets_flag() {
        let registry = PreviewRegistry::new();
        let mut s = ready(&registry);
        let ticket = s.begin_submit(1).unwrap();

        assert_eq!(s.cancel().unwrap(), Phase::Uploading);
        assert!(ticket.cancel.is_set());
    }

    #[test]
    fn done_session_drops_previews() {
        let registry = PreviewRegistry::new();
        let mut s = ready(&registry);
        s.begin_submit(1).unwrap();
        s.finish_upload(UploadOutcome::Persisted).unwrap();
        assert_eq!(registry.live(), 0);
    }

    #[test]
    fn crop_failure_returns_to_ready_to_crop() {
        let registry = PreviewRegistry::new();
        let mut s = session();
        s.choose_file("photo.jpg").unwrap();
        s.source_loaded(source(2000, 1000, &registry)).unwrap();
        let phase = s
            .crop_settled(&Err(CropError::Render("boom".into())))
            .unwrap();
        assert_eq!(phase, Phase::ReadyToCrop);
        assert!(s.set_zoom(1.5).unwrap().is_some());
    }

    #[test]
    fn invalid_event_leaves_phase_unchanged() {
        let mut s = session();
        let err = s.dispatch(SessionEvent::UploadResolved).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot UploadResolved while selecting"
        );
        assert_eq!(s.phase(), Phase::Selecting);
    }
}
