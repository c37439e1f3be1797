//! Submit: turn the session's current crop into a stored post.
//!
//! ```text
//! validate ─▶ name ─▶ upload_binary ─▶ [cancel?] ─▶ create_record ─▶ done
//!    │                     │                │              │
//!    ▼                     ▼                ▼              ▼
//!  Validation           Storage         Cancelled       Record
//! (no network)        (→ failed)     (→ cancelled)    (→ failed)
//! ```
//!
//! Storage APIs give no byte-level progress, so a ticker bumps a percentage
//! on a timer while the calls are in flight, stops at a cap, and snaps to 100
//! once the record exists.
//!
//! Cancellation is cooperative. The network calls themselves always run to
//! completion; the flag is checked after the upload, and a set flag
//! suppresses record creation. The uploaded object is then orphaned: it is
//! logged and reported in [`UploadError::Cancelled`], never deleted behind the
//! caller's back. A cancel that arrives after the record was created cannot
//! undo it; the submit still succeeds.

use crate::data_service::{DataService, DataServiceError};
use crate::naming::upload_name;
use crate::session::{SessionError, UploadOutcome, UploadSession, ValidationError};
use crate::types::AspectPreset;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Anything the session should not have allowed; details are in the log.
    #[error("Could not post right now, please try again")]
    Session(#[source] SessionError),
    #[error("Upload failed: {0}")]
    Storage(#[source] DataServiceError),
    #[error("Could not save the post: {0}")]
    Record(#[source] DataServiceError),
    #[error("Upload cancelled")]
    Cancelled {
        /// Set when the bytes were stored before the cancel was seen.
        orphaned_url: Option<String>,
    },
}

impl From<SessionError> for UploadError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Validation(v) => UploadError::Validation(v),
            other => {
                log::error!("unexpected session error during submit: {other}");
                UploadError::Session(other)
            }
        }
    }
}

impl UploadError {
    /// The session stays open and the user may submit again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, UploadError::Storage(_) | UploadError::Record(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UploadSettings {
    pub caption_min_len: usize,
    pub progress_step: u8,
    pub progress_interval: Duration,
    pub progress_cap: u8,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            caption_min_len: 1,
            progress_step: 10,
            progress_interval: Duration::from_millis(200),
            progress_cap: 90,
        }
    }
}

/// A post that made it to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistedPost {
    pub record_id: String,
    pub public_url: String,
    pub storage_name: String,
    pub owner_id: String,
    pub caption: String,
    pub preset: AspectPreset,
    pub width: u32,
    pub height: u32,
    pub size_bytes: usize,
    pub digest: String,
    pub created_at: DateTime<Utc>,
}

pub struct UploadOrchestrator<D: DataService> {
    service: Arc<D>,
    settings: UploadSettings,
}

impl<D: DataService> UploadOrchestrator<D> {
    pub fn new(service: Arc<D>, settings: UploadSettings) -> Self {
        Self { service, settings }
    }

    pub fn service(&self) -> &Arc<D> {
        &self.service
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    /// Upload the session's current artifact and create its record.
    ///
    /// Validation failures leave the session where it was and make no
    /// network calls. Backend failures move it to `failed`, from where it can
    /// be submitted again.
    pub async fn submit(&self, session: &mut UploadSession) -> Result<PersistedPost, UploadError> {
        let ticket = session.begin_submit(self.settings.caption_min_len)?;
        let name = upload_name(&ticket.owner_id, Utc::now());
        let ticker = ProgressTicker::start(session.progress_sender(), &self.settings);

        log::info!(
            "uploading {} ({} bytes, {})",
            name,
            ticket.artifact.bytes.len(),
            ticket.artifact.preset
        );
        let public_url = match self
            .service
            .upload_binary(&ticket.artifact.bytes, &name)
            .await
        {
            Ok(url) => url,
            Err(e) => {
                ticker.reset();
                log::error!("upload of {name} failed: {e}");
                session.finish_upload(UploadOutcome::Rejected)?;
                return Err(UploadError::Storage(e));
            }
        };

        if ticket.cancel.is_set() {
            ticker.reset();
            log::warn!("cancelled after upload; {public_url} is stored but has no record");
            session.finish_upload(UploadOutcome::Cancelled)?;
            return Err(UploadError::Cancelled {
                orphaned_url: Some(public_url),
            });
        }

        let record_id = match self
            .service
            .create_record(&ticket.owner_id, &public_url, &ticket.caption)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                ticker.reset();
                log::error!("creating record for {public_url} failed: {e}");
                session.finish_upload(UploadOutcome::Rejected)?;
                return Err(UploadError::Record(e));
            }
        };

        if ticket.cancel.is_set() {
            log::info!("cancel arrived after record {record_id} was created; keeping it");
        }
        ticker.complete();
        session.finish_upload(UploadOutcome::Persisted)?;
        log::info!("created record {record_id} for {public_url}");

        let artifact = ticket.artifact;
        Ok(PersistedPost {
            record_id,
            public_url,
            storage_name: name,
            owner_id: ticket.owner_id,
            caption: ticket.caption,
            preset: artifact.preset,
            width: artifact.width,
            height: artifact.height,
            size_bytes: artifact.bytes.len(),
            digest: artifact.digest,
            created_at: Utc::now(),
        })
    }
}

/// Synthetic progress: `step` every `interval`, holding at `cap`.
struct ProgressTicker {
    sender: Arc<watch::Sender<u8>>,
    handle: JoinHandle<()>,
}

impl ProgressTicker {
    fn start(sender: Arc<watch::Sender<u8>>, settings: &UploadSettings) -> Self {
        let tx = Arc::clone(&sender);
        let step = settings.progress_step;
        let cap = settings.progress_cap.min(99);
        let every = settings.progress_interval;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // First tick is immediate
            interval.tick().await;
            loop {
                interval.tick().await;
                tx.send_if_modified(|p| {
                    if *p >= cap {
                        return false;
                    }
                    *p = p.saturating_add(step).min(cap);
                    true
                });
            }
        });
        Self { sender, handle }
    }

    fn complete(&self) {
        self.handle.abort();
        self.sender.send_replace(100);
    }

    fn reset(&self) {
        self.handle.abort();
        self.sender.send_replace(0);
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
