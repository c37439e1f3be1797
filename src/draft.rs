//! Draft persistence for an unfinished upload.
//!
//! A [`SessionSnapshot`] is the recoverable part of a session: caption,
//! preset, viewport, the name of the chosen file and the phase it was in.
//! Binary data (the image, its crops, preview URLs) is never part of a
//! snapshot; after a restore the user picks the file again and the saved
//! viewport is applied once it has loaded.
//!
//! Snapshots live in one JSON file per owner under the store's directory:
//! `<dir>/<owner>.json`.

use crate::naming::sanitize_segment;
use crate::session::{Phase, SessionError, UploadSession};
use crate::types::AspectPreset;
use crate::viewport::ViewportState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

/// Bumped when the snapshot layout changes incompatibly.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid draft file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Missing or invalid owner id: {0:?}")]
    InvalidOwner(String),
    #[error("Draft version {found} is not supported (expected {SNAPSHOT_VERSION})")]
    UnsupportedVersion { found: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub owner_id: String,
    pub session_id: String,
    pub phase: Phase,
    pub file_name: Option<String>,
    pub preset: AspectPreset,
    pub viewport: ViewportState,
    pub caption: String,
    pub saved_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn capture(session: &UploadSession) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            owner_id: session.owner_id().to_string(),
            session_id: session.id().to_string(),
            phase: session.phase(),
            file_name: session.file_name().map(str::to_string),
            preset: session.preset(),
            viewport: session.viewport().state(),
            caption: session.caption().to_string(),
            saved_at: Utc::now(),
        }
    }

    /// Apply the caption and preset to a fresh session.
    ///
    /// Returns the viewport to restore once the image is loaded again.
    pub fn apply_to(&self, session: &mut UploadSession) -> Result<ViewportState, SessionError> {
        session.set_caption(self.caption.clone());
        session.set_preset(self.preset)?;
        Ok(self.viewport)
    }
}

pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, owner_id: &str) -> Result<PathBuf, SnapshotError> {
        let segment = sanitize_segment(owner_id)
            .ok_or_else(|| SnapshotError::InvalidOwner(owner_id.to_string()))?;
        Ok(self.dir.join(format!("{segment}.json")))
    }

    pub async fn save(&self, snapshot: &SessionSnapshot) -> Result<PathBuf, SnapshotError> {
        let path = self.path_for(&snapshot.owner_id)?;
        fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        log::debug!("saved draft for {} ({})", snapshot.owner_id, snapshot.phase);
        Ok(path)
    }

    pub async fn load(&self, owner_id: &str) -> Result<Option<SessionSnapshot>, SnapshotError> {
        let path = self.path_for(owner_id)?;
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: SessionSnapshot = serde_json::from_str(&text)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: snapshot.version,
            });
        }
        Ok(Some(snapshot))
    }

    /// Remove the owner's draft. Returns true if one existed.
    pub async fn clear(&self, owner_id: &str) -> Result<bool, SnapshotError> {
        let path = self.path_for(owner_id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
