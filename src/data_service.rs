//! The hosted backend, as seen by the upload pipeline.
//!
//! Only two calls matter here: store bytes under a generated name and get a
//! public URL back, then create a record pointing at that URL. [`DataService`]
//! is the seam; [`LocalDataService`] implements it on the local filesystem so
//! the CLI and integration tests can run the whole pipeline offline:
//!
//! ```text
//! <root>/
//! ├── storage/
//! │   └── alice/1767225600000-6f1c….jpg    ← upload_binary
//! └── records.json                         ← create_record (JSON array)
//! ```
//!
//! Public URLs are `/storage/<name>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

pub const PUBLIC_PREFIX: &str = "/storage/";

#[derive(Error, Debug)]
pub enum DataServiceError {
    #[error("Object already exists: {0}")]
    Collision(String),
    #[error("Invalid object name: {0}")]
    InvalidName(String),
    #[error("Storage quota exceeded ({size} bytes > {limit} bytes)")]
    QuotaExceeded { size: usize, limit: usize },
    #[error("Not authorized: {0}")]
    Unauthorized(String),
    #[error("Invalid record: {0}")]
    Validation(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Record store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub type ServiceResult<T> = Result<T, DataServiceError>;

#[async_trait]
pub trait DataService: Send + Sync {
    /// Store `bytes` under `name`; returns the public URL.
    async fn upload_binary(&self, bytes: &[u8], name: &str) -> ServiceResult<String>;

    /// Insert a post record; returns its id.
    async fn create_record(
        &self,
        owner_id: &str,
        public_url: &str,
        caption: &str,
    ) -> ServiceResult<String>;
}

/// One row of `records.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    pub owner_id: String,
    pub public_url: String,
    pub caption: String,
    pub created_at: DateTime<Utc>,
}

pub struct LocalDataService {
    root: PathBuf,
    max_object_bytes: Option<usize>,
    records: Mutex<()>,
}

impl LocalDataService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_object_bytes: None,
            records: Mutex::new(()),
        }
    }

    /// Reject uploads larger than `limit` bytes.
    pub fn with_quota(mut self, limit: usize) -> Self {
        self.max_object_bytes = Some(limit);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.root.join("storage")
    }

    fn records_path(&self) -> PathBuf {
        self.root.join("records.json")
    }

    /// Map an object name to a path inside the storage directory.
    fn validate_name(&self, name: &str) -> ServiceResult<PathBuf> {
        let clean = name.trim_start_matches('/');
        if clean.is_empty() {
            return Err(DataServiceError::InvalidName(name.to_string()));
        }
        if clean
            .split(['/', '\\'])
            .any(|seg| seg.is_empty() || seg == "." || seg == "..")
        {
            return Err(DataServiceError::InvalidName(format!(
                "{name} contains invalid segments"
            )));
        }
        Ok(self.storage_dir().join(clean))
    }

    /// Resolve a public URL back to the stored file.
    fn object_for_url(&self, public_url: &str) -> ServiceResult<PathBuf> {
        let name = public_url.strip_prefix(PUBLIC_PREFIX).ok_or_else(|| {
            DataServiceError::Validation(format!("not a storage URL: {public_url}"))
        })?;
        self.validate_name(name)
            .map_err(|_| DataServiceError::Validation(format!("bad storage URL: {public_url}")))
    }

    /// All records, oldest first.
    pub async fn records(&self) -> ServiceResult<Vec<StoredRecord>> {
        let _guard = self.records.lock().await;
        self.read_records().await
    }

    async fn read_records(&self) -> ServiceResult<Vec<StoredRecord>> {
        match fs::read_to_string(self.records_path()).await {
            Ok(text) if text.trim().is_empty() => Ok(Vec::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_records(&self, records: &[StoredRecord]) -> ServiceResult<()> {
        fs::create_dir_all(&self.root).await?;
        let json = serde_json::to_string_pretty(records)?;
        let tmp = self.root.join("records.json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, self.records_path()).await?;
        Ok(())
    }
}

/// Write `bytes` to a freshly created object; on failure remove `path` so no
/// partial object is left under its name.
async fn write_or_discard<W>(writer: &mut W, bytes: &[u8], path: &Path) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        writer.write_all(bytes).await?;
        writer.flush().await
    }
    .await;
    if let Err(e) = &written {
        log::warn!("writing {} failed, removing it: {}", path.display(), e);
        if let Err(cleanup) = fs::remove_file(path).await {
            log::warn!("could not remove {}: {}", path.display(), cleanup);
        }
    }
    written
}

#[async_trait]
impl DataService for LocalDataService {
    async fn upload_binary(&self, bytes: &[u8], name: &str) -> ServiceResult<String> {
        let path = self.validate_name(name)?;
        if let Some(limit) = self.max_object_bytes {
            if bytes.len() > limit {
                return Err(DataServiceError::QuotaExceeded {
                    size: bytes.len(),
                    limit,
                });
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(DataServiceError::Collision(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        write_or_discard(&mut file, bytes, &path).await?;

        let url = format!("{PUBLIC_PREFIX}{}", name.trim_start_matches('/'));
        log::debug!("stored {} bytes at {}", bytes.len(), path.display());
        Ok(url)
    }

    async fn create_record(
        &self,
        owner_id: &str,
        public_url: &str,
        caption: &str,
    ) -> ServiceResult<String> {
        if owner_id.trim().is_empty() {
            return Err(DataServiceError::Unauthorized("missing owner".into()));
        }
        let object = self.object_for_url(public_url)?;
        if fs::metadata(&object).await.is_err() {
            return Err(DataServiceError::Validation(format!(
                "{public_url} does not reference a stored object"
            )));
        }

        let _guard = self.records.lock().await;
        let mut records = self.read_records().await?;
        let record = StoredRecord {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            public_url: public_url.to_string(),
            caption: caption.to_string(),
            created_at: Utc::now(),
        };
        let id = record.id.clone();
        records.push(record);
        self.write_records(&records).await?;
        log::debug!("created record {id} for {owner_id}");
        Ok(id)
    }
}
