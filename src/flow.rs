//! The upload flow: one dispatcher wiring a session to its workers.
//!
//! [`UploadFlow`] owns the [`UploadSession`] and the machinery around it:
//!
//! | Input | Work |
//! |---|---|
//! | `choose_file` | compress (blocking pool) → identify → first crop |
//! | viewport / preset changes | debounced crop via [`LiveCropper`] |
//! | `settle` | wait for the latest crop, sync the phase, checkpoint the draft |
//! | `submit` | [`UploadOrchestrator`] |
//! | any of the above | restart the idle timer |
//!
//! Every input goes through this type, so timers, drafts and crops are all
//! driven from one place rather than observed from the side.

use crate::artifact::{ArtifactView, PreviewRegistry, SourceImage};
use crate::config::VaultConfig;
use crate::cropper::{CropError, CropRequest, LiveCropper};
use crate::data_service::DataService;
use crate::draft::{SessionSnapshot, SnapshotError, SnapshotStore};
use crate::imaging::{
    CompressOutcome, CompressStatus, CompressionProfile, CropOptions, ImageBackend,
    compress_if_needed,
};
use crate::session::{CancelFlag, Phase, SessionError, UploadSession};
use crate::timing::IdleTimer;
use crate::types::AspectPreset;
use crate::upload::{PersistedPost, UploadError, UploadOrchestrator, UploadSettings};
use crate::viewport::ViewportState;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Crop(#[from] CropError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Draft(#[from] SnapshotError),
}

/// Knobs for one flow, usually derived from [`VaultConfig`].
#[derive(Debug, Clone)]
pub struct FlowOptions {
    pub post_profile: CompressionProfile,
    pub avatar_profile: CompressionProfile,
    pub crop: CropOptions,
    pub max_zoom: f64,
    pub debounce: Duration,
    pub upload: UploadSettings,
    pub idle_timeout: Option<Duration>,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self::from_config(&VaultConfig::default())
    }
}

impl FlowOptions {
    pub fn from_config(config: &VaultConfig) -> Self {
        Self {
            post_profile: config.compression.post.profile(),
            avatar_profile: config.compression.avatar.profile(),
            crop: config.crop.options(),
            max_zoom: config.crop.max_zoom,
            debounce: config.crop.debounce(),
            upload: config.upload.settings(),
            idle_timeout: config.session.idle_timeout(),
        }
    }

    /// Profile pictures get the smaller avatar budget.
    pub fn profile_for(&self, preset: AspectPreset) -> &CompressionProfile {
        if preset.spec().circular {
            &self.avatar_profile
        } else {
            &self.post_profile
        }
    }
}

pub struct UploadFlow<B: ImageBackend + 'static, D: DataService> {
    backend: Arc<B>,
    cropper: LiveCropper<B>,
    uploader: UploadOrchestrator<D>,
    previews: PreviewRegistry,
    options: FlowOptions,
    session: UploadSession,
    drafts: Option<SnapshotStore>,
    pending_viewport: Option<ViewportState>,
    idle: Option<IdleTimer>,
    idle_prompt: Arc<watch::Sender<bool>>,
}

impl<B: ImageBackend + 'static, D: DataService> UploadFlow<B, D> {
    /// Open a session for `owner_id`. Must be called inside a tokio runtime.
    pub fn open(
        backend: Arc<B>,
        service: Arc<D>,
        owner_id: &str,
        preset: AspectPreset,
        options: FlowOptions,
    ) -> Result<Self, FlowError> {
        let session = UploadSession::open(owner_id, preset, options.max_zoom)?;
        let previews = PreviewRegistry::new();
        let cropper = LiveCropper::new(
            Arc::clone(&backend),
            Arc::clone(session.slot()),
            previews.clone(),
            options.crop,
            options.debounce,
        );
        let (idle_prompt, _) = watch::channel(false);
        let idle_prompt = Arc::new(idle_prompt);
        let idle = options.idle_timeout.map(|timeout| {
            let tx = Arc::clone(&idle_prompt);
            let id = session.id();
            IdleTimer::new(timeout, move || {
                log::info!("session {id} idle, prompting");
                tx.send_replace(true);
            })
        });

        let flow = Self {
            backend,
            cropper,
            uploader: UploadOrchestrator::new(service, options.upload),
            previews,
            options,
            session,
            drafts: None,
            pending_viewport: None,
            idle,
            idle_prompt,
        };
        flow.touch();
        Ok(flow)
    }

    /// Persist drafts for this owner in `store`.
    pub fn with_drafts(mut self, store: SnapshotStore) -> Self {
        self.drafts = Some(store);
        self
    }

    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    pub fn uploader(&self) -> &UploadOrchestrator<D> {
        &self.uploader
    }

    pub fn cancel_handle(&self) -> CancelFlag {
        self.session.cancel_flag()
    }

    /// Flips to true when the user has been inactive for the idle timeout.
    pub fn idle_prompt(&self) -> watch::Receiver<bool> {
        self.idle_prompt.subscribe()
    }

    fn touch(&self) {
        self.idle_prompt.send_if_modified(|prompting| std::mem::take(prompting));
        if let Some(idle) = &self.idle {
            idle.touch();
        }
    }

    fn schedule(&self, request: Option<CropRequest>) {
        if let Some(request) = request {
            self.cropper.schedule(request);
        }
    }

    // =========================================================================
    // Drafts
    // =========================================================================

    /// Load the owner's saved draft, if any, into this session.
    ///
    /// Caption and preset apply at once; the viewport applies after the next
    /// file loads.
    pub async fn resume_draft(&mut self) -> Result<Option<SessionSnapshot>, FlowError> {
        let Some(store) = &self.drafts else {
            return Ok(None);
        };
        let Some(snapshot) = store.load(self.session.owner_id()).await? else {
            return Ok(None);
        };
        self.pending_viewport = Some(snapshot.apply_to(&mut self.session)?);
        log::info!(
            "resumed draft from {} ({})",
            snapshot.saved_at.format("%Y-%m-%d %H:%M:%S"),
            snapshot.file_name.as_deref().unwrap_or("no file")
        );
        Ok(Some(snapshot))
    }

    /// Save a snapshot. Draft failures are logged, never fatal.
    async fn checkpoint(&self) {
        let Some(store) = &self.drafts else {
            return;
        };
        if let Err(e) = store.save(&SessionSnapshot::capture(&self.session)).await {
            log::warn!("could not save draft: {e}");
        }
    }

    async fn discard_draft(&self) {
        let Some(store) = &self.drafts else {
            return;
        };
        if let Err(e) = store.clear(self.session.owner_id()).await {
            log::warn!("could not remove draft: {e}");
        }
    }

    // =========================================================================
    // Inputs
    // =========================================================================

    /// Select a file: compress it if needed, read its size, start cropping.
    pub async fn choose_file(
        &mut self,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<CompressStatus, FlowError> {
        self.touch();
        self.session.choose_file(name)?;

        let backend = Arc::clone(&self.backend);
        let profile = *self.options.profile_for(self.session.preset());
        let file_name = name.to_string();
        let original = Arc::new(bytes);
        let fallback = Arc::clone(&original);
        let compressed = tokio::task::spawn_blocking(move || {
            compress_if_needed(backend.as_ref(), &file_name, original, &profile)
        })
        .await;
        let outcome = match compressed {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("compression of {name} crashed, using original: {e}");
                CompressOutcome {
                    bytes: fallback,
                    status: CompressStatus::FellBack,
                }
            }
        };

        let backend = Arc::clone(&self.backend);
        let loaded = Arc::clone(&outcome.bytes);
        let identified = tokio::task::spawn_blocking(move || backend.identify(&loaded)).await;
        let dimensions = match identified {
            Ok(Ok(d)) => d,
            Ok(Err(e)) => return Err(self.reject_source(name, &e.to_string())),
            Err(e) => {
                let reason = format!("decoder crashed: {e}");
                return Err(self.reject_source(name, &reason));
            }
        };

        let source =
            SourceImage::new(name, outcome.bytes, dimensions).with_preview(&self.previews);
        let mut request = self.session.source_loaded(source)?;
        if let Some(saved) = self.pending_viewport.take() {
            if let Some(restored) = self.session.restore_viewport(saved)? {
                request = restored;
            }
        }
        self.cropper.schedule(request);
        self.checkpoint().await;
        Ok(outcome.status)
    }

    pub fn set_preset(&mut self, preset: AspectPreset) -> Result<(), FlowError> {
        self.touch();
        let request = self.session.set_preset(preset)?;
        self.schedule(request);
        Ok(())
    }

    pub fn set_zoom(&mut self, zoom: f64) -> Result<(), FlowError> {
        self.touch();
        let request = self.session.set_zoom(zoom)?;
        self.schedule(request);
        Ok(())
    }

    pub fn zoom_by_wheel(&mut self, delta_y: f64) -> Result<(), FlowError> {
        self.touch();
        let request = self.session.zoom_by_wheel(delta_y)?;
        self.schedule(request);
        Ok(())
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) -> Result<(), FlowError> {
        self.touch();
        let request = self.session.pan_by(dx, dy)?;
        self.schedule(request);
        Ok(())
    }

    pub fn set_offset(&mut self, x: f64, y: f64) -> Result<(), FlowError> {
        self.touch();
        let request = self.session.set_offset(x, y)?;
        self.schedule(request);
        Ok(())
    }

    pub fn set_caption(&mut self, caption: impl Into<String>) {
        self.touch();
        self.session.set_caption(caption);
    }

    /// Wait for the latest crop and return it.
    pub async fn settle(&mut self) -> Result<Option<ArtifactView>, FlowError> {
        let slot = Arc::clone(self.session.slot());
        let result = slot.settle().await;
        self.session.crop_settled(&result)?;
        result?;
        self.checkpoint().await;
        Ok(self.session.artifact())
    }

    /// Upload the current crop. Waits for a pending crop first.
    pub async fn submit(&mut self) -> Result<PersistedPost, FlowError> {
        self.touch();
        if self.session.phase() == Phase::Cropping {
            self.settle().await?;
        }
        match self.uploader.submit(&mut self.session).await {
            Ok(post) => {
                self.stop_idle();
                self.discard_draft().await;
                Ok(post)
            }
            Err(e) => {
                match self.session.phase() {
                    Phase::Failed => self.checkpoint().await,
                    Phase::Cancelled => {
                        self.stop_idle();
                        self.discard_draft().await;
                    }
                    _ => {}
                }
                Err(e.into())
            }
        }
    }

    /// Abandon the session. During an upload this only raises the flag.
    pub async fn cancel(&mut self) -> Result<Phase, FlowError> {
        self.cropper.cancel();
        let phase = self.session.cancel()?;
        if phase == Phase::Cancelled {
            self.stop_idle();
            self.discard_draft().await;
        }
        Ok(phase)
    }

    /// Back to `selecting` so another file can be chosen.
    fn reject_source(&mut self, name: &str, reason: &str) -> FlowError {
        log::warn!("rejecting {name}: {reason}");
        match self.session.source_rejected(reason) {
            Ok(err) => SessionError::Validation(err).into(),
            Err(e) => e.into(),
        }
    }

    fn stop_idle(&self) {
        if let Some(idle) = &self.idle {
            idle.cancel();
        }
    }
}

impl<B: ImageBackend + 'static, D: DataService> Drop for UploadFlow<B, D> {
    fn drop(&mut self) {
        self.cropper.cancel();
        self.stop_idle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_service::tests::MockDataService;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use tempfile::TempDir;

    type TestFlow = UploadFlow<MockBackend, MockDataService>;

    fn open_with(backend: MockBackend, preset: AspectPreset, options: FlowOptions) -> TestFlow {
        UploadFlow::open(
            Arc::new(backend),
            Arc::new(MockDataService::new()),
            "alice",
            preset,
            options,
        )
        .unwrap()
    }

    fn open(backend: MockBackend) -> TestFlow {
        open_with(backend, AspectPreset::Square, FlowOptions::default())
    }

    #[tokio::test(start_paused = true)]
    async fn full_flow_persists_post() {
        let mut flow = open(MockBackend::with_dimensions(4000, 3000));

        let status = flow.choose_file("beach.jpg", vec![0; 2048]).await.unwrap();
        assert_eq!(status, CompressStatus::UnderThreshold);
        flow.set_zoom(1.5).unwrap();
        flow.pan_by(10.0, 0.0).unwrap();
        let artifact = flow.settle().await.unwrap().unwrap();
        assert_eq!((artifact.width, artifact.height), (1080, 1080));
        assert_eq!(flow.session().phase(), Phase::ReadyToSubmit);

        flow.set_caption("tide pools");
        let post = flow.submit().await.unwrap();
        assert_eq!(post.caption, "tide pools");
        assert_eq!(post.digest, artifact.digest);
        assert_eq!(flow.session().phase(), Phase::Done);
        assert_eq!(flow.previews().live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn gesture_burst_renders_once() {
        let backend = Arc::new(MockBackend::with_dimensions(4000, 3000));
        let mut flow: TestFlow = UploadFlow::open(
            Arc::clone(&backend),
            Arc::new(MockDataService::new()),
            "alice",
            AspectPreset::Square,
            FlowOptions::default(),
        )
        .unwrap();

        flow.choose_file("a.jpg", vec![0; 10]).await.unwrap();
        for _ in 0..10 {
            flow.pan_by(1.0, 0.0).unwrap();
            flow.zoom_by_wheel(-1.0).unwrap();
        }
        flow.settle().await.unwrap();
        assert_eq!(backend.crop_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn profile_preset_uses_avatar_compression() {
        let backend = Arc::new(MockBackend::with_dimensions(4000, 3000).resize_to(1000));
        let mut flow: TestFlow = UploadFlow::open(
            Arc::clone(&backend),
            Arc::new(MockDataService::new()),
            "alice",
            AspectPreset::Profile,
            FlowOptions::default(),
        )
        .unwrap();

        let status = flow
            .choose_file("me.jpg", vec![0; 1_200_000])
            .await
            .unwrap();
        assert!(matches!(status, CompressStatus::Compressed { .. }));
        assert!(backend.get_operations().contains(&RecordedOp::Resize {
            input_len: 1_200_000,
            width: 800,
            height: 600,
            quality: 85,
        }));

        flow.settle().await.unwrap();
        let circle = backend
            .get_operations()
            .iter()
            .any(|op| matches!(op, RecordedOp::Crop { circle: true, .. }));
        assert!(circle);
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_file_is_rejected() {
        let mut flow = open(MockBackend::new());
        let err = flow.choose_file("bad.jpg", vec![1, 2, 3]).await.unwrap_err();
        assert!(matches!(
            err,
            FlowError::Session(SessionError::Validation(
                crate::session::ValidationError::UnreadableImage(_)
            ))
        ));
        assert_eq!(flow.session().phase(), Phase::Selecting);
        assert_eq!(flow.previews().live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn compressor_crash_falls_back_to_original() {
        let mut flow = open(MockBackend::with_dimensions(4000, 3000).panicking_resize());

        let status = flow
            .choose_file("big.jpg", vec![0; 3_000_000])
            .await
            .unwrap();
        assert_eq!(status, CompressStatus::FellBack);
        assert_eq!(flow.session().source().unwrap().len(), 3_000_000);

        flow.set_caption("still works");
        let post = flow.submit().await.unwrap();
        assert_eq!(post.caption, "still works");
        assert_eq!(flow.session().phase(), Phase::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn compressor_crash_on_unreadable_file_allows_another_pick() {
        let mut flow = open(MockBackend::new().panicking_resize());

        for _ in 0..2 {
            let err = flow
                .choose_file("big.jpg", vec![0; 3_000_000])
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                FlowError::Session(SessionError::Validation(
                    crate::session::ValidationError::UnreadableImage(_)
                ))
            ));
            assert_eq!(flow.session().phase(), Phase::Selecting);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn crop_failure_blocks_submit() {
        let mut flow = open(MockBackend::with_dimensions(800, 800).failing_crop());
        flow.choose_file("a.jpg", vec![0; 10]).await.unwrap();
        flow.set_caption("hello");

        let err = flow.submit().await.unwrap_err();
        assert!(matches!(err, FlowError::Crop(CropError::Render(_))));
        assert_eq!(flow.session().phase(), Phase::ReadyToCrop);
        assert!(flow.uploader().service().get_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_releases_everything() {
        let mut flow = open(MockBackend::with_dimensions(4000, 3000));
        flow.choose_file("a.jpg", vec![0; 10]).await.unwrap();
        flow.settle().await.unwrap();
        assert_eq!(flow.previews().live(), 2);

        assert_eq!(flow.cancel().await.unwrap(), Phase::Cancelled);
        assert_eq!(flow.previews().live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_flow_releases_previews() {
        let mut flow = open(MockBackend::with_dimensions(4000, 3000));
        let previews = flow.previews().clone();
        flow.choose_file("a.jpg", vec![0; 10]).await.unwrap();
        flow.settle().await.unwrap();
        flow.set_zoom(2.0).unwrap();
        assert_eq!(previews.live(), 2);

        drop(flow);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(previews.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_prompt_fires_and_resets_on_activity() {
        let options = FlowOptions {
            idle_timeout: Some(Duration::from_secs(60)),
            ..FlowOptions::default()
        };
        let mut flow = open_with(
            MockBackend::with_dimensions(100, 100),
            AspectPreset::Square,
            options,
        );
        let prompt = flow.idle_prompt();

        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;
        assert!(*prompt.borrow());

        flow.set_caption("still here");
        assert!(!*prompt.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn draft_survives_a_new_session() {
        let tmp = TempDir::new().unwrap();

        let mut first = open(MockBackend::with_dimensions(2000, 1000))
            .with_drafts(SnapshotStore::new(tmp.path()));
        first.choose_file("dunes.jpg", vec![0; 10]).await.unwrap();
        first.set_preset(AspectPreset::Portrait).unwrap();
        first.set_zoom(2.0).unwrap();
        first.set_offset(30.0, 0.0).unwrap();
        first.set_caption("windy");
        first.settle().await.unwrap();
        drop(first);

        let mut second = open(MockBackend::with_dimensions(2000, 1000))
            .with_drafts(SnapshotStore::new(tmp.path()));
        let snapshot = second.resume_draft().await.unwrap().unwrap();
        assert_eq!(snapshot.file_name.as_deref(), Some("dunes.jpg"));
        assert_eq!(second.session().caption(), "windy");
        assert_eq!(second.session().preset(), AspectPreset::Portrait);

        second.choose_file("dunes.jpg", vec![0; 10]).await.unwrap();
        let state = second.session().viewport().state();
        assert_eq!(state.zoom, 2.0);
        assert_eq!(state.offset_x, 30.0);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_submit_discards_draft() {
        let tmp = TempDir::new().unwrap();
        let store_dir = tmp.path().to_path_buf();
        let mut flow = open(MockBackend::with_dimensions(500, 500))
            .with_drafts(SnapshotStore::new(&store_dir));
        flow.choose_file("a.jpg", vec![0; 10]).await.unwrap();
        flow.set_caption("x");
        flow.settle().await.unwrap();
        assert!(store_dir.join("alice.json").exists());

        flow.submit().await.unwrap();
        assert!(!store_dir.join("alice.json").exists());
    }
}
