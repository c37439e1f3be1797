//! Live crop rendering for the editor.
//!
//! Every viewport or preset change asks for a new crop. Requests are
//! debounced, rendered on the blocking pool, and committed into an
//! [`ArtifactSlot`]. Renders can finish out of order, so each request carries
//! a generation number taken from the slot: only a render whose generation is
//! still the latest may replace the current artifact. Anything older is
//! dropped on arrival, which also releases its preview URL.

use crate::artifact::{ArtifactView, CroppedArtifact, PreviewRegistry, SourceImage};
use crate::imaging::{CropOptions, ImageBackend, SourceRect, plan_crop, render_crop};
use crate::timing::Debouncer;
use crate::types::AspectPreset;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CropError {
    #[error("Crop render failed: {0}")]
    Render(String),
    #[error("Crop rendering was abandoned")]
    Abandoned,
}

/// Everything needed to render one crop.
#[derive(Debug, Clone)]
pub struct CropRequest {
    pub generation: u64,
    pub source: Arc<SourceImage>,
    pub rect: SourceRect,
    pub preset: AspectPreset,
}

#[derive(Debug, Default)]
struct SlotState {
    /// Generation of the newest request.
    latest: u64,
    artifact: Option<CroppedArtifact>,
    /// Latest generation whose render failed, with the message.
    failure: Option<(u64, String)>,
}

/// Holds the current artifact and arbitrates between competing renders.
#[derive(Debug)]
pub struct ArtifactSlot {
    state: Mutex<SlotState>,
    settled: watch::Sender<u64>,
}

impl Default for ArtifactSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactSlot {
    pub fn new() -> Self {
        let (settled, _) = watch::channel(0);
        Self {
            state: Mutex::new(SlotState::default()),
            settled,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new request; older in-flight renders become stale.
    pub fn begin(&self) -> u64 {
        let mut state = self.lock();
        state.latest += 1;
        state.latest
    }

    pub fn latest(&self) -> u64 {
        self.lock().latest
    }

    /// Store `artifact` if it belongs to the latest request.
    ///
    /// Returns false (and drops the artifact) when it is stale.
    pub fn commit(&self, artifact: CroppedArtifact) -> bool {
        let generation = artifact.generation;
        {
            let mut state = self.lock();
            if generation != state.latest {
                return false;
            }
            // Replacing drops the previous artifact and releases its preview
            state.artifact = Some(artifact);
            state.failure = None;
        }
        self.settled.send_replace(generation);
        true
    }

    /// Record a failed render for the latest request. Stale failures are ignored.
    pub fn fail(&self, generation: u64, message: impl Into<String>) -> bool {
        {
            let mut state = self.lock();
            if generation != state.latest {
                return false;
            }
            state.failure = Some((generation, message.into()));
        }
        self.settled.send_replace(generation);
        true
    }

    /// Mark the latest request settled without a result.
    pub fn abandon(&self) {
        let latest = self.lock().latest;
        self.settled.send_replace(latest);
    }

    /// Drop the current artifact and invalidate every in-flight render.
    pub fn clear(&self) {
        let latest = {
            let mut state = self.lock();
            state.latest += 1;
            state.artifact = None;
            state.failure = None;
            state.latest
        };
        self.settled.send_replace(latest);
    }

    /// The artifact, only if it answers the latest request.
    pub fn current(&self) -> Option<ArtifactView> {
        let state = self.lock();
        state
            .artifact
            .as_ref()
            .filter(|a| a.generation == state.latest)
            .map(CroppedArtifact::view)
    }

    /// The most recent artifact, even if a newer request is pending.
    pub fn last_committed(&self) -> Option<ArtifactView> {
        self.lock().artifact.as_ref().map(CroppedArtifact::view)
    }

    /// Failure message for the latest request, if its render failed.
    pub fn failure(&self) -> Option<String> {
        let state = self.lock();
        state
            .failure
            .as_ref()
            .filter(|(generation, _)| *generation == state.latest)
            .map(|(_, message)| message.clone())
    }

    /// True when the latest request has a result (artifact or failure).
    pub fn is_settled(&self) -> bool {
        *self.settled.borrow() >= self.latest()
    }

    /// Wait until the latest request has a result.
    ///
    /// Requests made while waiting are waited for too. Returns `Ok` when an
    /// artifact for the latest request is available, or when nothing was
    /// ever requested.
    pub async fn settle(&self) -> Result<(), CropError> {
        let mut rx = self.settled.subscribe();
        loop {
            let target = self.latest();
            if target == 0 {
                return Ok(());
            }
            rx.wait_for(|settled| *settled >= target)
                .await
                .map_err(|_| CropError::Abandoned)?;
            if self.latest() != target {
                continue;
            }
            if self.current().is_some() {
                return Ok(());
            }
            return match self.failure() {
                Some(message) => Err(CropError::Render(message)),
                None => Err(CropError::Abandoned),
            };
        }
    }
}

/// Debounced, out-of-order-safe crop renderer bound to one slot.
pub struct LiveCropper<B: ImageBackend + 'static> {
    backend: Arc<B>,
    slot: Arc<ArtifactSlot>,
    previews: PreviewRegistry,
    options: CropOptions,
    debouncer: Debouncer,
}

impl<B: ImageBackend + 'static> LiveCropper<B> {
    pub fn new(
        backend: Arc<B>,
        slot: Arc<ArtifactSlot>,
        previews: PreviewRegistry,
        options: CropOptions,
        debounce: Duration,
    ) -> Self {
        Self {
            backend,
            slot,
            previews,
            options,
            debouncer: Debouncer::new(debounce),
        }
    }

    pub fn slot(&self) -> &Arc<ArtifactSlot> {
        &self.slot
    }

    /// Queue `request`; renders after the debounce delay unless superseded first.
    pub fn schedule(&self, request: CropRequest) {
        let backend = Arc::clone(&self.backend);
        let slot = Arc::clone(&self.slot);
        let previews = self.previews.clone();
        let options = self.options;
        self.debouncer.call(move || async move {
            render_and_commit(backend, slot, previews, options, request).await;
        });
    }

    /// Render immediately, skipping the debounce.
    pub async fn render_now(&self, request: CropRequest) -> Result<(), CropError> {
        self.debouncer.cancel();
        let generation = request.generation;
        render_and_commit(
            Arc::clone(&self.backend),
            Arc::clone(&self.slot),
            self.previews.clone(),
            self.options,
            request,
        )
        .await;
        match self.slot.failure() {
            Some(message) if self.slot.latest() == generation => Err(CropError::Render(message)),
            _ => Ok(()),
        }
    }

    /// Stop any waiting render and release waiters.
    pub fn cancel(&self) {
        self.debouncer.cancel();
        self.slot.abandon();
    }
}

async fn render_and_commit<B: ImageBackend + 'static>(
    backend: Arc<B>,
    slot: Arc<ArtifactSlot>,
    previews: PreviewRegistry,
    options: CropOptions,
    request: CropRequest,
) {
    let CropRequest {
        generation,
        source,
        rect,
        preset,
    } = request;

    if generation != slot.latest() {
        log::debug!("skipping stale crop request {generation}");
        return;
    }

    let params = plan_crop(rect, &preset.spec(), &options);
    let bytes = Arc::clone(&source.bytes);
    let rendered =
        tokio::task::spawn_blocking(move || render_crop(backend.as_ref(), &bytes, &params)).await;

    match rendered {
        Ok(Ok(jpeg)) => {
            let artifact = CroppedArtifact::new(generation, preset, jpeg, &previews);
            let digest = artifact.digest.clone();
            if slot.commit(artifact) {
                log::debug!("committed crop {generation} ({preset}, {})", &digest[..12]);
            } else {
                log::debug!("discarded stale crop {generation}");
            }
        }
        Ok(Err(e)) => {
            log::warn!("crop {generation} failed: {e}");
            slot.fail(generation, e.to_string());
        }
        Err(e) => {
            log::error!("crop worker {generation} did not finish: {e}");
            slot.fail(generation, e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Dimensions;
    use crate::imaging::backend::tests::MockBackend;

    fn source() -> Arc<SourceImage> {
        Arc::new(SourceImage::new(
            "photo.jpg",
            Arc::new(vec![1, 2, 3]),
            Dimensions {
                width: 2000,
                height: 1000,
            },
        ))
    }

    fn request(slot: &ArtifactSlot, x: f64) -> CropRequest {
        CropRequest {
            generation: slot.begin(),
            source: source(),
            rect: SourceRect {
                x,
                y: 0.0,
                width: 1000.0,
                height: 1000.0,
            },
            preset: AspectPreset::Square,
        }
    }

    fn cropper(backend: Arc<MockBackend>, previews: &PreviewRegistry) -> LiveCropper<MockBackend> {
        LiveCropper::new(
            backend,
            Arc::new(ArtifactSlot::new()),
            previews.clone(),
            CropOptions::default(),
            Duration::from_millis(100),
        )
    }

    // =========================================================================
    // ArtifactSlot
    // =========================================================================

    #[test]
    fn stale_commit_is_rejected() {
        let previews = PreviewRegistry::new();
        let slot = ArtifactSlot::new();
        let old = slot.begin();
        let new = slot.begin();

        assert!(slot.commit(CroppedArtifact::new(new, AspectPreset::Square, vec![2], &previews)));
        assert!(!slot.commit(CroppedArtifact::new(old, AspectPreset::Square, vec![1], &previews)));

        let current = slot.current().unwrap();
        assert_eq!(current.generation, new);
        assert_eq!(current.bytes.as_slice(), &[2]);
        assert_eq!(previews.live(), 1);
    }

    #[test]
    fn pending_request_hides_previous_artifact() {
        let previews = PreviewRegistry::new();
        let slot = ArtifactSlot::new();
        let first = slot.begin();
        slot.commit(CroppedArtifact::new(first, AspectPreset::Square, vec![1], &previews));
        assert!(slot.current().is_some());

        slot.begin();
        assert!(slot.current().is_none());
        assert_eq!(slot.last_committed().unwrap().generation, first);
        assert!(!slot.is_settled());
    }

    #[test]
    fn stale_failure_is_ignored() {
        let slot = ArtifactSlot::new();
        let old = slot.begin();
        slot.begin();
        assert!(!slot.fail(old, "boom"));
        assert!(slot.failure().is_none());
    }

    #[test]
    fn clear_releases_artifact_preview() {
        let previews = PreviewRegistry::new();
        let slot = ArtifactSlot::new();
        let generation = slot.begin();
        slot.commit(CroppedArtifact::new(generation, AspectPreset::Square, vec![1], &previews));
        assert_eq!(previews.live(), 1);

        slot.clear();
        assert_eq!(previews.live(), 0);
        assert!(slot.last_committed().is_none());
        assert!(slot.is_settled());
    }

    #[tokio::test]
    async fn settle_with_nothing_requested_returns_immediately() {
        let slot = ArtifactSlot::new();
        assert_eq!(slot.settle().await, Ok(()));
    }

    #[tokio::test]
    async fn settle_reports_latest_failure() {
        let slot = ArtifactSlot::new();
        let generation = slot.begin();
        slot.fail(generation, "tainted canvas");
        assert_eq!(
            slot.settle().await,
            Err(CropError::Render("tainted canvas".into()))
        );
    }

    // =========================================================================
    // LiveCropper
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn burst_of_requests_renders_once() {
        let backend = Arc::new(MockBackend::new());
        let previews = PreviewRegistry::new();
        let cropper = cropper(Arc::clone(&backend), &previews);

        for i in 0..5 {
            cropper.schedule(request(cropper.slot(), i as f64 * 10.0));
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        cropper.slot().settle().await.unwrap();

        assert_eq!(backend.crop_count(), 1);
        let current = cropper.slot().current().unwrap();
        assert_eq!(current.generation, 5);
        assert_eq!(previews.live(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn each_settled_request_replaces_the_artifact() {
        let backend = Arc::new(MockBackend::new());
        let previews = PreviewRegistry::new();
        let cropper = cropper(Arc::clone(&backend), &previews);

        cropper.schedule(request(cropper.slot(), 0.0));
        cropper.slot().settle().await.unwrap();
        let first = cropper.slot().current().unwrap();

        cropper.schedule(request(cropper.slot(), 500.0));
        cropper.slot().settle().await.unwrap();
        let second = cropper.slot().current().unwrap();

        assert_ne!(first.digest, second.digest);
        assert!(!previews.is_live(&first.preview_url));
        assert!(previews.is_live(&second.preview_url));
        assert_eq!(previews.live(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_render_is_reported_and_keeps_previous() {
        let backend = Arc::new(MockBackend::new());
        let previews = PreviewRegistry::new();
        let cropper = cropper(Arc::clone(&backend), &previews);

        cropper.schedule(request(cropper.slot(), 0.0));
        cropper.slot().settle().await.unwrap();

        *backend.fail_crop.lock().unwrap() = true;
        cropper.schedule(request(cropper.slot(), 10.0));
        let result = cropper.slot().settle().await;

        assert!(matches!(result, Err(CropError::Render(_))));
        assert!(cropper.slot().current().is_none());
        assert_eq!(cropper.slot().last_committed().unwrap().generation, 1);
    }

    #[tokio::test]
    async fn render_now_skips_debounce() {
        let backend = Arc::new(MockBackend::new());
        let previews = PreviewRegistry::new();
        let cropper = cropper(Arc::clone(&backend), &previews);

        cropper.render_now(request(cropper.slot(), 0.0)).await.unwrap();
        assert!(cropper.slot().current().is_some());
        assert_eq!(backend.crop_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_releases_waiters() {
        let backend = Arc::new(MockBackend::new());
        let previews = PreviewRegistry::new();
        let cropper = cropper(Arc::clone(&backend), &previews);

        cropper.schedule(request(cropper.slot(), 0.0));
        cropper.cancel();
        assert_eq!(cropper.slot().settle().await, Err(CropError::Abandoned));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(backend.crop_count(), 0);
    }
}
