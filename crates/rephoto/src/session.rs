//! Interactive alignment session.
//!
//! The session owns the correspondence store and the two images, forwards every edit to the
//! compute worker and applies the results that are still current. A failed or discarded
//! computation never clears the last valid transform and images.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rephoto_geometry::{
    CorrespondenceId, CorrespondenceStore, Point2, Side, Transform, TransformKind,
};
use rephoto_image::Rgba32F;
use rephoto_imgproc::composite::{composite, CompositeMode};

use crate::config::SessionConfig;
use crate::coordinator::{ComputeCoordinator, ComputeRequest, ComputeResult, ComputeStage};
use crate::error::Error;
use crate::project::Project;

/// Progress of a session through the alignment pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// At least one image is missing.
    Empty,
    /// Both images are present and there are no correspondences yet.
    ImagesLoaded,
    /// Too few point pairs for the selected transform family.
    CorrespondencesInsufficient,
    /// Enough point pairs; a computation is pending.
    CorrespondencesSufficient,
    /// A transform has been fitted.
    TransformComputed,
    /// The modern image has been warped into the reference frame.
    Warped,
    /// The composite for the current generation is available.
    Composited,
}

/// What [`Session::poll`] did with a completed computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// A stage product was current and is now displayed.
    Applied {
        /// Generation of the result.
        generation: u64,
        /// State reached by applying it.
        state: SessionState,
    },
    /// The computation for the current generation failed; see [`Session::last_error`].
    Failed {
        /// Generation of the result.
        generation: u64,
    },
    /// The result was older than the store and was dropped.
    Discarded {
        /// Generation of the result.
        generation: u64,
    },
}

/// An alignment session: store, images, configuration and the latest valid results.
pub struct Session {
    config: SessionConfig,
    store: CorrespondenceStore,
    image_a: Option<Arc<Rgba32F>>,
    image_b: Option<Arc<Rgba32F>>,
    image_a_path: Option<PathBuf>,
    image_b_path: Option<PathBuf>,
    // fitted but not yet warped, committed together with the warped image
    staged_transform: Option<(u64, Arc<Transform>)>,
    transform: Option<Arc<Transform>>,
    warped: Option<Arc<Rgba32F>>,
    composited: Option<Arc<Rgba32F>>,
    last_error: Option<Error>,
    state: SessionState,
    discarded: u64,
    pending: Option<u64>,
    coordinator: ComputeCoordinator,
}

impl Session {
    /// Create an empty session and start its compute worker.
    pub fn new(config: SessionConfig) -> Result<Self, Error> {
        Ok(Self {
            config,
            store: CorrespondenceStore::new(),
            image_a: None,
            image_b: None,
            image_a_path: None,
            image_b_path: None,
            staged_transform: None,
            transform: None,
            warped: None,
            composited: None,
            last_error: None,
            state: SessionState::Empty,
            discarded: 0,
            pending: None,
            coordinator: ComputeCoordinator::spawn()?,
        })
    }

    /// Current configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Read-only view of the correspondences.
    pub fn store(&self) -> &CorrespondenceStore {
        &self.store
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The reference image.
    pub fn image_a(&self) -> Option<&Arc<Rgba32F>> {
        self.image_a.as_ref()
    }

    /// The modern image.
    pub fn image_b(&self) -> Option<&Arc<Rgba32F>> {
        self.image_b.as_ref()
    }

    /// The last successfully fitted transform, possibly from an older generation.
    pub fn transform(&self) -> Option<&Arc<Transform>> {
        self.transform.as_ref()
    }

    /// The last successfully warped image.
    pub fn warped(&self) -> Option<&Arc<Rgba32F>> {
        self.warped.as_ref()
    }

    /// The last composite.
    pub fn composited(&self) -> Option<&Arc<Rgba32F>> {
        self.composited.as_ref()
    }

    /// Error of the latest failed computation, cleared by the next applied result.
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// Paths the images were loaded from, as given to [`Session::load_images`] or as
    /// written in the loaded project.
    pub fn image_paths(&self) -> (Option<&Path>, Option<&Path>) {
        (self.image_a_path.as_deref(), self.image_b_path.as_deref())
    }

    /// Number of stale results dropped so far.
    pub fn discarded_results(&self) -> u64 {
        self.discarded
    }

    /// Replace both images. Previous results are dropped since they belong to other images.
    pub fn set_images(&mut self, image_a: Rgba32F, image_b: Rgba32F) {
        log::info!(
            "images loaded: reference {}, modern {}",
            image_a.size(),
            image_b.size()
        );
        self.image_a = Some(Arc::new(image_a));
        self.image_b = Some(Arc::new(image_b));
        self.image_a_path = None;
        self.image_b_path = None;
        self.staged_transform = None;
        self.transform = None;
        self.warped = None;
        self.composited = None;
        self.last_error = None;
        self.state = SessionState::Empty;
        // results computed for the previous images are now stale
        self.store_changed_without_edit();
    }

    /// Decode both images from disk and load them.
    pub fn load_images(
        &mut self,
        path_a: impl AsRef<Path>,
        path_b: impl AsRef<Path>,
    ) -> Result<(), Error> {
        let (path_a, path_b) = (path_a.as_ref(), path_b.as_ref());
        let image_a = rephoto_io::functional::read_image_rgba32f(path_a)?;
        let image_b = rephoto_io::functional::read_image_rgba32f(path_b)?;
        self.set_images(image_a, image_b);
        self.image_a_path = Some(path_a.to_path_buf());
        self.image_b_path = Some(path_b.to_path_buf());
        Ok(())
    }

    /// Add a point correspondence.
    pub fn add_point(&mut self, a: Point2, b: Point2) -> Result<CorrespondenceId, Error> {
        let id = self.store.add_point(a, b)?;
        self.on_store_changed();
        Ok(id)
    }

    /// Add a directed line correspondence.
    pub fn add_line(
        &mut self,
        a0: Point2,
        a1: Point2,
        b0: Point2,
        b1: Point2,
    ) -> Result<CorrespondenceId, Error> {
        let id = self.store.add_line(a0, a1, b0, b1)?;
        self.on_store_changed();
        Ok(id)
    }

    /// Add a face correspondence, corners TL, TR, BR, BL.
    pub fn add_face(
        &mut self,
        corners_a: &[Point2],
        corners_b: &[Point2],
    ) -> Result<CorrespondenceId, Error> {
        let id = self.store.add_face(corners_a, corners_b)?;
        self.on_store_changed();
        Ok(id)
    }

    /// Move one point of a correspondence.
    pub fn update(
        &mut self,
        id: CorrespondenceId,
        side: Side,
        index: usize,
        coord: Point2,
    ) -> Result<(), Error> {
        self.store.update(id, side, index, coord)?;
        self.on_store_changed();
        Ok(())
    }

    /// Remove a correspondence.
    pub fn remove(&mut self, id: CorrespondenceId) -> Result<(), Error> {
        self.store.remove(id)?;
        self.on_store_changed();
        Ok(())
    }

    /// Remove every correspondence.
    pub fn clear(&mut self) {
        self.store.clear();
        self.on_store_changed();
    }

    /// Change the transform family and recompute.
    pub fn set_transform_kind(&mut self, kind: TransformKind) {
        if self.config.transform_kind != kind {
            self.config.transform_kind = kind;
            self.store_changed_without_edit();
        }
    }

    /// Change the composite mode.
    ///
    /// The composite is re-rendered right away from the last warped image; no solve or warp
    /// is involved.
    pub fn set_composite_mode(&mut self, mode: CompositeMode) -> Result<(), Error> {
        self.config.composite = mode;
        if let Some(composited) = self.render_composite()? {
            self.composited = Some(composited);
        }
        Ok(())
    }

    fn render_composite(&self) -> Result<Option<Arc<Rgba32F>>, Error> {
        match (&self.image_a, &self.warped) {
            (Some(a), Some(warped)) => {
                Ok(Some(Arc::new(composite(a, warped, self.config.composite)?)))
            }
            _ => Ok(None),
        }
    }

    /// Replace the store and settings with the content of a project.
    ///
    /// Images referenced by the project are decoded relative to `base_dir` when both exist;
    /// otherwise the current images are kept.
    pub fn load_project(&mut self, project: Project, base_dir: &Path) -> Result<(), Error> {
        if let (Some(path_a), Some(path_b)) = project.resolved_image_paths(base_dir) {
            if path_a.exists() && path_b.exists() {
                self.load_images(path_a, path_b)?;
            } else {
                log::warn!("project images not found, keeping the current images");
            }
        }
        // keep the paths as written so saving the project gives them back unchanged
        self.image_a_path = project.image_a_path;
        self.image_b_path = project.image_b_path;
        self.config.transform_kind = project.warp_method;
        self.config.solver.tps_smoothing = project.tps_smoothing;

        let previous = self.store.generation();
        self.store = project.store;
        self.store.advance_generation_past(previous);
        self.on_store_changed();
        Ok(())
    }

    /// Snapshot the session as a project.
    pub fn to_project(&self) -> Project {
        Project {
            image_a_path: self.image_a_path.clone(),
            image_b_path: self.image_b_path.clone(),
            store: self.store.clone(),
            warp_method: self.config.transform_kind,
            tps_smoothing: self.config.solver.tps_smoothing,
        }
    }

    fn images_loaded(&self) -> bool {
        self.image_a.is_some() && self.image_b.is_some()
    }

    fn store_changed_without_edit(&mut self) {
        // in-flight results for the old settings become stale
        self.store.invalidate();
        self.on_store_changed();
    }

    fn on_store_changed(&mut self) {
        let generation = self.store.generation();
        self.coordinator.advance(generation);
        self.pending = None;

        if !self.images_loaded() {
            self.state = SessionState::Empty;
            return;
        }

        if self.store.is_empty() {
            self.state = SessionState::ImagesLoaded;
            return;
        }

        let snapshot = self.store.snapshot();
        if snapshot.pairs.len() < self.config.transform_kind.min_pairs() {
            self.state = SessionState::CorrespondencesInsufficient;
            return;
        }
        self.state = SessionState::CorrespondencesSufficient;

        if let (Some(image_a), Some(image_b)) = (&self.image_a, &self.image_b) {
            let request = ComputeRequest {
                generation: snapshot.generation,
                pairs: snapshot.pairs,
                image_a: Arc::clone(image_a),
                image_b: Arc::clone(image_b),
                kind: self.config.transform_kind,
                solver: self.config.solver,
                warp: self.config.warp,
                composite: self.config.composite,
            };
            match self.coordinator.submit(request) {
                Ok(()) => self.pending = Some(generation),
                Err(err) => {
                    log::warn!("failed to schedule generation {generation}: {err}");
                    self.last_error = Some(err);
                }
            }
        }
    }

    fn apply(&mut self, result: ComputeResult) -> SessionEvent {
        let generation = result.generation;
        if generation < self.store.generation() {
            self.discarded += 1;
            log::warn!(
                "discarding result of generation {generation}, store is at {}",
                self.store.generation()
            );
            return SessionEvent::Discarded { generation };
        }

        match result.outcome {
            Ok(ComputeStage::Transform(transform)) => {
                self.staged_transform = Some((generation, transform));
                self.last_error = None;
                self.store.mark_solved(generation);
                self.state = SessionState::TransformComputed;
            }
            Ok(ComputeStage::Warped(warped)) => {
                if let Some((staged, transform)) = self.staged_transform.take() {
                    if staged == generation {
                        self.transform = Some(transform);
                    }
                }
                self.warped = Some(warped);
                self.state = SessionState::Warped;
            }
            Ok(ComputeStage::Composited { image, mode }) => {
                // the mode may have changed while the request was running
                let composited = if mode == self.config.composite {
                    Some(image)
                } else {
                    match self.render_composite() {
                        Ok(rendered) => rendered,
                        Err(err) => {
                            self.last_error = Some(err);
                            self.pending = None;
                            return SessionEvent::Failed { generation };
                        }
                    }
                };
                self.composited = composited;
                self.state = SessionState::Composited;
                self.pending = None;
                log::info!("applied result of generation {generation}");
            }
            Err(err) => {
                log::warn!("computation of generation {generation} failed: {err}");
                self.staged_transform = None;
                self.last_error = Some(err);
                self.pending = None;
                return SessionEvent::Failed { generation };
            }
        }
        SessionEvent::Applied {
            generation,
            state: self.state,
        }
    }

    /// Apply every completed result without blocking.
    pub fn poll(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(result) = self.coordinator.try_recv() {
            events.push(self.apply(result));
        }
        events
    }

    /// Whether a computation for the current generation is still running.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Block until the computation for the current generation is composited or fails.
    ///
    /// Returns the final event: [`SessionEvent::Applied`] in the
    /// [`SessionState::Composited`] state, or [`SessionEvent::Failed`].
    ///
    /// # Errors
    ///
    /// [`Error::Worker`] if nothing is pending or the worker does not answer within `timeout`.
    pub fn wait(&mut self, timeout: Duration) -> Result<SessionEvent, Error> {
        let deadline = Instant::now() + timeout;
        while let Some(generation) = self.pending {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let result = self.coordinator.recv_timeout(remaining).ok_or_else(|| {
                Error::Worker(format!(
                    "no result for generation {generation} within {timeout:?}"
                ))
            })?;
            let event = self.apply(result);
            if self.pending.is_none() {
                return Ok(event);
            }
        }
        Err(Error::Worker(format!(
            "no computation pending in state {:?}",
            self.state
        )))
    }
}
