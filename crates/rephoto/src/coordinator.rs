//! Background solve -> warp -> composite pipeline.
//!
//! A single worker thread receives [`ComputeRequest`]s over a channel. Every request carries
//! the store generation it was built from; the coordinator publishes the newest submitted
//! generation through an atomic, and the worker drops any request that has been superseded
//! before it starts solving or warping.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    mpsc, Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use rephoto_geometry::{compute_transform, PointPair, SolverConfig, Transform, TransformKind};
use rephoto_image::Rgba32F;
use rephoto_imgproc::{
    composite::{composite, CompositeMode},
    warp::{warp, WarpConfig},
};

use crate::error::Error;

/// Everything the worker needs for one recompute, as immutable shared data.
#[derive(Clone, Debug)]
pub struct ComputeRequest {
    /// Store generation the pairs were taken from.
    pub generation: u64,
    /// Flattened correspondences.
    pub pairs: Arc<[PointPair]>,
    /// The reference image; its size is the warp target size.
    pub image_a: Arc<Rgba32F>,
    /// The image to warp.
    pub image_b: Arc<Rgba32F>,
    /// Transform family.
    pub kind: TransformKind,
    /// Solver tolerances.
    pub solver: SolverConfig,
    /// Resampling settings.
    pub warp: WarpConfig,
    /// Visualization to render once warped.
    pub composite: CompositeMode,
}

/// Product of one pipeline stage.
#[derive(Clone, Debug)]
pub enum ComputeStage {
    /// The fitted transform.
    Transform(Arc<Transform>),
    /// The modern image resampled into the reference frame.
    Warped(Arc<Rgba32F>),
    /// The composited visualization; the last stage of a request.
    Composited {
        /// The rendered composite.
        image: Arc<Rgba32F>,
        /// The mode it was rendered with.
        mode: CompositeMode,
    },
}

/// One message from the worker.
#[derive(Debug)]
pub struct ComputeResult {
    /// Generation of the request.
    pub generation: u64,
    /// The stage product, or the error that ended the request.
    pub outcome: Result<ComputeStage, Error>,
}

/// Run one request to completion on the current thread.
///
/// Every stage product is passed to `emit` as soon as it is ready; an error ends the request.
/// `is_current` is polled before the solve and before the warp; once it returns `false` the
/// request is abandoned and `false` is returned.
pub fn run_request(
    request: &ComputeRequest,
    is_current: impl Fn() -> bool,
    mut emit: impl FnMut(Result<ComputeStage, Error>),
) -> bool {
    if !is_current() {
        return false;
    }
    let transform = match compute_transform(&request.pairs, request.kind, &request.solver) {
        Ok(transform) => Arc::new(transform),
        Err(err) => {
            emit(Err(err.into()));
            return true;
        }
    };
    emit(Ok(ComputeStage::Transform(Arc::clone(&transform))));

    if !is_current() {
        return false;
    }
    let warped = match warp(
        &request.image_b,
        &transform,
        request.image_a.size(),
        request.warp.interpolation,
    ) {
        Ok(warped) => Arc::new(warped),
        Err(err) => {
            emit(Err(err.into()));
            return true;
        }
    };
    emit(Ok(ComputeStage::Warped(Arc::clone(&warped))));

    emit(
        composite(&request.image_a, &warped, request.composite)
            .map(|c| ComputeStage::Composited {
                image: Arc::new(c),
                mode: request.composite,
            })
            .map_err(Error::from),
    );
    true
}

fn worker_loop(
    requests: mpsc::Receiver<ComputeRequest>,
    results: mpsc::Sender<ComputeResult>,
    latest: Arc<AtomicU64>,
) {
    while let Ok(mut request) = requests.recv() {
        // only the newest queued request matters
        while let Ok(newer) = requests.try_recv() {
            log::debug!(
                "skipping generation {} superseded by {}",
                request.generation,
                newer.generation
            );
            request = newer;
        }

        let generation = request.generation;
        let is_current = || latest.load(Ordering::Acquire) <= generation;

        let start = std::time::Instant::now();
        let mut disconnected = false;
        let completed = run_request(&request, is_current, |outcome| {
            if results.send(ComputeResult { generation, outcome }).is_err() {
                disconnected = true;
            }
        });
        if disconnected {
            // the coordinator is gone
            break;
        }
        if completed {
            log::debug!("generation {generation} computed in {:?}", start.elapsed());
        } else {
            log::debug!("generation {generation} superseded, abandoned");
        }
    }
}

/// Owner of the compute worker thread.
///
/// Dropping the coordinator closes the request channel and joins the worker.
pub struct ComputeCoordinator {
    latest: Arc<AtomicU64>,
    requests: Option<mpsc::Sender<ComputeRequest>>,
    results: mpsc::Receiver<ComputeResult>,
    worker: Option<JoinHandle<()>>,
}

impl ComputeCoordinator {
    /// Start the worker thread.
    pub fn spawn() -> Result<Self, Error> {
        let latest = Arc::new(AtomicU64::new(0));
        let (request_tx, request_rx) = mpsc::channel();
        let (result_tx, result_rx) = mpsc::channel();

        let worker_latest = Arc::clone(&latest);
        let worker = std::thread::Builder::new()
            .name("rephoto-compute".to_string())
            .spawn(move || worker_loop(request_rx, result_tx, worker_latest))
            .map_err(|e| Error::Worker(format!("failed to spawn the compute worker: {e}")))?;

        Ok(Self {
            latest,
            requests: Some(request_tx),
            results: result_rx,
            worker: Some(worker),
        })
    }

    /// Publish a new generation without submitting work, superseding any queued request.
    pub fn advance(&self, generation: u64) {
        self.latest.fetch_max(generation, Ordering::AcqRel);
    }

    /// Newest generation seen by the coordinator.
    pub fn latest_generation(&self) -> u64 {
        self.latest.load(Ordering::Acquire)
    }

    /// Queue a request; older queued or running requests become stale.
    pub fn submit(&self, request: ComputeRequest) -> Result<(), Error> {
        self.advance(request.generation);
        log::debug!(
            "submitting generation {} with {} point pairs",
            request.generation,
            request.pairs.len()
        );
        self.requests
            .as_ref()
            .ok_or_else(|| Error::Worker("compute worker stopped".to_string()))?
            .send(request)
            .map_err(|_| Error::Worker("compute worker stopped".to_string()))
    }

    /// A completed result, if one is ready.
    pub fn try_recv(&self) -> Option<ComputeResult> {
        self.results.try_recv().ok()
    }

    /// Wait up to `timeout` for the next completed result.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ComputeResult> {
        self.results.recv_timeout(timeout).ok()
    }
}

impl Drop for ComputeCoordinator {
    fn drop(&mut self) {
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("compute worker panicked");
            }
        }
    }
}
