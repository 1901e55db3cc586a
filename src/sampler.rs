//! Periodic sampling for local camera sessions.
//!
//! - `SamplePipeline`: everything a sample needs besides the frame source.
//! - `SampleTask`: one acquired source plus pipeline; `tick()` runs one sample.
//!   Tests step it directly instead of waiting on timers.
//! - `Sampler::spawn`: runs a task on its own thread, one tick per period,
//!   until the returned `SamplerHandle` is stopped.
//!
//! The period is measured from the end of one sample to the start of the next.
//! The first sample is taken immediately after acquisition.

use anyhow::{anyhow, Context, Result};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::alert::AlertDispatcher;
use crate::detect::{Clock, DetectionResult, OccupancyEstimator, StatusClassifier, SystemClock};
use crate::frame::SNAPSHOT_JPEG_QUALITY;
use crate::history::{SampleLog, SampleRecord};
use crate::ingest::FrameSource;

pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_millis(1500);

/// Latest result of a session, shared between its sampler and the registry.
pub type ResultSlot = Arc<Mutex<Option<DetectionResult>>>;

/// Shared, cloneable sample dependencies.
#[derive(Clone)]
pub struct SamplePipeline {
    pub estimator: Arc<dyn OccupancyEstimator>,
    pub classifier: StatusClassifier,
    pub dispatcher: Arc<AlertDispatcher>,
    pub history: Option<Arc<dyn SampleLog>>,
    pub clock: Arc<dyn Clock>,
    /// Encode a JPEG snapshot of every sampled frame.
    pub snapshots: bool,
}

impl SamplePipeline {
    pub fn new(estimator: Arc<dyn OccupancyEstimator>, dispatcher: Arc<AlertDispatcher>) -> Self {
        Self {
            estimator,
            classifier: StatusClassifier::default(),
            dispatcher,
            history: None,
            clock: Arc::new(SystemClock),
            snapshots: true,
        }
    }
}

/// Owns an acquired frame source and releases it on drop.
struct AcquiredSource {
    source: Box<dyn FrameSource>,
}

impl AcquiredSource {
    fn acquire(mut source: Box<dyn FrameSource>) -> Result<Self> {
        source
            .acquire()
            .with_context(|| format!("acquire frame source {}", source.describe()))?;
        Ok(Self { source })
    }
}

impl Drop for AcquiredSource {
    fn drop(&mut self) {
        self.source.release();
    }
}

/// One session's sampling state.
pub struct SampleTask {
    session_id: String,
    source: AcquiredSource,
    pipeline: SamplePipeline,
    rng: Box<dyn RngCore + Send>,
    slot: ResultSlot,
}

impl SampleTask {
    /// Acquire `source` and build a task. Nothing is acquired on error.
    pub fn new(
        session_id: &str,
        source: Box<dyn FrameSource>,
        pipeline: SamplePipeline,
        slot: ResultSlot,
    ) -> Result<Self> {
        Self::with_rng(
            session_id,
            source,
            pipeline,
            slot,
            Box::new(StdRng::from_entropy()),
        )
    }

    pub fn with_rng(
        session_id: &str,
        source: Box<dyn FrameSource>,
        pipeline: SamplePipeline,
        slot: ResultSlot,
        rng: Box<dyn RngCore + Send>,
    ) -> Result<Self> {
        let source = AcquiredSource::acquire(source)?;
        Ok(Self {
            session_id: session_id.to_string(),
            source,
            pipeline,
            rng,
            slot,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Take one sample. Returns `None` when the source is not ready or the read fails.
    pub fn tick(&mut self) -> Option<DetectionResult> {
        if !self.source.source.is_ready() {
            log::trace!("{}: source not ready, tick skipped", self.session_id);
            return None;
        }
        let frame = match self.source.source.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("{}: frame read failed, tick skipped: {:#}", self.session_id, e);
                return None;
            }
        };

        let pipeline = &self.pipeline;
        let count = pipeline
            .estimator
            .estimate(&frame, pipeline.clock.as_ref(), self.rng.as_mut());
        let status = pipeline.classifier.classify(count);
        let snapshot = if pipeline.snapshots {
            frame.encode_jpeg(SNAPSHOT_JPEG_QUALITY).ok()
        } else {
            None
        };
        let result = DetectionResult::new(count, status, snapshot);
        log::debug!("{}: count={} status={}", self.session_id, count, status);

        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(result.clone());
        pipeline.dispatcher.on_result(&self.session_id, &result);
        if let Some(history) = &pipeline.history {
            let record = SampleRecord {
                id: self.session_id.clone(),
                count,
                status,
                timestamp_ms: pipeline.clock.now_ms(),
            };
            if let Err(e) = history.append(&record) {
                log::debug!("{}: sample log append failed: {:#}", self.session_id, e);
            }
        }
        Some(result)
    }
}

pub struct Sampler;

impl Sampler {
    /// Acquire `source` and start sampling it every `period` on a dedicated thread.
    ///
    /// Acquisition failure is returned as an error and no thread is started.
    pub fn spawn(
        session_id: &str,
        source: Box<dyn FrameSource>,
        pipeline: SamplePipeline,
        slot: ResultSlot,
        period: Duration,
    ) -> Result<SamplerHandle> {
        let task = SampleTask::new(session_id, source, pipeline, slot)?;
        Self::run(task, period)
    }

    /// Start a prepared task.
    pub fn run(mut task: SampleTask, period: Duration) -> Result<SamplerHandle> {
        let session_id = task.session_id.clone();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let join = std::thread::Builder::new()
            .name(format!("sampler-{}", session_id))
            .spawn(move || loop {
                task.tick();
                match stop_rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .with_context(|| format!("spawn sampler thread for {}", session_id))?;
        log::info!("{}: sampler started (period {:?})", session_id, period);
        Ok(SamplerHandle {
            session_id,
            stop_tx: Some(stop_tx),
            join: Some(join),
        })
    }
}

/// Control handle for a running sampler. Dropping it stops the sampler.
pub struct SamplerHandle {
    session_id: String,
    stop_tx: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl SamplerHandle {
    /// Cancel the loop and wait for the thread to release its source.
    ///
    /// Safe to call repeatedly. A panicked sampler thread is reported once.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("sampler thread for {} panicked", self.session_id))?;
            log::info!("{}: sampler stopped", self.session_id);
        }
        Ok(())
    }

    /// True while the sampler thread is alive.
    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|join| !join.is_finished())
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("{:#}", e);
        }
    }
}
