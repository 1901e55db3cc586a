//! Session registry: the control plane for every monitored camera.
//!
//! Invariants:
//! - an id is tracked iff its last start succeeded and no stop/cleanup removed it
//! - at most one sampler runs per id
//! - stopping an untracked id is a no-op
//!
//! Operations on one id are serialized by a per-id lock; different ids proceed
//! in parallel. The session map lock is never held across a network call or a
//! sampler join.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::detect::{DetectionResult, SafetyStatus};
use crate::ingest::FrameSource;
use crate::remote::{CameraBackend, RemoteDescriptor, StartRequest};
use crate::sampler::{ResultSlot, SamplePipeline, Sampler, SamplerHandle, DEFAULT_SAMPLE_PERIOD};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionKind {
    Local,
    Remote,
}

/// What to start a session with.
pub enum SessionDescriptor {
    /// A device camera; the registry acquires it and samples it locally.
    Local(Box<dyn FrameSource>),
    /// A network camera run by the remote backend.
    Remote(RemoteDescriptor),
}

impl SessionDescriptor {
    pub fn kind(&self) -> SessionKind {
        match self {
            SessionDescriptor::Local(_) => SessionKind::Local,
            SessionDescriptor::Remote(_) => SessionKind::Remote,
        }
    }
}

/// Point-in-time view of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionStatus {
    pub count: u32,
    pub status: SafetyStatus,
    pub running: bool,
}

/// On-demand still of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameSnapshot {
    /// Encoded image bytes (JPEG).
    pub image: Vec<u8>,
    pub count: u32,
    pub status: SafetyStatus,
}

/// One tracked camera feed.
pub struct CameraSession {
    id: String,
    kind: SessionKind,
    remote: Option<RemoteDescriptor>,
    running: bool,
    last_result: ResultSlot,
    sampler: Option<Arc<Mutex<SamplerHandle>>>,
}

impl CameraSession {
    fn local(id: &str, slot: ResultSlot, sampler: SamplerHandle) -> Self {
        Self {
            id: id.to_string(),
            kind: SessionKind::Local,
            remote: None,
            running: true,
            last_result: slot,
            sampler: Some(Arc::new(Mutex::new(sampler))),
        }
    }

    fn remote(id: &str, descriptor: RemoteDescriptor) -> Self {
        Self {
            id: id.to_string(),
            kind: SessionKind::Remote,
            remote: Some(descriptor),
            running: true,
            last_result: ResultSlot::default(),
            sampler: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn remote_descriptor(&self) -> Option<&RemoteDescriptor> {
        self.remote.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn last_result(&self) -> Option<DetectionResult> {
        lock(&self.last_result).clone()
    }
}

enum StopTarget {
    Remote,
    Local(Option<Arc<Mutex<SamplerHandle>>>),
}

pub struct SessionRegistry {
    backend: Arc<dyn CameraBackend>,
    pipeline: SamplePipeline,
    period: Duration,
    sessions: Mutex<HashMap<String, CameraSession>>,
    id_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionRegistry {
    pub fn new(backend: Arc<dyn CameraBackend>, pipeline: SamplePipeline) -> Self {
        Self {
            backend,
            pipeline,
            period: DEFAULT_SAMPLE_PERIOD,
            sessions: Mutex::new(HashMap::new()),
            id_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Start (or restart) a session. Returns false when acquisition or the
    /// backend start fails; no new entry is registered in that case.
    ///
    /// A local start first stops whatever is tracked under `id` (a local
    /// sampler or a remote backend session) and fails if that stop fails.
    pub fn start(&self, id: &str, descriptor: SessionDescriptor) -> bool {
        let id_lock = self.id_lock(id);
        let _serialized = lock(&id_lock);

        let started = match descriptor {
            SessionDescriptor::Remote(remote) => self.start_remote(id, remote),
            SessionDescriptor::Local(source) => self
                .stop_tracked(id)
                .and_then(|()| self.start_local(id, source)),
        };
        match started {
            Ok(session) => {
                log::info!("{}: {:?} session started", id, session.kind);
                self.insert(session);
                true
            }
            Err(e) => {
                log::warn!("{}: start failed: {:#}", id, e);
                false
            }
        }
    }

    fn start_remote(&self, id: &str, descriptor: RemoteDescriptor) -> Result<CameraSession> {
        let reply = self.backend.start(&StartRequest::new(id, &descriptor))?;
        if !reply.success {
            return Err(anyhow!("backend refused start: {}", reply.message));
        }
        Ok(CameraSession::remote(id, descriptor))
    }

    fn start_local(&self, id: &str, source: Box<dyn FrameSource>) -> Result<CameraSession> {
        let slot = ResultSlot::default();
        match Sampler::spawn(id, source, self.pipeline.clone(), slot.clone(), self.period) {
            Ok(handle) => Ok(CameraSession::local(id, slot, handle)),
            Err(e) => {
                self.pipeline.dispatcher.report_acquisition_failure(id, &e);
                Err(e)
            }
        }
    }

    fn insert(&self, session: CameraSession) {
        let previous = lock(&self.sessions).insert(session.id.clone(), session);
        // A replaced local session stops its sampler when `previous` goes out
        // of scope, after the map lock has been released.
        if let Some(previous) = &previous {
            log::info!("{}: previous {:?} session replaced", previous.id, previous.kind);
        }
    }

    /// Stop a session. The id is removed only when the underlying stop succeeds;
    /// an untracked id is a no-op that reports success.
    pub fn stop(&self, id: &str) -> bool {
        let id_lock = self.id_lock(id);
        let _serialized = lock(&id_lock);

        match self.stop_tracked(id) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{}: stop failed, session kept: {:#}", id, e);
                false
            }
        }
    }

    /// Stop and forget whatever is tracked under `id`. Callers hold the id lock.
    fn stop_tracked(&self, id: &str) -> Result<()> {
        let target = {
            let sessions = lock(&self.sessions);
            match sessions.get(id) {
                None => return Ok(()),
                Some(session) => match session.kind {
                    SessionKind::Remote => StopTarget::Remote,
                    SessionKind::Local => StopTarget::Local(session.sampler.clone()),
                },
            }
        };

        match target {
            StopTarget::Remote => {
                let reply = self.backend.stop(id)?;
                if !reply.success {
                    return Err(anyhow!("backend refused stop: {}", reply.message));
                }
            }
            StopTarget::Local(Some(handle)) => {
                let mut sampler = lock(&handle);
                sampler.stop()?;
            }
            StopTarget::Local(None) => {}
        }

        let _removed = lock(&self.sessions).remove(id);
        self.pipeline.dispatcher.forget(id);
        log::info!("{}: session stopped", id);
        Ok(())
    }

    /// Current status. Remote sessions are pulled from the backend.
    pub fn status(&self, id: &str) -> Option<SessionStatus> {
        let (kind, slot, running) = {
            let sessions = lock(&self.sessions);
            let session = sessions.get(id)?;
            (session.kind, session.last_result.clone(), session.running)
        };

        match kind {
            SessionKind::Local => {
                let (count, status) = lock(&slot)
                    .as_ref()
                    .map(|r| (r.count, r.status))
                    .unwrap_or_else(|| (0, self.pipeline.classifier.classify(0)));
                Some(SessionStatus {
                    count,
                    status,
                    running,
                })
            }
            SessionKind::Remote => match self.backend.status(id) {
                Ok(reply) if reply.success => {
                    *lock(&slot) = Some(DetectionResult::new(reply.count, reply.status, None));
                    Some(SessionStatus {
                        count: reply.count,
                        status: reply.status,
                        running: reply.running,
                    })
                }
                Ok(_) => {
                    log::debug!("{}: backend reported no status", id);
                    None
                }
                Err(e) => {
                    log::warn!("{}: status pull failed: {:#}", id, e);
                    None
                }
            },
        }
    }

    /// Latest still with its classification. Remote sessions are pulled on demand.
    pub fn frame(&self, id: &str) -> Option<FrameSnapshot> {
        let (kind, slot) = {
            let sessions = lock(&self.sessions);
            let session = sessions.get(id)?;
            (session.kind, session.last_result.clone())
        };

        match kind {
            SessionKind::Local => {
                let last = lock(&slot);
                let result = last.as_ref()?;
                Some(FrameSnapshot {
                    image: result.snapshot.clone()?,
                    count: result.count,
                    status: result.status,
                })
            }
            SessionKind::Remote => {
                let reply = match self.backend.frame(id) {
                    Ok(reply) if reply.success => reply,
                    Ok(_) => {
                        log::debug!("{}: backend reported no frame", id);
                        return None;
                    }
                    Err(e) => {
                        log::warn!("{}: frame pull failed: {:#}", id, e);
                        return None;
                    }
                };
                let image = match reply.decode_image() {
                    Ok(image) => image,
                    Err(e) => {
                        log::warn!("{}: frame image unusable: {:#}", id, e);
                        return None;
                    }
                };
                *lock(&slot) = Some(DetectionResult::new(
                    reply.count,
                    reply.status,
                    Some(image.clone()),
                ));
                Some(FrameSnapshot {
                    image,
                    count: reply.count,
                    status: reply.status,
                })
            }
        }
    }

    /// Address for consuming a session's video stream. Pure; the id need not be tracked.
    pub fn stream_address(&self, id: &str) -> String {
        self.backend.stream_address(id)
    }

    /// Stop every tracked session concurrently, wait for all, then forget all of
    /// them regardless of individual outcomes.
    pub fn cleanup(&self) {
        let ids = self.ids();
        if ids.is_empty() {
            return;
        }

        let failed = std::thread::scope(|scope| {
            let stops: Vec<_> = ids
                .iter()
                .map(|id| scope.spawn(move || self.stop(id)))
                .collect();
            stops
                .into_iter()
                .map(|stop| stop.join())
                .filter(|joined| !matches!(joined, Ok(true)))
                .count()
        });
        if failed > 0 {
            log::warn!(
                "cleanup: {} of {} sessions did not stop cleanly; forgetting them anyway",
                failed,
                ids.len()
            );
        }

        let leftovers: Vec<CameraSession> = lock(&self.sessions).drain().map(|(_, s)| s).collect();
        for session in &leftovers {
            self.pipeline.dispatcher.forget(&session.id);
        }
        log::info!("cleanup: {} sessions cleared", ids.len());
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.sessions).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, id: &str) -> bool {
        lock(&self.sessions).contains_key(id)
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.sessions).is_empty()
    }

    /// Run `f` against a tracked session.
    pub fn with_session<R>(&self, id: &str, f: impl FnOnce(&CameraSession) -> R) -> Option<R> {
        lock(&self.sessions).get(id).map(f)
    }

    fn id_lock(&self, id: &str) -> Arc<Mutex<()>> {
        lock(&self.id_locks)
            .entry(id.to_string())
            .or_default()
            .clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
