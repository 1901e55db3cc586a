#![allow(dead_code)]

use anyhow::{anyhow, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crowd_watch::detect::{ManualClock, SafetyStatus};
use crowd_watch::remote::{CommandReply, FrameReply, StartRequest, StatusReply};
use crowd_watch::{
    AlertDispatcher, AlertPolicy, CameraBackend, Frame, FrameSource, Notification,
    NotificationSink, OccupancyEstimator, RemoteDescriptor, SamplePipeline,
};

/// Sink that keeps every notification.
#[derive(Default)]
pub struct RecordingSink {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn notify(&self, notification: &Notification) -> Result<()> {
        self.seen.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Pipeline with a fixed clock and a recording sink.
pub fn pipeline(
    estimator: Arc<dyn OccupancyEstimator>,
    policy: AlertPolicy,
) -> (SamplePipeline, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let dispatcher = AlertDispatcher::new(policy).with_sink(sink.clone());
    let pipeline = SamplePipeline {
        clock: Arc::new(ManualClock::new(0)),
        ..SamplePipeline::new(estimator, Arc::new(dispatcher))
    };
    (pipeline, sink)
}

pub fn descriptor(address: &str) -> RemoteDescriptor {
    RemoteDescriptor {
        username: "operator".to_string(),
        password: "secret".to_string(),
        address: address.to_string(),
        port: 554,
        stream_path: "/live".to_string(),
    }
}

/// In-process camera backend with scripted outcomes and call counters.
#[derive(Default)]
pub struct ScriptedBackend {
    pub refuse_start: AtomicBool,
    pub refuse_stop: Mutex<HashSet<String>>,
    pub status: Mutex<Option<StatusReply>>,
    pub frame: Mutex<Option<FrameReply>>,
    pub calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    /// `stop` for this id waits until `stop_quorum` stops have begun.
    pub held_stop: Mutex<Option<String>>,
    pub stop_quorum: AtomicUsize,
    pub held_stop_released: AtomicBool,
    /// `start` for this id waits until `release_start` is set.
    pub held_start: Mutex<Option<String>>,
    pub start_entered: AtomicBool,
    pub release_start: AtomicBool,
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while !condition() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    true
}

impl ScriptedBackend {
    pub fn refusing_stop(ids: &[&str]) -> Self {
        let backend = Self::default();
        backend
            .refuse_stop
            .lock()
            .unwrap()
            .extend(ids.iter().map(|id| id.to_string()));
        backend
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CameraBackend for ScriptedBackend {
    fn start(&self, request: &StartRequest) -> Result<CommandReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.held_start.lock().unwrap().as_deref() == Some(request.id.as_str()) {
            self.start_entered.store(true, Ordering::SeqCst);
            if !wait_until(Duration::from_secs(5), || {
                self.release_start.load(Ordering::SeqCst)
            }) {
                return Err(anyhow!("start of {} never released", request.id));
            }
        }
        let success = !self.refuse_start.load(Ordering::SeqCst);
        Ok(CommandReply {
            success,
            message: if success { "started" } else { "camera unreachable" }.to_string(),
        })
    }

    fn stop(&self, id: &str) -> Result<CommandReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.held_stop.lock().unwrap().as_deref() == Some(id) {
            let quorum = self.stop_quorum.load(Ordering::SeqCst);
            if !wait_until(Duration::from_secs(5), || {
                self.stop_calls.load(Ordering::SeqCst) >= quorum
            }) {
                return Err(anyhow!("stop of {} never saw the other stops begin", id));
            }
            self.held_stop_released.store(true, Ordering::SeqCst);
        }
        if self.refuse_stop.lock().unwrap().contains(id) {
            return Err(anyhow!("connection reset while stopping {}", id));
        }
        Ok(CommandReply {
            success: true,
            message: "stopped".to_string(),
        })
    }

    fn status(&self, _id: &str) -> Result<StatusReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.status.lock().unwrap().clone().unwrap_or(StatusReply {
            success: true,
            count: 2,
            status: SafetyStatus::Safe,
            running: true,
        }))
    }

    fn frame(&self, _id: &str) -> Result<FrameReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.frame.lock().unwrap().clone().unwrap_or_default())
    }

    fn stream_address(&self, id: &str) -> String {
        format!("http://backend.test/api/camera/stream/{}", id)
    }
}

/// Local source that serves a white frame and reports acquire/release.
pub struct TestSource {
    pub fail_acquire: bool,
    pub acquired: Arc<AtomicBool>,
    pub released: Arc<AtomicBool>,
}

impl TestSource {
    pub fn new() -> Self {
        Self {
            fail_acquire: false,
            acquired: Arc::new(AtomicBool::new(false)),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn denied() -> Self {
        Self {
            fail_acquire: true,
            ..Self::new()
        }
    }
}

impl FrameSource for TestSource {
    fn describe(&self) -> String {
        "test://white".to_string()
    }

    fn acquire(&mut self) -> Result<()> {
        if self.fail_acquire {
            return Err(anyhow!("camera permission denied"));
        }
        self.acquired.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn read_frame(&mut self) -> Result<Frame> {
        Ok(Frame::solid(16, 12, [255, 255, 255]))
    }
}
