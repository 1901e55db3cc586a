//! Crowd Watch
//!
//! Crowd-density monitoring for camera feeds: each session samples its camera
//! on a fixed period, estimates how many people are in view, classifies the
//! count into a safety band and raises an alert when the band is critical.
//!
//! # Architecture
//!
//! - Local sessions own a device camera and run an in-process sampler thread.
//! - Remote sessions are run by a camera backend service; this engine starts,
//!   stops and polls them over HTTP.
//! - The session registry is the single control plane for both kinds.
//!
//! # Module Structure
//!
//! - `frame`: decoded RGB frames, luminance and JPEG snapshots
//! - `ingest`: frame sources (synthetic, HTTP snapshot cameras)
//! - `detect`: occupancy estimators, status classification
//! - `sampler`: periodic sampling loop per local session
//! - `alert`: alert dispatch and notification sinks (log, MQTT)
//! - `history`: optional sample log (SQLite)
//! - `remote`: camera backend client
//! - `registry`: session lifecycle (start, stop, status, frame, cleanup)
//! - `config`: daemon configuration

pub mod alert;
pub mod config;
pub mod detect;
pub mod frame;
pub mod history;
pub mod ingest;
pub mod registry;
pub mod remote;
pub mod sampler;

pub use alert::{AlertDispatcher, AlertPolicy, LogSink, Notification, NotificationSink, Severity};
pub use config::CrowdWatchConfig;
pub use detect::{
    DetectionResult, EstimatorRegistry, OccupancyEstimator, RegionHeuristic, SafetyStatus,
    StatusClassifier,
};
pub use frame::Frame;
pub use ingest::{open_source, FrameSource};
pub use registry::{FrameSnapshot, SessionDescriptor, SessionKind, SessionRegistry, SessionStatus};
pub use remote::{CameraBackend, HttpCameraBackend, RemoteDescriptor};
pub use sampler::{SamplePipeline, Sampler, SamplerHandle};
