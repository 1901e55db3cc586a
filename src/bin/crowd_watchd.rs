//! crowd_watchd - crowd-density monitoring daemon
//!
//! This daemon:
//! 1. Loads configuration (file + CROWD_WATCH_* env overrides)
//! 2. Starts every configured local and remote camera session
//! 3. Samples local cameras, classifies density, dispatches critical alerts
//! 4. Logs a status line per session at a fixed interval
//! 5. Stops every session on Ctrl-C

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use crowd_watch::alert::MqttSink;
use crowd_watch::history::{SampleLog, SqliteSampleLog};
use crowd_watch::{
    open_source, AlertDispatcher, CrowdWatchConfig, EstimatorRegistry, HttpCameraBackend,
    LogSink, SamplePipeline, SessionDescriptor, SessionRegistry, StatusClassifier,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Crowd-density monitoring daemon")]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "CROWD_WATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Seconds between status log lines; 0 disables them.
    #[arg(long, default_value_t = 10)]
    status_interval_secs: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = CrowdWatchConfig::load_from(args.config.as_deref())?;

    let mut dispatcher = AlertDispatcher::new(config.alert_policy).with_sink(Arc::new(LogSink));
    if let Some(mqtt) = config.mqtt.clone() {
        match MqttSink::connect(mqtt) {
            Ok(sink) => dispatcher = dispatcher.with_sink(Arc::new(sink)),
            Err(e) => log::warn!("mqtt alerts disabled: {:#}", e),
        }
    }

    let estimators = EstimatorRegistry::with_builtin();
    let estimator = estimators.resolve(&config.estimator)?;
    log::info!("estimator: {}", estimator.name());

    let mut pipeline = SamplePipeline::new(estimator, Arc::new(dispatcher));
    pipeline.classifier = StatusClassifier::new(config.critical_at);
    pipeline.snapshots = config.snapshots;
    if let Some(db_path) = &config.history_db_path {
        let history: Arc<dyn SampleLog> = Arc::new(SqliteSampleLog::open(db_path)?);
        pipeline.history = Some(history);
        log::info!("sample log: {}", db_path);
    }

    let backend = HttpCameraBackend::new(&config.backend_url, config.backend_timeout)?;
    log::info!("camera backend: {}", backend.base_url());
    let registry = SessionRegistry::new(Arc::new(backend), pipeline).with_period(config.sample_period);

    for camera in &config.local_cameras {
        let source = match open_source(&camera.source, camera.width, camera.height) {
            Ok(source) => source,
            Err(e) => {
                log::warn!("{}: {:#}", camera.id, e);
                continue;
            }
        };
        if !registry.start(&camera.id, SessionDescriptor::Local(source)) {
            log::warn!("{}: local camera not started", camera.id);
        }
    }
    for camera in &config.remote_cameras {
        if registry.start(&camera.id, SessionDescriptor::Remote(camera.descriptor.clone())) {
            log::info!("{}: stream at {}", camera.id, registry.stream_address(&camera.id));
        } else {
            log::warn!("{}: remote camera not started", camera.id);
        }
    }
    if registry.is_empty() {
        log::warn!("no camera sessions running");
    }

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("crowd_watchd running; waiting for shutdown signal (Ctrl-C)...");
    if args.status_interval_secs == 0 {
        let _ = rx.recv();
    } else {
        let interval = Duration::from_secs(args.status_interval_secs);
        loop {
            match rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => log_statuses(&registry),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    log::info!("shutdown signal received, stopping {} sessions...", registry.len());
    registry.cleanup();
    Ok(())
}

fn log_statuses(registry: &SessionRegistry) {
    for id in registry.ids() {
        match registry.status(&id) {
            Some(status) => log::info!(
                "{}: count={} status={} running={}",
                id,
                status.count,
                status.status,
                status.running
            ),
            None => log::info!("{}: status unavailable", id),
        }
    }
}
