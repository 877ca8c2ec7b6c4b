//! Three-thread orchestration (spec.md §5): a capture thread draining a
//! `PacketSource` into the bounded queue, a pipeline thread draining the
//! queue and publishing snapshots, and any number of snapshot readers
//! (the caller's UI thread(s)) reading the swappable pointer. No stage
//! calls back upstream; the only shared state is the capture queue and
//! the snapshot pointer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use meter_capture::{replay::ReplaySource, PacketSource, RawPacket};
use meter_proto::{ActorId, PlayerName};
use meter_session::Mode;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

#[cfg(feature = "live-capture")]
use meter_capture::live::LiveSource;

use crate::config::{CaptureConfig, Config};
use crate::metrics::PipelineMetrics;
use crate::pipeline::{Pipeline, PipelineError};
use crate::queue::CaptureQueue;

/// Bounds how long the pipeline thread blocks popping from the capture
/// queue before re-checking its shutdown flag and re-publishing a snapshot
/// even if no packet arrived (spec.md §5: "suspension points: only at (a)
/// the capture-queue blocking pop with timeout").
const PIPELINE_POLL_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("opening replay capture: {0}")]
    Replay(#[from] meter_capture::replay::ReplaySourceError),
    #[cfg(feature = "live-capture")]
    #[error("opening live capture: {0}")]
    Live(#[from] meter_capture::live::LiveSourceError),
}

/// The published view: `meter_snapshot::Snapshot` plus the pipeline's own
/// dropped-item counters (SPEC_FULL.md §2's "included in every Snapshot").
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    #[serde(flatten)]
    pub view: meter_snapshot::Snapshot,
    pub metrics: PipelineMetrics,
}

impl EngineSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

enum ControlCommand {
    SetMode(Mode, TsUsec),
    ManualToggle(TsUsec),
    ArchiveNow(TsUsec),
    ResetFame,
    SeedSelf(Option<PlayerName>, Option<ActorId>),
}

pub type TsUsec = i64;

fn empty_snapshot() -> EngineSnapshot {
    EngineSnapshot {
        view: meter_snapshot::project(
            Mode::Battle,
            "",
            None,
            &meter_session::HistoryRing::new(1),
            0,
            10.0,
            meter_aggregate::RankKey::Damage,
            &std::collections::HashMap::new(),
            &meter_snapshot::ItemCategoryTable::empty(),
        ),
        metrics: PipelineMetrics::default(),
    }
}

fn build_packet_source(capture: &CaptureConfig) -> Result<Box<dyn PacketSource + Send>, EngineError> {
    match capture {
        CaptureConfig::Replay { path } => Ok(Box::new(ReplaySource::open(path)?)),
        #[cfg(feature = "live-capture")]
        CaptureConfig::Live { filter } => Ok(Box::new(LiveSource::open(None, filter)?)),
        #[cfg(not(feature = "live-capture"))]
        CaptureConfig::Live { .. } => {
            warn!("live capture requested but the live-capture feature is disabled; falling back to an empty source");
            Ok(Box::new(ExhaustedSource))
        }
    }
}

/// Stands in for live capture when the `live-capture` feature is off: a
/// `PacketSource` that yields nothing, so the pipeline thread still starts
/// and idles cleanly rather than failing to construct at all.
struct ExhaustedSource;

impl PacketSource for ExhaustedSource {
    fn next_packet(&mut self) -> Option<RawPacket> {
        None
    }
}

/// Owns the capture and pipeline threads and the swappable snapshot
/// pointer. Dropping the engine (or calling `shutdown`) signals both
/// threads to stop and joins them.
pub struct Engine {
    shutdown: Arc<AtomicBool>,
    queue: Arc<CaptureQueue>,
    snapshot: Arc<Mutex<Arc<EngineSnapshot>>>,
    control_tx: mpsc::Sender<ControlCommand>,
    capture_handle: Option<JoinHandle<()>>,
    pipeline_handle: Option<JoinHandle<()>>,
}

impl Engine {
    pub fn start(config: Config) -> Result<Self, EngineError> {
        let pipeline = Pipeline::new(&config)?;
        let mut source = build_packet_source(&config.capture)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let queue = Arc::new(CaptureQueue::new(crate::queue::DEFAULT_CAPACITY));
        let snapshot = Arc::new(Mutex::new(Arc::new(empty_snapshot())));
        let (control_tx, control_rx) = mpsc::channel();

        let capture_handle = {
            let queue = Arc::clone(&queue);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || {
                while !shutdown.load(Ordering::Relaxed) {
                    match source.next_packet() {
                        Some(packet) => queue.push(packet),
                        None => break,
                    }
                }
                queue.close();
                info!("capture thread stopped");
            })
        };

        let pipeline_handle = {
            let queue = Arc::clone(&queue);
            let shutdown = Arc::clone(&shutdown);
            let snapshot = Arc::clone(&snapshot);
            thread::spawn(move || run_pipeline_loop(pipeline, queue, shutdown, snapshot, control_rx))
        };

        Ok(Engine {
            shutdown,
            queue,
            snapshot,
            control_tx,
            capture_handle: Some(capture_handle),
            pipeline_handle: Some(pipeline_handle),
        })
    }

    pub fn snapshot(&self) -> Arc<EngineSnapshot> {
        Arc::clone(&self.snapshot.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn set_mode(&self, mode: Mode, ts: TsUsec) {
        let _ = self.control_tx.send(ControlCommand::SetMode(mode, ts));
    }

    pub fn manual_toggle(&self, ts: TsUsec) {
        let _ = self.control_tx.send(ControlCommand::ManualToggle(ts));
    }

    pub fn archive_now(&self, ts: TsUsec) {
        let _ = self.control_tx.send(ControlCommand::ArchiveNow(ts));
    }

    pub fn reset_fame(&self) {
        let _ = self.control_tx.send(ControlCommand::ResetFame);
    }

    pub fn seed_self(&self, name: Option<PlayerName>, id: Option<ActorId>) {
        let _ = self.control_tx.send(ControlCommand::SeedSelf(name, id));
    }

    /// Signals both threads to stop and blocks until they've joined.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.queue.close();
        if let Some(handle) = self.capture_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.pipeline_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.queue.close();
        if let Some(handle) = self.capture_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.pipeline_handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_pipeline_loop(
    mut pipeline: Pipeline,
    queue: Arc<CaptureQueue>,
    shutdown: Arc<AtomicBool>,
    snapshot: Arc<Mutex<Arc<EngineSnapshot>>>,
    control_rx: mpsc::Receiver<ControlCommand>,
) {
    let mut last_ts: TsUsec = 0;
    loop {
        for command in control_rx.try_iter() {
            apply_control_command(&mut pipeline, command, &mut last_ts);
        }

        match queue.pop_timeout(PIPELINE_POLL_TIMEOUT) {
            Some(packet) => {
                last_ts = packet.ts_usec;
                pipeline.ingest_packet(packet);
            }
            None => {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
            }
        }

        pipeline.record_capture_drop(queue.dropped_total());
        pipeline.tick(last_ts);
        publish(&mut pipeline, last_ts, &snapshot);

        if shutdown.load(Ordering::Relaxed) && queue.pop_timeout(Duration::from_millis(0)).is_none() {
            break;
        }
    }
    info!("pipeline thread stopped");
}

fn apply_control_command(pipeline: &mut Pipeline, command: ControlCommand, last_ts: &mut TsUsec) {
    match command {
        ControlCommand::SetMode(mode, ts) => {
            pipeline.set_mode(mode, ts);
            *last_ts = ts;
        }
        ControlCommand::ManualToggle(ts) => {
            pipeline.manual_toggle(ts);
            *last_ts = ts;
        }
        ControlCommand::ArchiveNow(ts) => {
            pipeline.archive_now(ts);
            *last_ts = ts;
        }
        ControlCommand::ResetFame => pipeline.reset_fame(),
        ControlCommand::SeedSelf(name, id) => pipeline.seed_self(name, id),
    }
}

fn publish(pipeline: &mut Pipeline, now: TsUsec, snapshot: &Mutex<Arc<EngineSnapshot>>) {
    let view = pipeline.snapshot(now);
    let metrics = pipeline.metrics();
    let published = Arc::new(EngineSnapshot { view, metrics });
    match snapshot.lock() {
        Ok(mut guard) => *guard = published,
        Err(poisoned) => *poisoned.into_inner() = published,
    }
}
