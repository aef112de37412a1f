//! Stream lifecycle manager.
//!
//! Owns the `Stopped -> Loading -> Running -> Stopped` state machine and the
//! single background capture thread. The control surface calls
//! `request_start`, `stop` and `status` from any thread; the capture thread
//! reports progress through the same shared status.
//!
//! At most one capture resource exists at a time: `request_start` always
//! stops and joins the previous thread (which drops its stream) before the
//! next device is opened. Status changes are made under one mutex, so a
//! reader never sees a state without its matching device.

use anyhow::{anyhow, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::ingest::CameraProvider;
use crate::pipeline::{CapturePipeline, LoopExit};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StreamState {
    #[default]
    Stopped,
    Loading,
    Running,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Loading => write!(f, "loading"),
            Self::Running => write!(f, "running"),
        }
    }
}

/// Snapshot of the manager's state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamStatus {
    pub state: StreamState,
    /// Device the running loop is bound to. Set only while `Running`.
    pub active_device: Option<String>,
    /// Device being opened while `Loading`.
    pub requested_device: Option<String>,
    /// Frames processed by the current (or last) stream.
    pub frames_processed: u64,
    /// Frames that produced a control signal.
    pub signals_emitted: u64,
    /// Why the last start failed, if it did.
    pub last_error: Option<String>,
}

struct SharedStatus {
    status: StreamStatus,
    /// Bumped on every start; updates from an older capture thread are ignored.
    generation: u64,
}

struct Shared {
    inner: Mutex<SharedStatus>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SharedStatus> {
        // Status is plain data; a panic mid-update cannot leave it inconsistent.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply `change` if `generation` is still current.
    fn update(&self, generation: u64, change: impl FnOnce(&mut StreamStatus)) {
        let mut guard = self.lock();
        if guard.generation != generation {
            return;
        }
        change(&mut guard.status);
        drop(guard);
        self.changed.notify_all();
    }
}

struct Worker {
    device: String,
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

pub struct StreamManager {
    camera: Arc<dyn CameraProvider>,
    pipeline: Arc<CapturePipeline>,
    shared: Arc<Shared>,
    /// Serializes start/stop; holds the current capture thread.
    control: Mutex<Option<Worker>>,
}

impl StreamManager {
    pub fn new(camera: Arc<dyn CameraProvider>, pipeline: CapturePipeline) -> Self {
        Self {
            camera,
            pipeline: Arc::new(pipeline),
            shared: Arc::new(Shared {
                inner: Mutex::new(SharedStatus {
                    status: StreamStatus::default(),
                    generation: 0,
                }),
                changed: Condvar::new(),
            }),
            control: Mutex::new(None),
        }
    }

    /// Current status. Only takes the status lock, never waits on the capture thread.
    pub fn status(&self) -> StreamStatus {
        self.shared.lock().status.clone()
    }

    /// Stop any current stream, then start capturing from `device` in the background.
    ///
    /// Returns once the new capture thread is spawned; the state is
    /// `Loading` until the first frame arrives. Open or warm-up failures
    /// are reported through `status().last_error` and leave the manager
    /// `Stopped`.
    pub fn request_start(&self, device: &str) -> Result<()> {
        let device = device.trim();
        if device.is_empty() {
            return Err(anyhow!("device identifier must not be empty"));
        }

        let mut control = self.lock_control()?;
        self.stop_locked(&mut control)?;

        let generation = {
            let mut guard = self.shared.lock();
            guard.generation += 1;
            guard.status = StreamStatus {
                state: StreamState::Loading,
                requested_device: Some(device.to_string()),
                ..StreamStatus::default()
            };
            guard.generation
        };
        self.shared.changed.notify_all();
        log::info!("stream loading: {}", device);

        let stop = Arc::new(AtomicBool::new(false));
        let task = CaptureTask {
            device: device.to_string(),
            generation,
            stop: stop.clone(),
            camera: self.camera.clone(),
            pipeline: self.pipeline.clone(),
            shared: self.shared.clone(),
        };
        let spawned = std::thread::Builder::new()
            .name("capture-loop".to_string())
            .spawn(move || task.run());
        let join = match spawned {
            Ok(join) => join,
            Err(err) => {
                self.shared.update(generation, |status| {
                    status.state = StreamState::Stopped;
                    status.requested_device = None;
                    status.last_error = Some(format!("failed to spawn capture thread: {}", err));
                });
                return Err(anyhow!("failed to spawn capture thread: {}", err));
            }
        };
        *control = Some(Worker {
            device: device.to_string(),
            stop,
            join,
        });
        Ok(())
    }

    /// Stop the current stream and wait until its device is released.
    ///
    /// A no-op when already stopped.
    pub fn stop(&self) -> Result<()> {
        let mut control = self.lock_control()?;
        self.stop_locked(&mut control)
    }

    /// Block until `predicate` holds for the status or `timeout` elapses.
    ///
    /// Returns the matching status, or `None` on timeout.
    pub fn wait_for(
        &self,
        timeout: Duration,
        mut predicate: impl FnMut(&StreamStatus) -> bool,
    ) -> Option<StreamStatus> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.shared.lock();
        loop {
            if predicate(&guard.status) {
                return Some(guard.status.clone());
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            guard = match self.shared.changed.wait_timeout(guard, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn lock_control(&self) -> Result<MutexGuard<'_, Option<Worker>>> {
        self.control
            .lock()
            .map_err(|_| anyhow!("stream control lock poisoned"))
    }

    fn stop_locked(&self, control: &mut Option<Worker>) -> Result<()> {
        let Some(worker) = control.take() else {
            return Ok(());
        };
        worker.stop.store(true, Ordering::SeqCst);
        let joined = worker.join.join();

        let generation = self.shared.lock().generation;
        self.shared.update(generation, |status| {
            status.state = StreamState::Stopped;
            status.active_device = None;
            status.requested_device = None;
        });
        log::info!("stream stopped: {}", worker.device);

        joined.map_err(|_| anyhow!("capture thread for {} panicked", worker.device))
    }
}

impl Drop for StreamManager {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::error!("failed to stop stream on shutdown: {}", err);
        }
    }
}

/// Everything the capture thread owns.
struct CaptureTask {
    device: String,
    generation: u64,
    stop: Arc<AtomicBool>,
    camera: Arc<dyn CameraProvider>,
    pipeline: Arc<CapturePipeline>,
    shared: Arc<Shared>,
}

impl CaptureTask {
    fn run(self) {
        let mut stream = match self.camera.open(&self.device) {
            Ok(stream) => stream,
            Err(err) => return self.fail(format!("could not open {}: {}", self.device, err)),
        };

        let first = match self.pipeline.warm_up(stream.as_mut(), &self.stop) {
            Ok(frame) => frame,
            Err(err) => {
                drop(stream);
                return self.fail(err.to_string());
            }
        };

        self.shared.update(self.generation, |status| {
            status.state = StreamState::Running;
            status.active_device = Some(self.device.clone());
            status.requested_device = None;
        });
        log::info!("stream running: {}", self.device);

        let exit = self
            .pipeline
            .run(stream.as_mut(), first, &self.stop, |outcome| {
                let emitted = outcome.emitted();
                self.shared.update(self.generation, |status| {
                    status.frames_processed += 1;
                    if emitted {
                        status.signals_emitted += 1;
                    }
                });
            });
        drop(stream);

        match &exit {
            LoopExit::Stopped => log::debug!("capture loop for {} observed stop", self.device),
            LoopExit::SourceEnded(reason) => {
                log::info!("stream {} ended: {}", self.device, reason)
            }
        }
        self.shared.update(self.generation, |status| {
            status.state = StreamState::Stopped;
            status.active_device = None;
        });
    }

    fn fail(&self, reason: String) {
        log::error!("stream start failed: {}", reason);
        self.shared.update(self.generation, |status| {
            status.state = StreamState::Stopped;
            status.active_device = None;
            status.requested_device = None;
            status.last_error = Some(reason);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{ScriptedBackend, SharedDetector};
    use crate::ingest::{V4l2Config, V4l2Provider};
    use crate::pipeline::PipelineSettings;
    use crate::transport::ControlSink;

    struct NullSink;

    impl ControlSink for NullSink {
        fn send(&self, _address: &str, _value: f32) -> Result<()> {
            Ok(())
        }
    }

    fn manager() -> StreamManager {
        let detector: SharedDetector = Arc::new(Mutex::new(ScriptedBackend::synthetic()));
        let settings = PipelineSettings {
            warmup_delay: Duration::ZERO,
            ..PipelineSettings::default()
        };
        let pipeline = CapturePipeline::new(settings, detector, Arc::new(NullSink));
        let camera = V4l2Provider::new(V4l2Config {
            device: String::new(),
            target_fps: 200,
            width: 32,
            height: 24,
        });
        StreamManager::new(Arc::new(camera), pipeline)
    }

    #[test]
    fn starts_stopped_and_stop_is_idempotent() -> Result<()> {
        let manager = manager();
        assert_eq!(manager.status(), StreamStatus::default());
        manager.stop()?;
        manager.stop()?;
        assert_eq!(manager.status().state, StreamState::Stopped);
        Ok(())
    }

    #[test]
    fn stub_stream_runs_and_stops() -> Result<()> {
        let manager = manager();
        manager.request_start("stub://hands")?;
        let running = manager
            .wait_for(Duration::from_secs(5), |s| s.state == StreamState::Running)
            .expect("stream running");
        assert_eq!(running.active_device.as_deref(), Some("stub://hands"));

        manager
            .wait_for(Duration::from_secs(5), |s| s.signals_emitted >= 3)
            .expect("signals emitted");

        manager.stop()?;
        let status = manager.status();
        assert_eq!(status.state, StreamState::Stopped);
        assert_eq!(status.active_device, None);
        Ok(())
    }

    #[test]
    fn refused_device_reports_error() -> Result<()> {
        let manager = manager();
        manager.request_start("stub://fail")?;
        let status = manager
            .wait_for(Duration::from_secs(5), |s| s.last_error.is_some())
            .expect("start failure reported");
        assert_eq!(status.state, StreamState::Stopped);
        assert_eq!(status.active_device, None);
        Ok(())
    }

    #[test]
    fn empty_device_is_rejected() {
        let manager = manager();
        assert!(manager.request_start("  ").is_err());
        assert_eq!(manager.status().state, StreamState::Stopped);
    }
}
