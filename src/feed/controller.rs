use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use super::buffer::RollingBuffer;
use super::settings::FeedSettings;
use super::status::{ConnectionStatus, CycleOutcome, FeedSnapshot, FeedStatus};
use crate::clock::Clock;
use crate::detect::{BackendStats, InferenceError, SharedBackend};
use crate::detection::{top_k, Detection, FeatureVectors, RawDetection};
use crate::frame::{FrameSource, StillImage};

struct FeedState {
    buffer: RollingBuffer,
    status: FeedStatus,
    /// Capture time of the last inference call that came back with a reply.
    last_request_ms: Option<u64>,
    vectors: FeatureVectors,
    backend_stats: BackendStats,
}

/// Clears the in-flight flag when the cycle ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Detection feed controller.
///
/// Samples a frame source, runs one inference call per poll cycle and keeps a
/// bounded, freshness-pruned, most-recent-first buffer of detections. Shared
/// between the poll worker, the sweep worker and the API via `Arc`.
///
/// The controller MUST NOT:
/// - Persist frames or detections
/// - Issue more than one inference call at a time
pub struct FeedController {
    settings: FeedSettings,
    source: Mutex<Box<dyn FrameSource>>,
    backend: SharedBackend,
    backend_name: &'static str,
    clock: Arc<dyn Clock>,
    state: Mutex<FeedState>,
    in_flight: AtomicBool,
}

impl FeedController {
    pub fn new(
        settings: FeedSettings,
        source: Box<dyn FrameSource>,
        backend: SharedBackend,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        settings.validate()?;
        let (backend_name, backend_stats) = {
            let backend = backend
                .lock()
                .map_err(|_| anyhow!("backend lock poisoned"))?;
            (backend.name(), backend.stats())
        };
        let state = FeedState {
            buffer: RollingBuffer::new(settings.buffer_capacity),
            status: FeedStatus::default(),
            last_request_ms: None,
            vectors: FeatureVectors::new(settings.vector_seed),
            backend_stats,
        };
        Ok(Self {
            settings,
            source: Mutex::new(source),
            backend,
            backend_name,
            clock,
            state: Mutex::new(state),
            in_flight: AtomicBool::new(false),
        })
    }

    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    /// Connect the frame source and run the backend connection test once.
    ///
    /// Failure leaves the controller in `Error` until `connect()` is called again.
    pub fn connect(&self) -> Result<ConnectionStatus> {
        self.lock_state()?.status.connection = ConnectionStatus::Testing;

        let source_result = {
            let mut source = self.lock_source()?;
            let name = source.name().to_string();
            source
                .connect()
                .map_err(|e| format!("frame source {} unavailable: {:#}", name, e))
        };
        let result = source_result.and_then(|_| {
            let mut backend = self
                .backend
                .lock()
                .map_err(|_| "backend lock poisoned".to_string())?;
            match backend.test_connection() {
                Ok(true) => Ok(()),
                Ok(false) => Err(format!(
                    "{} connection test failed: unexpected reply",
                    self.backend_name
                )),
                Err(e) => Err(format!("{} connection test failed: {}", self.backend_name, e)),
            }
        });

        let mut state = self.lock_state()?;
        let status = match result {
            Ok(()) => {
                log::info!("feed connected (backend={})", self.backend_name);
                state.status.last_error = None;
                ConnectionStatus::Connected
            }
            Err(message) => {
                log::error!("feed initialization failed: {}", message);
                state.status.last_error = Some(message);
                ConnectionStatus::Error
            }
        };
        state.status.connection = status;
        Ok(status)
    }

    /// One poll cycle: sample, maybe infer, merge, truncate.
    pub fn poll_cycle(&self) -> Result<CycleOutcome> {
        if self.lock_state()?.status.connection != ConnectionStatus::Connected {
            return Ok(CycleOutcome::NotConnected);
        }

        let mut source = self.lock_source()?;
        if source.is_stopped() {
            return Ok(CycleOutcome::SourceStopped);
        }
        if !source.dimensions().is_ready() {
            return Ok(CycleOutcome::NoFrame);
        }
        let captured_at = self.clock.now_ms();
        if self.throttled(captured_at)? {
            return Ok(CycleOutcome::Throttled);
        }
        let Some(_in_flight) = InFlightGuard::acquire(&self.in_flight) else {
            return Ok(CycleOutcome::InFlight);
        };

        let frame = source.rasterize(self.settings.still_width, self.settings.still_height);
        drop(source);

        let still = frame.and_then(|rgb| {
            StillImage::encode(&rgb, self.settings.jpeg_quality, captured_at)
        });
        let still = match still {
            Ok(still) => still,
            Err(e) => {
                let message = format!("frame capture failed: {:#}", e);
                log::warn!("{}", message);
                let mut state = self.lock_state()?;
                state.status.last_error = Some(message.clone());
                self.finish_cycle(&mut state);
                return Ok(CycleOutcome::Failed { message });
            }
        };

        {
            let mut state = self.lock_state()?;
            state.status.frame_count += 1;
            state.status.loading = true;
        }

        let started = Instant::now();
        let (result, stats) = {
            let mut backend = self
                .backend
                .lock()
                .map_err(|_| anyhow!("backend lock poisoned"))?;
            (backend.analyze(&still), backend.stats())
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        let mut state = self.lock_state()?;
        state.status.loading = false;
        state.status.last_inference_ms = Some(latency_ms);
        state.backend_stats = stats;
        let outcome = self.merge(&mut state, result, captured_at);
        self.finish_cycle(&mut state);
        log::debug!(
            "poll cycle: {:?} buffer={}/{} latency={}ms",
            outcome,
            state.buffer.len(),
            state.buffer.capacity(),
            latency_ms
        );
        Ok(outcome)
    }

    fn merge(
        &self,
        state: &mut FeedState,
        result: Result<Vec<RawDetection>, InferenceError>,
        captured_at: u64,
    ) -> CycleOutcome {
        match result {
            Ok(raws) => {
                state.last_request_ms = Some(captured_at);
                let added = raws.len();
                if added > 0 {
                    let range = &self.settings.confidence;
                    let batch: Vec<Detection> = raws
                        .into_iter()
                        .map(|raw| Detection::from_raw(raw, captured_at, range, &mut state.vectors))
                        .collect();
                    state.buffer.prepend(batch);
                    state.status.last_error = None;
                }
                CycleOutcome::Completed { added }
            }
            Err(err) if err.is_malformed() => {
                state.last_request_ms = Some(captured_at);
                log::warn!("inference reply ignored: {}", err);
                CycleOutcome::Completed { added: 0 }
            }
            Err(err) => {
                log::warn!("inference failed ({}): {}", err.class(), err);
                let message = err.to_string();
                state.status.last_error = Some(message.clone());
                CycleOutcome::Failed { message }
            }
        }
    }

    fn finish_cycle(&self, state: &mut FeedState) {
        let dropped = state.buffer.truncate();
        if dropped > 0 {
            log::debug!("buffer truncated: {} dropped", dropped);
        }
        state.status.cycles_completed += 1;
    }

    fn throttled(&self, now_ms: u64) -> Result<bool> {
        let spacing_ms = self.settings.min_request_spacing.as_millis() as u64;
        if spacing_ms == 0 {
            return Ok(false);
        }
        let last = self.lock_state()?.last_request_ms;
        Ok(matches!(last, Some(last) if now_ms.saturating_sub(last) < spacing_ms))
    }

    /// Evict detections past the age horizon. Returns how many were evicted.
    pub fn sweep(&self) -> Result<usize> {
        let now = self.clock.now_ms();
        let mut state = self.lock_state()?;
        let evicted = state.buffer.sweep(now, self.settings.max_age);
        if evicted > 0 {
            log::debug!("sweep evicted {} detection(s)", evicted);
        }
        Ok(evicted)
    }

    /// Restore previously exported detections, most recent first. Entries
    /// beyond the buffer capacity are dropped from the tail.
    pub fn preload(&self, entries: Vec<Detection>) -> Result<()> {
        let dropped = self.lock_state()?.buffer.preload(entries);
        if dropped > 0 {
            log::debug!("preload truncated: {} dropped", dropped);
        }
        Ok(())
    }

    /// Full buffer, most recent first.
    pub fn detections(&self) -> Result<Vec<Detection>> {
        Ok(self.lock_state()?.buffer.snapshot())
    }

    /// Display top K in display order.
    pub fn display(&self) -> Result<Vec<Detection>> {
        let state = self.lock_state()?;
        Ok(top_k(state.buffer.iter(), self.settings.display_limit)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn status(&self) -> Result<FeedStatus> {
        Ok(self.lock_state()?.status.clone())
    }

    pub fn snapshot(&self) -> Result<FeedSnapshot> {
        let state = self.lock_state()?;
        let detections = top_k(state.buffer.iter(), self.settings.display_limit)
            .into_iter()
            .cloned()
            .collect();
        Ok(FeedSnapshot {
            backend: self.backend_name.to_string(),
            detections,
            total: state.buffer.len(),
            status: state.status.clone(),
            backend_stats: state.backend_stats.clone(),
        })
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, FeedState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("feed state lock poisoned"))
    }

    fn lock_source(&self) -> Result<MutexGuard<'_, Box<dyn FrameSource>>> {
        self.source
            .lock()
            .map_err(|_| anyhow!("frame source lock poisoned"))
    }
}
