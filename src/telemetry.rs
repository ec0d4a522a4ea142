//! Telemetry worker.
//!
//! A dedicated OS thread (`uvc-telemetry`) that runs while the session is
//! streaming. Each loop it:
//!
//! 1. Sleeps one poll interval, then exits if the session's running flag is clear.
//! 2. Snapshots [`ControlParameters`] under the session lock.
//! 3. Optionally runs a tracking tick: estimate, select, PD update, then emit
//!    `face` and `telemetry`.
//! 4. Once per report interval drains the frame counters and emits `stream`.
//!
//! The poll interval bounds how long `stop` waits for the join.

use crate::config::MAX_POLL_INTERVAL_MS;
use crate::control::{ControlParameters, PdController, TargetEstimator};
use crate::events::{
    EventEmitter, FacePayload, SessionEvent, StateStatus, StreamPayload, TelemetryPayload,
};
use crate::frame_buffer::{CounterSnapshot, FrameBuffer};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Name given to the worker thread.
pub const WORKER_THREAD_NAME: &str = "uvc-telemetry";

/// Shortest poll interval; zero would spin on the session lock.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Longest poll interval, so `stop` observes the running flag promptly.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_millis(MAX_POLL_INTERVAL_MS);

/// Estimator shared between the session (which owns it across runs) and the
/// worker (which drives it while running).
pub type SharedEstimator = Arc<Mutex<Box<dyn TargetEstimator>>>;

/// Timing and labelling for one worker run.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySettings {
    pub poll_interval: Duration,
    pub report_interval: Duration,
    /// `source` field of `stream` events.
    pub source: String,
    /// Tracking tick interval; `None` disables the tracking path.
    pub tracking_tick: Option<Duration>,
}

impl TelemetrySettings {
    /// Clamp the poll interval into `MIN_POLL_INTERVAL..=MAX_POLL_INTERVAL` and
    /// keep the report interval no shorter than the poll interval.
    pub fn bounded(mut self) -> Self {
        let requested = self.poll_interval;
        self.poll_interval = requested.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
        if self.poll_interval != requested {
            tracing::warn!(
                requested_ms = requested.as_millis() as u64,
                poll_ms = self.poll_interval.as_millis() as u64,
                "Poll interval out of range, clamped"
            );
        }
        self.report_interval = self.report_interval.max(self.poll_interval);
        self
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(40),
            report_interval: Duration::from_millis(1000),
            source: "uvc".to_string(),
            tracking_tick: None,
        }
    }
}

/// What the worker needs from the session that owns it.
pub trait SessionLink: Send + Sync + 'static {
    /// Whether the worker should keep looping.
    fn keep_running(&self) -> bool;

    /// Consistent copy of the control parameters, taken under the session lock.
    fn control_snapshot(&self) -> ControlParameters;

    fn frames(&self) -> &FrameBuffer;

    fn emitter(&self) -> &EventEmitter;
}

/// Kilobits per second for `bytes` observed over `elapsed`.
pub fn kbps(bytes: u64, elapsed: Duration) -> f64 {
    let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
    if elapsed_ms <= 0.0 {
        return 0.0;
    }
    (bytes as f64 * 8.0) / elapsed_ms
}

/// One throughput reporting window.
#[derive(Debug, Clone, Copy)]
pub struct ThroughputWindow {
    started: Instant,
}

impl ThroughputWindow {
    /// Window opened at `now`.
    pub fn new(now: Instant) -> Self {
        Self { started: now }
    }

    /// Whether `interval` has elapsed since the window opened.
    pub fn is_due(&self, now: Instant, interval: Duration) -> bool {
        now.saturating_duration_since(self.started) >= interval
    }

    /// Close the window at `now` with the drained counters and open the next one.
    pub fn close(
        &mut self,
        now: Instant,
        counters: CounterSnapshot,
        source: &str,
    ) -> StreamPayload {
        let elapsed = now.saturating_duration_since(self.started);
        self.started = now;
        StreamPayload {
            frames: counters.frames,
            bytes: counters.bytes,
            kbps: kbps(counters.bytes, elapsed),
            source: source.to_string(),
        }
    }
}

/// Tracking tick state for one worker run.
struct TrackingLoop {
    estimator: SharedEstimator,
    controller: PdController,
    interval: Duration,
    tick: u64,
    last_tick: Option<Instant>,
}

impl TrackingLoop {
    fn new(estimator: SharedEstimator, interval: Duration) -> Self {
        Self {
            estimator,
            controller: PdController::new(),
            interval,
            tick: 0,
            last_tick: None,
        }
    }

    fn is_due(&self, now: Instant) -> bool {
        self.last_tick
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval)
    }

    fn step(&mut self, now: Instant, params: &ControlParameters, emitter: &EventEmitter) {
        let dt = self
            .last_tick
            .map_or(self.interval, |last| now.saturating_duration_since(last));
        self.last_tick = Some(now);

        let started = Instant::now();
        let candidates = self.estimator.lock().estimate(self.tick);
        let latency = started.elapsed();
        self.tick += 1;

        let Some(target) = params.target_policy.select(&candidates) else {
            self.controller.reset();
            return;
        };

        let actuation = self.controller.update(target, &params.gains, dt);
        let fps = if dt.is_zero() {
            0.0
        } else {
            1.0 / dt.as_secs_f64()
        };

        emitter.emit(SessionEvent::Face(FacePayload {
            x: target.x,
            y: target.y,
            w: target.w,
            h: target.h,
            score: target.score,
        }));
        emitter.emit(SessionEvent::Telemetry(TelemetryPayload {
            fps,
            latency_ms: latency.as_secs_f64() * 1000.0,
            pan: actuation.pan,
            tilt: actuation.tilt,
        }));
    }
}

/// Background loop emitting throughput (and optionally tracking) telemetry.
pub struct TelemetryWorker {
    link: Arc<dyn SessionLink>,
    settings: TelemetrySettings,
    tracking: Option<TrackingLoop>,
}

impl TelemetryWorker {
    /// Build a worker. Tracking runs only if both a tick interval and an
    /// estimator are supplied.
    pub fn new(
        link: Arc<dyn SessionLink>,
        settings: TelemetrySettings,
        estimator: Option<SharedEstimator>,
    ) -> Self {
        let tracking = match (settings.tracking_tick, estimator) {
            (Some(interval), Some(estimator)) => Some(TrackingLoop::new(estimator, interval)),
            _ => None,
        };
        Self {
            link,
            settings,
            tracking,
        }
    }

    /// Spawn the worker on a named OS thread.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || self.run())
    }

    fn run(mut self) {
        let emitter = self.link.emitter().clone();
        tracing::info!(
            poll_ms = self.settings.poll_interval.as_millis() as u64,
            report_ms = self.settings.report_interval.as_millis() as u64,
            tracking = self.tracking.is_some(),
            "Telemetry worker started"
        );
        emitter.state(StateStatus::Running, "Telemetry worker started.");

        let mut window = ThroughputWindow::new(Instant::now());
        loop {
            thread::sleep(self.settings.poll_interval);
            if !self.link.keep_running() {
                break;
            }

            let params = self.link.control_snapshot();
            let now = Instant::now();

            if let Some(tracking) = self.tracking.as_mut() {
                if tracking.is_due(now) {
                    tracking.step(now, &params, &emitter);
                }
            }

            if window.is_due(now, self.settings.report_interval) {
                let counters = self.link.frames().drain_counters();
                let payload = window.close(now, counters, &self.settings.source);
                tracing::debug!(
                    frames = payload.frames,
                    bytes = payload.bytes,
                    kbps = payload.kbps,
                    "Throughput window"
                );
                emitter.emit(SessionEvent::Stream(payload));
            }
        }

        tracing::info!("Telemetry worker stopped");
        emitter.state(StateStatus::Connected, "Telemetry worker stopped.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{FaceObservation, PidGains, SyntheticTrajectory};
    use crate::driver::RawFrame;
    use crate::events::{CollectingSink, EventKind};
    use crate::profile::PixelFormat;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn kbps_is_bits_per_millisecond() {
        assert_eq!(kbps(125_000, Duration::from_secs(1)), 1000.0);
        assert_eq!(kbps(30_000, Duration::from_millis(500)), 480.0);
        assert_eq!(kbps(1_000, Duration::ZERO), 0.0);
    }

    #[test]
    fn settings_bound_the_poll_interval() {
        let slow = TelemetrySettings {
            poll_interval: Duration::from_millis(1500),
            ..TelemetrySettings::default()
        }
        .bounded();
        assert_eq!(slow.poll_interval, MAX_POLL_INTERVAL);
        assert_eq!(slow.report_interval, Duration::from_millis(1000));

        let spinning = TelemetrySettings {
            poll_interval: Duration::ZERO,
            report_interval: Duration::ZERO,
            ..TelemetrySettings::default()
        }
        .bounded();
        assert_eq!(spinning.poll_interval, MIN_POLL_INTERVAL);
        assert_eq!(spinning.report_interval, MIN_POLL_INTERVAL);

        let defaults = TelemetrySettings::default();
        assert_eq!(defaults.clone().bounded(), defaults);
    }

    #[test]
    fn window_reopens_on_close() {
        let t0 = Instant::now();
        let mut window = ThroughputWindow::new(t0);
        let interval = Duration::from_secs(1);
        assert!(!window.is_due(t0 + Duration::from_millis(999), interval));
        assert!(window.is_due(t0 + interval, interval));

        let payload = window.close(
            t0 + Duration::from_secs(2),
            CounterSnapshot {
                frames: 60,
                bytes: 250_000,
            },
            "uvc",
        );
        assert_eq!(payload.frames, 60);
        assert_eq!(payload.kbps, 1000.0);
        assert_eq!(payload.source, "uvc");
        assert!(!window.is_due(t0 + Duration::from_secs(2), interval));
    }

    struct TestLink {
        running: AtomicBool,
        params: Mutex<ControlParameters>,
        frames: FrameBuffer,
        emitter: EventEmitter,
    }

    impl SessionLink for TestLink {
        fn keep_running(&self) -> bool {
            self.running.load(Ordering::Acquire)
        }

        fn control_snapshot(&self) -> ControlParameters {
            *self.params.lock()
        }

        fn frames(&self) -> &FrameBuffer {
            &self.frames
        }

        fn emitter(&self) -> &EventEmitter {
            &self.emitter
        }
    }

    fn test_link(sink: Arc<CollectingSink>) -> Arc<TestLink> {
        Arc::new(TestLink {
            running: AtomicBool::new(true),
            params: Mutex::new(ControlParameters::default()),
            frames: FrameBuffer::new(),
            emitter: EventEmitter::new(sink),
        })
    }

    fn fast_settings(tracking_tick: Option<Duration>) -> TelemetrySettings {
        TelemetrySettings {
            poll_interval: Duration::from_millis(5),
            report_interval: Duration::from_millis(50),
            source: "test".into(),
            tracking_tick,
        }
    }

    #[test]
    fn worker_reports_throughput_and_lifecycle() {
        let sink = Arc::new(CollectingSink::new());
        let link = test_link(sink.clone());
        for _ in 0..4 {
            link.frames
                .ingest(&RawFrame::new(&[0u8; 250], 16, 8, PixelFormat::Mjpeg));
        }

        let handle = TelemetryWorker::new(link.clone(), fast_settings(None), None)
            .spawn()
            .unwrap();
        thread::sleep(Duration::from_millis(120));
        link.running.store(false, Ordering::Release);
        handle.join().unwrap();

        let states = sink.states();
        assert_eq!(states.first().unwrap().status, StateStatus::Running);
        assert_eq!(states.last().unwrap().status, StateStatus::Connected);

        let streams = sink.streams();
        assert!(!streams.is_empty());
        assert_eq!(streams[0].frames, 4);
        assert_eq!(streams[0].bytes, 1000);
        assert_eq!(streams[0].source, "test");
        assert!(sink.faces().is_empty());
    }

    #[test]
    fn tracking_tick_emits_face_then_telemetry() {
        let sink = Arc::new(CollectingSink::new());
        let link = test_link(sink.clone());
        *link.params.lock() = ControlParameters {
            gains: PidGains::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0),
            ..Default::default()
        };
        let estimator: SharedEstimator =
            Arc::new(Mutex::new(Box::new(SyntheticTrajectory::default())));

        let handle = TelemetryWorker::new(
            link.clone(),
            fast_settings(Some(Duration::from_millis(10))),
            Some(estimator),
        )
        .spawn()
        .unwrap();
        thread::sleep(Duration::from_millis(100));
        link.running.store(false, Ordering::Release);
        handle.join().unwrap();

        let kinds: Vec<EventKind> = sink.events().iter().map(|e| e.kind).collect();
        let first_face = kinds.iter().position(|k| *k == EventKind::Face).unwrap();
        assert_eq!(kinds[first_face + 1], EventKind::Telemetry);

        // Pure proportional law: pan = -(x - 0.5)
        let faces = sink.faces();
        let face = FaceObservation {
            x: faces[0].x,
            y: faces[0].y,
            w: faces[0].w,
            h: faces[0].h,
            score: faces[0].score,
        };
        let telemetry = sink.telemetry();
        let telemetry = &telemetry[0];
        assert!((telemetry.pan + (face.x - 0.5)).abs() < 1e-6);
        assert!((telemetry.tilt + (face.y - 0.5)).abs() < 1e-6);
        assert!(telemetry.fps > 0.0);
    }
}
