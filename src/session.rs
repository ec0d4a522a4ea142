//! Device session state machine.
//!
//! [`DeviceSession`] owns the device handle, the driver's stream context and the
//! control parameters, and orchestrates the lifecycle:
//!
//! ```text
//! Idle --attach--> Ready --start--> Streaming --stop--> Ready --detach/dispose--> Idle
//! ```
//!
//! `Error` is reachable from any transition. It is reported through the event
//! sink and is not terminal: the session stays usable for retry.
//!
//! # Locking
//!
//! - The session lock (`SessionShared::core`) guards handle, context, parameters
//!   and state. The telemetry worker takes it briefly to snapshot parameters.
//! - The frame lock lives inside [`FrameBuffer`] and is only ever taken by the
//!   driver callback and frame getters, so frame delivery never waits on
//!   session operations.
//! - The worker lock serialises start/stop/detach/dispose. It is always taken
//!   before the session lock, and the worker is joined without holding the
//!   session lock.
//!
//! An atomic running flag is checked before any lock so repeated `start`/`stop`
//! calls return immediately.
//!
//! Every public operation returns `bool`. Failures are reported as a `state`
//! event with `status = "error"` and never escape as `Err`.

use crate::config::TrackerConfig;
use crate::control::{
    ControlParameters, PidGains, SyntheticTrajectory, TargetEstimator, TargetPolicy,
};
use crate::device::DeviceHandle;
use crate::driver::{DeviceDriver, FrameCallback, RawFrame, StreamContext};
use crate::error::{AppResult, SessionError};
use crate::events::{EventEmitter, EventSink, SessionEvent, StateStatus, TelemetryPayload};
use crate::frame_buffer::{FrameBuffer, FrameSnapshot};
use crate::negotiator::FormatNegotiator;
use crate::profile::StreamProfile;
use crate::telemetry::{SessionLink, SharedEstimator, TelemetrySettings, TelemetryWorker};
use crate::uvc::PanTiltCommand;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Lifecycle state of a [`DeviceSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No handle attached.
    #[default]
    Idle,
    /// Handle attached; a context may or may not exist.
    Ready,
    /// Context armed, frames flowing, worker running.
    Streaming,
    /// The last transition failed. The session remains usable.
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Idle => "idle",
            SessionState::Ready => "ready",
            SessionState::Streaming => "streaming",
            SessionState::Error => "error",
        };
        f.write_str(label)
    }
}

/// State guarded by the session lock.
struct SessionCore {
    handle: DeviceHandle,
    context: Option<Box<dyn StreamContext>>,
    /// Profile the context is delivering; `Some` means armed.
    active_profile: Option<StreamProfile>,
    params: ControlParameters,
    state: SessionState,
}

impl SessionCore {
    fn new(params: ControlParameters) -> Self {
        Self {
            handle: DeviceHandle::none(),
            context: None,
            active_profile: None,
            params,
            state: SessionState::Idle,
        }
    }

    /// Stop delivery and release the context. Failures are logged and swallowed.
    fn teardown_context(&mut self) {
        let armed = self.active_profile.take().is_some();
        if let Some(mut context) = self.context.take() {
            if armed {
                if let Err(e) = context.stop_streaming() {
                    tracing::warn!(error = %e, "Failed to stop stream during teardown");
                }
            }
            if let Err(e) = context.close() {
                tracing::warn!(error = %e, "Failed to close stream context");
            }
        }
    }
}

/// State shared with the telemetry worker.
struct SessionShared {
    core: Mutex<SessionCore>,
    frames: Arc<FrameBuffer>,
    running: AtomicBool,
    /// Ingest gate read by the frame callback.
    streaming: Arc<AtomicBool>,
    emitter: EventEmitter,
}

impl SessionLink for SessionShared {
    fn keep_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn control_snapshot(&self) -> ControlParameters {
        self.core.lock().params
    }

    fn frames(&self) -> &FrameBuffer {
        &self.frames
    }

    fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }
}

type WorkerSlot = Option<JoinHandle<()>>;

/// Session manager for one USB video device.
///
/// # Thread Safety
///
/// All operations take `&self` and may be called concurrently from any thread.
pub struct DeviceSession {
    shared: Arc<SessionShared>,
    driver: Arc<dyn DeviceDriver>,
    negotiator: FormatNegotiator,
    settings: TelemetrySettings,
    estimator: Option<SharedEstimator>,
    worker: Mutex<WorkerSlot>,
}

impl DeviceSession {
    /// Start building a session over `driver`, reporting to `sink`.
    pub fn builder(
        driver: Arc<dyn DeviceDriver>,
        sink: Arc<dyn EventSink>,
    ) -> DeviceSessionBuilder {
        DeviceSessionBuilder::new(driver, sink)
    }

    /// Session with default preferences, timing and parameters.
    pub fn new(driver: Arc<dyn DeviceDriver>, sink: Arc<dyn EventSink>) -> Self {
        Self::builder(driver, sink).build()
    }

    /// Announce readiness to the host.
    pub fn init(&self) -> bool {
        tracing::info!(driver = self.driver.name(), "Session initialized");
        self.shared
            .emitter
            .state(StateStatus::Ready, "Native tracker initialized.");
        true
    }

    /// Attach an already-opened device and build a stream context for it.
    pub fn attach(&self, descriptor: i32, vendor_id: u16, product_id: u16) -> bool {
        let handle = DeviceHandle::new(descriptor, vendor_id, product_id);
        let mut worker = self.worker.lock();
        self.stop_worker(&mut worker);

        let result = {
            let mut core = self.shared.core.lock();
            core.teardown_context();
            self.shared.frames.reset();

            if !handle.is_valid() {
                core.handle = DeviceHandle::none();
                core.state = SessionState::Idle;
                Err(SessionError::NoDeviceAttached)
            } else {
                core.handle = handle;
                match self.driver.open(&handle) {
                    Ok(context) => {
                        core.context = Some(context);
                        core.state = SessionState::Ready;
                        Ok(())
                    }
                    Err(e) => {
                        core.state = SessionState::Error;
                        Err(SessionError::DriverInitFailure(format!("{e:#}")))
                    }
                }
            }
        };
        drop(worker);

        match result {
            Ok(()) => {
                tracing::info!(%handle, driver = self.driver.name(), "USB device attached");
                self.shared
                    .emitter
                    .state(StateStatus::Connected, format!("USB attached ({handle})."));
                true
            }
            Err(e) => {
                self.report(&e);
                false
            }
        }
    }

    /// Negotiate a profile and arm frame delivery without starting the worker.
    pub fn activate(&self) -> bool {
        let result = {
            let mut core = self.shared.core.lock();
            if core.active_profile.is_some() {
                return true;
            }
            match self.arm(&mut core) {
                Ok(profile) => {
                    core.active_profile = Some(profile);
                    if core.state != SessionState::Streaming {
                        core.state = SessionState::Ready;
                    }
                    Ok(profile)
                }
                Err(e) => {
                    core.teardown_context();
                    if core.handle.is_valid() {
                        core.state = SessionState::Error;
                    }
                    Err(e)
                }
            }
        };

        match result {
            Ok(profile) => {
                tracing::info!(%profile, "UVC stream active");
                self.shared.emitter.state(
                    StateStatus::Connected,
                    format!(
                        "UVC stream active (profile={profile}, {}x{}@{}fps).",
                        profile.width, profile.height, profile.fps
                    ),
                );
                true
            }
            Err(e) => {
                self.report(&e);
                false
            }
        }
    }

    /// Activate if needed and spawn the telemetry worker.
    pub fn start(&self) -> bool {
        if self.shared.running.load(Ordering::Acquire) {
            return true;
        }

        let mut worker = self.worker.lock();
        if self.shared.running.load(Ordering::Acquire) {
            return true;
        }

        if !self.shared.core.lock().handle.is_valid() {
            drop(worker);
            self.report(&SessionError::NoDeviceAttached);
            return false;
        }
        if !self.activate() {
            return false;
        }

        self.shared.streaming.store(true, Ordering::Release);
        self.shared.running.store(true, Ordering::Release);

        let link: Arc<dyn SessionLink> = self.shared.clone();
        let spawned =
            TelemetryWorker::new(link, self.settings.clone(), self.estimator.clone()).spawn();

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                self.shared.core.lock().state = SessionState::Streaming;
                true
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                self.shared.streaming.store(false, Ordering::Release);
                drop(worker);
                self.report(&SessionError::WorkerSpawn(e));
                false
            }
        }
    }

    /// Stop the worker and wait for it to exit. The stream context stays armed.
    pub fn stop(&self) -> bool {
        if !self.shared.running.load(Ordering::Acquire) {
            return true;
        }
        let mut worker = self.worker.lock();
        self.stop_worker(&mut worker);
        true
    }

    /// Stop, tear down the context and forget the handle.
    pub fn detach(&self) -> bool {
        if self.release() {
            tracing::info!("USB device detached");
            self.shared
                .emitter
                .state(StateStatus::Idle, "USB device detached.");
        }
        true
    }

    /// Final teardown. Safe to call repeatedly.
    pub fn dispose(&self) -> bool {
        self.release();
        tracing::info!("Session disposed");
        self.shared
            .emitter
            .state(StateStatus::Idle, "Native tracker disposed.");
        true
    }

    /// Replace the PID gains. Seen by the worker's next iteration.
    pub fn set_control_parameters(&self, gains: PidGains) -> bool {
        self.shared.core.lock().params.gains = gains;
        tracing::debug!(?gains, "Control gains updated");
        true
    }

    /// Select the target policy by name.
    pub fn set_target_policy(&self, name: &str) -> bool {
        match name.parse::<TargetPolicy>() {
            Ok(policy) => {
                self.shared.core.lock().params.target_policy = policy;
                tracing::debug!(%policy, "Target policy updated");
                true
            }
            Err(e) => {
                self.report(&e);
                false
            }
        }
    }

    /// Direct pan/tilt request, bypassing the control loop.
    ///
    /// Echoes the request as a `telemetry`/`state` pair and forwards it to the
    /// driver when a context exists. Non-finite values are rejected.
    pub fn manual_control(&self, pan: f32, tilt: f32, duration_ms: i32) -> bool {
        if !pan.is_finite() || !tilt.is_finite() {
            self.report(&SessionError::InvalidManualControl { pan, tilt });
            return false;
        }
        let command = PanTiltCommand::new(pan, tilt, duration_ms);
        {
            let mut core = self.shared.core.lock();
            if let Some(context) = core.context.as_mut() {
                match context.set_pan_tilt(&command) {
                    Ok(true) => tracing::debug!(?command, "Pan/tilt forwarded to device"),
                    Ok(false) => tracing::debug!("Device has no pan/tilt control"),
                    Err(e) => tracing::warn!(error = %e, "Pan/tilt transfer failed"),
                }
            }
        }

        self.shared
            .emitter
            .emit(SessionEvent::Telemetry(TelemetryPayload {
                fps: 0.0,
                latency_ms: 0.0,
                pan: f64::from(pan),
                tilt: f64::from(tilt),
            }));
        self.shared.emitter.state(
            StateStatus::Connected,
            format!("Manual control pan={pan}, tilt={tilt}, durationMs={duration_ms}"),
        );
        true
    }

    /// Copy of the latest frame payload; `None` if nothing has been captured.
    pub fn latest_frame(&self) -> Option<Vec<u8>> {
        self.shared.frames.latest_frame()
    }

    /// Payload together with its dimensions and encoding.
    pub fn frame_snapshot(&self) -> Option<FrameSnapshot> {
        self.shared.frames.snapshot()
    }

    /// Width of the latest frame, 0 when empty.
    pub fn frame_width(&self) -> u32 {
        self.shared.frames.width()
    }

    /// Height of the latest frame, 0 when empty.
    pub fn frame_height(&self) -> u32 {
        self.shared.frames.height()
    }

    /// Encoding code of the latest frame: 0 none, 1 YUYV, 2 MJPEG.
    pub fn frame_encoding(&self) -> i32 {
        self.shared.frames.encoding().code()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.core.lock().state
    }

    /// Attached handle, or the invalid sentinel.
    pub fn handle(&self) -> DeviceHandle {
        self.shared.core.lock().handle
    }

    /// Negotiated profile while armed.
    pub fn active_profile(&self) -> Option<StreamProfile> {
        self.shared.core.lock().active_profile
    }

    /// Current gains and target policy.
    pub fn control_parameters(&self) -> ControlParameters {
        self.shared.core.lock().params
    }

    /// Whether the telemetry worker is running.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    // -------------------------------------------------------------------------

    /// Ensure a context exists, negotiate and start delivery.
    fn arm(&self, core: &mut SessionCore) -> AppResult<StreamProfile> {
        if !core.handle.is_valid() {
            return Err(SessionError::NoDeviceAttached);
        }
        if core.context.is_none() {
            let context = self
                .driver
                .open(&core.handle)
                .map_err(|e| SessionError::DriverInitFailure(format!("{e:#}")))?;
            core.context = Some(context);
        }
        let Some(context) = core.context.as_mut() else {
            return Err(SessionError::NoDeviceAttached);
        };

        let profile = self.negotiator.negotiate(&mut **context)?;
        context
            .start_streaming(&profile, self.frame_callback())
            .map_err(|e| SessionError::StreamStartFailure(format!("{e:#}")))?;
        Ok(profile)
    }

    /// Callback handed to the driver. Copies frames only while streaming.
    fn frame_callback(&self) -> FrameCallback {
        let frames = Arc::clone(&self.shared.frames);
        let gate = Arc::clone(&self.shared.streaming);
        Arc::new(move |frame: &RawFrame<'_>| {
            if gate.load(Ordering::Acquire) {
                frames.ingest(frame);
            }
        })
    }

    /// Clear the running flag and join the worker. Caller holds the worker lock.
    fn stop_worker(&self, worker: &mut WorkerSlot) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.shared.streaming.store(false, Ordering::Release);

        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                tracing::warn!("Telemetry worker panicked");
            }
        }

        // Drop whatever was counted after the last report
        self.shared.frames.drain_counters();
        let mut core = self.shared.core.lock();
        if core.state == SessionState::Streaming {
            core.state = SessionState::Ready;
        }
    }

    /// Stop, tear down and clear the handle. Returns whether anything was attached.
    fn release(&self) -> bool {
        let mut worker = self.worker.lock();
        self.stop_worker(&mut worker);

        let mut core = self.shared.core.lock();
        let was_attached = core.handle.is_valid() || core.context.is_some();
        core.teardown_context();
        core.handle = DeviceHandle::none();
        core.state = SessionState::Idle;
        self.shared.frames.reset();
        was_attached
    }

    fn report(&self, err: &SessionError) {
        tracing::warn!(kind = %err.kind(), error = %err, "Session operation failed");
        self.shared.emitter.state(StateStatus::Error, err.to_string());
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        let mut worker = self.worker.lock();
        self.shared.running.store(false, Ordering::Release);
        self.shared.streaming.store(false, Ordering::Release);
        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                tracing::warn!("Telemetry worker panicked");
            }
        }
        self.shared.core.lock().teardown_context();
    }
}

impl fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.shared.core.lock();
        f.debug_struct("DeviceSession")
            .field("driver", &self.driver.name())
            .field("state", &core.state)
            .field("handle", &core.handle)
            .field("active_profile", &core.active_profile)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Builder for [`DeviceSession`].
pub struct DeviceSessionBuilder {
    driver: Arc<dyn DeviceDriver>,
    sink: Arc<dyn EventSink>,
    negotiator: FormatNegotiator,
    settings: TelemetrySettings,
    params: ControlParameters,
    estimator: Option<Box<dyn TargetEstimator>>,
}

impl DeviceSessionBuilder {
    /// Builder with default preferences, timing and parameters.
    pub fn new(driver: Arc<dyn DeviceDriver>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            driver,
            sink,
            negotiator: FormatNegotiator::default(),
            settings: TelemetrySettings::default(),
            params: ControlParameters::default(),
            estimator: None,
        }
    }

    /// Apply a loaded configuration: preferences, timing, initial parameters and
    /// tracking.
    pub fn apply_config(mut self, config: &TrackerConfig) -> AppResult<Self> {
        config.validate()?;
        self.negotiator = FormatNegotiator::new(config.preferences()?);
        self.params = config.control_parameters()?;
        self.settings = config.telemetry_settings();
        Ok(self)
    }

    /// Profile preference list, most desirable first.
    pub fn preferences(mut self, preferences: Vec<StreamProfile>) -> Self {
        self.negotiator = FormatNegotiator::new(preferences);
        self
    }

    /// Replace all worker timing and labelling.
    pub fn telemetry(mut self, settings: TelemetrySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Worker wake-up interval, clamped to 1..=100 ms at build time.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.settings.poll_interval = interval;
        self
    }

    /// Length of one throughput window.
    pub fn report_interval(mut self, interval: Duration) -> Self {
        self.settings.report_interval = interval;
        self
    }

    /// Initial gains and target policy.
    pub fn control_parameters(mut self, params: ControlParameters) -> Self {
        self.params = params;
        self
    }

    /// Enable the tracking tick at `interval`.
    pub fn tracking(mut self, interval: Duration) -> Self {
        self.settings.tracking_tick = Some(interval);
        self
    }

    /// Target estimator for the tracking tick. Defaults to [`SyntheticTrajectory`].
    pub fn estimator<E: TargetEstimator + 'static>(mut self, estimator: E) -> Self {
        self.estimator = Some(Box::new(estimator));
        self
    }

    /// Build the session. The poll interval is clamped to 1..=100 ms.
    pub fn build(self) -> DeviceSession {
        let settings = self.settings.bounded();
        let estimator = settings.tracking_tick.map(|_| {
            let estimator = self
                .estimator
                .unwrap_or_else(|| Box::new(SyntheticTrajectory::default()));
            Arc::new(Mutex::new(estimator))
        });

        DeviceSession {
            shared: Arc::new(SessionShared {
                core: Mutex::new(SessionCore::new(self.params)),
                frames: Arc::new(FrameBuffer::new()),
                running: AtomicBool::new(false),
                streaming: Arc::new(AtomicBool::new(false)),
                emitter: EventEmitter::new(self.sink),
            }),
            driver: self.driver,
            negotiator: self.negotiator,
            settings,
            estimator,
            worker: Mutex::new(None),
        }
    }
}
