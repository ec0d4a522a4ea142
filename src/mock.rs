//! Mock driver collaborator.
//!
//! Simulates a UVC camera without hardware. Useful for tests, benches and the CLI
//! demo.
//!
//! - Probes succeed for a configured set of profiles (or for everything).
//! - Frames are pushed on demand with [`MockDriver::deliver`] or, when a frame
//!   pump is configured, by a background thread at a fixed rate.
//! - Open/start failures can be injected and toggled at runtime.
//! - Pan/tilt commands are recorded when PTZ support is enabled.
//!
//! # Example
//!
//! ```
//! use uvc_tracker::mock::MockDriver;
//! use uvc_tracker::profile::StreamProfile;
//!
//! let driver = MockDriver::builder()
//!     .supports(StreamProfile::mjpeg(1280, 720, 30))
//!     .build();
//! assert_eq!(driver.open_count(), 0);
//! ```

use crate::device::DeviceHandle;
use crate::driver::{DeviceDriver, FrameCallback, RawFrame, StreamContext};
use crate::profile::{PixelFormat, StreamEncoding, StreamProfile};
use crate::uvc::{self, PanTiltCommand};
use anyhow::{anyhow, bail, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Fill `buf` with a deterministic pattern for frame number `index`.
///
/// Consecutive frames differ in every byte, so a torn copy is detectable.
pub fn fill_pattern(buf: &mut [u8], index: u64) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte = (i as u64).wrapping_add(index.wrapping_mul(31)) as u8;
    }
}

/// Allocate and fill a pattern payload of `len` bytes.
pub fn pattern_payload(len: usize, index: u64) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    fill_pattern(&mut buf, index);
    buf
}

/// Pixel format a mock device produces for a negotiated profile.
fn pixel_format_for(profile: &StreamProfile) -> PixelFormat {
    match profile.encoding {
        StreamEncoding::Yuyv => PixelFormat::Yuyv,
        StreamEncoding::Mjpeg | StreamEncoding::Any => PixelFormat::Mjpeg,
    }
}

#[derive(Debug, Clone, Copy)]
struct FramePump {
    fps: u32,
    frame_bytes: usize,
}

#[derive(Debug, Clone, Default)]
struct MockConfig {
    supported: Vec<StreamProfile>,
    accept_all: bool,
    pump: Option<FramePump>,
    ptz: bool,
}

#[derive(Default)]
struct MockState {
    callback: Mutex<Option<(FrameCallback, StreamProfile)>>,
    probed: Mutex<Vec<StreamProfile>>,
    pan_tilt: Mutex<Vec<PanTiltCommand>>,
    fail_open: AtomicBool,
    fail_start: AtomicBool,
    open_count: AtomicUsize,
    close_count: AtomicUsize,
    pumped: AtomicUsize,
}

/// Builder for [`MockDriver`].
#[derive(Debug, Default)]
pub struct MockDriverBuilder {
    config: MockConfig,
    fail_open: bool,
    fail_start: bool,
}

impl MockDriverBuilder {
    /// Acknowledge `profile` when probed.
    pub fn supports(mut self, profile: StreamProfile) -> Self {
        self.config.supported.push(profile);
        self
    }

    /// Acknowledge every profile in `profiles`.
    pub fn supports_all<I: IntoIterator<Item = StreamProfile>>(mut self, profiles: I) -> Self {
        self.config.supported.extend(profiles);
        self
    }

    /// Acknowledge whatever is probed.
    pub fn accept_any(mut self) -> Self {
        self.config.accept_all = true;
        self
    }

    /// Acknowledge exactly the profiles advertised by a raw UVC descriptor blob.
    pub fn from_descriptors(self, raw: &[u8]) -> Self {
        self.supports_all(uvc::advertised_profiles(raw))
    }

    /// Fail every `open` until toggled with [`MockDriver::set_fail_open`].
    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Fail every `start_streaming` until toggled with [`MockDriver::set_fail_start`].
    pub fn fail_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Push pattern frames of `frame_bytes` bytes at `fps` while streaming.
    pub fn frame_pump(mut self, fps: u32, frame_bytes: usize) -> Self {
        self.config.pump = Some(FramePump {
            fps: fps.max(1),
            frame_bytes,
        });
        self
    }

    /// Accept and record pan/tilt commands.
    pub fn with_ptz(mut self) -> Self {
        self.config.ptz = true;
        self
    }

    pub fn build(self) -> MockDriver {
        let state = Arc::new(MockState::default());
        state.fail_open.store(self.fail_open, Ordering::SeqCst);
        state.fail_start.store(self.fail_start, Ordering::SeqCst);
        MockDriver {
            config: Arc::new(self.config),
            state,
        }
    }
}

/// Simulated driver collaborator.
///
/// Clones share state, so a test can keep one clone for inspection after handing
/// another to the session.
#[derive(Clone)]
pub struct MockDriver {
    config: Arc<MockConfig>,
    state: Arc<MockState>,
}

impl MockDriver {
    pub fn builder() -> MockDriverBuilder {
        MockDriverBuilder::default()
    }

    /// Push one frame through the active callback, as the driver thread would.
    ///
    /// Returns `false` if no stream is active.
    pub fn deliver(&self, frame: &RawFrame<'_>) -> bool {
        let callback = self.state.callback.lock().as_ref().map(|(cb, _)| cb.clone());
        match callback {
            Some(cb) => {
                cb(frame);
                true
            }
            None => false,
        }
    }

    /// Push a pattern frame sized for the active profile.
    pub fn deliver_pattern(&self, len: usize, index: u64) -> bool {
        let Some((callback, profile)) = self.state.callback.lock().clone() else {
            return false;
        };
        let payload = pattern_payload(len, index);
        callback(&RawFrame::new(
            &payload,
            profile.width,
            profile.height,
            pixel_format_for(&profile),
        ));
        true
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.state.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `open` calls.
    pub fn open_count(&self) -> usize {
        self.state.open_count.load(Ordering::SeqCst)
    }

    /// Number of contexts closed.
    pub fn close_count(&self) -> usize {
        self.state.close_count.load(Ordering::SeqCst)
    }

    /// Every profile probed so far, in order.
    pub fn probed(&self) -> Vec<StreamProfile> {
        self.state.probed.lock().clone()
    }

    /// Profile currently streaming, if any.
    pub fn streaming_profile(&self) -> Option<StreamProfile> {
        self.state.callback.lock().as_ref().map(|(_, p)| *p)
    }

    pub fn is_streaming(&self) -> bool {
        self.state.callback.lock().is_some()
    }

    /// Pan/tilt commands received so far.
    pub fn pan_tilt_commands(&self) -> Vec<PanTiltCommand> {
        self.state.pan_tilt.lock().clone()
    }

    /// Frames pushed by the frame pump so far.
    pub fn pumped_frames(&self) -> usize {
        self.state.pumped.load(Ordering::SeqCst)
    }
}

impl DeviceDriver for MockDriver {
    fn name(&self) -> &str {
        "mock"
    }

    fn open(&self, handle: &DeviceHandle) -> Result<Box<dyn StreamContext>> {
        if !handle.is_valid() {
            bail!("invalid descriptor {}", handle.descriptor);
        }
        if self.state.fail_open.load(Ordering::SeqCst) {
            bail!("libusb_wrap_sys_device failed for {}", handle);
        }
        self.state.open_count.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(%handle, "Mock stream context opened");
        Ok(Box::new(MockContext {
            config: Arc::clone(&self.config),
            state: Arc::clone(&self.state),
            pump: None,
        }))
    }
}

struct PumpThread {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

struct MockContext {
    config: Arc<MockConfig>,
    state: Arc<MockState>,
    pump: Option<PumpThread>,
}

impl MockContext {
    fn spawn_pump(
        &self,
        pump: FramePump,
        profile: StreamProfile,
        callback: FrameCallback,
    ) -> Result<PumpThread> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let state = Arc::clone(&self.state);
        let period = Duration::from_secs_f64(1.0 / f64::from(pump.fps));
        let format = pixel_format_for(&profile);

        let handle = thread::Builder::new()
            .name("mock-frame-pump".to_string())
            .spawn(move || {
                let mut payload = vec![0u8; pump.frame_bytes];
                let mut index = 0u64;
                while flag.load(Ordering::Acquire) {
                    fill_pattern(&mut payload, index);
                    callback(&RawFrame::new(&payload, profile.width, profile.height, format));
                    state.pumped.fetch_add(1, Ordering::SeqCst);
                    index += 1;
                    thread::sleep(period);
                }
            })
            .map_err(|e| anyhow!("failed to spawn frame pump: {e}"))?;

        Ok(PumpThread { running, handle })
    }

    fn stop_pump(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.running.store(false, Ordering::Release);
            if pump.handle.join().is_err() {
                tracing::warn!("Mock frame pump panicked");
            }
        }
    }
}

impl StreamContext for MockContext {
    fn probe(&mut self, profile: &StreamProfile) -> Result<bool> {
        self.state.probed.lock().push(*profile);
        Ok(self.config.accept_all || self.config.supported.contains(profile))
    }

    fn start_streaming(&mut self, profile: &StreamProfile, on_frame: FrameCallback) -> Result<()> {
        if self.state.fail_start.load(Ordering::SeqCst) {
            bail!("libuvc_start_streaming returned -51");
        }
        self.stop_pump();
        *self.state.callback.lock() = Some((Arc::clone(&on_frame), *profile));
        if let Some(pump) = self.config.pump {
            self.pump = Some(self.spawn_pump(pump, *profile, on_frame)?);
        }
        Ok(())
    }

    fn stop_streaming(&mut self) -> Result<()> {
        self.stop_pump();
        *self.state.callback.lock() = None;
        Ok(())
    }

    fn set_pan_tilt(&mut self, command: &PanTiltCommand) -> Result<bool> {
        if !self.config.ptz {
            return Ok(false);
        }
        self.state.pan_tilt.lock().push(*command);
        Ok(true)
    }

    fn close(&mut self) -> Result<()> {
        self.stop_pump();
        self.state.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for MockContext {
    fn drop(&mut self) {
        self.stop_pump();
    }
}
