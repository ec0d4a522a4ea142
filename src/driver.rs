//! Driver collaborator contract.
//!
//! The USB/UVC protocol work lives outside this crate. The session talks to it
//! through two small traits:
//!
//! - [`DeviceDriver`] builds a [`StreamContext`] bound to an attached descriptor.
//! - [`StreamContext`] answers profile probes, starts/stops frame delivery and
//!   optionally accepts pan/tilt commands.
//!
//! Frames are delivered by invoking the [`FrameCallback`] on a driver-owned thread.
//! The callback returns promptly; it only takes a short critical section.
//!
//! # Thread Safety
//!
//! `DeviceDriver` is shared (`Send + Sync`). A `StreamContext` is owned by the
//! session and only touched under the session lock, so it only needs `Send`.

use crate::device::DeviceHandle;
use crate::profile::{PixelFormat, StreamProfile};
use crate::uvc::PanTiltCommand;
use anyhow::Result;
use std::sync::Arc;

/// A completed frame as handed over by the driver.
///
/// The payload is borrowed for the duration of the callback only.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl<'a> RawFrame<'a> {
    pub fn new(data: &'a [u8], width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
        }
    }
}

/// Callback invoked by the driver for each completed frame.
pub type FrameCallback = Arc<dyn Fn(&RawFrame<'_>) + Send + Sync>;

/// Factory for stream contexts.
pub trait DeviceDriver: Send + Sync {
    /// Human-readable driver name for logs.
    fn name(&self) -> &str;

    /// Build a stream context bound to the descriptor in `handle`.
    ///
    /// The context must be fully constructed or not at all.
    fn open(&self, handle: &DeviceHandle) -> Result<Box<dyn StreamContext>>;
}

/// Driver-owned streaming resource bound 1:1 to a device handle.
pub trait StreamContext: Send {
    /// Ask the device whether it acknowledges `profile`.
    ///
    /// `Ok(false)` means "not supported"; `Err` means the probe itself failed.
    /// Both cause the negotiator to move on to the next profile.
    fn probe(&mut self, profile: &StreamProfile) -> Result<bool>;

    /// Begin delivering frames for a previously acknowledged profile.
    fn start_streaming(&mut self, profile: &StreamProfile, on_frame: FrameCallback) -> Result<()>;

    /// Stop frame delivery. After this returns the callback is no longer invoked.
    fn stop_streaming(&mut self) -> Result<()>;

    /// Apply a pan/tilt command.
    ///
    /// Returns `Ok(false)` when the device has no pan/tilt control.
    fn set_pan_tilt(&mut self, command: &PanTiltCommand) -> Result<bool> {
        let _ = command;
        Ok(false)
    }

    /// Release the context. Called once, after `stop_streaming`.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
