//! # UVC Tracker Core Library
//!
//! Session manager for a USB video-capture peripheral. The host hands over an
//! already-opened device descriptor; the library negotiates a stream format,
//! ingests frames delivered on the driver's thread, reports throughput telemetry
//! from a background worker and stays safely startable, stoppable and
//! re-attachable from concurrent callers.
//!
//! ## Crate Structure
//!
//! - **`session`**: `DeviceSession`, the attach/activate/start/stop/detach/dispose
//!   state machine and the only type most hosts touch.
//! - **`driver`**: the `DeviceDriver` / `StreamContext` collaborator traits that the
//!   USB protocol layer implements.
//! - **`negotiator`**: ordered profile negotiation against a stream context.
//! - **`frame_buffer`**: latest-frame buffer and throughput counters shared with the
//!   driver callback.
//! - **`telemetry`**: the background worker emitting `stream` (and optionally
//!   `face`/`telemetry`) events.
//! - **`events`**: the `EventSink` contract, typed payloads and stock sinks.
//! - **`control`**: PID gains, target policies, the PD law and the pluggable
//!   `TargetEstimator`.
//! - **`uvc`**: UVC descriptor parsing, probe/commit blocks and pan/tilt payloads.
//! - **`commands`**: textual host command parser and dispatcher.
//! - **`config`** / **`logging`**: figment configuration and tracing setup.
//! - **`mock`** (feature `mock`): simulated driver for tests, benches and the demo.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use uvc_tracker::events::CollectingSink;
//! use uvc_tracker::mock::MockDriver;
//! use uvc_tracker::profile::StreamProfile;
//! use uvc_tracker::session::DeviceSession;
//!
//! let driver = MockDriver::builder()
//!     .supports(StreamProfile::mjpeg(1280, 720, 30))
//!     .build();
//! let sink = Arc::new(CollectingSink::new());
//! let session = DeviceSession::new(Arc::new(driver), sink.clone());
//!
//! assert!(session.attach(5, 0x1234, 0x5678));
//! assert!(session.activate());
//! assert_eq!(session.active_profile(), Some(StreamProfile::mjpeg(1280, 720, 30)));
//! assert!(session.dispose());
//! ```

pub mod commands;
pub mod config;
pub mod control;
pub mod device;
pub mod driver;
pub mod error;
pub mod events;
pub mod frame_buffer;
pub mod logging;
pub mod negotiator;
pub mod profile;
pub mod session;
pub mod telemetry;
pub mod uvc;

#[cfg(feature = "mock")]
pub mod mock;

pub use control::{ControlParameters, PidGains, TargetPolicy};
pub use device::DeviceHandle;
pub use driver::{DeviceDriver, FrameCallback, RawFrame, StreamContext};
pub use error::{AppResult, ErrorKind, SessionError};
pub use events::{EventKind, EventSink};
pub use profile::{FrameEncoding, PixelFormat, StreamEncoding, StreamProfile};
pub use session::{DeviceSession, DeviceSessionBuilder, SessionState};
