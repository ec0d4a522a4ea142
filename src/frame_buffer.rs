//! Latest-frame buffer and throughput counters.
//!
//! Written by the driver's callback thread, read by the session and external
//! pollers. The payload and its dimensions/encoding live behind one
//! `parking_lot::Mutex` so a reader never sees a width/height that does not match
//! the copied bytes. The frame and byte counters are separate atomics updated
//! with relaxed ordering: they only feed aggregate throughput telemetry and may
//! briefly disagree with the payload swap.
//!
//! The lock is held only for the copy, so the callback never waits behind
//! session operations (those use a different lock).

use crate::driver::RawFrame;
use crate::profile::FrameEncoding;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct LatestFrame {
    payload: Vec<u8>,
    width: u32,
    height: u32,
    encoding: FrameEncoding,
}

/// Copy of the buffered frame with its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSnapshot {
    pub payload: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub encoding: FrameEncoding,
}

/// Counter values drained at the end of a telemetry window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterSnapshot {
    pub frames: u64,
    pub bytes: u64,
}

/// Holds the most recently completed frame plus throughput counters.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    latest: Mutex<LatestFrame>,
    frames: AtomicU64,
    bytes: AtomicU64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `frame` into the buffer if its format is YUYV or MJPEG.
    ///
    /// Returns whether the frame was stored.
    pub fn ingest(&self, frame: &RawFrame<'_>) -> bool {
        let Some(encoding) = frame.format.accepted_encoding() else {
            return false;
        };

        {
            let mut latest = self.latest.lock();
            // Reuse the allocation between frames of similar size
            latest.payload.clear();
            latest.payload.extend_from_slice(frame.data);
            latest.width = frame.width;
            latest.height = frame.height;
            latest.encoding = encoding;
        }

        self.frames.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(frame.data.len() as u64, Ordering::Relaxed);
        true
    }

    /// Copy of the latest payload, or `None` if nothing has been captured.
    pub fn latest_frame(&self) -> Option<Vec<u8>> {
        let latest = self.latest.lock();
        if latest.encoding == FrameEncoding::None {
            return None;
        }
        Some(latest.payload.clone())
    }

    /// Consistent copy of payload and metadata.
    pub fn snapshot(&self) -> Option<FrameSnapshot> {
        let latest = self.latest.lock();
        if latest.encoding == FrameEncoding::None {
            return None;
        }
        Some(FrameSnapshot {
            payload: latest.payload.clone(),
            width: latest.width,
            height: latest.height,
            encoding: latest.encoding,
        })
    }

    pub fn width(&self) -> u32 {
        self.latest.lock().width
    }

    pub fn height(&self) -> u32 {
        self.latest.lock().height
    }

    pub fn encoding(&self) -> FrameEncoding {
        self.latest.lock().encoding
    }

    /// Read-and-reset both counters.
    pub fn drain_counters(&self) -> CounterSnapshot {
        CounterSnapshot {
            frames: self.frames.swap(0, Ordering::Relaxed),
            bytes: self.bytes.swap(0, Ordering::Relaxed),
        }
    }

    /// Current counter values without resetting them.
    pub fn peek_counters(&self) -> CounterSnapshot {
        CounterSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }

    /// Drop the buffered frame, release its allocation and zero the counters.
    pub fn reset(&self) {
        *self.latest.lock() = LatestFrame::default();
        self.frames.store(0, Ordering::Relaxed);
        self.bytes.store(0, Ordering::Relaxed);
    }
}
