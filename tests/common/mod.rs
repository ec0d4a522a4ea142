//! Shared helpers for session integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};
use uvc_tracker::events::{CollectingSink, StatePayload, StateStatus};
use uvc_tracker::mock::MockDriver;
use uvc_tracker::session::{DeviceSession, DeviceSessionBuilder};

/// Poll interval used by tests so stop/join stays fast.
pub const FAST_POLL: Duration = Duration::from_millis(5);

/// Builder over `driver` with a collecting sink and a fast poll interval.
pub fn builder(driver: &MockDriver) -> (DeviceSessionBuilder, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::new());
    let builder = DeviceSession::builder(Arc::new(driver.clone()), sink.clone())
        .poll_interval(FAST_POLL);
    (builder, sink)
}

/// Session over `driver` with default preferences and a fast poll interval.
pub fn session(driver: &MockDriver) -> (DeviceSession, Arc<CollectingSink>) {
    let (builder, sink) = builder(driver);
    (builder.build(), sink)
}

/// Mock camera that accepts everything.
pub fn any_camera() -> MockDriver {
    MockDriver::builder().accept_any().build()
}

/// Block until `predicate` holds or `timeout` elapses. Returns the final result.
pub fn wait_for(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    predicate()
}

/// `state` events with the given status and message.
pub fn count_states(sink: &CollectingSink, status: StateStatus, message: &str) -> usize {
    sink.states()
        .iter()
        .filter(|s| s.status == status && s.message == message)
        .count()
}

pub fn last_state(sink: &CollectingSink) -> StatePayload {
    sink.states().pop().expect("no state event emitted")
}

/// A payload produced by `mock::fill_pattern` for a single frame index.
pub fn is_single_pattern(payload: &[u8]) -> bool {
    match payload.first() {
        Some(&first) => payload
            .iter()
            .enumerate()
            .all(|(i, b)| *b == first.wrapping_add(i as u8)),
        None => true,
    }
}
