//! Integration tests for stream profile negotiation through the session.

mod common;

use common::{last_state, session};
use uvc_tracker::events::StateStatus;
use uvc_tracker::mock::MockDriver;
use uvc_tracker::profile::StreamProfile;
use uvc_tracker::session::SessionState;

/// Class-specific VS descriptors for a camera with YUYV 640x480@30 and MJPEG 1280x720@30.
fn descriptor_blob() -> Vec<u8> {
    fn frame(subtype: u8, index: u8, w: u16, h: u16, interval: u32) -> Vec<u8> {
        let mut d = vec![30, 0x24, subtype, index, 0];
        d.extend_from_slice(&w.to_le_bytes());
        d.extend_from_slice(&h.to_le_bytes());
        d.extend_from_slice(&[0u8; 12]);
        d.extend_from_slice(&interval.to_le_bytes());
        d.push(1);
        d.extend_from_slice(&interval.to_le_bytes());
        d
    }

    let mut raw = vec![9, 0x04, 1, 0, 0, 0x0E, 0x02, 0, 0];
    raw.extend_from_slice(&[27, 0x24, 0x04, 1]);
    raw.extend_from_slice(&[0u8; 23]);
    raw.extend(frame(0x05, 1, 640, 480, 333_333));
    raw.extend_from_slice(&[11, 0x24, 0x06, 2, 1, 0, 1, 0, 0, 0, 0]);
    raw.extend(frame(0x07, 1, 1280, 720, 333_333));
    raw
}

#[test]
fn falls_back_to_first_acknowledged_profile() {
    let driver = MockDriver::builder()
        .supports(StreamProfile::yuyv(640, 480, 30))
        .build();
    let (session, sink) = session(&driver);
    session.attach(5, 0x1234, 0x5678);

    assert!(session.activate());
    assert_eq!(session.active_profile(), Some(StreamProfile::yuyv(640, 480, 30)));

    // Every MJPEG preference and the YUYV 720p entry were offered first
    let probed = driver.probed();
    assert_eq!(probed.len(), 5);
    assert_eq!(probed[..4], StreamProfile::default_preferences()[..4]);

    let state = last_state(&sink);
    assert_eq!(state.status, StateStatus::Connected);
    assert!(state.message.contains("640x480@30fps"), "{}", state.message);
}

#[test]
fn unconstrained_profile_is_the_last_resort() {
    let driver = MockDriver::builder().supports(StreamProfile::any()).build();
    let (session, _sink) = session(&driver);
    session.attach(5, 0x1234, 0x5678);

    assert!(session.activate());
    assert_eq!(session.active_profile(), Some(StreamProfile::any()));
    assert_eq!(driver.probed().len(), StreamProfile::default_preferences().len());
}

#[test]
fn rejected_preferences_leave_session_in_error() {
    let driver = MockDriver::builder().build();
    let (session, sink) = session(&driver);
    session.attach(5, 0x1234, 0x5678);

    assert!(!session.activate());
    assert_eq!(session.state(), SessionState::Error);
    assert!(session.active_profile().is_none());
    assert!(!driver.is_streaming());
    assert_eq!(driver.open_count(), driver.close_count());

    let state = last_state(&sink);
    assert_eq!(state.status, StateStatus::Error);
    assert!(state.message.starts_with("No compatible stream profile"));

    // start cannot succeed either, and spawns nothing
    assert!(!session.start());
    assert!(!session.is_running());
}

#[test]
fn descriptor_advertised_profiles_drive_selection() {
    let driver = MockDriver::builder().from_descriptors(&descriptor_blob()).build();
    let (session, _sink) = session(&driver);
    session.attach(5, 0x1234, 0x5678);

    assert!(session.activate());
    assert_eq!(
        session.active_profile(),
        Some(StreamProfile::mjpeg(1280, 720, 30))
    );
}

#[test]
fn custom_preference_order_is_respected() {
    let driver = MockDriver::builder().accept_any().build();
    let (builder, _sink) = common::builder(&driver);
    let session = builder
        .preferences(vec![
            StreamProfile::yuyv(320, 240, 15),
            StreamProfile::mjpeg(1920, 1080, 30),
        ])
        .build();
    session.attach(5, 0x1234, 0x5678);

    assert!(session.activate());
    assert_eq!(session.active_profile(), Some(StreamProfile::yuyv(320, 240, 15)));
    assert_eq!(driver.probed(), vec![StreamProfile::yuyv(320, 240, 15)]);
}
