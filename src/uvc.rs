//! USB Video Class wire helpers.
//!
//! Pure functions over the byte layouts a driver needs when talking UVC:
//!
//! - Walking the raw configuration descriptor for video-streaming format/frame
//!   descriptors and PTZ-capable entities.
//! - Encoding/decoding the VS probe/commit control block.
//! - Building pan/tilt control payloads (absolute and relative).
//!
//! All multi-byte fields are little-endian, per the USB specification.

use crate::profile::{StreamEncoding, StreamProfile};
use std::fmt;
use std::time::Duration;

/// `CS_INTERFACE` class-specific descriptor type.
const CS_INTERFACE: u8 = 0x24;

const VC_INPUT_TERMINAL: u8 = 0x02;
const VC_PROCESSING_UNIT: u8 = 0x06;
const ITT_CAMERA: u16 = 0x0201;

const VS_FORMAT_UNCOMPRESSED: u8 = 0x04;
const VS_FRAME_UNCOMPRESSED: u8 = 0x05;
const VS_FORMAT_MJPEG: u8 = 0x06;
const VS_FRAME_MJPEG: u8 = 0x07;

/// 30 fps expressed in 100ns units.
pub const DEFAULT_FRAME_INTERVAL_100NS: u32 = 333_333;

/// `CT_PANTILT_ABSOLUTE_CONTROL` selector.
pub const CT_PANTILT_ABSOLUTE_CONTROL: u8 = 0x0D;
/// `CT_PANTILT_RELATIVE_CONTROL` selector.
pub const CT_PANTILT_RELATIVE_CONTROL: u8 = 0x0E;

fn u16_le(buf: &[u8], offset: usize) -> Option<u16> {
    let bytes = buf.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn u32_le(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Iterate `(bDescriptorType, descriptor bytes)` over a concatenated descriptor blob.
///
/// Stops at the first undersized or overrunning `bLength`.
fn descriptors(raw: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut offset = 0usize;
    std::iter::from_fn(move || {
        if offset + 2 >= raw.len() {
            return None;
        }
        let len = raw[offset] as usize;
        if len < 2 || offset + len > raw.len() {
            return None;
        }
        let desc = &raw[offset..offset + len];
        offset += len;
        Some(desc)
    })
}

/// One VS frame descriptor, tagged with its owning format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UvcFrameDescriptor {
    pub format_index: u8,
    pub frame_index: u8,
    pub encoding: StreamEncoding,
    pub width: u16,
    pub height: u16,
    pub default_interval_100ns: u32,
}

impl UvcFrameDescriptor {
    /// Default frame rate, rounded to the nearest integer.
    pub fn fps(&self) -> u32 {
        if self.default_interval_100ns == 0 {
            return 0;
        }
        (10_000_000 + self.default_interval_100ns / 2) / self.default_interval_100ns
    }

    pub fn profile(&self) -> StreamProfile {
        StreamProfile::new(
            self.encoding,
            u32::from(self.width),
            u32::from(self.height),
            self.fps(),
        )
    }
}

/// Collect every uncompressed/MJPEG frame descriptor in `raw`.
pub fn parse_stream_descriptors(raw: &[u8]) -> Vec<UvcFrameDescriptor> {
    let mut frames = Vec::new();
    let mut format_index = 1u8;
    let mut encoding = StreamEncoding::Yuyv;

    for desc in descriptors(raw) {
        if desc[1] != CS_INTERFACE || desc.len() < 4 {
            continue;
        }
        match desc[2] {
            VS_FORMAT_MJPEG => {
                encoding = StreamEncoding::Mjpeg;
                format_index = desc[3];
            }
            VS_FORMAT_UNCOMPRESSED => {
                encoding = StreamEncoding::Yuyv;
                format_index = desc[3];
            }
            VS_FRAME_MJPEG | VS_FRAME_UNCOMPRESSED => {
                let interval = if desc.len() >= 25 {
                    u32_le(desc, 21).unwrap_or(DEFAULT_FRAME_INTERVAL_100NS)
                } else {
                    DEFAULT_FRAME_INTERVAL_100NS
                };
                frames.push(UvcFrameDescriptor {
                    format_index,
                    frame_index: desc[3],
                    encoding,
                    width: u16_le(desc, 5).unwrap_or(0),
                    height: u16_le(desc, 7).unwrap_or(0),
                    default_interval_100ns: interval,
                });
            }
            _ => {}
        }
    }
    frames
}

/// Profiles advertised by the descriptor blob, in descriptor order.
pub fn advertised_profiles(raw: &[u8]) -> Vec<StreamProfile> {
    parse_stream_descriptors(raw)
        .iter()
        .map(UvcFrameDescriptor::profile)
        .collect()
}

/// `(format_index, frame_index, interval_100ns)` to commit when nothing better is
/// known: the first MJPEG frame, else the first frame, else format 1 / frame 1 at 30fps.
pub fn preferred_stream_params(frames: &[UvcFrameDescriptor]) -> (u8, u8, u32) {
    frames
        .iter()
        .find(|f| f.encoding == StreamEncoding::Mjpeg)
        .or_else(|| frames.first())
        .map(|f| (f.format_index, f.frame_index, f.default_interval_100ns))
        .unwrap_or((1, 1, DEFAULT_FRAME_INTERVAL_100NS))
}

/// Entity IDs that may host pan/tilt controls: camera input terminals and
/// processing units. Order of first appearance, no duplicates.
pub fn ptz_entity_candidates(raw: &[u8]) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    for desc in descriptors(raw) {
        if desc[1] != CS_INTERFACE || desc.len() < 4 {
            continue;
        }
        let id = match desc[2] {
            VC_INPUT_TERMINAL if desc.len() >= 8 && u16_le(desc, 4) == Some(ITT_CAMERA) => desc[3],
            VC_PROCESSING_UNIT => desc[3],
            _ => continue,
        };
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

// =============================================================================
// Probe / commit
// =============================================================================

/// VS probe/commit control block (UVC 1.0 26-byte or 1.1 34-byte form).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProbeCommitControl {
    pub hint: u16,
    pub format_index: u8,
    pub frame_index: u8,
    pub frame_interval_100ns: u32,
    pub max_payload: Option<u32>,
    pub len: usize,
}

impl ProbeCommitControl {
    /// Block requesting a fixed frame interval (`bmHint` bit 0).
    pub fn request(format_index: u8, frame_index: u8, frame_interval_100ns: u32) -> Self {
        Self {
            hint: 1,
            format_index,
            frame_index,
            frame_interval_100ns,
            max_payload: None,
            len: 26,
        }
    }

    /// Encode into a block of `len` bytes (26 or 34).
    pub fn encode(&self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len.max(8)];
        buf[0..2].copy_from_slice(&self.hint.to_le_bytes());
        buf[2] = self.format_index;
        buf[3] = self.frame_index;
        buf[4..8].copy_from_slice(&self.frame_interval_100ns.to_le_bytes());
        if let (Some(max), true) = (self.max_payload, len >= 26) {
            buf[22..26].copy_from_slice(&max.to_le_bytes());
        }
        buf
    }

    /// Decode a block returned by `GET_CUR`. Returns `None` for blocks under 8 bytes.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < 8 {
            return None;
        }
        Some(Self {
            hint: u16_le(buf, 0)?,
            format_index: buf[2],
            frame_index: buf[3],
            frame_interval_100ns: u32_le(buf, 4)?,
            max_payload: u32_le(buf, 22),
            len: buf.len(),
        })
    }
}

impl fmt::Display for ProbeCommitControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fmt={} frame={} interval={} maxPayload={} len={}",
            self.format_index,
            self.frame_index,
            self.frame_interval_100ns,
            self.max_payload.map_or(-1, i64::from),
            self.len
        )
    }
}

// =============================================================================
// Pan / tilt
// =============================================================================

/// Manual pan/tilt request with normalised axes in [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanTiltCommand {
    pub pan: f32,
    pub tilt: f32,
    pub duration_ms: i32,
}

impl PanTiltCommand {
    /// Build a command, clamping both axes into [-1, 1]. NaN is treated as centre.
    pub fn new(pan: f32, tilt: f32, duration_ms: i32) -> Self {
        let axis = |v: f32| if v.is_nan() { 0.0 } else { v.clamp(-1.0, 1.0) };
        Self {
            pan: axis(pan),
            tilt: axis(tilt),
            duration_ms,
        }
    }

    /// Control transfer timeout derived from the requested duration.
    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.duration_ms.clamp(50, 2000) as u64)
    }

    /// `SET_CUR` payload for the absolute control, mapped into the device's
    /// `GET_MIN`/`GET_MAX` range (pan, tilt pairs).
    pub fn absolute_payload(&self, min: (i32, i32), max: (i32, i32)) -> [u8; 8] {
        pan_tilt_pair(
            lerp_signed_range(self.pan, min.0, max.0),
            lerp_signed_range(self.tilt, min.1, max.1),
        )
    }

    /// `SET_CUR` payload for the absolute control using a fixed full-scale value
    /// (arc-seconds), for devices that do not report a range.
    pub fn scaled_payload(&self, scale: i32) -> [u8; 8] {
        let scaled = |v: f32| (f64::from(v.clamp(-1.0, 1.0)) * f64::from(scale)).round() as i32;
        pan_tilt_pair(scaled(self.pan), scaled(self.tilt))
    }

    /// `SET_CUR` payload for the relative control: direction and speed per axis.
    pub fn relative_payload(&self) -> [u8; 4] {
        let direction = |v: f32| -> i8 {
            if v > 0.05 {
                1
            } else if v < -0.05 {
                -1
            } else {
                0
            }
        };
        let speed = |v: f32| (v.clamp(-1.0, 1.0).abs() * 7.0).round().clamp(0.0, 7.0) as u8;
        [
            direction(self.pan) as u8,
            speed(self.pan),
            direction(self.tilt) as u8,
            speed(self.tilt),
        ]
    }
}

fn pan_tilt_pair(pan: i32, tilt: i32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[0..4].copy_from_slice(&pan.to_le_bytes());
    out[4..8].copy_from_slice(&tilt.to_le_bytes());
    out
}

/// Map `value` in [-1, 1] linearly onto `[min, max]`.
pub fn lerp_signed_range(value: f32, min: i32, max: i32) -> i32 {
    let v = f64::from(value.clamp(-1.0, 1.0));
    let mid = (i64::from(min) + i64::from(max)) as f64 / 2.0;
    let half = (i64::from(max) - i64::from(min)) as f64 / 2.0;
    (mid + half * v).round() as i32
}
