//! Stream profiles and frame encodings.
//!
//! A [`StreamProfile`] is an immutable (encoding, resolution, frame-rate) tuple.
//! Profiles are offered to the device in preference order: compressed formats and
//! higher resolutions first, falling back to uncompressed and finally to the
//! unconstrained [`StreamProfile::any`].
//!
//! Profiles render as compact names such as `mjpeg_720p30`, which is also the form
//! accepted in configuration files.

use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Encoding requested from the device when negotiating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamEncoding {
    /// Uncompressed packed 4:2:2.
    Yuyv,
    /// Motion JPEG.
    Mjpeg,
    /// Let the device pick.
    Any,
}

impl StreamEncoding {
    fn as_str(&self) -> &'static str {
        match self {
            StreamEncoding::Yuyv => "yuyv",
            StreamEncoding::Mjpeg => "mjpeg",
            StreamEncoding::Any => "any",
        }
    }
}

/// Encoding of the frame currently held by the frame buffer.
///
/// The discriminants are the integer codes reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum FrameEncoding {
    #[default]
    None = 0,
    Yuyv = 1,
    Mjpeg = 2,
}

impl FrameEncoding {
    /// Integer code exposed on the host command surface.
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Pixel format reported by the driver for a delivered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Yuyv,
    Mjpeg,
    Nv12,
    H264,
    /// Any other FourCC the driver passes through.
    Other(u32),
}

impl PixelFormat {
    /// Map to a buffer encoding. Only YUYV and MJPEG frames are accepted.
    pub fn accepted_encoding(self) -> Option<FrameEncoding> {
        match self {
            PixelFormat::Yuyv => Some(FrameEncoding::Yuyv),
            PixelFormat::Mjpeg => Some(FrameEncoding::Mjpeg),
            _ => None,
        }
    }
}

/// A (format, resolution, frame-rate) tuple a device may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamProfile {
    pub encoding: StreamEncoding,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl StreamProfile {
    pub const fn new(encoding: StreamEncoding, width: u32, height: u32, fps: u32) -> Self {
        Self {
            encoding,
            width,
            height,
            fps,
        }
    }

    /// Motion-JPEG profile.
    pub const fn mjpeg(width: u32, height: u32, fps: u32) -> Self {
        Self::new(StreamEncoding::Mjpeg, width, height, fps)
    }

    /// Uncompressed YUYV profile.
    pub const fn yuyv(width: u32, height: u32, fps: u32) -> Self {
        Self::new(StreamEncoding::Yuyv, width, height, fps)
    }

    /// Unconstrained profile: the device chooses format, size and rate.
    pub const fn any() -> Self {
        Self::new(StreamEncoding::Any, 0, 0, 0)
    }

    pub fn is_any(&self) -> bool {
        self.encoding == StreamEncoding::Any
    }

    /// Default preference list, most desirable first.
    pub fn default_preferences() -> Vec<StreamProfile> {
        vec![
            Self::mjpeg(1920, 1080, 30),
            Self::mjpeg(1280, 720, 30),
            Self::mjpeg(640, 480, 30),
            Self::yuyv(1280, 720, 10),
            Self::yuyv(640, 480, 30),
            Self::any(),
        ]
    }
}

/// Conventional width for a "<height>p" shorthand.
fn standard_width(height: u32) -> Option<u32> {
    match height {
        2160 => Some(3840),
        1440 => Some(2560),
        1080 => Some(1920),
        720 => Some(1280),
        480 => Some(640),
        360 => Some(640),
        240 => Some(320),
        _ => None,
    }
}

impl fmt::Display for StreamProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            return write!(f, "any");
        }
        if standard_width(self.height) == Some(self.width) {
            write!(f, "{}_{}p{}", self.encoding.as_str(), self.height, self.fps)
        } else {
            write!(
                f,
                "{}_{}x{}@{}",
                self.encoding.as_str(),
                self.width,
                self.height,
                self.fps
            )
        }
    }
}

impl FromStr for StreamProfile {
    type Err = SessionError;

    /// Accepts `any`, `<enc>_<height>p<fps>` and `<enc>_<w>x<h>@<fps>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SessionError::InvalidProfile(s.to_string());
        let name = s.trim().to_ascii_lowercase();
        if name == "any" {
            return Ok(Self::any());
        }

        let (enc, rest) = name.split_once('_').ok_or_else(invalid)?;
        let encoding = match enc {
            "mjpeg" | "mjpg" => StreamEncoding::Mjpeg,
            "yuyv" | "yuy2" => StreamEncoding::Yuyv,
            _ => return Err(invalid()),
        };

        if let Some((dims, fps)) = rest.split_once('@') {
            let (w, h) = dims.split_once('x').ok_or_else(invalid)?;
            let width = w.parse().map_err(|_| invalid())?;
            let height = h.parse().map_err(|_| invalid())?;
            let fps = fps.parse().map_err(|_| invalid())?;
            return Ok(Self::new(encoding, width, height, fps));
        }

        let (h, fps) = rest.split_once('p').ok_or_else(invalid)?;
        let height: u32 = h.parse().map_err(|_| invalid())?;
        let width = standard_width(height).ok_or_else(invalid)?;
        let fps = fps.parse().map_err(|_| invalid())?;
        Ok(Self::new(encoding, width, height, fps))
    }
}
