//! Device identity.
//!
//! The host opens the USB device and hands the session an already-opened file
//! descriptor together with the vendor/product IDs. Ownership of the underlying
//! resource stays with the host; the session only records it.

use std::fmt;

/// USB class code for video devices.
pub const USB_CLASS_VIDEO: u8 = 0x0E;

/// Identifies the already-opened device.
///
/// A negative descriptor is the "no device" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHandle {
    /// Host-owned file descriptor of the opened device.
    pub descriptor: i32,
    /// USB vendor ID.
    pub vendor_id: u16,
    /// USB product ID.
    pub product_id: u16,
}

impl DeviceHandle {
    /// Create a handle for an opened descriptor.
    pub fn new(descriptor: i32, vendor_id: u16, product_id: u16) -> Self {
        Self {
            descriptor,
            vendor_id,
            product_id,
        }
    }

    /// The "no device" sentinel.
    pub const fn none() -> Self {
        Self {
            descriptor: -1,
            vendor_id: 0,
            product_id: 0,
        }
    }

    /// Whether this handle refers to an opened device.
    pub fn is_valid(&self) -> bool {
        self.descriptor >= 0
    }
}

impl Default for DeviceHandle {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fd={}, vid=0x{:x}, pid=0x{:x}",
            self.descriptor, self.vendor_id, self.product_id
        )
    }
}

/// Summary of a USB device as enumerated by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDeviceInfo {
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub device_class: u8,
    /// Class code of each interface, in interface order.
    pub interface_classes: Vec<u8>,
}

impl UsbDeviceInfo {
    /// A device is likely UVC if the device itself or any interface is video class.
    pub fn is_likely_uvc(&self) -> bool {
        self.device_class == USB_CLASS_VIDEO
            || self.interface_classes.contains(&USB_CLASS_VIDEO)
    }
}
