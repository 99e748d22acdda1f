//! Camera frames as delivered by the platform shell

use std::time::Duration;

use bytes::Bytes;
use vcheck_liveness::DeviceOrientation;

/// Pixel buffer of one camera frame
#[derive(Debug, Clone, Default)]
pub struct RawFrame {
    /// Presentation timestamp from the capture pipeline, any epoch
    pub timestamp: Option<Duration>,
    pub pixels: Bytes,
    pub width: u32,
    pub height: u32,
}

impl RawFrame {
    pub fn new(pixels: Bytes, width: u32, height: u32) -> Self {
        RawFrame {
            timestamp: None,
            pixels,
            width,
            height,
        }
    }

    pub fn with_timestamp(mut self, timestamp: Duration) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A frame plus the sensor readings captured alongside it
#[derive(Debug, Clone, Default)]
pub struct CameraFrame {
    pub raw: RawFrame,
    /// Latest gravity reading; the previous one is reused when absent
    pub orientation: Option<DeviceOrientation>,
    /// Exposure estimate from the capture metadata
    pub brightness: Option<f32>,
}

impl CameraFrame {
    pub fn new(raw: RawFrame) -> Self {
        CameraFrame {
            raw,
            orientation: None,
            brightness: None,
        }
    }

    pub fn with_orientation(mut self, orientation: DeviceOrientation) -> Self {
        self.orientation = Some(orientation);
        self
    }

    pub fn with_brightness(mut self, brightness: f32) -> Self {
        self.brightness = Some(brightness);
        self
    }
}
