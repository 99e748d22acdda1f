//! Obstacles and their frame counters

use std::fmt;

/// Conditions that prevent valid gesture capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObstacleType {
    NoOrPartialFace,
    MultipleFaces,
    YawAngleExceeded,
    LowBrightness,
}

impl ObstacleType {
    /// Exactly one face is required
    pub fn from_face_count(count: u32) -> Option<Self> {
        match count {
            0 => Some(ObstacleType::NoOrPartialFace),
            1 => None,
            _ => Some(ObstacleType::MultipleFaces),
        }
    }
}

impl fmt::Display for ObstacleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObstacleType::NoOrPartialFace => "no_or_partial_face",
            ObstacleType::MultipleFaces => "multiple_faces",
            ObstacleType::YawAngleExceeded => "yaw_angle_exceeded",
            ObstacleType::LowBrightness => "low_brightness",
        };
        f.write_str(name)
    }
}

/// Debounce counters for transient obstacles
/// INVARIANT: a counter only grows across consecutive offending frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObstacleFrameCounters {
    low_brightness: u32,
    wrong_gesture: u32,
}

impl ObstacleFrameCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new count
    pub fn increment_low_brightness(&mut self) -> u32 {
        self.low_brightness = self.low_brightness.saturating_add(1);
        self.low_brightness
    }

    pub fn low_brightness(&self) -> u32 {
        self.low_brightness
    }

    pub fn reset_low_brightness(&mut self) {
        self.low_brightness = 0;
    }

    /// Returns the new count
    pub fn increment_wrong_gesture(&mut self) -> u32 {
        self.wrong_gesture = self.wrong_gesture.saturating_add(1);
        self.wrong_gesture
    }

    pub fn wrong_gesture(&self) -> u32 {
        self.wrong_gesture
    }

    pub fn reset_wrong_gesture(&mut self) {
        self.wrong_gesture = 0;
    }

    pub fn reset_on_stage_success(&mut self) {
        *self = Self::default();
    }

    pub fn reset_on_premature_end(&mut self) {
        *self = Self::default();
    }
}
