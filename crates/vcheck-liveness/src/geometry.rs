//! Face geometry and device orientation
//!
//! The face tracker reports head rotation and mouth openness per frame.
//! Only the three numbers the milestone flow needs survive past this module.

use std::f64::consts::PI;

/// Per-frame head pose and mouth openness, angles in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AngleSample {
    pub pitch: f32,
    pub yaw: f32,
    pub mouth_factor: f32,
}

impl AngleSample {
    pub fn new(pitch: f32, yaw: f32, mouth_factor: f32) -> Self {
        Self {
            pitch,
            yaw,
            mouth_factor,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.pitch.is_finite() && self.yaw.is_finite() && self.mouth_factor.is_finite()
    }
}

/// Output of the face tracker for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FaceGeometry {
    /// Rotation around the ear-to-ear axis (degrees)
    pub pitch: f32,
    /// Rotation around the vertical axis (degrees, positive = left)
    pub yaw: f32,
    /// Rotation around the nose axis (degrees)
    pub roll: f32,
    /// Mouth openness (0.0 = closed, 1.0 = fully open)
    pub mouth_openness: f32,
    pub face_detected: bool,
}

impl FaceGeometry {
    /// Build from Euler angles in radians, as most trackers report them
    pub fn from_euler_radians(pitch: f32, yaw: f32, roll: f32, mouth_openness: f32) -> Self {
        FaceGeometry {
            pitch: pitch.to_degrees(),
            yaw: yaw.to_degrees(),
            roll: roll.to_degrees(),
            mouth_openness,
            face_detected: true,
        }
    }

    /// The sample fed to the milestone flow. None when there is no usable face.
    pub fn angle_sample(&self) -> Option<AngleSample> {
        if !self.face_detected {
            return None;
        }
        let sample = AngleSample::new(self.pitch, self.yaw, self.mouth_openness);
        sample.is_finite().then_some(sample)
    }
}

/// Gravity vector from the motion sensor, in device coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeviceOrientation {
    pub gravity_x: f64,
    pub gravity_y: f64,
    pub gravity_z: f64,
}

impl DeviceOrientation {
    pub fn new(gravity_x: f64, gravity_y: f64, gravity_z: f64) -> Self {
        Self {
            gravity_x,
            gravity_y,
            gravity_z,
        }
    }

    /// Device held upright in portrait
    pub fn portrait() -> Self {
        Self::new(0.0, -1.0, 0.0)
    }

    /// Which way is up for a face, as the counter-clockwise rotation of the
    /// device relative to landscape-left, in whole degrees [0, 360).
    pub fn recognition_rotation_degrees(&self) -> u32 {
        if !self.gravity_x.is_finite() || !self.gravity_y.is_finite() {
            return 0;
        }
        let rotation = 2.0 * PI - self.gravity_x.atan2(self.gravity_y) + PI / 2.0;
        ((rotation * 180.0 / PI) as u32) % 360
    }
}
