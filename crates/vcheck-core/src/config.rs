//! Liveness configuration
//!
//! Angles are in degrees. Brightness is the exposure value reported by the
//! camera metadata (negative means darker than a neutral scene).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{VCheckError, VCheckResult};

/// Gesture thresholds used by the milestone flow
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureThresholds {
    /// Yaw that completes the head-position check (positive = left)
    pub left_yaw_deg: f32,
    /// Absolute yaw beyond which the pose is rejected
    pub yaw_hard_limit_deg: f32,
    /// Absolute pitch the head must reach in each direction
    pub outer_pitch_deg: f32,
    /// Mouth openness factor that completes the final gesture
    pub mouth_open_factor: f32,
}

impl Default for GestureThresholds {
    fn default() -> Self {
        GestureThresholds {
            left_yaw_deg: 15.0,
            yaw_hard_limit_deg: 45.0,
            outer_pitch_deg: 20.0,
            mouth_open_factor: 0.55,
        }
    }
}

/// Liveness session configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    pub thresholds: GestureThresholds,
    /// Hard session deadline
    pub time_limit_ms: u64,
    /// Stage indication is suppressed this long after a milestone passes
    pub stage_success_block_ms: u64,
    /// Guidance stays on the obstacle warning this long after a yaw obstacle
    pub obstacle_block_ms: u64,
    /// Frames keep recording this long after the final gesture
    pub drain_tail_ms: u64,
    /// Exposure value below which a frame counts as too dark
    pub min_brightness: f32,
    /// Consecutive dark frames before the session ends
    pub max_low_brightness_frames: u32,
    /// Yaw-exceeded frames before the legacy wrong-gesture escalation
    pub max_wrong_gesture_frames: u32,
    /// Whether yaw obstacles escalate to a terminal obstacle
    pub escalate_wrong_gesture: bool,
    /// Face count is sampled every N-th frame
    pub face_count_interval: u32,
    /// Local attempts before obstacles fail open
    pub max_attempts: u32,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        LivenessConfig {
            thresholds: GestureThresholds::default(),
            time_limit_ms: 14_000,
            stage_success_block_ms: 1_200,
            obstacle_block_ms: 1_100,
            drain_tail_ms: 800,
            min_brightness: -1.5,
            max_low_brightness_frames: 20,
            max_wrong_gesture_frames: 50,
            escalate_wrong_gesture: false,
            face_count_interval: 20,
            max_attempts: 5,
        }
    }
}

impl LivenessConfig {
    /// Tuning for poorly lit rooms and users with limited head mobility
    pub fn lenient() -> Self {
        LivenessConfig {
            thresholds: GestureThresholds {
                left_yaw_deg: 12.0,
                yaw_hard_limit_deg: 50.0,
                outer_pitch_deg: 15.0,
                mouth_open_factor: 0.45,
            },
            min_brightness: -2.5,
            max_low_brightness_frames: 40,
            ..Self::default()
        }
    }

    /// Parse a JSON configuration; missing fields take their defaults
    pub fn from_json(json: &str) -> VCheckResult<Self> {
        let config: LivenessConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> VCheckResult<()> {
        let t = &self.thresholds;
        for (name, value) in [
            ("left_yaw_deg", t.left_yaw_deg),
            ("yaw_hard_limit_deg", t.yaw_hard_limit_deg),
            ("outer_pitch_deg", t.outer_pitch_deg),
            ("mouth_open_factor", t.mouth_open_factor),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(VCheckError::InvalidConfig(format!(
                    "{name} must be finite and positive, got {value}"
                )));
            }
        }
        if t.yaw_hard_limit_deg <= t.left_yaw_deg {
            return Err(VCheckError::InvalidConfig(format!(
                "yaw_hard_limit_deg ({}) must exceed left_yaw_deg ({})",
                t.yaw_hard_limit_deg, t.left_yaw_deg
            )));
        }
        if !self.min_brightness.is_finite() {
            return Err(VCheckError::InvalidConfig(
                "min_brightness must be finite".into(),
            ));
        }
        for (name, value) in [
            ("max_low_brightness_frames", self.max_low_brightness_frames),
            ("max_wrong_gesture_frames", self.max_wrong_gesture_frames),
            ("face_count_interval", self.face_count_interval),
            ("max_attempts", self.max_attempts),
        ] {
            if value == 0 {
                return Err(VCheckError::InvalidConfig(format!("{name} must be at least 1")));
            }
        }
        if self.time_limit_ms == 0 {
            return Err(VCheckError::InvalidConfig("time_limit_ms must be non-zero".into()));
        }
        Ok(())
    }

    #[inline]
    pub fn time_limit(&self) -> Duration {
        Duration::from_millis(self.time_limit_ms)
    }

    #[inline]
    pub fn stage_success_block(&self) -> Duration {
        Duration::from_millis(self.stage_success_block_ms)
    }

    #[inline]
    pub fn obstacle_block(&self) -> Duration {
        Duration::from_millis(self.obstacle_block_ms)
    }

    #[inline]
    pub fn drain_tail(&self) -> Duration {
        Duration::from_millis(self.drain_tail_ms)
    }
}
