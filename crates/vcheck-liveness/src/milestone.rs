//! Milestone flow - the ordered gesture ladder
//!
//! Exactly one milestone is current. A frame can complete at most the
//! current milestone, and never while the yaw hard limit is exceeded.

use vcheck_core::GestureThresholds;

use crate::{AngleSample, ObstacleType};

/// Gesture stages, in the order they must be performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GestureMilestone {
    CheckHeadPosition,
    OuterLeftHeadPitch,
    OuterRightHeadPitch,
    MouthOpen,
}

impl GestureMilestone {
    pub const ALL: [GestureMilestone; 4] = [
        GestureMilestone::CheckHeadPosition,
        GestureMilestone::OuterLeftHeadPitch,
        GestureMilestone::OuterRightHeadPitch,
        GestureMilestone::MouthOpen,
    ];

    pub fn first() -> Self {
        GestureMilestone::CheckHeadPosition
    }

    pub fn next(self) -> Option<Self> {
        match self {
            GestureMilestone::CheckHeadPosition => Some(GestureMilestone::OuterLeftHeadPitch),
            GestureMilestone::OuterLeftHeadPitch => Some(GestureMilestone::OuterRightHeadPitch),
            GestureMilestone::OuterRightHeadPitch => Some(GestureMilestone::MouthOpen),
            GestureMilestone::MouthOpen => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }

    /// What the user is asked to do while this milestone is current
    pub fn guidance(self) -> StageGuidance {
        match self {
            GestureMilestone::CheckHeadPosition => StageGuidance::TurnHeadLeft,
            GestureMilestone::OuterLeftHeadPitch => StageGuidance::TiltHeadDown,
            GestureMilestone::OuterRightHeadPitch => StageGuidance::TiltHeadUp,
            GestureMilestone::MouthOpen => StageGuidance::OpenMouth,
        }
    }

    fn is_met(self, sample: &AngleSample, thresholds: &GestureThresholds) -> bool {
        match self {
            GestureMilestone::CheckHeadPosition => sample.yaw >= thresholds.left_yaw_deg,
            GestureMilestone::OuterLeftHeadPitch => sample.pitch <= -thresholds.outer_pitch_deg,
            GestureMilestone::OuterRightHeadPitch => sample.pitch >= thresholds.outer_pitch_deg,
            GestureMilestone::MouthOpen => sample.mouth_factor >= thresholds.mouth_open_factor,
        }
    }
}

/// Instruction shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageGuidance {
    TurnHeadLeft,
    TiltHeadDown,
    TiltHeadUp,
    OpenMouth,
    /// All gestures done; keep still while recording finishes
    Hold,
}

/// Result of checking one sample against the current milestone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageCheck {
    pub completed: Option<GestureMilestone>,
    pub obstacle: Option<ObstacleType>,
}

/// Sequential gesture state machine
#[derive(Debug, Clone)]
pub struct MilestoneFlow {
    thresholds: GestureThresholds,
    current: GestureMilestone,
    finished: bool,
}

impl MilestoneFlow {
    pub fn new(thresholds: GestureThresholds) -> Self {
        MilestoneFlow {
            thresholds,
            current: GestureMilestone::first(),
            finished: false,
        }
    }

    /// Evaluate one frame. The yaw hard limit is checked before any
    /// milestone, so an over-rotated frame never completes a gesture.
    pub fn check_current_stage(&mut self, sample: &AngleSample) -> StageCheck {
        if self.finished || !sample.is_finite() {
            return StageCheck::default();
        }

        if sample.yaw.abs() > self.thresholds.yaw_hard_limit_deg {
            return StageCheck {
                completed: None,
                obstacle: Some(ObstacleType::YawAngleExceeded),
            };
        }

        if !self.current.is_met(sample, &self.thresholds) {
            return StageCheck::default();
        }

        let completed = self.current;
        match completed.next() {
            Some(next) => self.current = next,
            None => self.finished = true,
        }
        StageCheck {
            completed: Some(completed),
            obstacle: None,
        }
    }

    /// The milestone being worked on (the last one once finished)
    pub fn current(&self) -> GestureMilestone {
        self.current
    }

    pub fn undone_stage(&self) -> Option<GestureMilestone> {
        (!self.finished).then_some(self.current)
    }

    pub fn guidance(&self) -> StageGuidance {
        self.undone_stage()
            .map(GestureMilestone::guidance)
            .unwrap_or(StageGuidance::Hold)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn thresholds(&self) -> &GestureThresholds {
        &self.thresholds
    }
}
