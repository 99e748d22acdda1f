//! Liveness session state
//!
//! One value of [`LivenessSession`] exists per attempt. Retrying builds a
//! fresh value instead of resetting fields on the old one.

use vcheck_core::{AttemptNumber, LivenessConfig, SessionId, SessionTime};
use vcheck_time::Cooldown;

use crate::{GestureMilestone, MilestoneFlow, ObstacleFrameCounters, SessionOutcome};

/// Lifecycle of a single session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Gestures and obstacles are evaluated
    Active,
    /// Finished; frames are still recorded until the drain tail lapses
    Draining { since: SessionTime, fail_open: bool },
    /// Recorder stop requested; waiting for the finalized file
    Stopping(SessionOutcome),
    Ended(SessionOutcome),
}

/// Mutable state of the running attempt
#[derive(Debug, Clone)]
pub struct LivenessSession {
    pub(crate) id: SessionId,
    pub(crate) attempt: AttemptNumber,
    pub(crate) flow: MilestoneFlow,
    pub(crate) counters: ObstacleFrameCounters,
    pub(crate) phase: SessionPhase,
    pub(crate) streaming_permitted: bool,
    pub(crate) stage_block: Cooldown,
    pub(crate) obstacle_block: Cooldown,
    pub(crate) face_count_frames: u32,
    pub(crate) last_frame_at: SessionTime,
    pub(crate) frames_seen: u64,
    pub(crate) frames_recorded: u64,
}

impl LivenessSession {
    pub fn new(id: SessionId, attempt: AttemptNumber, config: &LivenessConfig) -> Self {
        LivenessSession {
            id,
            attempt,
            flow: MilestoneFlow::new(config.thresholds.clone()),
            counters: ObstacleFrameCounters::new(),
            phase: SessionPhase::Active,
            streaming_permitted: true,
            stage_block: Cooldown::new(),
            obstacle_block: Cooldown::new(),
            face_count_frames: 0,
            last_frame_at: SessionTime::ZERO,
            frames_seen: 0,
            frames_recorded: 0,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn attempt(&self) -> AttemptNumber {
        self.attempt
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn current_milestone(&self) -> GestureMilestone {
        self.flow.current()
    }

    /// Gesture evaluation is over for this session
    pub fn is_finished(&self) -> bool {
        self.phase != SessionPhase::Active
    }

    pub fn is_ended(&self) -> bool {
        matches!(self.phase, SessionPhase::Ended(_))
    }

    pub fn streaming_permitted(&self) -> bool {
        self.streaming_permitted
    }

    pub fn counters(&self) -> &ObstacleFrameCounters {
        &self.counters
    }

    /// Whether the stage animation may advance at `now`
    pub fn stage_indication_allowed(&self, now: SessionTime) -> bool {
        self.phase == SessionPhase::Active && !self.stage_block.is_active(now)
    }

    /// Advance the face-count sampler by one frame. True on sampling ticks.
    pub(crate) fn tick_face_count_sampler(&mut self, interval: u32) -> bool {
        if self.phase != SessionPhase::Active || !self.streaming_permitted {
            return false;
        }
        self.face_count_frames += 1;
        if self.face_count_frames >= interval {
            self.face_count_frames = 0;
            true
        } else {
            false
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let now = self.last_frame_at;
        SessionSnapshot {
            session: self.id,
            attempt: self.attempt,
            current_milestone: self.flow.current(),
            is_finished: self.is_finished(),
            streaming_permitted: self.streaming_permitted,
            obstacle_block_active: self.obstacle_block.is_active(now),
            stage_block_active: self.stage_block.is_active(now),
            phase: self.phase,
            low_brightness_frames: self.counters.low_brightness(),
            wrong_gesture_frames: self.counters.wrong_gesture(),
            frames_seen: self.frames_seen,
            frames_recorded: self.frames_recorded,
        }
    }
}

/// Read-only view of a session, taken at its last processed frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session: SessionId,
    pub attempt: AttemptNumber,
    pub current_milestone: GestureMilestone,
    pub is_finished: bool,
    pub streaming_permitted: bool,
    pub obstacle_block_active: bool,
    pub stage_block_active: bool,
    pub phase: SessionPhase,
    pub low_brightness_frames: u32,
    pub wrong_gesture_frames: u32,
    pub frames_seen: u64,
    pub frames_recorded: u64,
}
