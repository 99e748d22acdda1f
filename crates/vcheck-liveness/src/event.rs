//! Events projected to the host shell

use std::path::PathBuf;
use std::time::Duration;

use vcheck_core::{AttemptNumber, SessionId};

use crate::{GestureMilestone, ObstacleType, StageGuidance};

/// Finalized recording handed back by the video recorder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoArtifact {
    pub path: PathBuf,
    pub frames: u64,
    pub duration: Duration,
}

/// Haptic pattern requested from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HapticFeedback {
    Success,
    Warning,
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// All gestures performed, or an obstacle failed open on the last attempt
    Completed { fail_open: bool },
    /// A terminal obstacle ended the session; the shell offers a retry
    PrematureEnd(ObstacleType),
    /// The deadline passed first
    TimedOut,
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SessionOutcome::Completed { .. })
    }
}

/// Everything the shell is told about a session
#[derive(Debug, Clone, PartialEq)]
pub enum LivenessEvent {
    SessionStarted {
        session: SessionId,
        attempt: AttemptNumber,
        guidance: StageGuidance,
    },
    MilestonePassed {
        session: SessionId,
        milestone: GestureMilestone,
        next: StageGuidance,
    },
    ObstacleRaised {
        session: SessionId,
        obstacle: ObstacleType,
        terminal: bool,
    },
    /// The obstacle warning cooled down; show the current instruction again
    GuidanceRestored {
        session: SessionId,
        guidance: StageGuidance,
    },
    Haptic(HapticFeedback),
    /// No more gestures are evaluated; recording drains and stops next
    GesturesCompleted {
        session: SessionId,
        fail_open: bool,
    },
    RecordingFailed {
        session: SessionId,
        reason: String,
    },
    /// Final signal. `video` is present only for completed sessions whose
    /// recording was flushed.
    SessionEnded {
        session: SessionId,
        attempt: AttemptNumber,
        outcome: SessionOutcome,
        video: Option<VideoArtifact>,
    },
    /// The face tracker could not be created; no session is running
    SetupFailed { reason: String },
}
