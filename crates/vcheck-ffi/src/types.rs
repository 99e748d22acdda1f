//! FFI Types - C-compatible type definitions

use std::ffi::{c_char, c_int, c_void, CString};
use std::time::Duration;

use bytes::Bytes;
use vcheck_liveness::{
    DeviceOrientation, GestureMilestone, HapticFeedback, LivenessEvent, ObstacleType, SessionOutcome,
    SessionPhase, SessionSnapshot, StageGuidance,
};
use vcheck_runtime::{CameraFrame, FrameReport, RawFrame};

use crate::c_string;

/// Kind of a [`VCheckEvent`]
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VCheckEventKind {
    SessionStarted = 0,
    MilestonePassed = 1,
    ObstacleRaised = 2,
    GuidanceRestored = 3,
    Haptic = 4,
    GesturesCompleted = 5,
    RecordingFailed = 6,
    SessionEnded = 7,
    SetupFailed = 8,
}

/// Flattened liveness event. Fields that do not apply to the kind are -1,
/// 0 or NULL. Pointers are valid only for the duration of the callback.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VCheckEvent {
    pub kind: VCheckEventKind,
    pub session: u64,
    pub attempt: u32,
    pub milestone: i32,
    pub guidance: i32,
    pub obstacle: i32,
    pub terminal: bool,
    pub haptic: i32,
    pub outcome: i32,
    pub fail_open: bool,
    pub video_path: *const c_char,
    pub video_frames: u64,
    pub video_duration_ms: u64,
    pub message: *const c_char,
}

impl VCheckEvent {
    fn empty(kind: VCheckEventKind) -> Self {
        VCheckEvent {
            kind,
            session: 0,
            attempt: 0,
            milestone: -1,
            guidance: -1,
            obstacle: -1,
            terminal: false,
            haptic: -1,
            outcome: -1,
            fail_open: false,
            video_path: std::ptr::null(),
            video_frames: 0,
            video_duration_ms: 0,
            message: std::ptr::null(),
        }
    }
}

/// A [`VCheckEvent`] together with the strings it points into
pub(crate) struct EncodedEvent {
    raw: VCheckEvent,
    _strings: Vec<CString>,
}

impl EncodedEvent {
    pub(crate) fn new(event: &LivenessEvent) -> Self {
        let mut strings = Vec::new();
        let mut keep = |s: &str| {
            let owned = c_string(s);
            let ptr = owned.as_ptr();
            strings.push(owned);
            ptr
        };

        let raw = match event {
            LivenessEvent::SessionStarted {
                session,
                attempt,
                guidance,
            } => VCheckEvent {
                session: session.0,
                attempt: attempt.get(),
                guidance: guidance_code(*guidance),
                ..VCheckEvent::empty(VCheckEventKind::SessionStarted)
            },
            LivenessEvent::MilestonePassed {
                session,
                milestone,
                next,
            } => VCheckEvent {
                session: session.0,
                milestone: milestone_code(*milestone),
                guidance: guidance_code(*next),
                ..VCheckEvent::empty(VCheckEventKind::MilestonePassed)
            },
            LivenessEvent::ObstacleRaised {
                session,
                obstacle,
                terminal,
            } => VCheckEvent {
                session: session.0,
                obstacle: obstacle_code(*obstacle),
                terminal: *terminal,
                ..VCheckEvent::empty(VCheckEventKind::ObstacleRaised)
            },
            LivenessEvent::GuidanceRestored { session, guidance } => VCheckEvent {
                session: session.0,
                guidance: guidance_code(*guidance),
                ..VCheckEvent::empty(VCheckEventKind::GuidanceRestored)
            },
            LivenessEvent::Haptic(feedback) => VCheckEvent {
                haptic: match feedback {
                    HapticFeedback::Success => 0,
                    HapticFeedback::Warning => 1,
                },
                ..VCheckEvent::empty(VCheckEventKind::Haptic)
            },
            LivenessEvent::GesturesCompleted { session, fail_open } => VCheckEvent {
                session: session.0,
                fail_open: *fail_open,
                ..VCheckEvent::empty(VCheckEventKind::GesturesCompleted)
            },
            LivenessEvent::RecordingFailed { session, reason } => VCheckEvent {
                session: session.0,
                message: keep(reason),
                ..VCheckEvent::empty(VCheckEventKind::RecordingFailed)
            },
            LivenessEvent::SessionEnded {
                session,
                attempt,
                outcome,
                video,
            } => {
                let mut raw = VCheckEvent {
                    session: session.0,
                    attempt: attempt.get(),
                    outcome: outcome_code(outcome),
                    ..VCheckEvent::empty(VCheckEventKind::SessionEnded)
                };
                match outcome {
                    SessionOutcome::Completed { fail_open } => raw.fail_open = *fail_open,
                    SessionOutcome::PrematureEnd(obstacle) => raw.obstacle = obstacle_code(*obstacle),
                    SessionOutcome::TimedOut => {}
                }
                if let Some(video) = video {
                    raw.video_path = keep(&video.path.to_string_lossy());
                    raw.video_frames = video.frames;
                    raw.video_duration_ms = video.duration.as_millis() as u64;
                }
                raw
            }
            LivenessEvent::SetupFailed { reason } => VCheckEvent {
                message: keep(reason),
                ..VCheckEvent::empty(VCheckEventKind::SetupFailed)
            },
        };

        EncodedEvent {
            raw,
            _strings: strings,
        }
    }

    pub(crate) fn as_ptr(&self) -> *const VCheckEvent {
        &self.raw
    }
}

pub fn milestone_code(milestone: GestureMilestone) -> i32 {
    match milestone {
        GestureMilestone::CheckHeadPosition => 0,
        GestureMilestone::OuterLeftHeadPitch => 1,
        GestureMilestone::OuterRightHeadPitch => 2,
        GestureMilestone::MouthOpen => 3,
    }
}

pub fn guidance_code(guidance: StageGuidance) -> i32 {
    match guidance {
        StageGuidance::TurnHeadLeft => 0,
        StageGuidance::TiltHeadDown => 1,
        StageGuidance::TiltHeadUp => 2,
        StageGuidance::OpenMouth => 3,
        StageGuidance::Hold => 4,
    }
}

pub fn obstacle_code(obstacle: ObstacleType) -> i32 {
    match obstacle {
        ObstacleType::NoOrPartialFace => 0,
        ObstacleType::MultipleFaces => 1,
        ObstacleType::YawAngleExceeded => 2,
        ObstacleType::LowBrightness => 3,
    }
}

pub fn outcome_code(outcome: &SessionOutcome) -> i32 {
    match outcome {
        SessionOutcome::Completed { .. } => 0,
        SessionOutcome::PrematureEnd(_) => 1,
        SessionOutcome::TimedOut => 2,
    }
}

/// One camera frame. `timestamp_us < 0` means no timestamp, a NaN
/// `brightness` means no exposure reading.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VCheckFrame {
    pub timestamp_us: i64,
    pub pixels: *const u8,
    pub len: usize,
    pub width: u32,
    pub height: u32,
    pub brightness: f32,
    pub has_gravity: bool,
    pub gravity_x: f64,
    pub gravity_y: f64,
    pub gravity_z: f64,
}

impl VCheckFrame {
    /// Copy the frame into an owned [`CameraFrame`]
    ///
    /// # Safety
    /// `pixels` must be NULL or valid for `len` bytes.
    pub(crate) unsafe fn to_camera_frame(&self) -> CameraFrame {
        let pixels = if self.pixels.is_null() || self.len == 0 {
            Bytes::new()
        } else {
            Bytes::copy_from_slice(std::slice::from_raw_parts(self.pixels, self.len))
        };

        let mut raw = RawFrame::new(pixels, self.width, self.height);
        if self.timestamp_us >= 0 {
            raw = raw.with_timestamp(Duration::from_micros(self.timestamp_us as u64));
        }

        let mut frame = CameraFrame::new(raw);
        if !self.brightness.is_nan() {
            frame = frame.with_brightness(self.brightness);
        }
        if self.has_gravity {
            frame = frame.with_orientation(DeviceOrientation::new(self.gravity_x, self.gravity_y, self.gravity_z));
        }
        frame
    }

    /// Borrowing view handed to native callbacks
    pub(crate) fn view(raw: &RawFrame) -> Self {
        VCheckFrame {
            timestamp_us: raw.timestamp.map(|t| t.as_micros() as i64).unwrap_or(-1),
            pixels: raw.pixels.as_ptr(),
            len: raw.pixels.len(),
            width: raw.width,
            height: raw.height,
            brightness: f32::NAN,
            has_gravity: false,
            gravity_x: 0.0,
            gravity_y: 0.0,
            gravity_z: 0.0,
        }
    }
}

/// Tracker output, angles in degrees
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VCheckFaceGeometry {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
    pub mouth_openness: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VCheckFrameReport {
    pub at_ms: u64,
    pub indicate_stage: bool,
    pub recorded: bool,
}

impl From<FrameReport> for VCheckFrameReport {
    fn from(report: FrameReport) -> Self {
        VCheckFrameReport {
            at_ms: report.at.as_millis(),
            indicate_stage: report.indicate_stage,
            recorded: report.recorded,
        }
    }
}

/// Session phase codes: 0 active, 1 draining, 2 stopping, 3 ended
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VCheckSnapshot {
    pub session: u64,
    pub attempt: u32,
    pub max_attempts: u32,
    pub milestone: i32,
    pub phase: i32,
    pub is_finished: bool,
    pub streaming_permitted: bool,
    pub low_brightness_frames: u32,
    pub frames_recorded: u64,
}

impl VCheckSnapshot {
    pub(crate) fn new(snapshot: &SessionSnapshot, max_attempts: u32) -> Self {
        VCheckSnapshot {
            session: snapshot.session.0,
            attempt: snapshot.attempt.get(),
            max_attempts,
            milestone: milestone_code(snapshot.current_milestone),
            phase: match snapshot.phase {
                SessionPhase::Active => 0,
                SessionPhase::Draining { .. } => 1,
                SessionPhase::Stopping(_) => 2,
                SessionPhase::Ended(_) => 3,
            },
            is_finished: snapshot.is_finished,
            streaming_permitted: snapshot.streaming_permitted,
            low_brightness_frames: snapshot.low_brightness_frames,
            frames_recorded: snapshot.frames_recorded,
        }
    }
}

/// Opaque recorder completion, consumed by `vcheck_recording_finished` or
/// `vcheck_recording_failed`
pub struct VCheckStopHandle {
    pub(crate) completion: vcheck_runtime::StopCompletion,
}

/// Receives every liveness event
pub type VCheckEventCallback = extern "C" fn(user_data: *mut c_void, event: *const VCheckEvent);

/// Prepare a fresh native tracker. Non-zero return is a setup failure.
pub type VCheckCreateTrackerCallback = extern "C" fn(user_data: *mut c_void) -> c_int;

/// Track one frame. Return 1 with `out` filled when a face was found, 0 when
/// none was, negative on error.
pub type VCheckTrackFaceCallback = extern "C" fn(
    user_data: *mut c_void,
    frame: *const VCheckFrame,
    rotation_degrees: u32,
    out: *mut VCheckFaceGeometry,
) -> c_int;

/// Count faces in a frame; negative when no answer is available
pub type VCheckCountFacesCallback = extern "C" fn(user_data: *mut c_void, frame: *const VCheckFrame) -> i32;

pub type VCheckStartRecordingCallback = extern "C" fn(user_data: *mut c_void) -> c_int;

pub type VCheckRecordFrameCallback = extern "C" fn(user_data: *mut c_void, frame: *const VCheckFrame) -> c_int;

/// Stop recording and later resolve `completion` exactly once
pub type VCheckStopRecordingCallback = extern "C" fn(user_data: *mut c_void, completion: *mut VCheckStopHandle);

/// Native collaborators. `count_faces` is optional; all others are required.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct VCheckCallbacks {
    pub user_data: *mut c_void,
    pub on_event: Option<VCheckEventCallback>,
    pub create_tracker: Option<VCheckCreateTrackerCallback>,
    pub track_face: Option<VCheckTrackFaceCallback>,
    pub count_faces: Option<VCheckCountFacesCallback>,
    pub start_recording: Option<VCheckStartRecordingCallback>,
    pub record_frame: Option<VCheckRecordFrameCallback>,
    pub stop_recording: Option<VCheckStopRecordingCallback>,
}
