//! Controller harness - a full liveness controller over fake collaborators
//!
//! Frames are stamped 33ms apart and the harness sleeps the same amount on
//! the tokio clock after each one, so under a paused runtime the deadline
//! timer and the frame clock advance together.

use std::time::Duration;

use bytes::Bytes;
use tokio::runtime::Handle;
use vcheck_core::{LivenessConfig, VCheckResult};
use vcheck_liveness::SessionPhase;
use vcheck_runtime::{CameraFrame, Collaborators, FrameReport, LivenessController, RawFrame};

use crate::{
    EventLog, MemoryRecorder, RecorderHandle, Scene, SceneFaceCounter, SceneTrackerFactory, ScriptedUser,
    StopBehavior, UserFrame,
};

/// Spacing between submitted frames
pub const FRAME_SPACING: Duration = Duration::from_millis(33);

/// Wires a [`LivenessController`] to a scene, an in-memory recorder and an event log
pub struct ControllerHarness {
    pub controller: LivenessController,
    pub scene: Scene,
    pub events: EventLog,
    trackers: SceneTrackerFactory,
    recorder: RecorderHandle,
    pixels: Bytes,
    camera_clock: Duration,
}

impl ControllerHarness {
    /// Must be called from inside a tokio runtime
    pub fn new(config: LivenessConfig, stop: StopBehavior) -> VCheckResult<Self> {
        let scene = Scene::default();
        let trackers = SceneTrackerFactory::new(scene.clone());
        let (recorder, recorder_handle) = MemoryRecorder::new(stop);
        let events = EventLog::default();

        let collaborators = Collaborators {
            tracker_factory: Box::new(trackers.clone()),
            face_counter: Box::new(SceneFaceCounter::new(scene.clone())),
            recorder: Box::new(recorder),
        };
        let controller = LivenessController::new(config, collaborators, events.clone(), Handle::current())?;

        Ok(ControllerHarness {
            controller,
            scene,
            events,
            trackers,
            recorder: recorder_handle,
            pixels: Bytes::from(vec![0u8; 16 * 16]),
            // Camera timestamps rarely start at zero
            camera_clock: Duration::from_secs(3_600),
        })
    }

    pub fn trackers(&self) -> &SceneTrackerFactory {
        &self.trackers
    }

    pub fn recorder(&self) -> &RecorderHandle {
        &self.recorder
    }

    /// Show `frame` to the camera and submit it, then let 33ms pass
    pub async fn show(&mut self, frame: UserFrame) -> FrameReport {
        self.scene.set(frame);
        let raw = RawFrame::new(self.pixels.clone(), 16, 16).with_timestamp(self.camera_clock);
        let report = self
            .controller
            .submit_frame(CameraFrame::new(raw).with_brightness(frame.brightness));
        self.camera_clock += FRAME_SPACING;
        tokio::time::sleep(FRAME_SPACING).await;
        report
    }

    /// Play `frames` frames of `user`
    pub async fn play(&mut self, user: &mut ScriptedUser, frames: usize) -> Vec<FrameReport> {
        let mut reports = Vec::with_capacity(frames);
        for _ in 0..frames {
            let frame = user.next_frame();
            reports.push(self.show(frame).await);
        }
        reports
    }

    /// Play `user` until the controller reports an ended session, at most `max_frames`
    pub async fn play_until_ended(&mut self, user: &mut ScriptedUser, max_frames: usize) -> usize {
        for played in 0..max_frames {
            if self.session_ended() {
                return played;
            }
            let frame = user.next_frame();
            self.show(frame).await;
        }
        max_frames
    }

    /// Let spawned completions and timers run
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    pub fn session_ended(&self) -> bool {
        self.controller
            .snapshot()
            .map(|snapshot| matches!(snapshot.phase, SessionPhase::Ended(_)))
            .unwrap_or(false)
    }
}
