//! Fake collaborators backed by a shared scene
//!
//! The test writes the current [`UserFrame`] into a [`Scene`]; the fake
//! tracker and face counter read it back when the controller asks.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use vcheck_core::{VCheckError, VCheckResult};
use vcheck_liveness::{FaceGeometry, LivenessEvent, SessionOutcome, VideoArtifact};
use vcheck_runtime::{
    FaceCountSource, FaceTracker, FaceTrackerFactory, LivenessObserver, RawFrame, StopCompletion, VideoRecorder,
};

use crate::{UserFrame, FRAME_SPACING};

/// What the camera currently sees
#[derive(Clone, Default)]
pub struct Scene(Arc<Mutex<UserFrame>>);

impl Scene {
    pub fn set(&self, frame: UserFrame) {
        *self.0.lock() = frame;
    }

    pub fn get(&self) -> UserFrame {
        *self.0.lock()
    }
}

/// Reports the scene's pose
pub struct SceneTracker {
    scene: Scene,
}

impl FaceTracker for SceneTracker {
    fn track(&mut self, _frame: &RawFrame, _rotation_degrees: u32) -> VCheckResult<Option<FaceGeometry>> {
        Ok(self.scene.get().pose.map(|pose| FaceGeometry {
            pitch: pose.pitch,
            yaw: pose.yaw,
            roll: 0.0,
            mouth_openness: pose.mouth_factor,
            face_detected: true,
        }))
    }
}

/// Builds [`SceneTracker`]s; can be told to fail the next few builds
#[derive(Clone)]
pub struct SceneTrackerFactory {
    scene: Scene,
    created: Arc<AtomicUsize>,
    failures_left: Arc<AtomicUsize>,
}

impl SceneTrackerFactory {
    pub fn new(scene: Scene) -> Self {
        SceneTrackerFactory {
            scene,
            created: Arc::new(AtomicUsize::new(0)),
            failures_left: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fail_next(&self, builds: usize) {
        self.failures_left.store(builds, Ordering::SeqCst);
    }

    /// Successful builds so far
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl FaceTrackerFactory for SceneTrackerFactory {
    fn create(&mut self) -> VCheckResult<Box<dyn FaceTracker>> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(VCheckError::TrackingSetup("tracking model unavailable".into()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SceneTracker {
            scene: self.scene.clone(),
        }))
    }
}

/// Reports the scene's face count
pub struct SceneFaceCounter {
    scene: Scene,
}

impl SceneFaceCounter {
    pub fn new(scene: Scene) -> Self {
        SceneFaceCounter { scene }
    }
}

impl FaceCountSource for SceneFaceCounter {
    fn count_faces(&mut self, _frame: &RawFrame) -> Option<u32> {
        Some(self.scene.get().faces)
    }
}

/// How the fake recorder answers a stop request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopBehavior {
    /// Resolve the completion inside `stop_recording`
    Immediate,
    /// Report a flush failure
    Fail,
    /// Drop the completion without resolving it
    Abandon,
    /// Park the completion; the test resolves it via [`RecorderHandle::finish_pending`]
    Manual,
}

#[derive(Default)]
struct RecorderLog {
    starts: u32,
    stops: u32,
    frames: u64,
    total_frames: u64,
    pending: Option<StopCompletion>,
}

/// In-memory recorder counting what it was given
pub struct MemoryRecorder {
    behavior: StopBehavior,
    log: Arc<Mutex<RecorderLog>>,
}

/// Test-side view of a [`MemoryRecorder`]
#[derive(Clone)]
pub struct RecorderHandle {
    log: Arc<Mutex<RecorderLog>>,
}

fn artifact(frames: u64, take: u32) -> VideoArtifact {
    VideoArtifact {
        path: PathBuf::from(format!("/tmp/vcheck/liveness-{take}.mp4")),
        frames,
        duration: FRAME_SPACING * frames as u32,
    }
}

impl MemoryRecorder {
    pub fn new(behavior: StopBehavior) -> (Self, RecorderHandle) {
        let log = Arc::new(Mutex::new(RecorderLog::default()));
        (
            MemoryRecorder {
                behavior,
                log: log.clone(),
            },
            RecorderHandle { log },
        )
    }
}

impl VideoRecorder for MemoryRecorder {
    fn start_recording(&mut self) -> VCheckResult<()> {
        let mut log = self.log.lock();
        log.starts += 1;
        log.frames = 0;
        Ok(())
    }

    fn record_frame(&mut self, _frame: &RawFrame) -> VCheckResult<()> {
        let mut log = self.log.lock();
        log.frames += 1;
        log.total_frames += 1;
        Ok(())
    }

    fn stop_recording(&mut self, completion: StopCompletion) {
        let mut log = self.log.lock();
        log.stops += 1;
        match self.behavior {
            StopBehavior::Immediate => completion.finish(artifact(log.frames, log.starts)),
            StopBehavior::Fail => completion.fail("encoder failed to finalize"),
            StopBehavior::Abandon => drop(completion),
            StopBehavior::Manual => log.pending = Some(completion),
        }
    }
}

impl RecorderHandle {
    pub fn starts(&self) -> u32 {
        self.log.lock().starts
    }

    pub fn stops(&self) -> u32 {
        self.log.lock().stops
    }

    /// Frames recorded in the current take
    pub fn frames(&self) -> u64 {
        self.log.lock().frames
    }

    pub fn total_frames(&self) -> u64 {
        self.log.lock().total_frames
    }

    pub fn has_pending(&self) -> bool {
        self.log.lock().pending.is_some()
    }

    /// Resolve a parked completion with the current take. False if none was parked.
    pub fn finish_pending(&self) -> bool {
        let mut log = self.log.lock();
        let Some(completion) = log.pending.take() else {
            return false;
        };
        completion.finish(artifact(log.frames, log.starts));
        true
    }
}

/// Observer that keeps every event
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<LivenessEvent>>>);

impl EventLog {
    pub fn events(&self) -> Vec<LivenessEvent> {
        self.0.lock().clone()
    }

    pub fn take(&self) -> Vec<LivenessEvent> {
        std::mem::take(&mut *self.0.lock())
    }

    pub fn outcomes(&self) -> Vec<SessionOutcome> {
        self.0
            .lock()
            .iter()
            .filter_map(|event| match event {
                LivenessEvent::SessionEnded { outcome, .. } => Some(*outcome),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, matches: impl Fn(&LivenessEvent) -> bool) -> usize {
        self.0.lock().iter().filter(|event| matches(event)).count()
    }
}

impl LivenessObserver for EventLog {
    fn on_event(&self, event: &LivenessEvent) {
        self.0.lock().push(event.clone());
    }
}
