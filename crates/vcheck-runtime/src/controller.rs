//! Liveness controller - runs one liveness session at a time
//!
//! The controller owns the engine behind a mutex shared with the deadline
//! task and the recorder completion tasks. Frames, deadlines and recorder
//! completions each take the lock, feed the engine, execute the returned
//! directives, and release the lock before observers hear about it.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use vcheck_core::{LivenessConfig, SessionId, SessionTime, VCheckError, VCheckResult};
use vcheck_liveness::{
    AttemptBudget, DeviceOrientation, Directive, FrameObservation, LivenessEngine, LivenessEvent,
    SessionSnapshot, VideoArtifact,
};
use vcheck_time::{FrameClock, SessionTimer};

use crate::{
    CameraFrame, FaceCountSource, FaceTracker, FaceTrackerFactory, LivenessObserver, RawFrame,
    StopCompletion, VideoRecorder,
};

/// The host-side pieces the controller drives
pub struct Collaborators {
    pub tracker_factory: Box<dyn FaceTrackerFactory>,
    pub face_counter: Box<dyn FaceCountSource>,
    pub recorder: Box<dyn VideoRecorder>,
}

/// What happened to one submitted frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Session time assigned to the frame
    pub at: SessionTime,
    /// Whether the stage animation may advance on this frame
    pub indicate_stage: bool,
    /// Whether the frame went to the recorder
    pub recorded: bool,
    /// Whether the face counter ran on this frame
    pub face_counted: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ControllerStats {
    pub frames_submitted: u64,
    pub frames_idle: u64,
    pub tracking_errors: u64,
    pub recorder_errors: u64,
    pub sessions_started: u64,
}

struct ControllerState {
    engine: LivenessEngine,
    tracker_factory: Box<dyn FaceTrackerFactory>,
    tracker: Option<Box<dyn FaceTracker>>,
    face_counter: Box<dyn FaceCountSource>,
    recorder: Box<dyn VideoRecorder>,
    timer: SessionTimer,
    clock: FrameClock,
    /// Camera timestamp of the first frame of the session
    origin: Option<Duration>,
    orientation: DeviceOrientation,
    stats: ControllerStats,
}

struct Shared {
    state: Mutex<ControllerState>,
    observer: Arc<dyn LivenessObserver>,
    runtime: Handle,
}

/// Effects of a directive batch that matter after the lock is released
#[derive(Default)]
struct Applied {
    recorded: bool,
    events: Vec<LivenessEvent>,
}

/// Drives liveness sessions against the injected collaborators
pub struct LivenessController {
    shared: Arc<Shared>,
}

impl LivenessController {
    /// Create an idle controller. Timers and recorder completions run on `runtime`.
    pub fn new<O>(
        config: LivenessConfig,
        collaborators: Collaborators,
        observer: O,
        runtime: Handle,
    ) -> VCheckResult<Self>
    where
        O: LivenessObserver + 'static,
    {
        let engine = LivenessEngine::new(config)?;
        let state = ControllerState {
            engine,
            tracker_factory: collaborators.tracker_factory,
            tracker: None,
            face_counter: collaborators.face_counter,
            recorder: collaborators.recorder,
            timer: SessionTimer::new(runtime.clone()),
            clock: FrameClock::new(),
            origin: None,
            orientation: DeviceOrientation::portrait(),
            stats: ControllerStats::default(),
        };

        Ok(LivenessController {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                observer: Arc::new(observer),
                runtime,
            }),
        })
    }

    /// Start the first session: build the tracker, start the recorder, arm the deadline
    pub fn start(&self) -> VCheckResult<()> {
        self.shared.begin(false)
    }

    /// Replace an ended session with a fresh one. The attempt budget carries over.
    pub fn retry(&self) -> VCheckResult<()> {
        self.shared.begin(true)
    }

    /// Process one camera frame. Frames outside a running session are ignored.
    pub fn submit_frame(&self, frame: CameraFrame) -> FrameReport {
        let (report, events) = {
            let mut state = self.shared.state.lock();
            self.shared.process_frame(&mut state, &frame)
        };
        self.shared.dispatch(events);
        report
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.shared.state.lock().engine.snapshot()
    }

    pub fn budget(&self) -> AttemptBudget {
        *self.shared.state.lock().engine.budget()
    }

    pub fn stats(&self) -> ControllerStats {
        self.shared.state.lock().stats.clone()
    }

    pub fn is_deadline_armed(&self) -> bool {
        self.shared.state.lock().timer.is_armed()
    }
}

impl Shared {
    fn begin(self: &Arc<Self>, retry: bool) -> VCheckResult<()> {
        let outcome = {
            let mut state = self.state.lock();
            self.begin_locked(&mut state, retry)
        };

        match outcome {
            Ok(events) => {
                self.dispatch(events);
                Ok(())
            }
            Err(err) => {
                if matches!(err, VCheckError::TrackingSetup(_) | VCheckError::Recorder(_)) {
                    self.dispatch(vec![LivenessEvent::SetupFailed {
                        reason: err.to_string(),
                    }]);
                }
                Err(err)
            }
        }
    }

    fn begin_locked(
        self: &Arc<Self>,
        state: &mut ControllerState,
        retry: bool,
    ) -> VCheckResult<Vec<LivenessEvent>> {
        match state.engine.session() {
            Some(session) if !session.is_ended() => {
                return Err(VCheckError::SessionActive(session.id()));
            }
            None if retry => return Err(VCheckError::SessionNotStarted),
            _ => {}
        }

        state.tracker = None;
        let tracker = state.tracker_factory.create().map_err(|err| {
            warn!(error = %err, "face tracker could not be created");
            match err {
                VCheckError::TrackingSetup(_) => err,
                other => VCheckError::TrackingSetup(other.to_string()),
            }
        })?;
        state.tracker = Some(tracker);

        state.recorder.start_recording().map_err(|err| {
            warn!(error = %err, "recorder failed to start");
            match err {
                VCheckError::Recorder(_) => err,
                other => VCheckError::Recorder(other.to_string()),
            }
        })?;

        state.clock.reset();
        state.origin = None;
        state.stats.sessions_started += 1;

        let directives = if retry {
            state.engine.retry()?
        } else {
            state.engine.start()?
        };
        Ok(self.apply(state, directives, None).events)
    }

    fn process_frame(
        self: &Arc<Self>,
        state: &mut ControllerState,
        frame: &CameraFrame,
    ) -> (FrameReport, Vec<LivenessEvent>) {
        state.stats.frames_submitted += 1;
        if let Some(orientation) = frame.orientation {
            state.orientation = orientation;
        }

        let running = state
            .engine
            .session()
            .map(|session| !session.is_ended())
            .unwrap_or(false);
        if !running {
            state.stats.frames_idle += 1;
            return (FrameReport::default(), Vec::new());
        }

        let at = match frame.raw.timestamp {
            Some(stamp) => {
                let origin = *state.origin.get_or_insert(stamp);
                let offset = stamp.saturating_sub(origin);
                state.clock.observe(SessionTime::from_micros(offset.as_micros() as u64))
            }
            None => state.clock.tick(),
        };

        let mut observation = FrameObservation::at(at);
        if let Some(brightness) = frame.brightness {
            observation = observation.with_brightness(brightness);
        }

        let face_counted = state.engine.face_count_due();
        if face_counted {
            if let Some(count) = state.face_counter.count_faces(&frame.raw) {
                observation = observation.with_face_count(count);
            }
        }

        let rotation = state.orientation.recognition_rotation_degrees();
        if let Some(tracker) = state.tracker.as_mut() {
            match tracker.track(&frame.raw, rotation) {
                Ok(Some(geometry)) => {
                    if let Some(sample) = geometry.angle_sample() {
                        observation = observation.with_face(sample);
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    state.stats.tracking_errors += 1;
                    debug!(error = %err, "face tracking failed for frame");
                }
            }
        }

        let directives = state.engine.on_frame(&observation);
        let applied = self.apply(state, directives, Some(&frame.raw));
        let report = FrameReport {
            at,
            indicate_stage: state.engine.stage_indication_allowed(at),
            recorded: applied.recorded,
            face_counted,
        };
        (report, applied.events)
    }

    /// Execute directives in order. Must be called with the state lock held.
    fn apply(
        self: &Arc<Self>,
        state: &mut ControllerState,
        directives: Vec<Directive>,
        frame: Option<&RawFrame>,
    ) -> Applied {
        let mut applied = Applied::default();

        for directive in directives {
            match directive {
                Directive::RecordFrame => {
                    let Some(frame) = frame else { continue };
                    match state.recorder.record_frame(frame) {
                        Ok(()) => applied.recorded = true,
                        Err(err) => {
                            state.stats.recorder_errors += 1;
                            warn!(error = %err, "recorder rejected frame");
                        }
                    }
                }
                Directive::StopRecording { session } => {
                    let (completion, finished) = StopCompletion::channel();
                    state.recorder.stop_recording(completion);

                    let shared = Arc::downgrade(self);
                    self.runtime.spawn(async move {
                        let result = match finished.await {
                            Ok(result) => result,
                            Err(_) => Err("recorder dropped the stop completion".to_string()),
                        };
                        if let Some(shared) = shared.upgrade() {
                            shared.on_recording_stopped(session, result);
                        }
                    });
                }
                Directive::ArmTimeout { session, after } => {
                    let shared: Weak<Shared> = Arc::downgrade(self);
                    state.timer.arm(after, move || {
                        if let Some(shared) = shared.upgrade() {
                            shared.on_deadline(session);
                        }
                    });
                }
                Directive::CancelTimeout => {
                    state.timer.cancel();
                }
                Directive::Emit(event) => applied.events.push(event),
            }
        }

        applied
    }

    fn on_deadline(self: &Arc<Self>, session: SessionId) {
        let events = {
            let mut state = self.state.lock();
            let directives = state.engine.on_timeout(session);
            self.apply(&mut state, directives, None).events
        };
        self.dispatch(events);
    }

    fn on_recording_stopped(self: &Arc<Self>, session: SessionId, result: Result<VideoArtifact, String>) {
        let events = {
            let mut state = self.state.lock();
            let directives = state.engine.on_recording_stopped(session, result);
            if !directives.is_empty() {
                state.tracker = None;
            }
            self.apply(&mut state, directives, None).events
        };
        if !events.is_empty() {
            info!(session = %session, "recorder flushed");
        }
        self.dispatch(events);
    }

    fn dispatch(&self, events: Vec<LivenessEvent>) {
        for event in &events {
            self.observer.on_event(event);
        }
    }
}
