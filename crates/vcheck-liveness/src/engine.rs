//! Liveness engine - per-frame orchestration
//!
//! The engine owns the running [`LivenessSession`] and the attempt budget.
//! It performs no I/O: every effect is returned as a [`Directive`] for the
//! host to execute in order. All entry points take `&mut self`, so whoever
//! owns the engine serializes frames, deadline firings and recorder
//! completions by construction.

use std::time::Duration;

use tracing::{debug, info, warn};
use vcheck_core::{LivenessConfig, SessionId, SessionTime, VCheckError, VCheckResult};

use crate::{
    AngleSample, AttemptBudget, HapticFeedback, LivenessEvent, LivenessSession, ObstacleType,
    SessionOutcome, SessionPhase, SessionSnapshot, VideoArtifact,
};

/// What one camera frame contributed
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameObservation {
    /// Presentation time relative to session start
    pub at: SessionTime,
    /// Head pose, if the tracker found a face
    pub face: Option<AngleSample>,
    /// Exposure estimate for the frame
    pub brightness: Option<f32>,
    /// Face count, only on sampling ticks
    pub face_count: Option<u32>,
}

impl FrameObservation {
    pub fn at(at: SessionTime) -> Self {
        FrameObservation {
            at,
            ..Default::default()
        }
    }

    pub fn with_face(mut self, sample: AngleSample) -> Self {
        self.face = Some(sample);
        self
    }

    pub fn with_brightness(mut self, brightness: f32) -> Self {
        self.brightness = Some(brightness);
        self
    }

    pub fn with_face_count(mut self, count: u32) -> Self {
        self.face_count = Some(count);
        self
    }
}

/// Side effect requested by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Append the current raw frame to the recording
    RecordFrame,
    /// Stop the recorder and report back via `on_recording_stopped`
    StopRecording { session: SessionId },
    /// Arm the deadline, replacing any pending one; on firing call `on_timeout(session)`
    ArmTimeout { session: SessionId, after: Duration },
    CancelTimeout,
    Emit(LivenessEvent),
}

/// Functional core of the liveness pipeline
pub struct LivenessEngine {
    config: LivenessConfig,
    budget: AttemptBudget,
    session: Option<LivenessSession>,
    next_id: SessionId,
}

impl LivenessEngine {
    pub fn new(config: LivenessConfig) -> VCheckResult<Self> {
        config.validate()?;
        Ok(LivenessEngine {
            budget: AttemptBudget::new(config.max_attempts),
            config,
            session: None,
            next_id: SessionId::new(1),
        })
    }

    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }

    pub fn budget(&self) -> &AttemptBudget {
        &self.budget
    }

    pub fn session(&self) -> Option<&LivenessSession> {
        self.session.as_ref()
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.session.as_ref().map(LivenessSession::snapshot)
    }

    /// Begin the first session. The recorder must already be running.
    pub fn start(&mut self) -> VCheckResult<Vec<Directive>> {
        if let Some(session) = &self.session {
            if !session.is_ended() {
                return Err(VCheckError::SessionActive(session.id));
            }
        }

        let id = self.next_id;
        self.next_id = id.next();
        let session = LivenessSession::new(id, self.budget.current(), &self.config);
        let guidance = session.flow.guidance();

        info!(
            session = %id,
            attempt = %session.attempt,
            max_attempts = self.budget.max(),
            "liveness session started"
        );

        let directives = vec![
            Directive::ArmTimeout {
                session: id,
                after: self.config.time_limit(),
            },
            Directive::Emit(LivenessEvent::SessionStarted {
                session: id,
                attempt: session.attempt,
                guidance,
            }),
        ];
        self.session = Some(session);
        Ok(directives)
    }

    /// Replace an ended session with a fresh one
    pub fn retry(&mut self) -> VCheckResult<Vec<Directive>> {
        match &self.session {
            None => Err(VCheckError::SessionNotStarted),
            Some(session) if !session.is_ended() => Err(VCheckError::SessionActive(session.id)),
            Some(_) => {
                self.session = None;
                self.start()
            }
        }
    }

    /// Advance the face-count sampler. Call once per frame, before
    /// `on_frame`; on `true` the frame's observation should carry a count.
    pub fn face_count_due(&mut self) -> bool {
        let interval = self.config.face_count_interval;
        self.session
            .as_mut()
            .map(|session| session.tick_face_count_sampler(interval))
            .unwrap_or(false)
    }

    pub fn stage_indication_allowed(&self, now: SessionTime) -> bool {
        self.session
            .as_ref()
            .map(|session| session.stage_indication_allowed(now))
            .unwrap_or(false)
    }

    /// Process one camera frame
    pub fn on_frame(&mut self, frame: &FrameObservation) -> Vec<Directive> {
        let mut out = Vec::new();
        if let Some(session) = self.session.as_mut() {
            evaluate_frame(session, &self.config, &mut self.budget, frame, &mut out);
        }
        out
    }

    /// The deadline armed for `session` fired
    pub fn on_timeout(&mut self, session_id: SessionId) -> Vec<Directive> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        if session.id != session_id {
            debug!(session = %session_id, "ignoring deadline for a replaced session");
            return Vec::new();
        }
        match session.phase {
            SessionPhase::Active => {}
            SessionPhase::Draining { fail_open, .. } => {
                debug!(session = %session.id, "drain deadline reached, stopping recorder");
                return stop_after_drain(session, fail_open);
            }
            SessionPhase::Stopping(_) | SessionPhase::Ended(_) => {
                debug!(session = %session_id, "ignoring deadline for a finished session");
                return Vec::new();
            }
        }

        warn!(
            session = %session.id,
            milestone = ?session.flow.current(),
            "liveness session ran out of time"
        );
        session.streaming_permitted = false;
        session.phase = SessionPhase::Stopping(SessionOutcome::TimedOut);
        vec![
            Directive::Emit(LivenessEvent::Haptic(HapticFeedback::Warning)),
            Directive::StopRecording { session: session.id },
        ]
    }

    /// The recorder finished flushing the file requested by `StopRecording`
    pub fn on_recording_stopped(
        &mut self,
        session_id: SessionId,
        result: Result<VideoArtifact, String>,
    ) -> Vec<Directive> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let SessionPhase::Stopping(outcome) = session.phase else {
            debug!(session = %session_id, "unexpected recorder completion");
            return Vec::new();
        };
        if session.id != session_id {
            debug!(session = %session_id, "recorder completion for a replaced session");
            return Vec::new();
        }

        session.phase = SessionPhase::Ended(outcome);
        let mut out = vec![Directive::CancelTimeout];

        let video = match result {
            Ok(artifact) if outcome.is_success() => Some(artifact),
            Ok(_) => None,
            Err(reason) => {
                warn!(session = %session.id, %reason, "recording did not finalize");
                if outcome.is_success() {
                    out.push(Directive::Emit(LivenessEvent::RecordingFailed {
                        session: session.id,
                        reason,
                    }));
                }
                None
            }
        };

        info!(session = %session.id, ?outcome, has_video = video.is_some(), "liveness session ended");
        out.push(Directive::Emit(LivenessEvent::SessionEnded {
            session: session.id,
            attempt: session.attempt,
            outcome,
            video,
        }));
        out
    }
}

/// Steps of one frame, in order: drain handling, face count, exposure,
/// gestures with the yaw limit, then recording.
fn evaluate_frame(
    session: &mut LivenessSession,
    config: &LivenessConfig,
    budget: &mut AttemptBudget,
    frame: &FrameObservation,
    out: &mut Vec<Directive>,
) {
    session.frames_seen += 1;
    if frame.at > session.last_frame_at {
        session.last_frame_at = frame.at;
    }

    match session.phase {
        SessionPhase::Active => {}
        SessionPhase::Draining { since, fail_open } => {
            if frame.at.since(since) >= config.drain_tail() {
                debug!(session = %session.id, "drain tail elapsed, stopping recorder");
                out.extend(stop_after_drain(session, fail_open));
            } else {
                record(session, out);
            }
            return;
        }
        SessionPhase::Stopping(_) | SessionPhase::Ended(_) => return,
    }

    if session.obstacle_block.take_expired(frame.at) {
        out.push(Directive::Emit(LivenessEvent::GuidanceRestored {
            session: session.id,
            guidance: session.flow.guidance(),
        }));
    }

    if let Some(obstacle) = frame.face_count.and_then(ObstacleType::from_face_count) {
        raise_terminal(session, config, budget, obstacle, frame.at, out);
        record(session, out);
        return;
    }

    if let Some(brightness) = frame.brightness {
        if brightness < config.min_brightness {
            let dark_frames = session.counters.increment_low_brightness();
            if dark_frames >= config.max_low_brightness_frames {
                raise_terminal(session, config, budget, ObstacleType::LowBrightness, frame.at, out);
                record(session, out);
                return;
            }
        } else {
            session.counters.reset_low_brightness();
        }
    }

    if let Some(sample) = frame.face {
        let check = session.flow.check_current_stage(&sample);

        if let Some(obstacle) = check.obstacle {
            let frames = session.counters.increment_wrong_gesture();
            if config.escalate_wrong_gesture && frames >= config.max_wrong_gesture_frames {
                raise_terminal(session, config, budget, obstacle, frame.at, out);
                record(session, out);
                return;
            }
            raise_transient(session, config, obstacle, frame.at, out);
        } else {
            session.counters.reset_wrong_gesture();
            if let Some(milestone) = check.completed {
                session.counters.reset_on_stage_success();
                session.stage_block.start(frame.at, config.stage_success_block());
                let next = session.flow.guidance();

                info!(session = %session.id, ?milestone, "milestone passed");
                out.push(Directive::Emit(LivenessEvent::Haptic(HapticFeedback::Success)));
                out.push(Directive::Emit(LivenessEvent::MilestonePassed {
                    session: session.id,
                    milestone,
                    next,
                }));

                if milestone.is_terminal() {
                    finish(session, config, frame.at, false, out);
                }
            }
        }
    }

    record(session, out);
}

fn record(session: &mut LivenessSession, out: &mut Vec<Directive>) {
    if session.streaming_permitted {
        session.frames_recorded += 1;
        out.push(Directive::RecordFrame);
    }
}

/// Warn once per obstacle window; repeated frames only extend the window
fn raise_transient(
    session: &mut LivenessSession,
    config: &LivenessConfig,
    obstacle: ObstacleType,
    at: SessionTime,
    out: &mut Vec<Directive>,
) {
    let already_warned = session.obstacle_block.is_active(at);
    session.obstacle_block.start(at, config.obstacle_block());
    if already_warned {
        return;
    }

    debug!(session = %session.id, %obstacle, "transient obstacle");
    out.push(Directive::Emit(LivenessEvent::Haptic(HapticFeedback::Warning)));
    out.push(Directive::Emit(LivenessEvent::ObstacleRaised {
        session: session.id,
        obstacle,
        terminal: false,
    }));
}

fn raise_terminal(
    session: &mut LivenessSession,
    config: &LivenessConfig,
    budget: &mut AttemptBudget,
    obstacle: ObstacleType,
    at: SessionTime,
    out: &mut Vec<Directive>,
) {
    out.push(Directive::Emit(LivenessEvent::ObstacleRaised {
        session: session.id,
        obstacle,
        terminal: true,
    }));

    if budget.is_exhausted() {
        warn!(session = %session.id, %obstacle, "attempt budget spent, obstacle fails open");
        out.push(Directive::Emit(LivenessEvent::Haptic(HapticFeedback::Success)));
        finish(session, config, at, true, out);
        return;
    }

    warn!(session = %session.id, %obstacle, attempt = %session.attempt, "session ended prematurely");
    session.streaming_permitted = false;
    session.counters.reset_on_premature_end();
    session.face_count_frames = 0;
    session.phase = SessionPhase::Stopping(SessionOutcome::PrematureEnd(obstacle));
    budget.consume();

    out.push(Directive::CancelTimeout);
    out.push(Directive::Emit(LivenessEvent::Haptic(HapticFeedback::Warning)));
    out.push(Directive::StopRecording { session: session.id });
}

/// Enter the drain tail. The session deadline is replaced by the drain
/// deadline, so the recorder stops even if no further frame arrives.
fn finish(
    session: &mut LivenessSession,
    config: &LivenessConfig,
    at: SessionTime,
    fail_open: bool,
    out: &mut Vec<Directive>,
) {
    session.phase = SessionPhase::Draining { since: at, fail_open };
    out.push(Directive::ArmTimeout {
        session: session.id,
        after: config.drain_tail(),
    });
    out.push(Directive::Emit(LivenessEvent::GesturesCompleted {
        session: session.id,
        fail_open,
    }));
}

fn stop_after_drain(session: &mut LivenessSession, fail_open: bool) -> Vec<Directive> {
    session.streaming_permitted = false;
    session.phase = SessionPhase::Stopping(SessionOutcome::Completed { fail_open });
    vec![Directive::StopRecording { session: session.id }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GestureMilestone, StageGuidance};
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn ms(millis: u64) -> SessionTime {
        SessionTime::from_millis(millis)
    }

    fn started(config: LivenessConfig) -> (LivenessEngine, SessionId) {
        let mut engine = LivenessEngine::new(config).unwrap();
        engine.start().unwrap();
        let id = engine.snapshot().unwrap().session;
        (engine, id)
    }

    fn events(directives: &[Directive]) -> Vec<LivenessEvent> {
        directives
            .iter()
            .filter_map(|d| match d {
                Directive::Emit(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    fn artifact() -> VideoArtifact {
        VideoArtifact {
            path: PathBuf::from("/tmp/liveness.mp4"),
            frames: 120,
            duration: Duration::from_secs(4),
        }
    }

    fn ended_outcome(directives: &[Directive]) -> Option<(SessionOutcome, Option<VideoArtifact>)> {
        events(directives).into_iter().find_map(|e| match e {
            LivenessEvent::SessionEnded { outcome, video, .. } => Some((outcome, video)),
            _ => None,
        })
    }

    const GESTURES: [(f32, f32, f32); 4] = [(0.0, 20.0, 0.0), (-25.0, 0.0, 0.0), (25.0, 0.0, 0.0), (0.0, 0.0, 0.9)];

    /// Performs all four gestures, one per frame, 33ms apart. Returns the time of the last.
    fn perform_gestures(engine: &mut LivenessEngine, from: u64, count: usize) -> u64 {
        let mut t = from;
        for (pitch, yaw, mouth) in GESTURES.iter().take(count) {
            t += 33;
            engine.on_frame(&FrameObservation::at(ms(t)).with_face(AngleSample::new(*pitch, *yaw, *mouth)));
        }
        t
    }

    #[test]
    fn test_full_session_drains_then_hands_off_video() {
        let mut engine = LivenessEngine::new(LivenessConfig::default()).unwrap();
        let start = engine.start().unwrap();
        let id = engine.snapshot().unwrap().session;
        assert_eq!(
            start[0],
            Directive::ArmTimeout {
                session: id,
                after: Duration::from_millis(14_000)
            }
        );

        let mut passed = Vec::new();
        let mut t = 0;
        for (pitch, yaw, mouth) in GESTURES {
            t += 33;
            let out = engine.on_frame(
                &FrameObservation::at(ms(t))
                    .with_face(AngleSample::new(pitch, yaw, mouth))
                    .with_brightness(0.0),
            );
            assert!(out.contains(&Directive::RecordFrame));
            passed.extend(events(&out).into_iter().filter_map(|e| match e {
                LivenessEvent::MilestonePassed { milestone, .. } => Some(milestone),
                _ => None,
            }));
        }
        assert_eq!(passed, GestureMilestone::ALL);
        assert!(engine.snapshot().unwrap().is_finished);

        // recording continues through the drain tail
        assert_eq!(engine.on_frame(&FrameObservation::at(ms(t + 400))), vec![Directive::RecordFrame]);
        assert_eq!(
            engine.on_frame(&FrameObservation::at(ms(t + 800))),
            vec![Directive::StopRecording { session: id }]
        );
        assert!(!engine.snapshot().unwrap().streaming_permitted);
        assert!(engine.on_frame(&FrameObservation::at(ms(t + 833))).is_empty());

        let out = engine.on_recording_stopped(id, Ok(artifact()));
        assert_eq!(out[0], Directive::CancelTimeout);
        assert_eq!(
            ended_outcome(&out),
            Some((SessionOutcome::Completed { fail_open: false }, Some(artifact())))
        );
    }

    #[test]
    fn test_yaw_sequence_passes_head_check_on_sixteen_degrees() {
        let (mut engine, _) = started(LivenessConfig::default());
        let mut passed_at = None;
        for (i, yaw) in [5.0, 10.0, 16.0].into_iter().enumerate() {
            let out = engine.on_frame(&FrameObservation::at(ms(i as u64 * 33)).with_face(AngleSample::new(0.0, yaw, 0.0)));
            if events(&out)
                .iter()
                .any(|e| matches!(e, LivenessEvent::MilestonePassed { milestone: GestureMilestone::CheckHeadPosition, .. }))
            {
                passed_at = Some(i);
            }
        }
        assert_eq!(passed_at, Some(2));
        assert_eq!(engine.snapshot().unwrap().current_milestone, GestureMilestone::OuterLeftHeadPitch);
    }

    #[test]
    fn test_face_count_sampled_every_third_frame() {
        let config = LivenessConfig {
            face_count_interval: 3,
            ..Default::default()
        };
        let (mut engine, _) = started(config);
        let mut counts = [1u32, 1, 0, 0, 1].into_iter();
        let mut obstacles = Vec::new();

        for frame in 1..=15u64 {
            let mut observation = FrameObservation::at(ms(frame * 33));
            if engine.face_count_due() {
                if let Some(count) = counts.next() {
                    observation = observation.with_face_count(count);
                }
            }
            for event in events(&engine.on_frame(&observation)) {
                if let LivenessEvent::ObstacleRaised { obstacle, terminal, .. } = event {
                    obstacles.push((frame, obstacle, terminal));
                }
            }
        }
        assert_eq!(obstacles, vec![(9, ObstacleType::NoOrPartialFace, true)]);
    }

    #[test]
    fn test_single_bright_frame_resets_dark_counter() {
        let (mut engine, _) = started(LivenessConfig::default());
        let mut t = 0;
        let mut feed = |engine: &mut LivenessEngine, brightness: f32| {
            t += 33;
            events(&engine.on_frame(&FrameObservation::at(ms(t)).with_brightness(brightness)))
        };

        for _ in 0..19 {
            assert!(feed(&mut engine, -2.0).is_empty());
        }
        assert_eq!(engine.snapshot().unwrap().low_brightness_frames, 19);
        feed(&mut engine, 0.0);
        assert_eq!(engine.snapshot().unwrap().low_brightness_frames, 0);

        for _ in 0..19 {
            assert!(feed(&mut engine, -2.0).is_empty());
        }
        let last = feed(&mut engine, -2.0);
        assert!(last.contains(&LivenessEvent::ObstacleRaised {
            session: engine.snapshot().unwrap().session,
            obstacle: ObstacleType::LowBrightness,
            terminal: true,
        }));
    }

    #[test]
    fn test_fifth_terminal_obstacle_fails_open() {
        let mut engine = LivenessEngine::new(LivenessConfig::default()).unwrap();
        for attempt in 1..=5u32 {
            if attempt == 1 {
                engine.start().unwrap();
            } else {
                engine.retry().unwrap();
            }
            let snapshot = engine.snapshot().unwrap();
            let id = snapshot.session;
            assert_eq!(snapshot.attempt.get(), attempt);

            let out = engine.on_frame(&FrameObservation::at(ms(33)).with_face_count(2));
            if attempt < 5 {
                assert!(out.contains(&Directive::StopRecording { session: id }));
                assert!(!out.contains(&Directive::RecordFrame));
                let ended = engine.on_recording_stopped(id, Ok(artifact()));
                assert_eq!(
                    ended_outcome(&ended),
                    Some((SessionOutcome::PrematureEnd(ObstacleType::MultipleFaces), None))
                );
            } else {
                assert!(events(&out).contains(&LivenessEvent::GesturesCompleted {
                    session: id,
                    fail_open: true
                }));
                assert!(out.contains(&Directive::RecordFrame));

                let stop = engine.on_frame(&FrameObservation::at(ms(900)));
                assert_eq!(stop, vec![Directive::StopRecording { session: id }]);
                let ended = engine.on_recording_stopped(id, Ok(artifact()));
                assert_eq!(
                    ended_outcome(&ended),
                    Some((SessionOutcome::Completed { fail_open: true }, Some(artifact())))
                );
            }
        }
    }

    #[test]
    fn test_timeout_preempts_pending_gesture() {
        let (mut engine, id) = started(LivenessConfig::default());
        let t = perform_gestures(&mut engine, 0, 3);

        let out = engine.on_timeout(id);
        assert!(out.contains(&Directive::StopRecording { session: id }));

        // the mouth would have opened on the next frame
        let late = engine.on_frame(&FrameObservation::at(ms(t + 33)).with_face(AngleSample::new(0.0, 0.0, 0.9)));
        assert!(late.is_empty());

        let ended = engine.on_recording_stopped(id, Ok(artifact()));
        assert_eq!(ended_outcome(&ended), Some((SessionOutcome::TimedOut, None)));
        // timeouts do not consume attempts
        assert_eq!(engine.budget().current().get(), 1);
    }

    #[test]
    fn test_gesture_completion_beats_late_timeout() {
        let (mut engine, id) = started(LivenessConfig::default());
        let t = perform_gestures(&mut engine, 0, 4);

        // a deadline after the last gesture ends the drain, not the session
        assert_eq!(engine.on_timeout(id), vec![Directive::StopRecording { session: id }]);
        assert!(engine.on_frame(&FrameObservation::at(ms(t + 800))).is_empty());
        let ended = engine.on_recording_stopped(id, Ok(artifact()));
        assert_eq!(
            ended_outcome(&ended),
            Some((SessionOutcome::Completed { fail_open: false }, Some(artifact())))
        );
    }

    #[test]
    fn test_drain_ends_without_further_frames() {
        let (mut engine, id) = started(LivenessConfig::default());
        let t = perform_gestures(&mut engine, 0, 3);
        let last = engine.on_frame(&FrameObservation::at(ms(t + 33)).with_face(AngleSample::new(0.0, 0.0, 0.9)));
        assert!(last.contains(&Directive::ArmTimeout {
            session: id,
            after: Duration::from_millis(800)
        }));

        // camera went quiet; only the drain deadline arrives
        let out = engine.on_timeout(id);
        assert_eq!(out, vec![Directive::StopRecording { session: id }]);
        assert!(!engine.snapshot().unwrap().streaming_permitted);
        assert!(engine.on_timeout(id).is_empty());

        let ended = engine.on_recording_stopped(id, Ok(artifact()));
        assert_eq!(
            ended_outcome(&ended),
            Some((SessionOutcome::Completed { fail_open: false }, Some(artifact())))
        );
    }

    #[test]
    fn test_stale_timeout_after_retry_is_ignored() {
        let (mut engine, first) = started(LivenessConfig::default());
        engine.on_frame(&FrameObservation::at(ms(33)).with_face_count(0));
        engine.on_recording_stopped(first, Err("discarded".into()));
        engine.retry().unwrap();

        assert!(engine.on_timeout(first).is_empty());
        let snapshot = engine.snapshot().unwrap();
        assert_ne!(snapshot.session, first);
        assert_eq!(snapshot.phase, SessionPhase::Active);
    }

    #[test]
    fn test_yaw_obstacle_warns_once_and_restores_guidance() {
        let (mut engine, id) = started(LivenessConfig::default());
        let mut raised = 0;
        for i in 0..10u64 {
            let out = engine.on_frame(&FrameObservation::at(ms(i * 33)).with_face(AngleSample::new(0.0, 60.0, 0.0)));
            raised += events(&out)
                .iter()
                .filter(|e| matches!(e, LivenessEvent::ObstacleRaised { terminal: false, .. }))
                .count();
            // recording continues through transient obstacles
            assert!(out.contains(&Directive::RecordFrame));
        }
        assert_eq!(raised, 1);
        assert!(engine.snapshot().unwrap().obstacle_block_active);

        let neutral = AngleSample::new(0.0, 0.0, 0.0);
        assert!(events(&engine.on_frame(&FrameObservation::at(ms(1000)).with_face(neutral))).is_empty());
        assert_eq!(
            events(&engine.on_frame(&FrameObservation::at(ms(1400)).with_face(neutral))),
            vec![LivenessEvent::GuidanceRestored {
                session: id,
                guidance: StageGuidance::TurnHeadLeft
            }]
        );
        assert!(events(&engine.on_frame(&FrameObservation::at(ms(1433)).with_face(neutral))).is_empty());
    }

    #[test]
    fn test_wrong_gesture_escalation() {
        let config = LivenessConfig {
            escalate_wrong_gesture: true,
            max_wrong_gesture_frames: 3,
            ..Default::default()
        };
        let (mut engine, id) = started(config);
        let over = AngleSample::new(0.0, -70.0, 0.0);
        engine.on_frame(&FrameObservation::at(ms(0)).with_face(over));
        engine.on_frame(&FrameObservation::at(ms(33)).with_face(over));
        let out = engine.on_frame(&FrameObservation::at(ms(66)).with_face(over));
        assert!(out.contains(&Directive::StopRecording { session: id }));
        assert_eq!(
            engine.snapshot().unwrap().phase,
            SessionPhase::Stopping(SessionOutcome::PrematureEnd(ObstacleType::YawAngleExceeded))
        );
    }

    #[test]
    fn test_stage_indication_blocked_after_success() {
        let (mut engine, _) = started(LivenessConfig::default());
        assert!(engine.stage_indication_allowed(ms(0)));
        engine.on_frame(&FrameObservation::at(ms(100)).with_face(AngleSample::new(0.0, 20.0, 0.0)));
        assert!(!engine.stage_indication_allowed(ms(500)));
        assert!(engine.stage_indication_allowed(ms(1300)));
    }

    #[test]
    fn test_recorder_failure_on_completed_session() {
        let (mut engine, id) = started(LivenessConfig::default());
        let t = perform_gestures(&mut engine, 0, 4);
        engine.on_frame(&FrameObservation::at(ms(t + 800)));

        let out = engine.on_recording_stopped(id, Err("disk full".into()));
        let events = events(&out);
        assert!(events.contains(&LivenessEvent::RecordingFailed {
            session: id,
            reason: "disk full".into()
        }));
        assert_eq!(
            ended_outcome(&out),
            Some((SessionOutcome::Completed { fail_open: false }, None))
        );
    }

    #[test]
    fn test_lifecycle_errors() {
        let mut engine = LivenessEngine::new(LivenessConfig::default()).unwrap();
        assert!(matches!(engine.retry(), Err(VCheckError::SessionNotStarted)));
        engine.start().unwrap();
        assert!(matches!(engine.start(), Err(VCheckError::SessionActive(_))));
        assert!(matches!(engine.retry(), Err(VCheckError::SessionActive(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = LivenessConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(LivenessEngine::new(config).is_err());
    }

    proptest! {
        #[test]
        fn prop_low_brightness_iff_twenty_consecutive(dark in prop::collection::vec(any::<bool>(), 0..120)) {
            let (mut engine, _) = started(LivenessConfig::default());

            let mut run = 0;
            let mut expected = None;
            for (i, is_dark) in dark.iter().enumerate() {
                run = if *is_dark { run + 1 } else { 0 };
                if run >= 20 && expected.is_none() {
                    expected = Some(i);
                }
            }

            let mut raised = None;
            for (i, is_dark) in dark.iter().enumerate() {
                let brightness = if *is_dark { -3.0 } else { 0.5 };
                let out = engine.on_frame(&FrameObservation::at(ms(i as u64 * 33)).with_brightness(brightness));
                let low = events(&out).iter().any(|e| matches!(
                    e,
                    LivenessEvent::ObstacleRaised { obstacle: ObstacleType::LowBrightness, .. }
                ));
                if low && raised.is_none() {
                    raised = Some(i);
                }
            }
            prop_assert_eq!(raised, expected);
        }

        #[test]
        fn prop_retry_restores_initial_state(
            history in prop::collection::vec((0usize..4, 0usize..25, 0u32..3), 1..6)
        ) {
            let config = LivenessConfig { max_attempts: 10, ..Default::default() };
            let (mut engine, mut id) = started(config);

            for (gestures, dark_frames, face_count) in history {
                let mut t = perform_gestures(&mut engine, 0, gestures);
                for _ in 0..dark_frames.min(19) {
                    t += 33;
                    engine.on_frame(&FrameObservation::at(ms(t)).with_brightness(-5.0));
                }
                // guarantee a terminal obstacle
                let count = if face_count == 1 { 0 } else { face_count };
                engine.on_frame(&FrameObservation::at(ms(t + 33)).with_face_count(count));
                engine.on_recording_stopped(id, Ok(artifact()));
                engine.retry().unwrap();
                id = engine.snapshot().unwrap().session;

                let snapshot = engine.snapshot().unwrap();
                prop_assert_eq!(snapshot.current_milestone, GestureMilestone::CheckHeadPosition);
                prop_assert_eq!(snapshot.phase, SessionPhase::Active);
                prop_assert!(!snapshot.is_finished);
                prop_assert!(snapshot.streaming_permitted);
                prop_assert!(!snapshot.obstacle_block_active);
                prop_assert!(!snapshot.stage_block_active);
                prop_assert_eq!(snapshot.low_brightness_frames, 0);
                prop_assert_eq!(snapshot.wrong_gesture_frames, 0);
                prop_assert_eq!(snapshot.frames_seen, 0);
            }
        }
    }
}
