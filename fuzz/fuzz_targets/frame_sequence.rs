#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::path::PathBuf;
use std::time::Duration;
use vcheck_core::{LivenessConfig, SessionTime};
use vcheck_liveness::{
    AngleSample, Directive, FrameObservation, LivenessEngine, LivenessEvent, SessionPhase, VideoArtifact,
};

#[derive(Debug, Arbitrary)]
enum Input {
    Frame {
        advance_ms: u16,
        pitch: f32,
        yaw: f32,
        mouth: f32,
        face: bool,
        brightness: Option<f32>,
        faces: u8,
    },
    Timeout,
    StopFinished(bool),
    Retry,
}

fuzz_target!(|inputs: Vec<Input>| {
    let Ok(mut engine) = LivenessEngine::new(LivenessConfig::default()) else {
        return;
    };
    let Ok(mut pending) = engine.start() else {
        return;
    };
    let mut now = SessionTime::ZERO;
    let mut started = 1usize;
    let mut ended = 0usize;

    for input in inputs {
        let Some(session) = engine.session().map(|s| s.id()) else {
            return;
        };
        let directives = match input {
            Input::Frame {
                advance_ms,
                pitch,
                yaw,
                mouth,
                face,
                brightness,
                faces,
            } => {
                now = now + Duration::from_millis(advance_ms as u64);
                let mut frame = FrameObservation::at(now);
                if face {
                    frame = frame.with_face(AngleSample::new(pitch, yaw, mouth));
                }
                if let Some(brightness) = brightness {
                    frame = frame.with_brightness(brightness);
                }
                if engine.face_count_due() {
                    frame = frame.with_face_count(faces as u32);
                }
                engine.on_frame(&frame)
            }
            Input::Timeout => engine.on_timeout(session),
            Input::StopFinished(ok) => {
                let result = if ok {
                    Ok(VideoArtifact {
                        path: PathBuf::from("/fuzz.mp4"),
                        frames: 1,
                        duration: Duration::from_millis(33),
                    })
                } else {
                    Err("flush failed".to_string())
                };
                engine.on_recording_stopped(session, result)
            }
            Input::Retry => match engine.retry() {
                Ok(directives) => {
                    started += 1;
                    directives
                }
                Err(_) => continue,
            },
        };
        pending.extend(directives);

        for directive in pending.drain(..) {
            if let Directive::Emit(LivenessEvent::SessionEnded { .. }) = directive {
                ended += 1;
            }
        }
        assert!(ended <= started);

        let budget = engine.budget();
        assert!(budget.current().get() <= budget.max());
        if let Some(snapshot) = engine.snapshot() {
            assert!(snapshot.frames_recorded <= snapshot.frames_seen);
            if matches!(snapshot.phase, SessionPhase::Ended(_)) {
                assert!(!snapshot.streaming_permitted);
            }
        }
    }
});
