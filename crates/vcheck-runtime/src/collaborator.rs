//! Platform collaborators injected into the controller
//!
//! Vision, recording and UI live in the host shell. The controller only
//! sees these traits, so tests drive it with scripted fakes.

use tokio::sync::{mpsc, oneshot};
use vcheck_core::VCheckResult;
use vcheck_liveness::{FaceGeometry, LivenessEvent, VideoArtifact};

use crate::RawFrame;

/// Head pose tracker. One instance per session.
pub trait FaceTracker: Send {
    /// Track the face in `frame`, rotated by `rotation_degrees` for upright
    /// recognition. `Ok(None)` when no face was found.
    fn track(&mut self, frame: &RawFrame, rotation_degrees: u32) -> VCheckResult<Option<FaceGeometry>>;
}

/// Builds a fresh tracker for every session start and retry
pub trait FaceTrackerFactory: Send {
    fn create(&mut self) -> VCheckResult<Box<dyn FaceTracker>>;
}

impl<F> FaceTrackerFactory for F
where
    F: FnMut() -> VCheckResult<Box<dyn FaceTracker>> + Send,
{
    fn create(&mut self) -> VCheckResult<Box<dyn FaceTracker>> {
        self()
    }
}

/// Face-count detector, sampled every few frames
pub trait FaceCountSource: Send {
    /// `None` when the detector produced no answer for this frame
    fn count_faces(&mut self, frame: &RawFrame) -> Option<u32>;
}

impl<F> FaceCountSource for F
where
    F: FnMut(&RawFrame) -> Option<u32> + Send,
{
    fn count_faces(&mut self, frame: &RawFrame) -> Option<u32> {
        self(frame)
    }
}

/// Single-use handle the recorder resolves once the file is flushed
#[derive(Debug)]
pub struct StopCompletion {
    tx: oneshot::Sender<Result<VideoArtifact, String>>,
}

impl StopCompletion {
    pub fn channel() -> (Self, oneshot::Receiver<Result<VideoArtifact, String>>) {
        let (tx, rx) = oneshot::channel();
        (StopCompletion { tx }, rx)
    }

    pub fn finish(self, artifact: VideoArtifact) {
        self.resolve(Ok(artifact));
    }

    pub fn fail(self, reason: impl Into<String>) {
        self.resolve(Err(reason.into()));
    }

    pub fn resolve(self, result: Result<VideoArtifact, String>) {
        // The controller may be gone already
        let _ = self.tx.send(result);
    }
}

/// Video recorder fed with the frames the engine keeps
pub trait VideoRecorder: Send {
    fn start_recording(&mut self) -> VCheckResult<()>;

    fn record_frame(&mut self, frame: &RawFrame) -> VCheckResult<()>;

    /// Stop and flush. Resolve `completion` when the file is final; it may
    /// be resolved from any thread, before or after this call returns.
    fn stop_recording(&mut self, completion: StopCompletion);
}

/// Receives every [`LivenessEvent`], never while the session lock is held
pub trait LivenessObserver: Send + Sync {
    fn on_event(&self, event: &LivenessEvent);
}

impl<F> LivenessObserver for F
where
    F: Fn(&LivenessEvent) + Send + Sync,
{
    fn on_event(&self, event: &LivenessEvent) {
        self(event)
    }
}

impl LivenessObserver for mpsc::UnboundedSender<LivenessEvent> {
    fn on_event(&self, event: &LivenessEvent) {
        if self.send(event.clone()).is_err() {
            tracing::trace!("liveness observer channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stop_completion_delivers_once() {
        let (completion, rx) = StopCompletion::channel();
        completion.finish(VideoArtifact {
            path: PathBuf::from("a.mp4"),
            frames: 3,
            duration: Duration::from_millis(100),
        });
        let result = rx.await.unwrap();
        assert_eq!(result.unwrap().frames, 3);
    }

    #[tokio::test]
    async fn test_dropped_completion_closes_channel() {
        let (completion, rx) = StopCompletion::channel();
        drop(completion);
        assert!(rx.await.is_err());
    }

    #[test]
    fn test_closure_collaborators() {
        let mut counter = |_: &RawFrame| Some(2);
        assert_eq!(counter.count_faces(&RawFrame::default()), Some(2));

        let seen = std::sync::Mutex::new(0);
        let observer = |_: &LivenessEvent| *seen.lock().unwrap() += 1;
        observer.on_event(&LivenessEvent::Haptic(vcheck_liveness::HapticFeedback::Success));
        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
