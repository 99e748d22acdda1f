#![allow(clippy::missing_safety_doc)]
//! FFI Session functions

use std::ffi::{c_char, c_int, c_void, CStr};
use std::path::PathBuf;
use std::ptr;
use std::time::Duration;

use tokio::runtime::Runtime;
use tracing::{debug, warn};
use vcheck_core::{LivenessConfig, VCheckError, VCheckResult};
use vcheck_liveness::{FaceGeometry, LivenessEvent, VideoArtifact};
use vcheck_runtime::{
    Collaborators, FaceCountSource, FaceTracker, FaceTrackerFactory, LivenessController, LivenessObserver,
    RawFrame, StopCompletion, VideoRecorder,
};

use crate::error::*;
use crate::types::*;

/// Opaque handle to a liveness controller and the runtime its timers live on
pub struct VCheckSessionHandle {
    controller: LivenessController,
    runtime: Option<Runtime>,
}

impl Drop for VCheckSessionHandle {
    fn drop(&mut self) {
        // The handle may be freed from a callback running on the session thread,
        // where a blocking runtime shutdown would panic.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[derive(Clone, Copy)]
struct UserData(*mut c_void);

// The shell promises its callbacks may be invoked from the controller's
// timer thread as well as from the thread submitting frames.
unsafe impl Send for UserData {}
unsafe impl Sync for UserData {}

struct NativeObserver {
    on_event: VCheckEventCallback,
    user_data: UserData,
}

impl LivenessObserver for NativeObserver {
    fn on_event(&self, event: &LivenessEvent) {
        let encoded = EncodedEvent::new(event);
        (self.on_event)(self.user_data.0, encoded.as_ptr());
    }
}

struct NativeTrackerFactory {
    create: VCheckCreateTrackerCallback,
    track: VCheckTrackFaceCallback,
    user_data: UserData,
}

impl FaceTrackerFactory for NativeTrackerFactory {
    fn create(&mut self) -> VCheckResult<Box<dyn FaceTracker>> {
        let code = (self.create)(self.user_data.0);
        if code != 0 {
            warn!(code, "native face tracker could not be created");
            return Err(VCheckError::TrackingSetup(format!("native tracker returned {code}")));
        }
        Ok(Box::new(NativeTracker {
            track: self.track,
            user_data: self.user_data,
        }))
    }
}

struct NativeTracker {
    track: VCheckTrackFaceCallback,
    user_data: UserData,
}

impl FaceTracker for NativeTracker {
    fn track(&mut self, frame: &RawFrame, rotation_degrees: u32) -> VCheckResult<Option<FaceGeometry>> {
        let view = VCheckFrame::view(frame);
        let mut out = VCheckFaceGeometry::default();
        match (self.track)(self.user_data.0, &view, rotation_degrees, &mut out) {
            0 => Ok(None),
            1 => Ok(Some(FaceGeometry {
                pitch: out.pitch,
                yaw: out.yaw,
                roll: out.roll,
                mouth_openness: out.mouth_openness,
                face_detected: true,
            })),
            code => {
                warn!(code, "native face tracker failed");
                Err(VCheckError::Tracking(format!("native tracker returned {code}")))
            }
        }
    }
}

struct NativeFaceCounter {
    count: Option<VCheckCountFacesCallback>,
    user_data: UserData,
}

impl FaceCountSource for NativeFaceCounter {
    fn count_faces(&mut self, frame: &RawFrame) -> Option<u32> {
        let count = self.count?;
        let view = VCheckFrame::view(frame);
        u32::try_from(count(self.user_data.0, &view)).ok()
    }
}

struct NativeRecorder {
    start: VCheckStartRecordingCallback,
    record: VCheckRecordFrameCallback,
    stop: VCheckStopRecordingCallback,
    user_data: UserData,
}

impl VideoRecorder for NativeRecorder {
    fn start_recording(&mut self) -> VCheckResult<()> {
        match (self.start)(self.user_data.0) {
            0 => Ok(()),
            code => {
                warn!(code, "native recorder failed to start");
                Err(VCheckError::Recorder(format!("start returned {code}")))
            }
        }
    }

    fn record_frame(&mut self, frame: &RawFrame) -> VCheckResult<()> {
        let view = VCheckFrame::view(frame);
        match (self.record)(self.user_data.0, &view) {
            0 => Ok(()),
            code => {
                debug!(code, "native recorder dropped a frame");
                Err(VCheckError::Recorder(format!("record returned {code}")))
            }
        }
    }

    fn stop_recording(&mut self, completion: StopCompletion) {
        let handle = Box::into_raw(Box::new(VCheckStopHandle { completion }));
        (self.stop)(self.user_data.0, handle);
    }
}

fn build_session(config: LivenessConfig, callbacks: &VCheckCallbacks) -> Result<VCheckSessionHandle, c_int> {
    let (
        Some(on_event),
        Some(create_tracker),
        Some(track_face),
        Some(start_recording),
        Some(record_frame),
        Some(stop_recording),
    ) = (
        callbacks.on_event,
        callbacks.create_tracker,
        callbacks.track_face,
        callbacks.start_recording,
        callbacks.record_frame,
        callbacks.stop_recording,
    )
    else {
        return Err(invalid_argument("Missing required callback"));
    };
    let user_data = UserData(callbacks.user_data);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("vcheck-session")
        .enable_time()
        .build()
        .map_err(|err| {
            warn!(error = %err, "session runtime could not be built");
            set_last_error(&err.to_string());
            c_int::from(VCheckErrorCode::InternalError)
        })?;

    let collaborators = Collaborators {
        tracker_factory: Box::new(NativeTrackerFactory {
            create: create_tracker,
            track: track_face,
            user_data,
        }),
        face_counter: Box::new(NativeFaceCounter {
            count: callbacks.count_faces,
            user_data,
        }),
        recorder: Box::new(NativeRecorder {
            start: start_recording,
            record: record_frame,
            stop: stop_recording,
            user_data,
        }),
    };
    let observer = NativeObserver { on_event, user_data };

    let controller = LivenessController::new(config, collaborators, observer, runtime.handle().clone())
        .map_err(|err| report_error(&err))?;
    Ok(VCheckSessionHandle {
        controller,
        runtime: Some(runtime),
    })
}

/// Create a liveness session controller
/// `config_json` may be NULL for the default configuration.
/// Returns a handle that must be freed with vcheck_session_free
#[no_mangle]
pub unsafe extern "C" fn vcheck_session_create(
    config_json: *const c_char,
    callbacks: *const VCheckCallbacks,
) -> *mut VCheckSessionHandle {
    if callbacks.is_null() {
        set_last_error("Null callbacks");
        return ptr::null_mut();
    }

    let config = if config_json.is_null() {
        LivenessConfig::default()
    } else {
        let parsed = CStr::from_ptr(config_json)
            .to_str()
            .map_err(|err| VCheckError::InvalidConfig(err.to_string()))
            .and_then(LivenessConfig::from_json);
        match parsed {
            Ok(config) => config,
            Err(err) => {
                report_error(&err);
                return ptr::null_mut();
            }
        }
    };

    match build_session(config, &*callbacks) {
        Ok(handle) => Box::into_raw(Box::new(handle)),
        Err(_) => ptr::null_mut(),
    }
}

/// Free a session handle. Pending timers and recorder completions are
/// abandoned. May be called from a callback delivered on the session thread
/// (the deadline and recorder flush paths), but not from a callback that runs
/// inside another `vcheck_session_*` call on the same handle.
#[no_mangle]
pub unsafe extern "C" fn vcheck_session_free(handle: *mut VCheckSessionHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Start the first liveness session
#[no_mangle]
pub unsafe extern "C" fn vcheck_session_start(handle: *mut VCheckSessionHandle) -> c_int {
    if handle.is_null() {
        return invalid_argument("Null handle");
    }
    match (*handle).controller.start() {
        Ok(()) => 0,
        Err(err) => report_error(&err),
    }
}

/// Start a new attempt after the previous session ended
#[no_mangle]
pub unsafe extern "C" fn vcheck_session_retry(handle: *mut VCheckSessionHandle) -> c_int {
    if handle.is_null() {
        return invalid_argument("Null handle");
    }
    match (*handle).controller.retry() {
        Ok(()) => 0,
        Err(err) => report_error(&err),
    }
}

/// Process one camera frame. `report` may be NULL.
/// Pixels are copied; the caller keeps ownership of the buffer.
#[no_mangle]
pub unsafe extern "C" fn vcheck_session_submit_frame(
    handle: *mut VCheckSessionHandle,
    frame: *const VCheckFrame,
    report: *mut VCheckFrameReport,
) -> c_int {
    if handle.is_null() || frame.is_null() {
        return invalid_argument("Null pointer");
    }

    let camera_frame = (*frame).to_camera_frame();
    let result = (*handle).controller.submit_frame(camera_frame);
    if !report.is_null() {
        *report = result.into();
    }
    0
}

/// Copy the current session state into `out`
#[no_mangle]
pub unsafe extern "C" fn vcheck_session_snapshot(
    handle: *const VCheckSessionHandle,
    out: *mut VCheckSnapshot,
) -> c_int {
    if handle.is_null() || out.is_null() {
        return invalid_argument("Null pointer");
    }

    let controller = &(*handle).controller;
    match controller.snapshot() {
        Some(snapshot) => {
            *out = VCheckSnapshot::new(&snapshot, controller.budget().max());
            0
        }
        None => {
            set_last_error("No session started");
            VCheckErrorCode::SessionNotFound.into()
        }
    }
}

/// Report a flushed recording. Consumes `completion`; `path` must not be NULL.
#[no_mangle]
pub unsafe extern "C" fn vcheck_recording_finished(
    completion: *mut VCheckStopHandle,
    path: *const c_char,
    frames: u64,
    duration_ms: u64,
) -> c_int {
    if completion.is_null() {
        return invalid_argument("Null completion");
    }
    let completion = Box::from_raw(completion).completion;
    if path.is_null() {
        completion.fail("recorder reported no file");
        return invalid_argument("Null path");
    }

    let path = PathBuf::from(CStr::from_ptr(path).to_string_lossy().into_owned());
    completion.finish(VideoArtifact {
        path,
        frames,
        duration: Duration::from_millis(duration_ms),
    });
    0
}

/// Report a recording that could not be finalized. Consumes `completion`.
#[no_mangle]
pub unsafe extern "C" fn vcheck_recording_failed(completion: *mut VCheckStopHandle, reason: *const c_char) -> c_int {
    if completion.is_null() {
        return invalid_argument("Null completion");
    }
    let completion = Box::from_raw(completion).completion;
    let reason = if reason.is_null() {
        "unknown recorder failure".to_string()
    } else {
        CStr::from_ptr(reason).to_string_lossy().into_owned()
    };
    completion.fail(reason);
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Native side of the tests, reached through `user_data`
    #[derive(Default)]
    struct Shell {
        yaw: Mutex<f32>,
        tracker_failures: AtomicU32,
        recorded: AtomicUsize,
        events: Mutex<Vec<(VCheckEventKind, i32)>>,
        // freed by `free_when_ended`
        handle: AtomicPtr<VCheckSessionHandle>,
        freed: AtomicBool,
    }

    extern "C" fn on_event(user_data: *mut c_void, event: *const VCheckEvent) {
        let shell = unsafe { &*(user_data as *const Shell) };
        let event = unsafe { &*event };
        shell.events.lock().unwrap().push((event.kind, event.outcome));
    }

    extern "C" fn free_when_ended(user_data: *mut c_void, event: *const VCheckEvent) {
        on_event(user_data, event);
        let shell = unsafe { &*(user_data as *const Shell) };
        if unsafe { (*event).kind } == VCheckEventKind::SessionEnded {
            let handle = shell.handle.swap(ptr::null_mut(), Ordering::SeqCst);
            unsafe { vcheck_session_free(handle) };
            shell.freed.store(true, Ordering::SeqCst);
        }
    }

    extern "C" fn create_tracker(user_data: *mut c_void) -> c_int {
        let shell = unsafe { &*(user_data as *const Shell) };
        if shell.tracker_failures.load(Ordering::SeqCst) > 0 {
            shell.tracker_failures.fetch_sub(1, Ordering::SeqCst);
            return -1;
        }
        0
    }

    extern "C" fn track_face(
        user_data: *mut c_void,
        _frame: *const VCheckFrame,
        _rotation: u32,
        out: *mut VCheckFaceGeometry,
    ) -> c_int {
        let shell = unsafe { &*(user_data as *const Shell) };
        unsafe {
            (*out).yaw = *shell.yaw.lock().unwrap();
        }
        1
    }

    extern "C" fn start_recording(_: *mut c_void) -> c_int {
        0
    }

    extern "C" fn record_frame(user_data: *mut c_void, _: *const VCheckFrame) -> c_int {
        let shell = unsafe { &*(user_data as *const Shell) };
        shell.recorded.fetch_add(1, Ordering::SeqCst);
        0
    }

    extern "C" fn stop_recording(_: *mut c_void, completion: *mut VCheckStopHandle) {
        let path = crate::c_string("/tmp/vcheck.mp4");
        unsafe { vcheck_recording_finished(completion, path.as_ptr(), 10, 400) };
    }

    fn callbacks(shell: &Shell) -> VCheckCallbacks {
        VCheckCallbacks {
            user_data: shell as *const Shell as *mut c_void,
            on_event: Some(on_event),
            create_tracker: Some(create_tracker),
            track_face: Some(track_face),
            count_faces: None,
            start_recording: Some(start_recording),
            record_frame: Some(record_frame),
            stop_recording: Some(stop_recording),
        }
    }

    fn frame(timestamp_ms: i64) -> VCheckFrame {
        VCheckFrame {
            timestamp_us: timestamp_ms * 1_000,
            pixels: ptr::null(),
            len: 0,
            width: 0,
            height: 0,
            brightness: 0.0,
            has_gravity: false,
            gravity_x: 0.0,
            gravity_y: 0.0,
            gravity_z: 0.0,
        }
    }

    #[test]
    fn test_missing_callbacks_rejected() {
        let shell = Shell::default();
        let mut table = callbacks(&shell);
        table.stop_recording = None;
        let handle = unsafe { vcheck_session_create(ptr::null(), &table) };
        assert!(handle.is_null());
        assert!(!vcheck_get_last_error().is_null());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let shell = Shell::default();
        let config = crate::c_string(r#"{"max_attempts": 0}"#);
        let handle = unsafe { vcheck_session_create(config.as_ptr(), &callbacks(&shell)) };
        assert!(handle.is_null());
    }

    #[test]
    fn test_tracker_setup_failure_surfaces() {
        let shell = Shell::default();
        shell.tracker_failures.store(1, Ordering::SeqCst);
        let handle = unsafe { vcheck_session_create(ptr::null(), &callbacks(&shell)) };
        assert!(!handle.is_null());

        let code = unsafe { vcheck_session_start(handle) };
        assert_eq!(code, VCheckErrorCode::TrackingSetup as c_int);
        assert_eq!(shell.events.lock().unwrap()[0].0, VCheckEventKind::SetupFailed);

        let mut snapshot = VCheckSnapshot::default();
        let code = unsafe { vcheck_session_snapshot(handle, &mut snapshot) };
        assert_eq!(code, VCheckErrorCode::SessionNotFound as c_int);

        unsafe { vcheck_session_free(handle) };
    }

    #[test]
    fn test_session_runs_through_native_callbacks() {
        let shell = Shell::default();
        let handle = unsafe { vcheck_session_create(ptr::null(), &callbacks(&shell)) };
        assert!(!handle.is_null());
        assert_eq!(unsafe { vcheck_session_start(handle) }, 0);

        let mut report = VCheckFrameReport::default();
        *shell.yaw.lock().unwrap() = 20.0;
        assert_eq!(unsafe { vcheck_session_submit_frame(handle, &frame(0), &mut report) }, 0);
        assert!(report.recorded);
        assert!(!report.indicate_stage);

        let mut snapshot = VCheckSnapshot::default();
        assert_eq!(unsafe { vcheck_session_snapshot(handle, &mut snapshot) }, 0);
        assert_eq!(snapshot.milestone, 1);
        assert_eq!(snapshot.attempt, 1);
        assert_eq!(snapshot.max_attempts, 5);
        assert_eq!(shell.recorded.load(Ordering::SeqCst), 1);

        // no events besides start, haptic and the milestone; the session keeps running
        let kinds: Vec<_> = shell.events.lock().unwrap().iter().map(|(kind, _)| *kind).collect();
        assert_eq!(
            kinds,
            vec![
                VCheckEventKind::SessionStarted,
                VCheckEventKind::Haptic,
                VCheckEventKind::MilestonePassed
            ]
        );

        assert_eq!(unsafe { vcheck_session_retry(handle) }, VCheckErrorCode::SessionActive as c_int);
        unsafe { vcheck_session_free(handle) };
    }

    #[test]
    fn test_free_from_event_callback_after_deadline() {
        let shell = Shell::default();
        let mut table = callbacks(&shell);
        table.on_event = Some(free_when_ended);
        let config = crate::c_string(r#"{"time_limit_ms": 30}"#);
        let handle = unsafe { vcheck_session_create(config.as_ptr(), &table) };
        assert!(!handle.is_null());
        shell.handle.store(handle, Ordering::SeqCst);
        assert_eq!(unsafe { vcheck_session_start(handle) }, 0);

        // the deadline and the recorder flush both land on the session thread
        for _ in 0..200 {
            if shell.freed.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(shell.freed.load(Ordering::SeqCst));
        assert!(shell.handle.load(Ordering::SeqCst).is_null());
        let last = shell.events.lock().unwrap().last().map(|(kind, _)| *kind);
        assert_eq!(last, Some(VCheckEventKind::SessionEnded));
    }

    #[test]
    fn test_null_handles() {
        assert_eq!(
            unsafe { vcheck_session_start(ptr::null_mut()) },
            VCheckErrorCode::InvalidArgument as c_int
        );
        assert_eq!(
            unsafe { vcheck_recording_failed(ptr::null_mut(), ptr::null()) },
            VCheckErrorCode::InvalidArgument as c_int
        );
    }
}
