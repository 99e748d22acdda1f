//! FFI error codes and the thread-local last error

use std::ffi::{c_char, c_int, CString};

use tracing::{debug, warn};
use vcheck_core::VCheckError;

/// Error codes for FFI functions
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VCheckErrorCode {
    Ok = 0,
    InvalidArgument = -1,
    InvalidConfig = -2,
    /// A session is still running
    SessionActive = -3,
    /// Retry requested before any session was started
    SessionNotStarted = -4,
    /// The face tracker could not be created
    TrackingSetup = -5,
    Recorder = -6,
    InvalidVerdict = -7,
    /// No session to report on
    SessionNotFound = -8,
    InternalError = -99,
}

impl From<VCheckErrorCode> for c_int {
    fn from(code: VCheckErrorCode) -> Self {
        code as c_int
    }
}

impl From<&VCheckError> for VCheckErrorCode {
    fn from(err: &VCheckError) -> Self {
        match err {
            VCheckError::InvalidConfig(_) | VCheckError::ConfigParse(_) => VCheckErrorCode::InvalidConfig,
            VCheckError::TrackingSetup(_) => VCheckErrorCode::TrackingSetup,
            VCheckError::Recorder(_) => VCheckErrorCode::Recorder,
            VCheckError::SessionActive(_) => VCheckErrorCode::SessionActive,
            VCheckError::SessionNotStarted => VCheckErrorCode::SessionNotStarted,
            VCheckError::InvalidVerdict(_) => VCheckErrorCode::InvalidVerdict,
            VCheckError::Tracking(_) => VCheckErrorCode::InternalError,
        }
    }
}

thread_local! {
    static LAST_ERROR: std::cell::RefCell<Option<CString>> =
        const { std::cell::RefCell::new(None) };
}

/// Set the last error message
pub fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Record `err` as the last error and return its code
pub fn report_error(err: &VCheckError) -> c_int {
    let code = VCheckErrorCode::from(err);
    warn!(error = %err, ?code, "call failed");
    set_last_error(&err.to_string());
    code.into()
}

/// Reject a null pointer argument
pub fn invalid_argument(what: &str) -> c_int {
    debug!(what, "invalid argument");
    set_last_error(what);
    VCheckErrorCode::InvalidArgument.into()
}

/// Get the last error message on this thread
/// Returns NULL if no error
#[no_mangle]
pub extern "C" fn vcheck_get_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match e.borrow().as_ref() {
        Some(s) => s.as_ptr(),
        None => std::ptr::null(),
    })
}

/// Clear the last error
#[no_mangle]
pub extern "C" fn vcheck_clear_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}
