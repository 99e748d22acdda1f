#![allow(clippy::missing_safety_doc)]
//! VCheck FFI - C ABI for the liveness controller
//!
//! The mobile shells own the camera, the vision models and the recorder.
//! They hand those in as callbacks and push frames through
//! `vcheck_session_submit_frame`; everything the user sees comes back
//! through the event callback.

pub mod error;
pub mod session;
pub mod types;
pub mod verdict;

use std::ffi::{c_char, c_int, CString};

pub use error::*;
pub use session::*;
pub use types::*;
pub use verdict::*;

use vcheck_core::LivenessConfig;
use vcheck_runtime::{init_tracing, TelemetryConfig};

/// Library version
#[no_mangle]
pub extern "C" fn vcheck_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr() as *const c_char
}

/// Install logging. Returns 0 when installed, 1 when a subscriber was already present.
#[no_mangle]
pub extern "C" fn vcheck_init(json_logs: bool) -> c_int {
    let config = TelemetryConfig {
        json: json_logs,
        ..Default::default()
    };
    if init_tracing(&config) {
        0
    } else {
        1
    }
}

/// Default liveness configuration as JSON. Free with `vcheck_free_string`.
#[no_mangle]
pub extern "C" fn vcheck_default_config_json() -> *mut c_char {
    match serde_json::to_string(&LivenessConfig::default()) {
        Ok(json) => c_string(&json).into_raw(),
        Err(err) => {
            set_last_error(&err.to_string());
            std::ptr::null_mut()
        }
    }
}

/// Free a string allocated by VCheck
#[no_mangle]
pub unsafe extern "C" fn vcheck_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

pub(crate) fn c_string(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}
