#![allow(clippy::missing_safety_doc)]
//! Backend verdicts for the shell's networking layer

use std::ffi::{c_char, c_int, CStr};

use vcheck_core::{
    resolve_stage, resolve_upload, resolve_upload_error, BackendFailureReason, LivenessUploadResponse,
    StageResolution, StageResponse, UploadVerdict, VCheckError, VCheckResult,
};

use crate::error::*;

/// 0 proceed to the stage check, 1 retry liveness, 2 failed
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VCheckUploadAction {
    Proceed = 0,
    RetryLiveness = 1,
    Failed = 2,
}

/// `reason` is set for `RetryLiveness` only, -1 otherwise:
/// 0 face not found, 1 multiple faces, 2 fast movement, 3 too dark,
/// 4 invalid movements, 5 unknown
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VCheckUploadVerdict {
    pub action: VCheckUploadAction,
    pub reason: i32,
}

impl From<UploadVerdict> for VCheckUploadVerdict {
    fn from(verdict: UploadVerdict) -> Self {
        match verdict {
            UploadVerdict::Proceed => VCheckUploadVerdict {
                action: VCheckUploadAction::Proceed,
                reason: -1,
            },
            UploadVerdict::RetryLiveness(reason) => VCheckUploadVerdict {
                action: VCheckUploadAction::RetryLiveness,
                reason: match reason {
                    BackendFailureReason::FaceNotFound => 0,
                    BackendFailureReason::MultipleFaces => 1,
                    BackendFailureReason::FastMovement => 2,
                    BackendFailureReason::TooDark => 3,
                    BackendFailureReason::InvalidMovements => 4,
                    BackendFailureReason::Unknown => 5,
                },
            },
            UploadVerdict::Failed => VCheckUploadVerdict {
                action: VCheckUploadAction::Failed,
                reason: -1,
            },
        }
    }
}

unsafe fn json_arg<'a>(json: *const c_char) -> VCheckResult<&'a str> {
    if json.is_null() {
        return Err(VCheckError::InvalidVerdict("null payload".into()));
    }
    CStr::from_ptr(json)
        .to_str()
        .map_err(|err| VCheckError::InvalidVerdict(err.to_string()))
}

/// Resolve the body of a successful liveness upload
#[no_mangle]
pub unsafe extern "C" fn vcheck_resolve_upload(response_json: *const c_char, out: *mut VCheckUploadVerdict) -> c_int {
    if out.is_null() {
        return invalid_argument("Null output");
    }
    match json_arg(response_json).and_then(LivenessUploadResponse::from_json) {
        Ok(response) => {
            *out = resolve_upload(&response).into();
            0
        }
        Err(err) => report_error(&err),
    }
}

/// Resolve a failed upload. Pass a negative `error_code` when the failure had none.
#[no_mangle]
pub extern "C" fn vcheck_resolve_upload_error(error_code: i32) -> VCheckUploadVerdict {
    resolve_upload_error(u16::try_from(error_code).ok()).into()
}

/// Resolve the current-stage response: 0 completed, 1 expired, 2 unexpected
#[no_mangle]
pub unsafe extern "C" fn vcheck_resolve_stage(response_json: *const c_char, out: *mut c_int) -> c_int {
    if out.is_null() {
        return invalid_argument("Null output");
    }
    match json_arg(response_json).and_then(StageResponse::from_json) {
        Ok(response) => {
            *out = match resolve_stage(&response) {
                StageResolution::Completed => 0,
                StageResolution::Expired => 1,
                StageResolution::Unexpected(_) => 2,
            };
            0
        }
        Err(err) => report_error(&err),
    }
}
