//! Backend verdict resolution
//!
//! After a local session completes, the shell uploads the recorded video and
//! later asks the backend for the current verification stage. The HTTP calls
//! belong to the shell; this module only decides what the answers mean.

use serde::Deserialize;

use crate::{VCheckError, VCheckResult};

/// Upload failures with this HTTP status are treated as accepted
pub const UPLOAD_ACCEPTED_ERROR_CODE: u16 = 400;

/// Server-side liveness challenge status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessChallengeStatus {
    Initialized,
    Processing,
    Success,
    Fail,
    Unknown(i64),
}

impl LivenessChallengeStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => LivenessChallengeStatus::Initialized,
            1 => LivenessChallengeStatus::Processing,
            2 => LivenessChallengeStatus::Success,
            3 => LivenessChallengeStatus::Fail,
            other => LivenessChallengeStatus::Unknown(other),
        }
    }
}

/// Why the backend rejected a liveness video
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendFailureReason {
    FaceNotFound,
    MultipleFaces,
    FastMovement,
    TooDark,
    InvalidMovements,
    Unknown,
}

impl BackendFailureReason {
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "FACE_NOT_FOUND" => BackendFailureReason::FaceNotFound,
            "MULTIPLE_FACES" => BackendFailureReason::MultipleFaces,
            "FAST_MOVEMENT" => BackendFailureReason::FastMovement,
            "TOO_DARK" => BackendFailureReason::TooDark,
            "INVALID_MOVEMENTS" => BackendFailureReason::InvalidMovements,
            _ => BackendFailureReason::Unknown,
        }
    }
}

/// Body of a successful liveness upload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LivenessUploadResponse {
    #[serde(default)]
    pub is_final: Option<bool>,
    #[serde(default)]
    pub status: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl LivenessUploadResponse {
    pub fn from_json(json: &str) -> VCheckResult<Self> {
        serde_json::from_str(json).map_err(|e| VCheckError::InvalidVerdict(e.to_string()))
    }
}

/// What the shell should do after an upload answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadVerdict {
    /// Accepted; fetch the current verification stage next
    Proceed,
    /// Rejected for a reason the user can fix; restart the liveness session
    RetryLiveness(BackendFailureReason),
    /// Upload failed outright
    Failed,
}

/// Resolve a successful upload response
pub fn resolve_upload(response: &LivenessUploadResponse) -> UploadVerdict {
    if response.is_final == Some(true) {
        return UploadVerdict::Proceed;
    }

    let status = response.status.map(LivenessChallengeStatus::from_code);
    if status != Some(LivenessChallengeStatus::Fail) {
        return UploadVerdict::Proceed;
    }

    match response.reason.as_deref().map(str::trim) {
        Some(reason) if !reason.is_empty() => {
            UploadVerdict::RetryLiveness(BackendFailureReason::from_code(reason))
        }
        // a failure without a reason is not actionable by the user
        _ => UploadVerdict::Proceed,
    }
}

/// Resolve an upload that failed with an HTTP / API error code
pub fn resolve_upload_error(code: Option<u16>) -> UploadVerdict {
    match code {
        Some(UPLOAD_ACCEPTED_ERROR_CODE) => UploadVerdict::Proceed,
        _ => UploadVerdict::Failed,
    }
}

/// Known error codes returned by the current-stage endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageErrorType {
    VerificationNotInitialized,
    UserInteractedCompleted,
    VerificationExpired,
}

impl StageErrorType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(StageErrorType::VerificationNotInitialized),
            1 => Some(StageErrorType::UserInteractedCompleted),
            2 => Some(StageErrorType::VerificationExpired),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            StageErrorType::VerificationNotInitialized => 0,
            StageErrorType::UserInteractedCompleted => 1,
            StageErrorType::VerificationExpired => 2,
        }
    }
}

/// Body of the current-stage endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StageResponse {
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub error_code: Option<i64>,
}

impl StageResponse {
    pub fn from_json(json: &str) -> VCheckResult<Self> {
        serde_json::from_str(json).map_err(|e| VCheckError::InvalidVerdict(e.to_string()))
    }
}

/// Outcome of the stage check that follows a liveness upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageResolution {
    /// Verification finished; the partner callback should run
    Completed,
    /// Verification expired; finish without the partner callback
    Expired,
    Unexpected(Option<i64>),
}

pub fn resolve_stage(response: &StageResponse) -> StageResolution {
    match response.error_code.and_then(StageErrorType::from_code) {
        Some(StageErrorType::UserInteractedCompleted) => StageResolution::Completed,
        Some(StageErrorType::VerificationExpired) => StageResolution::Expired,
        _ => StageResolution::Unexpected(response.error_code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_upload_proceeds() {
        let response = LivenessUploadResponse::from_json(r#"{"is_final": true, "status": 3, "reason": "TOO_DARK"}"#)
            .unwrap();
        assert_eq!(resolve_upload(&response), UploadVerdict::Proceed);
    }

    #[test]
    fn test_failed_upload_with_reason_retries() {
        let response =
            LivenessUploadResponse::from_json(r#"{"is_final": false, "status": 3, "reason": "fast_movement"}"#)
                .unwrap();
        assert_eq!(
            resolve_upload(&response),
            UploadVerdict::RetryLiveness(BackendFailureReason::FastMovement)
        );
    }

    #[test]
    fn test_failed_upload_without_reason_proceeds() {
        let response = LivenessUploadResponse::from_json(r#"{"status": 3, "reason": "  "}"#).unwrap();
        assert_eq!(resolve_upload(&response), UploadVerdict::Proceed);
    }

    #[test]
    fn test_unknown_reason_still_retries() {
        let response = LivenessUploadResponse::from_json(r#"{"status": 3, "reason": "GLARE"}"#).unwrap();
        assert_eq!(
            resolve_upload(&response),
            UploadVerdict::RetryLiveness(BackendFailureReason::Unknown)
        );
    }

    #[test]
    fn test_upload_error_codes() {
        assert_eq!(resolve_upload_error(Some(400)), UploadVerdict::Proceed);
        assert_eq!(resolve_upload_error(Some(500)), UploadVerdict::Failed);
        assert_eq!(resolve_upload_error(None), UploadVerdict::Failed);
    }

    #[test]
    fn test_stage_resolution() {
        let done = StageResponse::from_json(r#"{"error_code": 1}"#).unwrap();
        assert_eq!(resolve_stage(&done), StageResolution::Completed);

        let expired = StageResponse::from_json(r#"{"error_code": 2}"#).unwrap();
        assert_eq!(resolve_stage(&expired), StageResolution::Expired);

        let pending = StageResponse::from_json(r#"{"data": {"type": 1}}"#).unwrap();
        assert_eq!(resolve_stage(&pending), StageResolution::Unexpected(None));
    }

    #[test]
    fn test_garbage_payload_is_error() {
        assert!(matches!(
            StageResponse::from_json("42"),
            Err(VCheckError::InvalidVerdict(_))
        ));
    }
}
