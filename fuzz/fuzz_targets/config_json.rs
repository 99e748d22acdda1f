#![no_main]

use libfuzzer_sys::fuzz_target;
use vcheck_core::{resolve_stage, resolve_upload, LivenessConfig, LivenessUploadResponse, StageResponse};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Whatever parses must also validate and build an engine
    if let Ok(config) = LivenessConfig::from_json(text) {
        assert!(config.validate().is_ok());
        assert!(vcheck_liveness::LivenessEngine::new(config).is_ok());
    }

    if let Ok(response) = LivenessUploadResponse::from_json(text) {
        let _ = resolve_upload(&response);
    }
    if let Ok(response) = StageResponse::from_json(text) {
        let _ = resolve_stage(&response);
    }
});
