//! VCheck Runtime - the imperative shell around the liveness engine
//!
//! Per camera frame:
//! 1. Rebase the frame timestamp onto session time
//! 2. Sample the face count when due
//! 3. Track the face with the current device rotation
//! 4. Evaluate the observation in the engine
//! 5. Execute the returned directives (record, stop, arm, cancel)
//! 6. Project events to the observer, outside the session lock
//!
//! The deadline and recorder completions arrive on the tokio runtime and
//! go through the same lock, so the engine sees one input at a time.

pub mod collaborator;
pub mod controller;
pub mod frame;
pub mod telemetry;

pub use collaborator::*;
pub use controller::*;
pub use frame::*;
pub use telemetry::*;
