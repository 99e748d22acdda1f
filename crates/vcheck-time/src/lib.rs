//! VCheck Time - temporal control for liveness sessions
//!
//! - Frame clock: monotonic session time for frames without timestamps
//! - Cooldown: short suppression windows measured on frame time
//! - Session timer: one-shot, cancellable deadline on the async runtime

pub mod clock;
pub mod cooldown;
pub mod timer;

pub use clock::*;
pub use cooldown::*;
pub use timer::*;
