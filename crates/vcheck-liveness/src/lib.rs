//! VCheck Liveness - the frame-driven gesture challenge
//!
//! A liveness session asks the user for a fixed sequence of gestures while
//! the camera records. Every frame is turned into a small observation
//! (head angles, mouth openness, exposure, occasionally a face count) and
//! fed to the [`LivenessEngine`], which answers with [`Directive`]s for the
//! host: record this frame, stop the recorder, arm or cancel the deadline,
//! tell the UI something.
//!
//! # Gesture ladder
//!
//! - CheckHeadPosition: turn the head left past the yaw threshold
//! - OuterLeftHeadPitch: pitch to the negative extreme
//! - OuterRightHeadPitch: pitch to the positive extreme
//! - MouthOpen: open the mouth past the openness threshold
//!
//! # Obstacles
//!
//! Face count problems end the session at once. Low exposure and excessive
//! yaw must persist across consecutive frames before they matter. After the
//! attempt budget is spent, terminal obstacles complete the session instead
//! of ending it.

pub mod budget;
pub mod engine;
pub mod event;
pub mod geometry;
pub mod milestone;
pub mod obstacle;
pub mod session;

pub use budget::*;
pub use engine::*;
pub use event::*;
pub use geometry::*;
pub use milestone::*;
pub use obstacle::*;
pub use session::*;
