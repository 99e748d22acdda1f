//! VCheck Test Harness - liveness sessions without a camera
//!
//! This crate provides:
//! - Scripted users that perform (or fail) the gesture challenge
//! - Fake tracker, face counter, recorder and observer
//! - A deterministic engine simulator with a virtual deadline
//! - A controller harness for tokio tests with paused time
//! - End-to-end scenarios checked against per-session rules

pub mod fakes;
pub mod harness;
pub mod scenarios;
pub mod simulator;
pub mod user;

pub use fakes::*;
pub use harness::*;
pub use scenarios::*;
pub use simulator::*;
pub use user::*;
