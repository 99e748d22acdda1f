//! VCheck Core - Fundamental types shared by the liveness pipeline
//!
//! This crate defines:
//! - Identifiers (SessionId, AttemptNumber)
//! - Session time (SessionTime)
//! - Error taxonomy (VCheckError)
//! - Liveness configuration and its defaults
//! - Resolution of backend liveness/stage responses

pub mod config;
pub mod error;
pub mod id;
pub mod time;
pub mod verdict;

pub use config::*;
pub use error::*;
pub use id::*;
pub use time::*;
pub use verdict::*;
