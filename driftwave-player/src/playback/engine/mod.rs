//! Stream engine
//!
//! **Module Structure:**
//! - `core.rs`: struct definition, lifecycle and the playback state machine
//! - `queue.rs`: chunk intake, draining onto the timeline, completions
//! - `diagnostics.rs`: status accessors, telemetry and analysis snapshots

mod core;
mod diagnostics;
mod queue;

pub use core::StreamEngine;
