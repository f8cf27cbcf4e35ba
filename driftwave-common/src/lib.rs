//! # Driftwave Common Library
//!
//! Shared code for the Driftwave streaming player:
//! - Engine event types, the broadcast EventBus and synchronous listeners
//! - Playback state enumeration
//! - Fade curve definitions
//! - Configuration file resolution

pub mod config;
pub mod error;
pub mod events;
pub mod fade_curves;

pub use error::{Error, Result};
pub use events::{EngineEvent, EventBus, PlaybackState};
pub use fade_curves::FadeCurve;
