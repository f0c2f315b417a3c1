//! Recording session engine
//!
//! This module implements the recording orchestration core:
//! - RecordingEngine driving one session at a time through a capture backend
//! - The session state machine and its option/outcome types

pub mod engine;
pub mod state;

pub use engine::{EngineConfig, RecorderEvent, RecordingEngine};
pub use state::{
    Quality, RecorderStatus, RecordingOptions, RecordingSession, RecordingState, StartedRecording,
    StoppedRecording,
};
