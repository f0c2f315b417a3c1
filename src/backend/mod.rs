//! Capture backend selection
//!
//! This module implements the pluggable backend architecture:
//! - CaptureBackend trait and descriptor metadata for each candidate
//! - CapabilityRouter that probes candidates and selects the first usable one
//! - Default candidate catalog ranked by platform and capability

pub mod catalog;
pub mod mock;
pub mod router;
pub mod traits;

pub use catalog::default_candidates;
pub use router::{CapabilityRouter, RegisteredBackend, RouterConfig, SelectedBackend};
pub use traits::{
    BackendDescriptor, BackendEvent, CapabilityFlags, CaptureBackend, CaptureConfig, CaptureStart,
    CaptureStop, PermissionStatus, ProbeKind, Rating, RatingSet,
};
