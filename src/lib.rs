//! deskrec - desktop recording orchestration.
//!
//! This crate implements the recording core an application shell builds on:
//! capability-based backend selection, the recording session state machine,
//! device enumeration and validation, audio strategy resolution, and output
//! file lifecycle management. Capture itself (native screen APIs, audio
//! mixing, encoding) lives behind the [`backend::CaptureBackend`] trait and
//! is supplied by the embedding application.

pub mod backend;
pub mod devices;
pub mod error;
pub mod output;
pub mod recorder;
pub mod service;

pub use backend::{
    default_candidates, BackendDescriptor, BackendEvent, CapabilityFlags, CapabilityRouter,
    CaptureBackend, CaptureConfig, CaptureStart, CaptureStop, PermissionStatus, ProbeKind, Rating,
    RatingSet, RegisteredBackend, RouterConfig, SelectedBackend,
};
pub use devices::{
    AudioCaptureMode, AudioStrategyDecision, AudioStrategyResolver, DeviceInventory, DeviceKind,
    DeviceRecord, DeviceRegistry, RegistryConfig, StrategyRationale, ValidationReport,
};
pub use error::{ErrorResponse, ProbeFailure, RecorderError, RecorderResult, ValidationIssue};
pub use output::{
    FinalizeOutcome, OutputFileRecord, OutputManager, OutputStatus, RetentionPolicy, SweepReport,
};
pub use recorder::{
    EngineConfig, Quality, RecorderEvent, RecorderStatus, RecordingEngine, RecordingOptions,
    RecordingState, StartedRecording, StoppedRecording,
};
pub use service::{
    ConfirmResponse, ControlResponse, RecorderService, ServiceConfig, StartResponse, StopResponse,
};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing for binaries and tests that want console output.
///
/// Respects `RUST_LOG`; quiet by default otherwise.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deskrec=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
