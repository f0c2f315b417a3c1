//! Capture backend contract
//!
//! Platform-agnostic trait every capture backend implements, plus the
//! descriptor metadata the capability router ranks backends by. Backends
//! own the native capture work (screen APIs, audio mixing, encoding); the
//! core only drives them through this contract.

use crate::devices::DeviceRecord;
use crate::devices::strategy::AudioCaptureMode;
use crate::error::RecorderResult;
use crate::recorder::state::Quality;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;

/// What a backend is capable of capturing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityFlags {
    /// Can capture system audio without a virtual driver.
    pub system_audio: bool,

    /// Can capture a microphone.
    pub microphone: bool,

    /// Can merge system audio and microphone into a single output.
    pub merger: bool,
}

/// Coarse rating on a three-step scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Low,
    Medium,
    High,
}

/// Quality/performance/reliability ratings derived from a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSet {
    pub quality: Rating,
    pub performance: Rating,
    pub reliability: Rating,
}

/// How a backend's capability probe behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// The probe enumerates hardware (displays, devices). Runs under a
    /// bounded timeout and may be retried once.
    Enumeration,

    /// The probe checks that something exists (a binary, a framework).
    /// Fast by construction, so it runs unbounded and is never retried.
    Existence,
}

/// Default timeout applied to enumeration-style probes.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Immutable metadata describing one backend candidate.
///
/// Constructed once per candidate list build; ratings are derived from the
/// capability flags and dependency count at construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendDescriptor {
    /// Backend name, e.g. `"screencapturekit"`.
    pub name: String,

    /// OS names this backend applies to (`"macos"`, `"windows"`, `"linux"`).
    /// Empty means any platform.
    pub platform_applicability: Vec<String>,

    /// Probe order. Lower is tried first.
    pub priority: u8,

    /// External dependencies this backend needs (binaries, drivers).
    pub dependencies: Vec<String>,

    /// What the backend can capture.
    pub capabilities: CapabilityFlags,

    /// How its capability probe is run.
    pub probe_kind: ProbeKind,

    /// Derived quality/performance/reliability ratings.
    pub ratings: RatingSet,
}

impl BackendDescriptor {
    /// Build a descriptor, deriving its ratings.
    pub fn new(
        name: impl Into<String>,
        platform_applicability: Vec<String>,
        priority: u8,
        dependencies: Vec<String>,
        capabilities: CapabilityFlags,
        probe_kind: ProbeKind,
    ) -> Self {
        // A merging system-audio backend produces the best recordings; a
        // dependency-free backend is the fastest and least likely to break.
        let quality = if capabilities.system_audio && capabilities.merger {
            Rating::High
        } else if capabilities.system_audio {
            Rating::Medium
        } else {
            Rating::Low
        };
        let performance = if dependencies.is_empty() {
            Rating::High
        } else {
            Rating::Medium
        };
        let reliability = match dependencies.len() {
            0 => Rating::High,
            1 => Rating::Medium,
            _ => Rating::Low,
        };

        Self {
            name: name.into(),
            platform_applicability,
            priority,
            dependencies,
            capabilities,
            probe_kind,
            ratings: RatingSet {
                quality,
                performance,
                reliability,
            },
        }
    }

    /// Whether this backend applies to the given OS name.
    pub fn applies_to(&self, os: &str) -> bool {
        self.platform_applicability.is_empty()
            || self.platform_applicability.iter().any(|p| p == os)
    }
}

/// Configuration handed to a backend when recording starts.
///
/// Assembled by the engine from the caller's options, the audio strategy
/// decision, and the generated output path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConfig {
    /// Recording id assigned by the engine.
    pub recording_id: String,

    /// Screen or window id to capture.
    pub screen_id: String,

    /// Where the backend should write the recording.
    pub output_path: PathBuf,

    /// Whether to capture a microphone track.
    pub include_microphone: bool,

    /// Microphone device id, if one was selected.
    pub microphone_device_id: Option<String>,

    /// How system audio should be captured.
    pub audio_mode: AudioCaptureMode,

    /// Bound system audio device id (device-specific mode only).
    pub system_audio_device_id: Option<String>,

    pub video_quality: Quality,
    pub audio_quality: Quality,
}

/// Returned by a backend when capture has started.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStart {
    pub success: bool,

    /// Recording id echoed back from the config.
    pub recording_id: String,

    /// Where the backend is writing. May differ from the requested path if
    /// the backend can only write to its own scratch location.
    pub output_path: PathBuf,
}

/// Returned by a backend when capture has stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStop {
    /// Final or temporary path of the written file.
    pub output_path: PathBuf,

    /// Duration as measured by the backend.
    pub duration_ms: u64,
}

/// Result of a permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied {
        /// What was denied.
        message: String,
        /// How the user can fix it.
        suggestion: String,
    },
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Events a backend pushes to the engine while a session is live.
#[derive(Debug, Clone)]
pub enum BackendEvent {
    /// The backend positively confirmed frames/samples are flowing.
    CaptureConfirmed { recording_id: String },

    /// A device in use vanished mid-session.
    DeviceLost { device_id: String },

    /// The backend crashed or hit an unrecoverable error.
    Fatal { message: String },
}

/// Contract every capture backend implements.
///
/// Methods take `&self`; backends use interior mutability so one instance
/// can be shared between the router, registry, and engine.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// One-time setup before the first recording.
    async fn initialize(&self) -> RecorderResult<()>;

    /// Capability probe: is this backend currently usable?
    ///
    /// `Ok(true)` selects the backend, `Ok(false)` or `Err` rejects it.
    /// Errors should carry enough context to show up in the aggregate
    /// selection failure.
    async fn probe(&self) -> anyhow::Result<bool>;

    /// Check OS capture permissions without prompting.
    async fn check_permissions(&self) -> PermissionStatus;

    /// Begin capturing with the given configuration.
    async fn start_recording(&self, config: CaptureConfig) -> RecorderResult<CaptureStart>;

    /// Stop capturing and return the written file.
    async fn stop_recording(&self) -> RecorderResult<CaptureStop>;

    /// Pause capture without tearing the stream down.
    async fn pause_recording(&self) -> RecorderResult<()>;

    /// Resume a paused capture.
    async fn resume_recording(&self) -> RecorderResult<()>;

    /// Enumerate capturable screens and windows.
    async fn get_available_screens(&self) -> RecorderResult<Vec<DeviceRecord>>;

    /// Enumerate audio devices.
    async fn get_available_audio_devices(&self) -> RecorderResult<Vec<DeviceRecord>>;

    /// Subscribe to live-capture events.
    fn subscribe(&self) -> broadcast::Receiver<BackendEvent>;

    /// Release all native resources. Must tolerate being called in any
    /// state, including after a failed start, and must never panic.
    async fn cleanup(&self);
}
