//! Error types and handling
//!
//! Common error types used across the recording core. Every error maps to a
//! structured [`ErrorResponse`] so a caller can render actionable UI without
//! string-parsing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One failed capability probe: which backend, and why it was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeFailure {
    /// Backend name from its descriptor.
    pub name: String,

    /// Human-readable reason the probe failed.
    pub reason: String,
}

/// One issue found while validating a device selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ValidationIssue {
    /// The requested screen id is not in the current device inventory.
    UnknownScreen { id: String },

    /// The requested audio input id is not in the current device inventory.
    UnknownAudioDevice { id: String },

    /// No screens have been enumerated yet.
    NoScreensAvailable,

    /// No audio input devices have been enumerated yet.
    NoAudioDevicesAvailable,
}

impl ValidationIssue {
    /// Remediation hint for this issue.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::UnknownScreen { .. } => "Refresh the screen list and pick a current entry",
            Self::UnknownAudioDevice { .. } => "Refresh the audio device list and pick a current entry",
            Self::NoScreensAvailable => "Check screen recording permission and connected displays",
            Self::NoAudioDevicesAvailable => "Check that at least one audio input device is connected",
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownScreen { id } => write!(f, "unknown screen id: {}", id),
            Self::UnknownAudioDevice { id } => write!(f, "unknown audio device id: {}", id),
            Self::NoScreensAvailable => write!(f, "no screens available"),
            Self::NoAudioDevicesAvailable => write!(f, "no audio input devices available"),
        }
    }
}

/// Recording-core error type.
#[derive(Error, Debug)]
pub enum RecorderError {
    /// No backend has been selected yet (router never ran or was reset).
    #[error("no capture backend available")]
    ServiceUnavailable,

    /// Every candidate backend failed its capability probe.
    ///
    /// The failure list carries one entry per candidate so the report can be
    /// rebuilt without re-running any probe.
    #[error("no usable capture backend: {}", format_probe_failures(.failures))]
    NoUsableBackend { failures: Vec<ProbeFailure> },

    /// A device selection did not validate against the current inventory.
    #[error("invalid device selection: {}", format_issues(.issues))]
    Validation { issues: Vec<ValidationIssue> },

    /// A start was attempted while a session already exists.
    #[error("Already recording")]
    AlreadyRecording,

    /// The backend failed to begin capturing.
    #[error("failed to start recording: {0}")]
    Start(String),

    /// The backend failed to stop cleanly.
    #[error("failed to stop recording: {0}")]
    Stop(String),

    /// Pause attempted in a state that does not allow it.
    #[error("cannot pause: {0}")]
    Pause(String),

    /// Resume attempted in a state that does not allow it.
    #[error("cannot resume: {0}")]
    Resume(String),

    /// The OS denied screen or audio capture.
    #[error("permission denied: {message}")]
    Permission {
        message: String,
        suggestion: String,
    },

    /// A device vanished or failed mid-session.
    #[error("device error: {0}")]
    Device(String),

    /// The output file is missing or empty after stop.
    #[error("output file error: {0}")]
    File(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_probe_failures(failures: &[ProbeFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.name, f.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Structured error payload for the application shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Stable error kind for programmatic handling.
    pub kind: String,

    /// Human-readable message.
    pub message: String,

    /// Remediation hint, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl From<&RecorderError> for ErrorResponse {
    fn from(error: &RecorderError) -> Self {
        let kind = match error {
            RecorderError::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            RecorderError::NoUsableBackend { .. } => "SERVICE_UNAVAILABLE",
            RecorderError::Validation { .. } => "VALIDATION_ERROR",
            RecorderError::AlreadyRecording => "START_ERROR",
            RecorderError::Start(_) => "START_ERROR",
            RecorderError::Stop(_) => "STOP_ERROR",
            RecorderError::Pause(_) => "PAUSE_ERROR",
            RecorderError::Resume(_) => "RESUME_ERROR",
            RecorderError::Permission { .. } => "PERMISSION_ERROR",
            RecorderError::Device(_) => "DEVICE_ERROR",
            RecorderError::File(_) => "FILE_ERROR",
            RecorderError::Io(_) => "IO_ERROR",
        };

        let suggestion = match error {
            RecorderError::Permission { suggestion, .. } => Some(suggestion.clone()),
            RecorderError::Validation { issues } => issues
                .first()
                .map(|issue| issue.suggestion().to_string()),
            RecorderError::NoUsableBackend { .. } => {
                Some("Install or enable at least one capture backend".to_string())
            }
            _ => None,
        };

        ErrorResponse {
            kind: kind.to_string(),
            message: error.to_string(),
            suggestion,
        }
    }
}

impl From<RecorderError> for ErrorResponse {
    fn from(error: RecorderError) -> Self {
        ErrorResponse::from(&error)
    }
}

/// Result type alias using RecorderError.
pub type RecorderResult<T> = Result<T, RecorderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_probe_error_lists_every_candidate() {
        let error = RecorderError::NoUsableBackend {
            failures: vec![
                ProbeFailure {
                    name: "screencapturekit".to_string(),
                    reason: "enumeration timed out".to_string(),
                },
                ProbeFailure {
                    name: "ffmpeg".to_string(),
                    reason: "binary not found".to_string(),
                },
            ],
        };

        let message = error.to_string();
        assert!(message.contains("screencapturekit"));
        assert!(message.contains("enumeration timed out"));
        assert!(message.contains("ffmpeg"));
        assert!(message.contains("binary not found"));
    }

    #[test]
    fn test_error_response_carries_permission_suggestion() {
        let error = RecorderError::Permission {
            message: "screen recording not granted".to_string(),
            suggestion: "Allow in System Preferences and try again".to_string(),
        };

        let response = ErrorResponse::from(&error);
        assert_eq!(response.kind, "PERMISSION_ERROR");
        assert_eq!(
            response.suggestion.as_deref(),
            Some("Allow in System Preferences and try again")
        );
    }

    #[test]
    fn test_already_recording_message_is_stable() {
        let response = ErrorResponse::from(RecorderError::AlreadyRecording);
        assert_eq!(response.message, "Already recording");
        assert_eq!(response.kind, "START_ERROR");
    }
}
