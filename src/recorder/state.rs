//! Recording state management
//!
//! Defines the recording state machine, the per-recording session data, and
//! the option/outcome types exchanged with the application shell.

use crate::backend::traits::BackendDescriptor;
use crate::error::ErrorResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Current state of the recording engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No session exists.
    Idle,
    /// A session is being set up; the backend has not started yet.
    Starting,
    /// Capturing.
    Recording,
    /// Capture is paused.
    Paused,
    /// Stop was requested; the output file is being finalized.
    Stopping,
    /// The output file was verified. Auto-resets to idle after cleanup.
    Completed,
    /// The session failed. Auto-resets to idle after cleanup.
    Error,
}

impl Default for RecordingState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Recording quality setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    Medium,
    High,
}

impl Default for Quality {
    fn default() -> Self {
        Self::Medium
    }
}

fn default_audio_input() -> String {
    RecordingOptions::DEFAULT_AUDIO_INPUT.to_string()
}

fn default_true() -> bool {
    true
}

/// Options for starting a recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingOptions {
    /// Screen or window id to capture.
    pub screen_id: String,

    /// Audio input device id, or `"default"` to let the strategy resolver
    /// pick.
    #[serde(default = "default_audio_input")]
    pub audio_input_id: String,

    /// Whether to capture a microphone track.
    #[serde(default = "default_true")]
    pub include_microphone: bool,

    /// Whether to capture system audio.
    #[serde(default)]
    pub include_system_audio: bool,

    #[serde(default)]
    pub video_quality: Quality,

    #[serde(default)]
    pub audio_quality: Quality,

    /// Where the final file should land. Scratch space when unset.
    #[serde(default)]
    pub recording_directory: Option<PathBuf>,

    /// Filename override; `.mp4` is appended when no extension is given.
    #[serde(default)]
    pub filename: Option<String>,
}

impl RecordingOptions {
    /// Sentinel meaning "no explicit audio input chosen".
    pub const DEFAULT_AUDIO_INPUT: &'static str = "default";
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self {
            screen_id: String::new(),
            audio_input_id: default_audio_input(),
            include_microphone: true,
            include_system_audio: false,
            video_quality: Quality::default(),
            audio_quality: Quality::default(),
            recording_directory: None,
            filename: None,
        }
    }
}

/// One active recording session.
///
/// Exactly one exists per engine instance while a recording runs; it is
/// dropped when the engine resets to idle.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub id: Uuid,

    /// Monotonic start time; durations are always computed against this,
    /// never accumulated tick by tick.
    pub started_at: Instant,

    /// Wall-clock start time, for reporting.
    pub started_at_utc: DateTime<Utc>,

    /// Time spent paused so far.
    pub paused_total: Duration,

    /// When the current pause began, if paused.
    pub paused_since: Option<Instant>,

    /// Last computed duration.
    pub duration_ms: u64,

    /// Where the recording should end up.
    pub expected_output_path: PathBuf,

    /// Where the verified file actually is, once known.
    pub actual_output_path: Option<PathBuf>,

    /// True once the backend confirmed capture is live. Gates pause/resume.
    pub validated: bool,

    pub last_error: Option<ErrorResponse>,

    /// Immutable copy of the caller's options.
    pub options_snapshot: RecordingOptions,

    /// The backend this session runs on.
    pub backend: BackendDescriptor,
}

impl RecordingSession {
    pub fn new(
        id: Uuid,
        expected_output_path: PathBuf,
        options_snapshot: RecordingOptions,
        backend: BackendDescriptor,
    ) -> Self {
        Self {
            id,
            started_at: Instant::now(),
            started_at_utc: Utc::now(),
            paused_total: Duration::ZERO,
            paused_since: None,
            duration_ms: 0,
            expected_output_path,
            actual_output_path: None,
            validated: false,
            last_error: None,
            options_snapshot,
            backend,
        }
    }

    /// Recorded time at `now`, excluding pauses.
    pub fn elapsed_ms(&self, now: Instant) -> u64 {
        let gross = now.saturating_duration_since(self.started_at);
        let paused = self.paused_total
            + self
                .paused_since
                .map(|since| now.saturating_duration_since(since))
                .unwrap_or(Duration::ZERO);
        gross.saturating_sub(paused).as_millis() as u64
    }

    /// Record the start of a pause.
    pub fn mark_paused(&mut self, now: Instant) {
        if self.paused_since.is_none() {
            self.paused_since = Some(now);
        }
    }

    /// Record the end of a pause.
    pub fn mark_resumed(&mut self, now: Instant) {
        if let Some(since) = self.paused_since.take() {
            self.paused_total += now.saturating_duration_since(since);
        }
    }
}

/// Returned by the engine when a recording has started.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedRecording {
    pub recording_id: Uuid,
    pub backend: String,
    pub output_path: PathBuf,
}

/// Returned by the engine when a recording has stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedRecording {
    /// True when there was nothing to stop.
    pub was_already_stopped: bool,

    pub output_path: Option<PathBuf>,

    pub duration_ms: Option<u64>,

    /// True when the file could not be relocated and lives at a temp path.
    pub degraded: bool,
}

impl StoppedRecording {
    pub fn already_stopped() -> Self {
        Self {
            was_already_stopped: true,
            output_path: None,
            duration_ms: None,
            degraded: false,
        }
    }
}

/// Point-in-time snapshot of the engine for the shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderStatus {
    pub state: RecordingState,
    pub recording_id: Option<Uuid>,
    pub duration_ms: u64,
    pub validated: bool,
    pub backend: Option<String>,
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorResponse>,
}

impl RecorderStatus {
    pub fn idle() -> Self {
        Self {
            state: RecordingState::Idle,
            recording_id: None,
            duration_ms: 0,
            validated: false,
            backend: None,
            output_path: None,
            last_error: None,
        }
    }
}
