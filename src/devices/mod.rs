//! Device enumeration and audio capture strategy
//!
//! The device registry caches screen/audio inventories and validates
//! selections; the strategy resolver decides how system audio and the
//! microphone should be captured for one recording.

pub mod registry;
pub mod strategy;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use registry::{DeviceInventory, DeviceRegistry, RegistryConfig, ValidationReport};
pub use strategy::{
    AudioCaptureMode, AudioStrategyDecision, AudioStrategyResolver, StrategyRationale,
};

/// What kind of capturable device a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Screen,
    Window,
    AudioInput,
    AudioOutput,
}

/// One enumerated device.
///
/// Records are never mutated in place; a refresh replaces the whole
/// inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    /// Backend-assigned device id.
    pub id: String,

    /// Name shown to the user.
    pub display_name: String,

    pub kind: DeviceKind,

    /// When this record was enumerated.
    pub discovered_at: DateTime<Utc>,
}

impl DeviceRecord {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            kind,
            discovered_at: Utc::now(),
        }
    }

    /// Convenience constructor for a screen record.
    pub fn screen(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::new(id, display_name, DeviceKind::Screen)
    }

    /// Convenience constructor for an audio input record.
    pub fn audio_input(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::new(id, display_name, DeviceKind::AudioInput)
    }

    /// Convenience constructor for an audio output record.
    pub fn audio_output(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::new(id, display_name, DeviceKind::AudioOutput)
    }
}
