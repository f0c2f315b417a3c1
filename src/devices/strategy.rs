//! Audio capture strategy resolution
//!
//! Decides, per recording, how system audio and the microphone should be
//! captured given the current device inventory. The decision is a pure
//! function of its inputs: re-running with the same options and device list
//! always yields the same result.

use super::{DeviceKind, DeviceRecord};
use crate::recorder::state::RecordingOptions;
use serde::{Deserialize, Serialize};

/// Name substrings identifying third-party virtual audio drivers.
///
/// When one of these shows up in the inventory the resolver picks native
/// system-audio capture and does not bind a device id: binding would make
/// the recording depend on a driver the user may not keep installed.
const VIRTUAL_DRIVER_MARKERS: [&str; 5] = ["teams", "loopback", "soundflower", "blackhole", "virtual"];

/// Name substrings identifying a machine's built-in microphone.
const BUILTIN_MIC_MARKERS: [&str; 3] = ["built-in", "macbook", "internal"];

/// How system audio is captured for one recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AudioCaptureMode {
    /// Capture system audio through the platform's native API.
    NativeSystemAudio,

    /// Capture from one explicitly chosen device.
    DeviceSpecific,

    /// No system audio; microphone only (or nothing).
    MicrophoneOnly,
}

/// Why the resolver picked its mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyRationale {
    /// The caller named a specific input device.
    ExplicitDevice,

    /// Virtual drivers are present but native capture avoids depending
    /// on them.
    AvoidThirdPartyDependency,

    /// System audio sources exist and native capture works with all of them.
    BestCompatibility,

    /// The caller did not ask for system audio.
    SystemAudioDisabled,

    /// Nothing in the inventory can provide system audio.
    NoSystemAudioSource,
}

/// The resolver's decision for one recording. Computed fresh per start call
/// and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioStrategyDecision {
    pub mode: AudioCaptureMode,

    /// Display names of virtual drivers found in the inventory.
    pub detected_virtual_drivers: Vec<String>,

    pub rationale: StrategyRationale,

    /// Bound system audio device. Only set in device-specific mode.
    pub system_audio_device_id: Option<String>,

    /// Microphone to record from, when one is wanted and available.
    pub microphone_device_id: Option<String>,
}

/// Resolves the audio capture strategy from options and device inventory.
#[derive(Debug, Clone)]
pub struct AudioStrategyResolver {
    virtual_markers: Vec<String>,
    builtin_markers: Vec<String>,
}

impl Default for AudioStrategyResolver {
    fn default() -> Self {
        Self {
            virtual_markers: VIRTUAL_DRIVER_MARKERS.iter().map(|m| m.to_string()).collect(),
            builtin_markers: BUILTIN_MIC_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl AudioStrategyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide how to capture audio for one recording.
    pub fn resolve(
        &self,
        options: &RecordingOptions,
        audio_devices: &[DeviceRecord],
    ) -> AudioStrategyDecision {
        let microphone_device_id = self.pick_microphone(options, audio_devices);

        // An explicit device choice overrides everything else.
        if options.audio_input_id != RecordingOptions::DEFAULT_AUDIO_INPUT {
            return AudioStrategyDecision {
                mode: AudioCaptureMode::DeviceSpecific,
                detected_virtual_drivers: Vec::new(),
                rationale: StrategyRationale::ExplicitDevice,
                system_audio_device_id: Some(options.audio_input_id.clone()),
                microphone_device_id,
            };
        }

        if !options.include_system_audio {
            return AudioStrategyDecision {
                mode: AudioCaptureMode::MicrophoneOnly,
                detected_virtual_drivers: Vec::new(),
                rationale: StrategyRationale::SystemAudioDisabled,
                system_audio_device_id: None,
                microphone_device_id,
            };
        }

        let detected_virtual_drivers: Vec<String> = audio_devices
            .iter()
            .filter(|device| self.is_virtual_driver(&device.display_name))
            .map(|device| device.display_name.clone())
            .collect();

        if !detected_virtual_drivers.is_empty() {
            return AudioStrategyDecision {
                mode: AudioCaptureMode::NativeSystemAudio,
                detected_virtual_drivers,
                rationale: StrategyRationale::AvoidThirdPartyDependency,
                system_audio_device_id: None,
                microphone_device_id,
            };
        }

        let has_system_audio_source = audio_devices
            .iter()
            .any(|device| device.kind == DeviceKind::AudioOutput);

        if has_system_audio_source {
            return AudioStrategyDecision {
                mode: AudioCaptureMode::NativeSystemAudio,
                detected_virtual_drivers: Vec::new(),
                rationale: StrategyRationale::BestCompatibility,
                system_audio_device_id: None,
                microphone_device_id,
            };
        }

        AudioStrategyDecision {
            mode: AudioCaptureMode::MicrophoneOnly,
            detected_virtual_drivers: Vec::new(),
            rationale: StrategyRationale::NoSystemAudioSource,
            system_audio_device_id: None,
            microphone_device_id,
        }
    }

    /// Microphone selection, independent of the system audio mode:
    /// explicit id, else built-in heuristic, else first available input.
    fn pick_microphone(
        &self,
        options: &RecordingOptions,
        audio_devices: &[DeviceRecord],
    ) -> Option<String> {
        if !options.include_microphone {
            return None;
        }

        if options.audio_input_id != RecordingOptions::DEFAULT_AUDIO_INPUT {
            return Some(options.audio_input_id.clone());
        }

        let inputs: Vec<&DeviceRecord> = audio_devices
            .iter()
            .filter(|device| device.kind == DeviceKind::AudioInput)
            .collect();

        inputs
            .iter()
            .find(|device| self.is_builtin_mic(&device.display_name))
            .or_else(|| inputs.first())
            .map(|device| device.id.clone())
    }

    fn is_virtual_driver(&self, name: &str) -> bool {
        let lowered = name.to_lowercase();
        self.virtual_markers.iter().any(|m| lowered.contains(m))
    }

    fn is_builtin_mic(&self, name: &str) -> bool {
        let lowered = name.to_lowercase();
        self.builtin_markers.iter().any(|m| lowered.contains(m))
    }
}
