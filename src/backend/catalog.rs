//! Default backend candidate catalog
//!
//! Builds the platform-ranked descriptor list for the backends this system
//! knows about. Adapters for these descriptors are registered by the
//! embedding application; the catalog only encodes ranking and capability
//! metadata.

use super::traits::{BackendDescriptor, CapabilityFlags, ProbeKind};

/// Build the default candidate descriptors, ranked by priority.
///
/// Native platform APIs come first; the ffmpeg device-capture fallback is
/// last because it depends on an external binary and cannot merge audio
/// tracks itself.
pub fn default_candidates() -> Vec<BackendDescriptor> {
    vec![
        BackendDescriptor::new(
            "screencapturekit",
            vec!["macos".to_string()],
            0,
            vec![],
            CapabilityFlags {
                system_audio: true,
                microphone: true,
                merger: true,
            },
            ProbeKind::Enumeration,
        ),
        BackendDescriptor::new(
            "wasapi-loopback",
            vec!["windows".to_string()],
            1,
            vec![],
            CapabilityFlags {
                system_audio: true,
                microphone: true,
                merger: false,
            },
            ProbeKind::Enumeration,
        ),
        BackendDescriptor::new(
            "pipewire",
            vec!["linux".to_string()],
            2,
            vec!["pipewire".to_string()],
            CapabilityFlags {
                system_audio: true,
                microphone: true,
                merger: false,
            },
            ProbeKind::Enumeration,
        ),
        BackendDescriptor::new(
            "ffmpeg",
            vec![],
            10,
            vec!["ffmpeg".to_string()],
            CapabilityFlags {
                system_audio: false,
                microphone: true,
                merger: false,
            },
            ProbeKind::Existence,
        ),
    ]
}
