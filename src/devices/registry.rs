//! Device registry
//!
//! Caches screen/window/audio inventories enumerated through the selected
//! capture backend. Explicit refreshes inside the TTL window are served from
//! the cache so hardware is never enumerated twice back to back; a
//! background task keeps the cache warm on a fixed interval.

use super::{DeviceKind, DeviceRecord};
use crate::backend::CapabilityRouter;
use crate::error::{RecorderResult, ValidationIssue};
use crate::recorder::state::RecordingOptions;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Default lifetime of a cached inventory.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Default interval of the background refresh task.
pub const DEFAULT_BACKGROUND_INTERVAL: Duration = Duration::from_secs(30);

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How long a cached inventory stays valid.
    pub cache_ttl: Duration,

    /// How often the background task re-enumerates.
    pub background_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            background_interval: DEFAULT_BACKGROUND_INTERVAL,
        }
    }
}

/// One enumeration pass over screens and audio devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInventory {
    pub screens: Vec<DeviceRecord>,
    pub audio: Vec<DeviceRecord>,
}

/// Result of validating a device selection against the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

struct CachedInventory {
    inventory: DeviceInventory,
    fetched_at: Instant,
}

/// Caches device inventories and validates selections against them.
pub struct DeviceRegistry {
    router: Arc<CapabilityRouter>,
    config: RegistryConfig,
    cache: RwLock<Option<CachedInventory>>,
}

impl DeviceRegistry {
    pub fn new(router: Arc<CapabilityRouter>, config: RegistryConfig) -> Self {
        Self {
            router,
            config,
            cache: RwLock::new(None),
        }
    }

    pub fn with_defaults(router: Arc<CapabilityRouter>) -> Self {
        Self::new(router, RegistryConfig::default())
    }

    /// Return the device inventory.
    ///
    /// `refresh(false)` inside the TTL window returns the cached inventory
    /// without touching hardware. `refresh(true)` always re-enumerates. The
    /// cache is replaced wholesale, never patched.
    pub async fn refresh(&self, force: bool) -> RecorderResult<DeviceInventory> {
        if !force {
            let cache = self.cache.read();
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.config.cache_ttl {
                    return Ok(cached.inventory.clone());
                }
            }
        }

        let selected = self.router.select_backend().await?;
        let screens = selected.adapter.get_available_screens().await?;
        let audio = selected.adapter.get_available_audio_devices().await?;

        let inventory = DeviceInventory { screens, audio };
        tracing::debug!(
            screens = inventory.screens.len(),
            audio = inventory.audio.len(),
            "device inventory refreshed"
        );

        *self.cache.write() = Some(CachedInventory {
            inventory: inventory.clone(),
            fetched_at: Instant::now(),
        });

        Ok(inventory)
    }

    /// Validate a screen/audio selection against the current inventory.
    ///
    /// Returns itemized issues rather than a bare boolean so the caller can
    /// build remediation hints. The audio id is only checked when it names a
    /// concrete device (the `"default"` sentinel always passes).
    pub async fn validate(
        &self,
        screen_id: &str,
        audio_input_id: &str,
    ) -> RecorderResult<ValidationReport> {
        let inventory = self.refresh(false).await?;
        let mut issues = Vec::new();

        if inventory.screens.is_empty() {
            issues.push(ValidationIssue::NoScreensAvailable);
        } else if !inventory.screens.iter().any(|s| s.id == screen_id) {
            issues.push(ValidationIssue::UnknownScreen {
                id: screen_id.to_string(),
            });
        }

        if audio_input_id != RecordingOptions::DEFAULT_AUDIO_INPUT {
            let inputs: Vec<&DeviceRecord> = inventory
                .audio
                .iter()
                .filter(|d| d.kind == DeviceKind::AudioInput)
                .collect();
            if inputs.is_empty() {
                issues.push(ValidationIssue::NoAudioDevicesAvailable);
            } else if !inputs.iter().any(|d| d.id == audio_input_id) {
                issues.push(ValidationIssue::UnknownAudioDevice {
                    id: audio_input_id.to_string(),
                });
            }
        }

        Ok(ValidationReport {
            valid: issues.is_empty(),
            issues,
        })
    }

    /// Spawn the periodic background refresh.
    ///
    /// The returned handle aborts the task when dropped.
    pub fn spawn_background_refresh(self: &Arc<Self>) -> RegistryRefreshHandle {
        let registry = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(registry.config.background_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so the task
            // only re-enumerates after a full interval.
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(error) = registry.refresh(true).await {
                    tracing::warn!(%error, "background device refresh failed");
                }
            }
        });
        RegistryRefreshHandle { handle }
    }
}

/// Owns the background refresh task; aborts it on drop.
pub struct RegistryRefreshHandle {
    handle: JoinHandle<()>,
}

impl Drop for RegistryRefreshHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
