//! Capability router
//!
//! Probes backend candidates in priority order and selects the first usable
//! one. Probes run strictly sequentially so short-circuit selection holds
//! and no two backends initialize exclusive OS resources at once.

use super::traits::{
    BackendDescriptor, CaptureBackend, ProbeKind, DEFAULT_PROBE_TIMEOUT,
};
use crate::error::{ProbeFailure, RecorderError, RecorderResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// A backend candidate: descriptor plus the adapter implementing it.
pub struct RegisteredBackend {
    pub descriptor: BackendDescriptor,
    pub adapter: Arc<dyn CaptureBackend>,
}

/// The backend the router settled on.
#[derive(Clone)]
pub struct SelectedBackend {
    pub descriptor: BackendDescriptor,
    pub adapter: Arc<dyn CaptureBackend>,
}

impl std::fmt::Debug for SelectedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedBackend")
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// OS name candidates are filtered against. Defaults to the current OS.
    pub platform: String,

    /// Timeout applied to enumeration-style probes.
    pub probe_timeout: Duration,

    /// Backoff before the single retry of a failed enumeration probe.
    pub retry_backoff: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

/// Selects a capture backend by probing candidates in priority order.
///
/// The selection is cached for the router's lifetime; repeated calls return
/// the cached backend without re-probing, so hardware permission prompts
/// fire at most once per process. [`CapabilityRouter::force_reselect`]
/// discards the cache.
pub struct CapabilityRouter {
    candidates: Vec<RegisteredBackend>,
    config: RouterConfig,

    /// Cached selection. The async mutex is held across probing so two
    /// concurrent callers cannot both walk the candidate list.
    selection: Mutex<Option<SelectedBackend>>,
}

impl CapabilityRouter {
    /// Create a router over the given candidates, sorted by priority.
    pub fn new(mut candidates: Vec<RegisteredBackend>, config: RouterConfig) -> Self {
        candidates.sort_by_key(|c| c.descriptor.priority);
        Self {
            candidates,
            config,
            selection: Mutex::new(None),
        }
    }

    /// Create a router with the default configuration.
    pub fn with_defaults(candidates: Vec<RegisteredBackend>) -> Self {
        Self::new(candidates, RouterConfig::default())
    }

    /// Descriptors of all registered candidates, in probe order.
    pub fn candidate_descriptors(&self) -> Vec<BackendDescriptor> {
        self.candidates.iter().map(|c| c.descriptor.clone()).collect()
    }

    /// Return the selected backend, probing candidates on the first call.
    pub async fn select_backend(&self) -> RecorderResult<SelectedBackend> {
        let mut selection = self.selection.lock().await;
        if let Some(selected) = selection.as_ref() {
            return Ok(selected.clone());
        }

        let selected = self.probe_candidates().await?;
        *selection = Some(selected.clone());
        Ok(selected)
    }

    /// Discard the cached selection and probe the candidate list again.
    pub async fn force_reselect(&self) -> RecorderResult<SelectedBackend> {
        let mut selection = self.selection.lock().await;
        let selected = self.probe_candidates().await?;
        *selection = Some(selected.clone());
        Ok(selected)
    }

    /// The cached selection, if probing already ran.
    pub async fn current_selection(&self) -> Option<SelectedBackend> {
        self.selection.lock().await.clone()
    }

    async fn probe_candidates(&self) -> RecorderResult<SelectedBackend> {
        let mut failures: Vec<ProbeFailure> = Vec::new();

        for candidate in &self.candidates {
            let name = candidate.descriptor.name.clone();

            if !candidate.descriptor.applies_to(&self.config.platform) {
                tracing::debug!(backend = %name, platform = %self.config.platform, "skipping: wrong platform");
                continue;
            }

            tracing::info!(backend = %name, "probing capture backend");
            match self.run_probe(candidate).await {
                Ok(true) => {
                    tracing::info!(
                        backend = %name,
                        quality = ?candidate.descriptor.ratings.quality,
                        "selected capture backend"
                    );
                    return Ok(SelectedBackend {
                        descriptor: candidate.descriptor.clone(),
                        adapter: candidate.adapter.clone(),
                    });
                }
                Ok(false) => {
                    tracing::info!(backend = %name, "backend reported itself unusable");
                    failures.push(ProbeFailure {
                        name,
                        reason: "backend reported itself unusable".to_string(),
                    });
                }
                Err(reason) => {
                    tracing::warn!(backend = %name, %reason, "backend probe failed");
                    failures.push(ProbeFailure { name, reason });
                }
            }
        }

        Err(RecorderError::NoUsableBackend { failures })
    }

    /// Run one candidate's probe according to its probe kind.
    ///
    /// Enumeration probes get a bounded timeout and one retry with backoff;
    /// existence probes run unbounded and are never retried.
    async fn run_probe(&self, candidate: &RegisteredBackend) -> Result<bool, String> {
        match candidate.descriptor.probe_kind {
            ProbeKind::Existence => candidate
                .adapter
                .probe()
                .await
                .map_err(|e| e.to_string()),
            ProbeKind::Enumeration => {
                match self.probe_bounded(candidate).await {
                    Ok(usable) => Ok(usable),
                    Err(first_reason) => {
                        tracing::debug!(
                            backend = %candidate.descriptor.name,
                            reason = %first_reason,
                            "enumeration probe failed, retrying once"
                        );
                        tokio::time::sleep(self.config.retry_backoff).await;
                        self.probe_bounded(candidate)
                            .await
                            .map_err(|retry_reason| {
                                format!("{} (after retry: {})", first_reason, retry_reason)
                            })
                    }
                }
            }
        }
    }

    async fn probe_bounded(&self, candidate: &RegisteredBackend) -> Result<bool, String> {
        match tokio::time::timeout(self.config.probe_timeout, candidate.adapter.probe()).await {
            Ok(Ok(usable)) => Ok(usable),
            Ok(Err(error)) => Err(error.to_string()),
            Err(_) => Err(format!(
                "probe timed out after {:?}",
                self.config.probe_timeout
            )),
        }
    }
}
