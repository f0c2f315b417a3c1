//! Recorder service facade
//!
//! Wires the router, device registry, output manager, and engine together
//! and exposes the operations an application shell calls. Engine results
//! are mapped to plain response payloads so the shell never has to parse
//! error strings.

use crate::backend::{CapabilityRouter, PermissionStatus, RegisteredBackend, RouterConfig};
use crate::devices::registry::{DeviceRegistry, RegistryConfig, RegistryRefreshHandle};
use crate::devices::DeviceRecord;
use crate::error::{ErrorResponse, RecorderResult};
use crate::output::{OutputManager, RetentionPolicy, SweepReport};
use crate::recorder::engine::{EngineConfig, RecorderEvent, RecordingEngine};
use crate::recorder::state::{RecorderStatus, RecordingOptions};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Service-wide configuration.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub router: RouterConfig,
    pub registry: RegistryConfig,
    pub engine: EngineConfig,
    pub retention: RetentionPolicy,

    /// Scratch directory override. OS temp space when unset.
    pub scratch_dir: Option<PathBuf>,
}

/// Response to a start request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

/// Response to a stop request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResponse {
    pub success: bool,
    pub was_already_stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

/// Response to a pause/resume request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

/// Response to a completion check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    pub exists: bool,
    pub size_bytes: u64,
}

/// The recording core behind one facade.
pub struct RecorderService {
    router: Arc<CapabilityRouter>,
    registry: Arc<DeviceRegistry>,
    output: Arc<OutputManager>,
    engine: Arc<RecordingEngine>,
    retention: RetentionPolicy,
    refresh_handle: Mutex<Option<RegistryRefreshHandle>>,
}

impl RecorderService {
    /// Build the service over the given backend candidates.
    ///
    /// Adopts and sweeps scratch leftovers from previous runs so stale temp
    /// recordings don't accumulate.
    pub fn new(candidates: Vec<RegisteredBackend>, config: ServiceConfig) -> RecorderResult<Self> {
        let router = Arc::new(CapabilityRouter::new(candidates, config.router));
        let registry = Arc::new(DeviceRegistry::new(
            Arc::clone(&router),
            config.registry,
        ));
        let output = Arc::new(match config.scratch_dir {
            Some(dir) => OutputManager::new(dir)?,
            None => OutputManager::with_default_scratch()?,
        });

        let adopted = output.adopt_scratch_files()?;
        if adopted > 0 {
            tracing::info!(adopted, "adopted scratch files from a previous run");
        }
        let startup_sweep = output.sweep(&config.retention);
        if startup_sweep.deleted > 0 {
            tracing::info!(
                deleted = startup_sweep.deleted,
                freed_bytes = startup_sweep.freed_bytes,
                "startup retention sweep"
            );
        }

        let engine = Arc::new(RecordingEngine::new(
            Arc::clone(&router),
            Arc::clone(&registry),
            Arc::clone(&output),
            config.engine,
        ));

        Ok(Self {
            router,
            registry,
            output,
            engine,
            retention: config.retention,
            refresh_handle: Mutex::new(None),
        })
    }

    /// Start the periodic device refresh task.
    pub fn start_background_refresh(&self) {
        let mut handle = self.refresh_handle.lock();
        if handle.is_none() {
            *handle = Some(self.registry.spawn_background_refresh());
        }
    }

    /// Subscribe to recording events.
    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.engine.subscribe()
    }

    pub async fn start_recording(&self, options: RecordingOptions) -> StartResponse {
        match self.engine.start(options).await {
            Ok(started) => StartResponse {
                success: true,
                recording_id: Some(started.recording_id),
                output_path: Some(started.output_path),
                backend: Some(started.backend),
                error: None,
            },
            Err(error) => StartResponse {
                success: false,
                recording_id: None,
                output_path: None,
                backend: None,
                error: Some(ErrorResponse::from(&error)),
            },
        }
    }

    pub async fn stop_recording(&self) -> StopResponse {
        match self.engine.stop().await {
            Ok(stopped) => StopResponse {
                success: true,
                was_already_stopped: stopped.was_already_stopped,
                output_path: stopped.output_path,
                duration_ms: stopped.duration_ms,
                degraded: stopped.degraded,
                error: None,
            },
            Err(error) => StopResponse {
                success: false,
                was_already_stopped: false,
                output_path: None,
                duration_ms: None,
                degraded: false,
                error: Some(ErrorResponse::from(&error)),
            },
        }
    }

    pub async fn pause_recording(&self) -> ControlResponse {
        match self.engine.pause().await {
            Ok(()) => ControlResponse {
                success: true,
                error: None,
            },
            Err(error) => ControlResponse {
                success: false,
                error: Some(ErrorResponse::from(&error)),
            },
        }
    }

    pub async fn resume_recording(&self) -> ControlResponse {
        match self.engine.resume().await {
            Ok(()) => ControlResponse {
                success: true,
                error: None,
            },
            Err(error) => ControlResponse {
                success: false,
                error: Some(ErrorResponse::from(&error)),
            },
        }
    }

    pub fn get_status(&self) -> RecorderStatus {
        self.engine.status()
    }

    /// Capturable screens, from cache unless a refresh is forced.
    pub async fn get_available_screens(&self, refresh: bool) -> RecorderResult<Vec<DeviceRecord>> {
        Ok(self.registry.refresh(refresh).await?.screens)
    }

    /// Audio devices, from cache when fresh.
    pub async fn get_available_audio_devices(&self) -> RecorderResult<Vec<DeviceRecord>> {
        Ok(self.registry.refresh(false).await?.audio)
    }

    /// Check that a finished recording really exists with content.
    pub fn confirm_recording_complete(&self, path: &Path) -> ConfirmResponse {
        match self.output.confirm_complete(path) {
            Ok(size_bytes) => ConfirmResponse {
                exists: true,
                size_bytes,
            },
            Err(_) => ConfirmResponse {
                exists: false,
                size_bytes: 0,
            },
        }
    }

    /// Check OS capture permissions on the selected backend.
    pub async fn check_permissions(&self) -> RecorderResult<PermissionStatus> {
        let selected = self.router.select_backend().await?;
        Ok(selected.adapter.check_permissions().await)
    }

    /// Run a retention sweep with the configured policy.
    pub fn sweep(&self) -> SweepReport {
        self.output.sweep(&self.retention)
    }

    /// Stop background work and release the current session, if any.
    pub async fn shutdown(&self) {
        *self.refresh_handle.lock() = None;
        self.engine.cleanup().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::backend::traits::{BackendDescriptor, CapabilityFlags, ProbeKind};
    use tempfile::tempdir;

    fn service_over(backend: Arc<MockBackend>, scratch: PathBuf) -> RecorderService {
        let descriptor = BackendDescriptor::new(
            "mock",
            vec![],
            0,
            vec![],
            CapabilityFlags {
                system_audio: true,
                microphone: true,
                merger: true,
            },
            ProbeKind::Existence,
        );
        RecorderService::new(
            vec![RegisteredBackend {
                descriptor,
                adapter: backend,
            }],
            ServiceConfig {
                router: RouterConfig {
                    platform: "testos".to_string(),
                    ..RouterConfig::default()
                },
                scratch_dir: Some(scratch),
                ..ServiceConfig::default()
            },
        )
        .unwrap()
    }

    fn options_in(dir: &Path) -> RecordingOptions {
        RecordingOptions {
            screen_id: "screen-1".to_string(),
            recording_directory: Some(dir.to_path_buf()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_start_while_recording_returns_structured_failure() {
        let dir = tempdir().unwrap();
        let service = service_over(Arc::new(MockBackend::new()), dir.path().join("scratch"));

        let first = service.start_recording(options_in(dir.path())).await;
        assert!(first.success);

        let second = service.start_recording(options_in(dir.path())).await;
        assert!(!second.success);
        assert_eq!(second.error.unwrap().message, "Already recording");
    }

    #[tokio::test]
    async fn test_stop_while_idle_succeeds_as_already_stopped() {
        let dir = tempdir().unwrap();
        let service = service_over(Arc::new(MockBackend::new()), dir.path().join("scratch"));

        let response = service.stop_recording().await;

        assert!(response.success);
        assert!(response.was_already_stopped);
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_device_listings_come_from_the_registry_cache() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(MockBackend::new());
        let service = service_over(backend.clone(), dir.path().join("scratch"));

        let screens = service.get_available_screens(false).await.unwrap();
        let audio = service.get_available_audio_devices().await.unwrap();
        assert_eq!(screens.len(), 1);
        assert_eq!(audio.len(), 1);
        assert_eq!(backend.screen_enumerations(), 1);

        service.get_available_screens(true).await.unwrap();
        assert_eq!(backend.screen_enumerations(), 2);
    }

    #[tokio::test]
    async fn test_confirm_recording_complete_checks_the_file() {
        let dir = tempdir().unwrap();
        let service = service_over(Arc::new(MockBackend::new()), dir.path().join("scratch"));

        let missing = service.confirm_recording_complete(&dir.path().join("nope.mp4"));
        assert!(!missing.exists);

        let path = dir.path().join("real.mp4");
        std::fs::write(&path, b"recording").unwrap();
        let real = service.confirm_recording_complete(&path);
        assert!(real.exists);
        assert_eq!(real.size_bytes, 9);
    }

    #[tokio::test]
    async fn test_full_lifecycle_through_the_facade() {
        let dir = tempdir().unwrap();
        let service = service_over(Arc::new(MockBackend::new()), dir.path().join("scratch"));

        let started = service.start_recording(options_in(dir.path())).await;
        assert!(started.success);
        // Let the watcher process the backend's confirmation.
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        let paused = service.pause_recording().await;
        assert!(paused.success);
        let resumed = service.resume_recording().await;
        assert!(resumed.success);

        let stopped = service.stop_recording().await;
        assert!(stopped.success);
        assert!(!stopped.was_already_stopped);

        let confirm = service.confirm_recording_complete(&stopped.output_path.unwrap());
        assert!(confirm.exists);
        assert!(confirm.size_bytes > 0);

        service.shutdown().await;
    }
}
