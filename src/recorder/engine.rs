//! Recording session engine
//!
//! Owns the session state machine and drives the selected capture backend
//! through start/stop/pause/resume. Device and audio-strategy inputs are
//! gathered at start time; file verification gates the completed state.

use super::state::{
    RecorderStatus, RecordingOptions, RecordingSession, RecordingState, StartedRecording,
    StoppedRecording,
};
use crate::backend::traits::{BackendEvent, CaptureBackend, CaptureConfig, PermissionStatus};
use crate::backend::{CapabilityRouter, SelectedBackend};
use crate::devices::registry::DeviceRegistry;
use crate::devices::strategy::AudioStrategyResolver;
use crate::error::{ErrorResponse, RecorderError, RecorderResult};
use crate::output::OutputManager;
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

/// Events emitted during a recording session.
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    /// A session was created and the backend accepted the start.
    Started {
        recording_id: Uuid,
        backend: String,
        output_path: PathBuf,
    },
    /// The backend confirmed capture is live; pause/resume are now allowed.
    Validated { recording_id: Uuid },
    /// Periodic duration update, at most one per second.
    Progress {
        recording_id: Uuid,
        duration_ms: u64,
    },
    Paused { recording_id: Uuid },
    Resumed { recording_id: Uuid },
    /// The output file was verified and the session is done.
    Completed {
        recording_id: Uuid,
        output_path: PathBuf,
        duration_ms: u64,
    },
    /// The session failed and the engine reset to idle.
    Error { response: ErrorResponse },
}

/// Engine timing configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often the duration is recomputed.
    pub tick_interval: Duration,

    /// Minimum wall time between progress events.
    pub progress_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(250),
            progress_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Default)]
struct SessionTasks {
    ticker: Option<JoinHandle<()>>,
    watcher: Option<JoinHandle<()>>,
}

/// Drives one recording session at a time through the selected backend.
///
/// All mutation happens on the cooperative scheduler; the start guard is
/// checked synchronously before any asynchronous work, so two rapid
/// concurrent starts cannot both proceed.
pub struct RecordingEngine {
    router: Arc<CapabilityRouter>,
    registry: Arc<DeviceRegistry>,
    resolver: AudioStrategyResolver,
    output: Arc<OutputManager>,
    config: EngineConfig,

    state: Arc<RwLock<RecordingState>>,
    session: Arc<RwLock<Option<RecordingSession>>>,
    active_backend: RwLock<Option<SelectedBackend>>,
    event_tx: broadcast::Sender<RecorderEvent>,
    tasks: Mutex<SessionTasks>,
}

impl RecordingEngine {
    pub fn new(
        router: Arc<CapabilityRouter>,
        registry: Arc<DeviceRegistry>,
        output: Arc<OutputManager>,
        config: EngineConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            router,
            registry,
            resolver: AudioStrategyResolver::new(),
            output,
            config,
            state: Arc::new(RwLock::new(RecordingState::Idle)),
            session: Arc::new(RwLock::new(None)),
            active_backend: RwLock::new(None),
            event_tx,
            tasks: Mutex::new(SessionTasks::default()),
        }
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.event_tx.subscribe()
    }

    /// Current state.
    pub fn state(&self) -> RecordingState {
        *self.state.read()
    }

    /// Point-in-time status snapshot.
    pub fn status(&self) -> RecorderStatus {
        let state = *self.state.read();
        let session = self.session.read();
        match session.as_ref() {
            None => RecorderStatus {
                state,
                ..RecorderStatus::idle()
            },
            Some(session) => RecorderStatus {
                state,
                recording_id: Some(session.id),
                duration_ms: if state == RecordingState::Recording {
                    session.elapsed_ms(Instant::now())
                } else {
                    session.duration_ms
                },
                validated: session.validated,
                backend: Some(session.backend.name.clone()),
                output_path: session
                    .actual_output_path
                    .clone()
                    .or_else(|| Some(session.expected_output_path.clone())),
                last_error: session.last_error.clone(),
            },
        }
    }

    /// Start a recording session.
    pub async fn start(&self, options: RecordingOptions) -> RecorderResult<StartedRecording> {
        // The guard runs synchronously, before the first await: a second
        // start issued in the same scheduler turn sees the state change.
        {
            let mut state = self.state.write();
            if *state != RecordingState::Idle {
                return Err(RecorderError::AlreadyRecording);
            }
            *state = RecordingState::Starting;
        }

        let selected = match self.router.select_backend().await {
            Ok(selected) => selected,
            Err(error) => return self.abort_start(error),
        };

        if let Err(error) = selected.adapter.initialize().await {
            return self.abort_start(error);
        }

        if let PermissionStatus::Denied {
            message,
            suggestion,
        } = selected.adapter.check_permissions().await
        {
            return self.abort_start(RecorderError::Permission {
                message,
                suggestion,
            });
        }

        let inventory = match self.registry.refresh(false).await {
            Ok(inventory) => inventory,
            Err(error) => return self.abort_start(error),
        };

        let report = match self
            .registry
            .validate(&options.screen_id, &options.audio_input_id)
            .await
        {
            Ok(report) => report,
            Err(error) => return self.abort_start(error),
        };
        if !report.valid {
            return self.abort_start(RecorderError::Validation {
                issues: report.issues,
            });
        }

        let decision = self.resolver.resolve(&options, &inventory.audio);
        tracing::info!(
            mode = ?decision.mode,
            rationale = ?decision.rationale,
            virtual_drivers = decision.detected_virtual_drivers.len(),
            "audio strategy resolved"
        );

        let expected_path = match self.output.generate_path(&options) {
            Ok(path) => path,
            Err(error) => return self.abort_start(error),
        };

        let recording_id = Uuid::new_v4();
        self.output
            .register_active(recording_id.to_string(), &expected_path);

        let capture_config = CaptureConfig {
            recording_id: recording_id.to_string(),
            screen_id: options.screen_id.clone(),
            output_path: expected_path.clone(),
            include_microphone: options.include_microphone,
            microphone_device_id: decision.microphone_device_id.clone(),
            audio_mode: decision.mode,
            system_audio_device_id: decision.system_audio_device_id.clone(),
            video_quality: options.video_quality,
            audio_quality: options.audio_quality,
        };

        // Subscribe before starting so a confirmation emitted during start
        // is buffered rather than lost.
        let backend_rx = selected.adapter.subscribe();

        tracing::info!(
            backend = %selected.descriptor.name,
            output = %expected_path.display(),
            "starting recording"
        );

        let start = match selected.adapter.start_recording(capture_config).await {
            Ok(start) if start.success => start,
            Ok(_) => {
                let error = RecorderError::Start("backend reported an unsuccessful start".to_string());
                return Err(self.fail_start(recording_id, &selected, error).await);
            }
            Err(error) => {
                let error = match error {
                    error @ (RecorderError::Start(_) | RecorderError::Permission { .. }) => error,
                    other => RecorderError::Start(other.to_string()),
                };
                return Err(self.fail_start(recording_id, &selected, error).await);
            }
        };

        let session = RecordingSession::new(
            recording_id,
            expected_path.clone(),
            options,
            selected.descriptor.clone(),
        );
        *self.session.write() = Some(session);
        *self.active_backend.write() = Some(selected.clone());
        *self.state.write() = RecordingState::Recording;

        self.spawn_ticker();
        self.spawn_watcher(backend_rx, selected.adapter.clone());

        let _ = self.event_tx.send(RecorderEvent::Started {
            recording_id,
            backend: selected.descriptor.name.clone(),
            output_path: expected_path.clone(),
        });
        tracing::info!(%recording_id, backend_path = %start.output_path.display(), "recording started");

        Ok(StartedRecording {
            recording_id,
            backend: selected.descriptor.name.clone(),
            output_path: expected_path,
        })
    }

    /// Stop the active recording session.
    ///
    /// Always accepted while recording or paused; stopping with no session
    /// reports `was_already_stopped` instead of failing.
    pub async fn stop(&self) -> RecorderResult<StoppedRecording> {
        {
            let mut state = self.state.write();
            match *state {
                RecordingState::Idle | RecordingState::Completed | RecordingState::Error => {
                    return Ok(StoppedRecording::already_stopped());
                }
                RecordingState::Recording | RecordingState::Paused => {
                    *state = RecordingState::Stopping;
                }
                RecordingState::Starting => {
                    return Err(RecorderError::Stop("a start is still in progress".to_string()));
                }
                RecordingState::Stopping => {
                    return Err(RecorderError::Stop("a stop is already in progress".to_string()));
                }
            }
        }

        // The duration timer stops now; relocation below may take longer.
        self.abort_ticker();

        let now = Instant::now();
        let (recording_id, expected_path, duration_ms) = {
            let mut guard = self.session.write();
            match guard.as_mut() {
                Some(session) => {
                    session.mark_resumed(now);
                    session.duration_ms = session.elapsed_ms(now);
                    (
                        session.id,
                        session.expected_output_path.clone(),
                        session.duration_ms,
                    )
                }
                None => {
                    *self.state.write() = RecordingState::Idle;
                    return Ok(StoppedRecording::already_stopped());
                }
            }
        };

        let adapter = self
            .active_backend
            .read()
            .as_ref()
            .map(|selected| selected.adapter.clone());
        let Some(adapter) = adapter else {
            self.cleanup().await;
            return Err(RecorderError::ServiceUnavailable);
        };

        tracing::info!(%recording_id, duration_ms, "stopping recording");

        let capture_stop = match adapter.stop_recording().await {
            Ok(capture_stop) => capture_stop,
            Err(error) => {
                let error = match error {
                    error @ RecorderError::Stop(_) => error,
                    other => RecorderError::Stop(other.to_string()),
                };
                return Err(self.fail_stopping(&adapter, error).await);
            }
        };

        let finalize = self.output.finalize(
            &capture_stop.output_path,
            &expected_path,
            &recording_id.to_string(),
        );

        match self.output.confirm_complete(&finalize.final_path) {
            Ok(size_bytes) => {
                self.output
                    .mark_completed(&recording_id.to_string(), &finalize.final_path, size_bytes);
                if let Some(session) = self.session.write().as_mut() {
                    session.actual_output_path = Some(finalize.final_path.clone());
                }
                *self.state.write() = RecordingState::Completed;
                let _ = self.event_tx.send(RecorderEvent::Completed {
                    recording_id,
                    output_path: finalize.final_path.clone(),
                    duration_ms,
                });
                tracing::info!(
                    %recording_id,
                    output = %finalize.final_path.display(),
                    size_bytes,
                    duration_ms,
                    degraded = finalize.degraded,
                    "recording completed"
                );

                self.cleanup().await;

                Ok(StoppedRecording {
                    was_already_stopped: false,
                    output_path: Some(finalize.final_path),
                    duration_ms: Some(duration_ms),
                    degraded: finalize.degraded,
                })
            }
            Err(file_error) => Err(self.fail_stopping(&adapter, file_error).await),
        }
    }

    /// Pause the active recording. Only allowed once the backend has
    /// confirmed live capture.
    pub async fn pause(&self) -> RecorderResult<()> {
        {
            let state = *self.state.read();
            if state != RecordingState::Recording {
                return Err(RecorderError::Pause(format!(
                    "no active recording to pause (state: {:?})",
                    state
                )));
            }
            let validated = self
                .session
                .read()
                .as_ref()
                .map(|s| s.validated)
                .unwrap_or(false);
            if !validated {
                return Err(RecorderError::Pause(
                    "capture has not been validated yet".to_string(),
                ));
            }
        }

        let adapter = self
            .active_backend
            .read()
            .as_ref()
            .map(|selected| selected.adapter.clone())
            .ok_or(RecorderError::ServiceUnavailable)?;

        adapter
            .pause_recording()
            .await
            .map_err(|error| RecorderError::Pause(error.to_string()))?;

        let now = Instant::now();
        let recording_id = {
            let mut guard = self.session.write();
            let Some(session) = guard.as_mut() else {
                return Err(RecorderError::Pause("session vanished".to_string()));
            };
            session.duration_ms = session.elapsed_ms(now);
            session.mark_paused(now);
            session.id
        };
        *self.state.write() = RecordingState::Paused;
        let _ = self.event_tx.send(RecorderEvent::Paused { recording_id });
        tracing::info!(%recording_id, "recording paused");
        Ok(())
    }

    /// Resume a paused recording.
    pub async fn resume(&self) -> RecorderResult<()> {
        {
            let state = *self.state.read();
            if state != RecordingState::Paused {
                return Err(RecorderError::Resume(format!(
                    "no paused recording to resume (state: {:?})",
                    state
                )));
            }
        }

        let adapter = self
            .active_backend
            .read()
            .as_ref()
            .map(|selected| selected.adapter.clone())
            .ok_or(RecorderError::ServiceUnavailable)?;

        adapter
            .resume_recording()
            .await
            .map_err(|error| RecorderError::Resume(error.to_string()))?;

        let now = Instant::now();
        let recording_id = {
            let mut guard = self.session.write();
            let Some(session) = guard.as_mut() else {
                return Err(RecorderError::Resume("session vanished".to_string()));
            };
            session.mark_resumed(now);
            session.id
        };
        *self.state.write() = RecordingState::Recording;
        let _ = self.event_tx.send(RecorderEvent::Resumed { recording_id });
        tracing::info!(%recording_id, "recording resumed");
        Ok(())
    }

    /// Tear down the current session and reset to idle.
    ///
    /// Callable from any state, idempotent, and never fails: backend
    /// cleanup errors (including "stream already stopped" races) are
    /// swallowed.
    pub async fn cleanup(&self) {
        let (ticker, watcher) = {
            let mut tasks = self.tasks.lock();
            (tasks.ticker.take(), tasks.watcher.take())
        };
        if let Some(handle) = ticker {
            handle.abort();
        }
        if let Some(handle) = watcher {
            handle.abort();
        }

        let adapter = self
            .active_backend
            .write()
            .take()
            .map(|selected| selected.adapter);
        if let Some(adapter) = adapter {
            adapter.cleanup().await;
        }

        let leftover = self.session.write().take();
        if let Some(session) = leftover {
            // A session torn down before verification leaves no usable file.
            if session.actual_output_path.is_none() {
                self.output.mark_aborted(&session.id.to_string());
            }
        }

        *self.state.write() = RecordingState::Idle;
    }

    /// Reset a failed start that never created a session.
    fn abort_start<T>(&self, error: RecorderError) -> RecorderResult<T> {
        *self.state.write() = RecordingState::Idle;
        tracing::warn!(%error, "start rejected");
        Err(error)
    }

    /// Failure path for a start the backend rejected: through the error
    /// state, emit the error event, clean up, and settle on idle.
    async fn fail_start(
        &self,
        recording_id: Uuid,
        selected: &SelectedBackend,
        error: RecorderError,
    ) -> RecorderError {
        let response = ErrorResponse::from(&error);
        tracing::error!(error = %response.message, "backend failed to start");

        *self.state.write() = RecordingState::Error;
        let _ = self.event_tx.send(RecorderEvent::Error {
            response: response.clone(),
        });

        self.output.mark_aborted(&recording_id.to_string());
        selected.adapter.cleanup().await;
        *self.state.write() = RecordingState::Idle;

        error
    }

    /// Failure path for a stop that could not produce a verified file.
    async fn fail_stopping(
        &self,
        adapter: &Arc<dyn CaptureBackend>,
        error: RecorderError,
    ) -> RecorderError {
        Self::fail_active_session(
            &self.state,
            &self.session,
            &self.output,
            adapter,
            &self.event_tx,
            error,
        )
        .await
    }

    /// Shared failure path: record the error on the session, transition
    /// through the error state, emit the error event, and reset to idle.
    /// Tolerates backend stop/cleanup races without re-throwing.
    async fn fail_active_session(
        state: &RwLock<RecordingState>,
        session: &RwLock<Option<RecordingSession>>,
        output: &OutputManager,
        adapter: &Arc<dyn CaptureBackend>,
        event_tx: &broadcast::Sender<RecorderEvent>,
        error: RecorderError,
    ) -> RecorderError {
        let response = ErrorResponse::from(&error);

        let recording_id = {
            let mut guard = session.write();
            guard.as_mut().map(|s| {
                s.last_error = Some(response.clone());
                s.id
            })
        };
        let Some(recording_id) = recording_id else {
            // Nothing active; the error still propagates to the caller.
            return error;
        };

        tracing::error!(%recording_id, error = %response.message, "recording session failed");

        *state.write() = RecordingState::Error;
        let _ = event_tx.send(RecorderEvent::Error { response });

        output.mark_aborted(&recording_id.to_string());

        if let Err(stop_error) = adapter.stop_recording().await {
            // Typical for a crashed backend: the stream is already gone.
            tracing::debug!(%stop_error, "backend stop during failure cleanup");
        }
        adapter.cleanup().await;

        *session.write() = None;
        *state.write() = RecordingState::Idle;

        error
    }

    fn abort_ticker(&self) {
        if let Some(handle) = self.tasks.lock().ticker.take() {
            handle.abort();
        }
    }

    /// Arm the duration ticker. Duration is recomputed from the session
    /// start on every tick, so dropped ticks cannot cause drift; progress
    /// events are throttled to the configured interval.
    fn spawn_ticker(&self) {
        let state = Arc::clone(&self.state);
        let session = Arc::clone(&self.session);
        let event_tx = self.event_tx.clone();
        let tick = self.config.tick_interval;
        let progress_every = self.config.progress_interval;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            let mut last_progress: Option<Instant> = None;

            loop {
                interval.tick().await;
                let current = *state.read();
                match current {
                    RecordingState::Recording => {
                        let now = Instant::now();
                        let update = {
                            let mut guard = session.write();
                            match guard.as_mut() {
                                Some(session) => {
                                    session.duration_ms = session.elapsed_ms(now);
                                    (session.id, session.duration_ms)
                                }
                                None => break,
                            }
                        };
                        let due = last_progress
                            .map(|at| now.saturating_duration_since(at) >= progress_every)
                            .unwrap_or(true);
                        if due {
                            last_progress = Some(now);
                            let _ = event_tx.send(RecorderEvent::Progress {
                                recording_id: update.0,
                                duration_ms: update.1,
                            });
                        }
                    }
                    // Duration is frozen while paused; keep polling for the
                    // next transition.
                    RecordingState::Paused => {}
                    _ => break,
                }
            }
        });

        self.tasks.lock().ticker = Some(handle);
    }

    /// Watch the backend's event stream: confirmation flips the validation
    /// gate, device loss and crashes fail the session from any state.
    fn spawn_watcher(
        &self,
        mut rx: broadcast::Receiver<BackendEvent>,
        adapter: Arc<dyn CaptureBackend>,
    ) {
        let state = Arc::clone(&self.state);
        let session = Arc::clone(&self.session);
        let event_tx = self.event_tx.clone();
        let output = Arc::clone(&self.output);

        let handle = tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "backend event stream lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                match event {
                    BackendEvent::CaptureConfirmed { .. } => {
                        let confirmed = {
                            let mut guard = session.write();
                            match guard.as_mut() {
                                Some(session) if !session.validated => {
                                    session.validated = true;
                                    Some(session.id)
                                }
                                _ => None,
                            }
                        };
                        if let Some(recording_id) = confirmed {
                            tracing::info!(%recording_id, "backend confirmed live capture");
                            let _ = event_tx.send(RecorderEvent::Validated { recording_id });
                        }
                    }
                    BackendEvent::DeviceLost { device_id } => {
                        Self::fail_active_session(
                            &state,
                            &session,
                            &output,
                            &adapter,
                            &event_tx,
                            RecorderError::Device(format!(
                                "device vanished mid-session: {}",
                                device_id
                            )),
                        )
                        .await;
                        break;
                    }
                    BackendEvent::Fatal { message } => {
                        Self::fail_active_session(
                            &state,
                            &session,
                            &output,
                            &adapter,
                            &event_tx,
                            RecorderError::Device(message),
                        )
                        .await;
                        break;
                    }
                }
            }
        });

        self.tasks.lock().watcher = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockBackend, StopPathMode};
    use crate::backend::traits::{BackendDescriptor, CapabilityFlags, ProbeKind};
    use crate::backend::{RegisteredBackend, RouterConfig};
    use crate::devices::registry::RegistryConfig;
    use std::path::Path;
    use tempfile::tempdir;

    fn engine_over(backend: Arc<MockBackend>, scratch: &Path) -> RecordingEngine {
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
        let router = Arc::new(CapabilityRouter::new(
            vec![RegisteredBackend {
                descriptor,
                adapter: backend,
            }],
            RouterConfig {
                platform: "testos".to_string(),
                ..RouterConfig::default()
            },
        ));
        let registry = Arc::new(DeviceRegistry::new(
            Arc::clone(&router),
            RegistryConfig::default(),
        ));
        let output = Arc::new(OutputManager::new(scratch.join("scratch")).unwrap());
        RecordingEngine::new(router, registry, output, EngineConfig::default())
    }

    fn options_in(dir: &Path) -> RecordingOptions {
        RecordingOptions {
            screen_id: "screen-1".to_string(),
            recording_directory: Some(dir.to_path_buf()),
            ..Default::default()
        }
    }

    fn drain(rx: &mut broadcast::Receiver<RecorderEvent>) -> Vec<RecorderEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_five_second_recording_round_trip() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(MockBackend::new());
        let engine = engine_over(backend.clone(), dir.path());
        let mut rx = engine.subscribe();

        let started = engine.start(options_in(dir.path())).await.unwrap();
        assert_eq!(engine.state(), RecordingState::Recording);

        tokio::time::sleep(Duration::from_secs(5)).await;
        let stopped = engine.stop().await.unwrap();

        assert!(!stopped.was_already_stopped);
        let duration = stopped.duration_ms.unwrap();
        assert!(
            (4800..=5200).contains(&duration),
            "duration {} out of range",
            duration
        );

        let output_path = stopped.output_path.unwrap();
        assert_eq!(output_path, started.output_path);
        assert!(std::fs::metadata(&output_path).unwrap().len() > 0);
        assert_eq!(engine.state(), RecordingState::Idle);

        let events = drain(&mut rx);
        assert!(matches!(events.first(), Some(RecorderEvent::Started { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, RecorderEvent::Validated { .. })));
        assert!(matches!(
            events.last(),
            Some(RecorderEvent::Completed { .. })
        ));
    }

    #[tokio::test]
    async fn test_double_start_is_rejected_without_state_change() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(MockBackend::new());
        let engine = engine_over(backend, dir.path());

        engine.start(options_in(dir.path())).await.unwrap();
        let second = engine.start(options_in(dir.path())).await;

        match second {
            Err(RecorderError::AlreadyRecording) => {}
            other => panic!("expected AlreadyRecording, got {:?}", other.map(|_| ())),
        }
        assert_eq!(engine.state(), RecordingState::Recording);
    }

    #[tokio::test]
    async fn test_concurrent_starts_cannot_both_proceed() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(MockBackend::new());
        let engine = engine_over(backend, dir.path());

        let (first, second) = tokio::join!(
            engine.start(options_in(dir.path())),
            engine.start(options_in(dir.path()))
        );

        let successes = [first.is_ok(), second.is_ok()]
            .iter()
            .filter(|ok| **ok)
            .count();
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_stop_while_idle_reports_already_stopped() {
        let dir = tempdir().unwrap();
        let engine = engine_over(Arc::new(MockBackend::new()), dir.path());

        let stopped = engine.stop().await.unwrap();

        assert!(stopped.was_already_stopped);
        assert!(stopped.output_path.is_none());
        assert_eq!(engine.state(), RecordingState::Idle);
    }

    #[tokio::test]
    async fn test_pause_is_rejected_before_validation() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(MockBackend::new().without_confirmation());
        let engine = engine_over(backend, dir.path());

        engine.start(options_in(dir.path())).await.unwrap();
        tokio::task::yield_now().await;

        match engine.pause().await {
            Err(RecorderError::Pause(_)) => {}
            other => panic!("expected pause rejection, got {:?}", other),
        }
        // The rejection did not disturb the session.
        assert_eq!(engine.state(), RecordingState::Recording);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_resume_excludes_paused_time() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(MockBackend::new());
        let engine = engine_over(backend, dir.path());
        let mut rx = engine.subscribe();

        engine.start(options_in(dir.path())).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        engine.pause().await.unwrap();
        assert_eq!(engine.state(), RecordingState::Paused);
        tokio::time::sleep(Duration::from_secs(3)).await;

        engine.resume().await.unwrap();
        assert_eq!(engine.state(), RecordingState::Recording);
        tokio::time::sleep(Duration::from_secs(1)).await;

        let stopped = engine.stop().await.unwrap();
        assert_eq!(stopped.duration_ms.unwrap(), 3000);

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, RecorderEvent::Paused { .. })));
        assert!(events.iter().any(|e| matches!(e, RecorderEvent::Resumed { .. })));
    }

    #[tokio::test]
    async fn test_resume_without_pause_is_rejected() {
        let dir = tempdir().unwrap();
        let engine = engine_over(Arc::new(MockBackend::new()), dir.path());

        engine.start(options_in(dir.path())).await.unwrap();
        tokio::task::yield_now().await;

        assert!(matches!(
            engine.resume().await,
            Err(RecorderError::Resume(_))
        ));
    }

    #[tokio::test]
    async fn test_backend_start_failure_resets_to_idle() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(MockBackend::new().failing_start("encoder unavailable"));
        let engine = engine_over(backend.clone(), dir.path());
        let mut rx = engine.subscribe();

        let result = engine.start(options_in(dir.path())).await;

        assert!(matches!(result, Err(RecorderError::Start(_))));
        assert_eq!(engine.state(), RecordingState::Idle);
        assert!(backend.cleanup_calls() >= 1);

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, RecorderEvent::Error { .. })));
    }

    #[tokio::test]
    async fn test_unknown_screen_is_a_validation_error() {
        let dir = tempdir().unwrap();
        let engine = engine_over(Arc::new(MockBackend::new()), dir.path());

        let mut options = options_in(dir.path());
        options.screen_id = "ghost-screen".to_string();

        match engine.start(options).await {
            Err(RecorderError::Validation { issues }) => {
                assert_eq!(issues.len(), 1);
            }
            other => panic!("expected validation error, got {:?}", other.map(|_| ())),
        }
        assert_eq!(engine.state(), RecordingState::Idle);
    }

    #[tokio::test]
    async fn test_permission_denied_carries_suggestion_and_is_not_retried() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(MockBackend::new().with_permissions(PermissionStatus::Denied {
            message: "screen recording not granted".to_string(),
            suggestion: "Allow in System Preferences and try again".to_string(),
        }));
        let engine = engine_over(backend, dir.path());

        match engine.start(options_in(dir.path())).await {
            Err(error @ RecorderError::Permission { .. }) => {
                let response = ErrorResponse::from(&error);
                assert!(response.suggestion.unwrap().contains("System Preferences"));
            }
            other => panic!("expected permission error, got {:?}", other.map(|_| ())),
        }
        assert_eq!(engine.state(), RecordingState::Idle);
    }

    #[tokio::test]
    async fn test_missing_output_file_fails_with_file_error() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(MockBackend::new().with_stop_path_mode(StopPathMode::Missing));
        let engine = engine_over(backend, dir.path());
        let mut rx = engine.subscribe();

        engine.start(options_in(dir.path())).await.unwrap();
        tokio::task::yield_now().await;

        match engine.stop().await {
            Err(RecorderError::File(_)) => {}
            other => panic!("expected file error, got {:?}", other.map(|_| ())),
        }
        assert_eq!(engine.state(), RecordingState::Idle);

        let events = drain(&mut rx);
        let error = events.iter().find_map(|e| match e {
            RecorderEvent::Error { response } => Some(response.clone()),
            _ => None,
        });
        assert_eq!(error.unwrap().kind, "FILE_ERROR");
    }

    #[tokio::test]
    async fn test_temp_output_is_relocated_to_expected_path() {
        let dir = tempdir().unwrap();
        let temp_dir = dir.path().join("backend-temp");
        let backend = Arc::new(
            MockBackend::new().with_stop_path_mode(StopPathMode::Redirect(temp_dir.clone())),
        );
        let engine = engine_over(backend, dir.path());

        let started = engine.start(options_in(dir.path())).await.unwrap();
        tokio::task::yield_now().await;
        let stopped = engine.stop().await.unwrap();

        let output_path = stopped.output_path.unwrap();
        assert_eq!(output_path, started.output_path);
        assert!(!stopped.degraded);
        assert!(output_path.is_file());
        // The backend's temp copy was moved, not duplicated.
        assert!(std::fs::read_dir(&temp_dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true));
    }

    #[tokio::test]
    async fn test_fatal_backend_event_fails_session_from_any_state() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(MockBackend::new());
        let engine = engine_over(backend.clone(), dir.path());
        let mut rx = engine.subscribe();

        engine.start(options_in(dir.path())).await.unwrap();
        tokio::task::yield_now().await;

        backend.emit(crate::backend::BackendEvent::Fatal {
            message: "capture pipeline crashed".to_string(),
        });
        // Let the watcher process the event.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(engine.state(), RecordingState::Idle);
        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, RecorderEvent::Error { .. })));
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent_from_any_state() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(MockBackend::new());
        let engine = engine_over(backend.clone(), dir.path());

        // From idle, twice.
        engine.cleanup().await;
        engine.cleanup().await;
        assert_eq!(engine.state(), RecordingState::Idle);

        // From a live recording, twice.
        engine.start(options_in(dir.path())).await.unwrap();
        engine.cleanup().await;
        engine.cleanup().await;
        assert_eq!(engine.state(), RecordingState::Idle);
        assert!(engine.status().recording_id.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_events_are_throttled_to_one_per_second() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(MockBackend::new());
        let engine = engine_over(backend, dir.path());
        let mut rx = engine.subscribe();

        engine.start(options_in(dir.path())).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        engine.stop().await.unwrap();

        let progress_count = drain(&mut rx)
            .iter()
            .filter(|e| matches!(e, RecorderEvent::Progress { .. }))
            .count();
        assert!(
            (4..=6).contains(&progress_count),
            "expected ~5 progress events, got {}",
            progress_count
        );
    }

    #[tokio::test]
    async fn test_status_snapshot_reflects_session() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(MockBackend::new());
        let engine = engine_over(backend, dir.path());

        assert_eq!(engine.status().state, RecordingState::Idle);

        let started = engine.start(options_in(dir.path())).await.unwrap();
        tokio::task::yield_now().await;

        let status = engine.status();
        assert_eq!(status.state, RecordingState::Recording);
        assert_eq!(status.recording_id, Some(started.recording_id));
        assert_eq!(status.backend.as_deref(), Some("mock"));
        assert_eq!(status.output_path, Some(started.output_path));
    }
}
