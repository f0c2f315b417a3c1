//! Scripted in-memory capture backend
//!
//! Stands in for a real platform backend in tests: probe outcomes, device
//! inventories, permission results, and failure modes are all scripted, and
//! "capture" writes a small placeholder file so output verification has
//! something real to check.

use super::traits::{
    BackendEvent, CaptureBackend, CaptureConfig, CaptureStart, CaptureStop, PermissionStatus,
};
use crate::devices::DeviceRecord;
use crate::error::{RecorderError, RecorderResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Scripted probe behavior.
#[derive(Debug, Clone, Copy)]
pub enum ProbeScript {
    /// Probe resolves usable.
    Pass,

    /// Probe resolves, but reports the backend unusable.
    Unusable,

    /// Probe errors with the given reason.
    Fail(&'static str),

    /// First probe errors, subsequent probes pass.
    FailThenPass(&'static str),

    /// Probe never resolves within any sane timeout.
    Hang,
}

/// Where the mock reports its output file on stop.
#[derive(Debug, Clone)]
pub enum StopPathMode {
    /// Report the path the engine asked for (no relocation needed).
    Requested,

    /// Write to a different directory and report that path, forcing the
    /// output manager to relocate the file.
    Redirect(PathBuf),

    /// Report the requested path but never write it.
    Missing,
}

#[derive(Default)]
struct MockState {
    recording: bool,
    paused: bool,
    config: Option<CaptureConfig>,
    started_at: Option<Instant>,
    actual_path: Option<PathBuf>,
}

/// Scripted mock implementation of [`CaptureBackend`].
pub struct MockBackend {
    probe_script: ProbeScript,
    permissions: PermissionStatus,
    stop_path_mode: StopPathMode,
    auto_confirm: bool,
    fail_start: Option<&'static str>,
    fail_stop: Option<&'static str>,
    screens: Vec<DeviceRecord>,
    audio_devices: Vec<DeviceRecord>,

    probe_calls: AtomicU64,
    screen_enumerations: AtomicU64,
    audio_enumerations: AtomicU64,
    cleanup_calls: AtomicU64,

    state: Mutex<MockState>,
    event_tx: broadcast::Sender<BackendEvent>,
}

impl MockBackend {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(32);
        Self {
            probe_script: ProbeScript::Pass,
            permissions: PermissionStatus::Granted,
            stop_path_mode: StopPathMode::Requested,
            auto_confirm: true,
            fail_start: None,
            fail_stop: None,
            screens: vec![DeviceRecord::screen("screen-1", "Main Display")],
            audio_devices: vec![DeviceRecord::audio_input("mic-1", "Built-in Microphone")],
            probe_calls: AtomicU64::new(0),
            screen_enumerations: AtomicU64::new(0),
            audio_enumerations: AtomicU64::new(0),
            cleanup_calls: AtomicU64::new(0),
            state: Mutex::new(MockState::default()),
            event_tx,
        }
    }

    pub fn with_probe(mut self, script: ProbeScript) -> Self {
        self.probe_script = script;
        self
    }

    pub fn with_permissions(mut self, permissions: PermissionStatus) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_screens(mut self, screens: Vec<DeviceRecord>) -> Self {
        self.screens = screens;
        self
    }

    pub fn with_audio_devices(mut self, audio_devices: Vec<DeviceRecord>) -> Self {
        self.audio_devices = audio_devices;
        self
    }

    pub fn with_stop_path_mode(mut self, mode: StopPathMode) -> Self {
        self.stop_path_mode = mode;
        self
    }

    /// Never emit `CaptureConfirmed`, leaving the session unvalidated.
    pub fn without_confirmation(mut self) -> Self {
        self.auto_confirm = false;
        self
    }

    pub fn failing_start(mut self, reason: &'static str) -> Self {
        self.fail_start = Some(reason);
        self
    }

    pub fn failing_stop(mut self, reason: &'static str) -> Self {
        self.fail_stop = Some(reason);
        self
    }

    pub fn probe_calls(&self) -> u64 {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn screen_enumerations(&self) -> u64 {
        self.screen_enumerations.load(Ordering::SeqCst)
    }

    pub fn audio_enumerations(&self) -> u64 {
        self.audio_enumerations.load(Ordering::SeqCst)
    }

    pub fn cleanup_calls(&self) -> u64 {
        self.cleanup_calls.load(Ordering::SeqCst)
    }

    pub fn is_recording(&self) -> bool {
        self.state.lock().recording
    }

    /// The capture configuration of the current or last session.
    pub fn last_config(&self) -> Option<CaptureConfig> {
        self.state.lock().config.clone()
    }

    /// Inject a backend event, e.g. a mid-session device loss.
    pub fn emit(&self, event: BackendEvent) {
        let _ = self.event_tx.send(event);
    }

    fn write_placeholder(path: &PathBuf) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, b"mock capture data")
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureBackend for MockBackend {
    async fn initialize(&self) -> RecorderResult<()> {
        Ok(())
    }

    async fn probe(&self) -> anyhow::Result<bool> {
        let call = self.probe_calls.fetch_add(1, Ordering::SeqCst);
        match self.probe_script {
            ProbeScript::Pass => Ok(true),
            ProbeScript::Unusable => Ok(false),
            ProbeScript::Fail(reason) => Err(anyhow::anyhow!("{}", reason)),
            ProbeScript::FailThenPass(reason) => {
                if call == 0 {
                    Err(anyhow::anyhow!("{}", reason))
                } else {
                    Ok(true)
                }
            }
            ProbeScript::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(true)
            }
        }
    }

    async fn check_permissions(&self) -> PermissionStatus {
        self.permissions.clone()
    }

    async fn start_recording(&self, config: CaptureConfig) -> RecorderResult<CaptureStart> {
        if let Some(reason) = self.fail_start {
            return Err(RecorderError::Start(reason.to_string()));
        }

        let actual_path = match &self.stop_path_mode {
            StopPathMode::Requested | StopPathMode::Missing => config.output_path.clone(),
            StopPathMode::Redirect(dir) => {
                let filename = config
                    .output_path
                    .file_name()
                    .map(|n| n.to_os_string())
                    .unwrap_or_else(|| "capture.mp4".into());
                dir.join(filename)
            }
        };

        if !matches!(self.stop_path_mode, StopPathMode::Missing) {
            Self::write_placeholder(&actual_path)?;
        }

        {
            let mut state = self.state.lock();
            state.recording = true;
            state.paused = false;
            state.started_at = Some(Instant::now());
            state.actual_path = Some(actual_path.clone());
            state.config = Some(config.clone());
        }

        if self.auto_confirm {
            let _ = self.event_tx.send(BackendEvent::CaptureConfirmed {
                recording_id: config.recording_id.clone(),
            });
        }

        Ok(CaptureStart {
            success: true,
            recording_id: config.recording_id,
            output_path: actual_path,
        })
    }

    async fn stop_recording(&self) -> RecorderResult<CaptureStop> {
        if let Some(reason) = self.fail_stop {
            return Err(RecorderError::Stop(reason.to_string()));
        }

        let (actual_path, started_at) = {
            let mut state = self.state.lock();
            if !state.recording {
                return Err(RecorderError::Stop("stream already stopped".to_string()));
            }
            state.recording = false;
            state.paused = false;
            (state.actual_path.take(), state.started_at.take())
        };

        let output_path = actual_path
            .ok_or_else(|| RecorderError::Stop("no output path recorded".to_string()))?;

        let duration_ms = started_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);

        Ok(CaptureStop {
            output_path,
            duration_ms,
        })
    }

    async fn pause_recording(&self) -> RecorderResult<()> {
        let mut state = self.state.lock();
        if !state.recording {
            return Err(RecorderError::Pause("not recording".to_string()));
        }
        state.paused = true;
        Ok(())
    }

    async fn resume_recording(&self) -> RecorderResult<()> {
        let mut state = self.state.lock();
        if !state.recording {
            return Err(RecorderError::Resume("not recording".to_string()));
        }
        state.paused = false;
        Ok(())
    }

    async fn get_available_screens(&self) -> RecorderResult<Vec<DeviceRecord>> {
        self.screen_enumerations.fetch_add(1, Ordering::SeqCst);
        Ok(self.screens.clone())
    }

    async fn get_available_audio_devices(&self) -> RecorderResult<Vec<DeviceRecord>> {
        self.audio_enumerations.fetch_add(1, Ordering::SeqCst);
        Ok(self.audio_devices.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.event_tx.subscribe()
    }

    async fn cleanup(&self) {
        self.cleanup_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        state.recording = false;
        state.paused = false;
        state.config = None;
        state.started_at = None;
        state.actual_path = None;
    }
}
