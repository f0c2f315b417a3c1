//! End-to-end tests of the recording core against scripted backends.

use deskrec::backend::mock::{MockBackend, ProbeScript};
use deskrec::{
    AudioCaptureMode, BackendDescriptor, CapabilityFlags, DeviceRecord, ProbeKind, RecorderEvent,
    RecorderService, RecordingOptions, RecordingState, RegisteredBackend, RetentionPolicy,
    RouterConfig, ServiceConfig,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn descriptor(name: &str, priority: u8) -> BackendDescriptor {
    BackendDescriptor::new(
        name,
        vec![],
        priority,
        vec![],
        CapabilityFlags {
            system_audio: true,
            microphone: true,
            merger: true,
        },
        ProbeKind::Existence,
    )
}

fn service_config(scratch: &Path) -> ServiceConfig {
    ServiceConfig {
        router: RouterConfig {
            platform: "testos".to_string(),
            ..RouterConfig::default()
        },
        scratch_dir: Some(scratch.to_path_buf()),
        ..ServiceConfig::default()
    }
}

fn single_backend_service(backend: Arc<MockBackend>, scratch: &Path) -> RecorderService {
    RecorderService::new(
        vec![RegisteredBackend {
            descriptor: descriptor("mock", 0),
            adapter: backend,
        }],
        service_config(scratch),
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

#[tokio::test(start_paused = true)]
async fn five_second_recording_produces_a_verified_file() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(MockBackend::new());
    let service = single_backend_service(backend, &dir.path().join("scratch"));
    let mut events = service.subscribe();

    let started = service.start_recording(options_in(dir.path())).await;
    assert!(started.success, "start failed: {:?}", started.error);

    tokio::time::sleep(Duration::from_secs(5)).await;

    let stopped = service.stop_recording().await;
    assert!(stopped.success, "stop failed: {:?}", stopped.error);

    let duration = stopped.duration_ms.unwrap();
    assert!(
        duration >= 4800 && duration <= 5200,
        "expected ~5000ms, got {}",
        duration
    );

    let output_path = stopped.output_path.unwrap();
    let metadata = std::fs::metadata(&output_path).unwrap();
    assert!(metadata.len() > 0);

    // started -> validated -> progress... -> completed, in that order.
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(matches!(seen.first(), Some(RecorderEvent::Started { .. })));
    let validated_at = seen
        .iter()
        .position(|e| matches!(e, RecorderEvent::Validated { .. }))
        .unwrap();
    let completed_at = seen
        .iter()
        .position(|e| matches!(e, RecorderEvent::Completed { .. }))
        .unwrap();
    assert!(validated_at < completed_at);

    assert_eq!(service.get_status().state, RecordingState::Idle);
}

#[tokio::test]
async fn router_falls_back_to_the_next_usable_backend() {
    let dir = tempdir().unwrap();
    let broken = Arc::new(MockBackend::new().with_probe(ProbeScript::Fail("framework missing")));
    let working = Arc::new(MockBackend::new());

    let service = RecorderService::new(
        vec![
            RegisteredBackend {
                descriptor: descriptor("native", 0),
                adapter: broken,
            },
            RegisteredBackend {
                descriptor: descriptor("fallback", 1),
                adapter: working.clone(),
            },
        ],
        service_config(&dir.path().join("scratch")),
    )
    .unwrap();

    let started = service.start_recording(options_in(dir.path())).await;
    assert!(started.success);
    assert_eq!(started.backend.as_deref(), Some("fallback"));
    assert!(working.is_recording());

    service.stop_recording().await;
}

#[tokio::test]
async fn start_with_no_usable_backend_reports_every_candidate() {
    let dir = tempdir().unwrap();
    let service = RecorderService::new(
        vec![
            RegisteredBackend {
                descriptor: descriptor("native", 0),
                adapter: Arc::new(MockBackend::new().with_probe(ProbeScript::Fail("no displays"))),
            },
            RegisteredBackend {
                descriptor: descriptor("fallback", 1),
                adapter: Arc::new(MockBackend::new().with_probe(ProbeScript::Unusable)),
            },
        ],
        service_config(&dir.path().join("scratch")),
    )
    .unwrap();

    let response = service.start_recording(options_in(dir.path())).await;

    assert!(!response.success);
    let error = response.error.unwrap();
    assert_eq!(error.kind, "SERVICE_UNAVAILABLE");
    assert!(error.message.contains("native"));
    assert!(error.message.contains("no displays"));
    assert!(error.message.contains("fallback"));
}

#[tokio::test]
async fn virtual_driver_in_inventory_never_binds_a_device() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(MockBackend::new().with_audio_devices(vec![
        DeviceRecord::audio_input("mic-1", "Built-in Microphone"),
        DeviceRecord::audio_output("bh-2ch", "BlackHole 2ch"),
    ]));
    let service = single_backend_service(backend.clone(), &dir.path().join("scratch"));

    let mut options = options_in(dir.path());
    options.include_system_audio = true;

    let started = service.start_recording(options).await;
    assert!(started.success);

    let config = backend.last_config().unwrap();
    assert_eq!(config.audio_mode, AudioCaptureMode::NativeSystemAudio);
    assert!(config.system_audio_device_id.is_none());
    assert_eq!(config.microphone_device_id.as_deref(), Some("mic-1"));

    service.stop_recording().await;
}

#[tokio::test]
async fn startup_sweep_reclaims_stale_scratch_files() {
    let dir = tempdir().unwrap();
    let scratch = dir.path().join("scratch");
    std::fs::create_dir_all(&scratch).unwrap();
    std::fs::write(scratch.join("stale.mp4"), b"left over from a crash").unwrap();

    let mut config = service_config(&scratch);
    config.retention = RetentionPolicy {
        max_file_age: Duration::ZERO,
        ..RetentionPolicy::default()
    };

    let _service = RecorderService::new(
        vec![RegisteredBackend {
            descriptor: descriptor("mock", 0),
            adapter: Arc::new(MockBackend::new()),
        }],
        config,
    )
    .unwrap();

    assert!(!scratch.join("stale.mp4").exists());
}

#[tokio::test]
async fn shutdown_is_safe_to_repeat_mid_recording() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(MockBackend::new());
    let service = single_backend_service(backend.clone(), &dir.path().join("scratch"));
    service.start_background_refresh();

    let started = service.start_recording(options_in(dir.path())).await;
    assert!(started.success);

    service.shutdown().await;
    service.shutdown().await;

    assert_eq!(service.get_status().state, RecordingState::Idle);
    assert!(!backend.is_recording());
}
