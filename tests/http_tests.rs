// SPDX-License-Identifier: GPL-3.0-only

//! End-to-end tests of the HTTP routes and process shutdown

use camera_server::backends::virtual_camera::{VirtualCamera, VirtualCameraProbe};
use camera_server::config::{AppPaths, ServerConfig};
use camera_server::server::{self, AppState};
use camera_server::singleton::ProcessTable;
use camera_server::supervisor::serve_until_stopped;
use camera_server::{CameraService, SupervisorError};
use serde_json::Value;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

struct TestServer {
    base: String,
    probe: VirtualCameraProbe,
    shutdown: CancellationToken,
    _dir: tempfile::TempDir,
}

async fn start() -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ServerConfig::default();
    config.lifecycle.shutdown_grace_ms = 50;

    let camera = VirtualCamera::new(16, 8).with_read_delay(Duration::from_millis(5));
    let probe = camera.probe();
    let shutdown = CancellationToken::new();
    let service = CameraService::new(
        Box::new(camera),
        &config,
        dir.path().join("images"),
        Handle::current(),
        TaskTracker::new(),
        shutdown.clone(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let state = AppState {
        service: Arc::new(service),
        shutdown: shutdown.clone(),
        public_url: base.clone(),
    };
    tokio::spawn(server::serve(listener, state));

    TestServer {
        base,
        probe,
        shutdown,
        _dir: dir,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_health_reports_device_state() {
    let server = start().await;
    let client = reqwest::Client::new();

    let body: Value = client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "healthy");
    assert_eq!(body["device_open"], false);
    assert_eq!(body["shutdown_requested"], false);
    assert_eq!(body["active_sessions"], 0);
    assert_eq!(body["device_opens"], 0);
    server.shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_capture_then_download() {
    let server = start().await;
    let client = reqwest::Client::new();

    let missing = client.get(format!("{}/image", server.base)).send().await.unwrap();
    assert_eq!(missing.status(), 404);

    let captured: Value = client
        .post(format!("{}/capture", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(captured["message"], "Image captured");
    assert_eq!(captured["url"], format!("{}/image", server.base));

    let image = client.get(format!("{}/image", server.base)).send().await.unwrap();
    assert_eq!(image.status(), 200);
    assert_eq!(image.headers()["content-type"], "image/jpeg");
    assert!(
        image.headers()["content-disposition"]
            .to_str()
            .unwrap()
            .contains("captured_image.jpg")
    );
    let bytes = image.bytes().await.unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    server.shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_camera_and_reopen() {
    let server = start().await;
    let client = reqwest::Client::new();

    let off = client
        .post(format!("{}/shutdown-camera", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(off.status(), 200);

    let refused = client.post(format!("{}/capture", server.base)).send().await.unwrap();
    assert_eq!(refused.status(), 409);
    let stream = client.get(format!("{}/video_feed", server.base)).send().await.unwrap();
    assert_eq!(stream.status(), 409);
    assert_eq!(server.probe.open_attempts(), 0);

    client
        .post(format!("{}/reopen-camera", server.base))
        .send()
        .await
        .unwrap();
    let ok = client.post(format!("{}/capture", server.base)).send().await.unwrap();
    assert_eq!(ok.status(), 200);
    server.shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unavailable_device_is_503() {
    let server = start().await;
    server.probe.fail_next_opens(1);

    let response = reqwest::Client::new()
        .post(format!("{}/capture", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("unavailable"));
    server.shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_video_feed_streams_multipart() {
    let server = start().await;
    let client = reqwest::Client::new();

    let mut response = client
        .get(format!("{}/video_feed", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"],
        "multipart/x-mixed-replace; boundary=frame"
    );

    let mut received = Vec::new();
    while received.len() < 64 {
        let chunk = response.chunk().await.unwrap().expect("stream ended early");
        received.extend_from_slice(&chunk);
    }
    assert!(received.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));

    let health: Value = client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["active_sessions"], 1);
    assert_eq!(health["device_open"], true);
    assert_eq!(health["device_opens"], 1);

    drop(response);
    // Disconnect ends the session, then the grace period closes the device
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!server.probe.is_open());
    server.shutdown.cancel();
}

struct FakeParent {
    alive: bool,
}

impl ProcessTable for FakeParent {
    fn is_alive(&self, _pid: i32) -> bool {
        self.alive
    }

    fn terminate(&self, _pid: i32) -> io::Result<()> {
        Ok(())
    }

    fn current_pid(&self) -> i32 {
        std::process::id() as i32
    }

    fn parent_pid(&self) -> i32 {
        4242
    }
}

fn supervisor_config(dir: &tempfile::TempDir) -> (ServerConfig, AppPaths) {
    let mut config = ServerConfig::default();
    config.host = Some("127.0.0.1".to_string());
    config.port = 0;
    config.base_dir = Some(dir.path().to_path_buf());
    config.watchdog.poll_interval_secs = 1;
    config.janitor.enabled = false;
    let paths = config.paths();
    paths.ensure_dirs().unwrap();
    (config, paths)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lost_parent_stops_server() {
    let dir = tempfile::tempdir().unwrap();
    let (config, paths) = supervisor_config(&dir);

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        serve_until_stopped(
            &config,
            &paths,
            Box::new(VirtualCamera::new(4, 4)),
            Arc::new(FakeParent { alive: false }),
            CancellationToken::new(),
        ),
    )
    .await
    .expect("supervisor should stop on its own");

    assert!(matches!(result, Err(SupervisorError::ParentLost { pid: 4242 })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_stops_server_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let (config, paths) = supervisor_config(&dir);
    let shutdown = CancellationToken::new();

    let task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            serve_until_stopped(
                &config,
                &paths,
                Box::new(VirtualCamera::new(4, 4)),
                Arc::new(FakeParent { alive: true }),
                shutdown,
            )
            .await
        }
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("supervisor should stop after cancel")
        .unwrap();
    assert!(result.is_ok());
}
