// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use camera_server::ServerConfig;
use camera_server::config::AppPaths;
use std::time::Duration;

#[test]
fn test_config_default() {
    let config = ServerConfig::default();

    assert!(config.host.is_none(), "Host should default to the LAN address");
    assert!(config.watchdog.enabled, "Watchdog should be on by default");
    assert!(config.janitor.enabled, "Janitor should be on by default");
    assert_eq!(config.shutdown_grace(), Duration::from_secs(1));
}

#[test]
fn test_config_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("server.json");
    std::fs::write(
        &path,
        r#"{
            "port": 6000,
            "device": { "path": "/dev/video4", "jpeg_quality": 70 },
            "watchdog": { "enabled": false },
            "janitor": { "interval_secs": 30 }
        }"#,
    )
    .unwrap();

    let config = ServerConfig::load(&path).unwrap();
    assert_eq!(config.port, 6000);
    assert_eq!(config.device.path, "/dev/video4");
    assert_eq!(config.device.jpeg_quality, 70);
    // Unspecified fields keep their defaults
    assert_eq!(config.device.width, 640);
    assert!(!config.watchdog.enabled);
    assert_eq!(config.janitor.interval(), Duration::from_secs(30));
    assert_eq!(config.janitor.max_age(), Duration::from_secs(300));
}

#[test]
fn test_config_load_rejects_bad_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("server.json");
    std::fs::write(&path, "{ port: ").unwrap();

    let err = ServerConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("server.json"));
}

#[test]
fn test_config_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(ServerConfig::load(&dir.path().join("absent.json")).is_err());
}

#[test]
fn test_paths_follow_base_dir() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        base_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    };

    let paths = config.paths();
    assert_eq!(paths, AppPaths::new(dir.path().to_path_buf()));
    paths.ensure_dirs().unwrap();
    assert!(paths.images_dir().is_dir());
    assert!(paths.logs_dir().is_dir());
}

#[test]
fn test_user_default_paths_end_with_app_dir() {
    let paths = AppPaths::user_default();
    assert!(paths.base.ends_with("camera-server"));
}
