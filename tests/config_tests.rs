// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use livecam::Config;
use livecam::backends::camera::{CameraBackendType, CameraPosition};
use livecam::constants::SessionPreset;
use livecam::render::ClearColor;

#[test]
fn test_config_default() {
    let config = Config::default();

    assert!(config.mirror_preview, "Mirror preview should be enabled by default");
    assert_eq!(config.camera_position, CameraPosition::Front);
    assert_eq!(config.preset, SessionPreset::Hd1920x1080);
    assert_eq!(config.clear_color, ClearColor::BLACK);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_round_trips_through_json() {
    let config = Config {
        camera_position: CameraPosition::Back,
        preset: SessionPreset::Hd1280x720,
        backend: CameraBackendType::TestPattern,
        clear_color: ClearColor {
            r: 0.1,
            g: 0.2,
            b: 0.3,
            a: 1.0,
        },
        ..Default::default()
    };
    let json = serde_json::to_string_pretty(&config).unwrap();
    assert!(json.contains("\"720p\""));
    assert_eq!(Config::from_json(&json).unwrap(), config);
}

#[test]
fn test_config_load_from_file() {
    let path = std::env::temp_dir().join(format!("livecam-config-{}.json", std::process::id()));
    std::fs::write(&path, r#"{ "camera_position": "back", "preferred_fps": 60 }"#).unwrap();

    let config = Config::load(Some(&path)).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.camera_position, CameraPosition::Back);
    assert_eq!(config.surface_layer().preferred_fps, 60);
}

#[test]
fn test_config_missing_file_is_an_error() {
    let path = std::env::temp_dir().join("livecam-config-does-not-exist.json");
    assert!(Config::load(Some(&path)).is_err());
}
