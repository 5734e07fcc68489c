// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use overlaycam::config::{ConfigSource, StaticConfigSource};
use overlaycam::constants::{DegradePolicy, PoolMode};
use overlaycam::plugins::OptionValue;
use overlaycam::{Config, JsonConfigSource};
use std::time::Duration;

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.camera.width, 1280);
    assert_eq!(config.camera.height, 720);
    assert_eq!(config.camera.fps, 30);
    assert_eq!(config.pool.mode, PoolMode::Backpressure);
    assert_eq!(config.engine.degrade_policy, DegradePolicy::DropOldest);
    assert!(config.plugins.is_empty(), "No plugins should be configured by default");
    assert!(config.check().is_ok());
}

#[test]
fn test_default_shortcuts() {
    let config = Config::default();
    assert_eq!(config.shortcuts.get("quit").map(String::as_str), Some("q"));
    assert_eq!(config.shortcuts.get("pause").map(String::as_str), Some("space"));
}

#[test]
fn test_parse_plugin_instances() {
    let text = r#"{
        "camera": { "width": 640, "height": 480, "fps": 15 },
        "plugin_instances": [
            { "name": "clock", "pos": 2, "options": { "format": "%H:%M" } },
            { "name": "banner", "type": "text", "pos": 1, "enabled": false,
              "options": { "text": "LIVE", "x": 10, "y": 10 } }
        ],
        "keyboard_shortcuts": { "quit": "ctrl+q" },
        "hotkeys": { "t": "banner" }
    }"#;
    let config = Config::from_json(text, "inline").unwrap();

    assert_eq!(config.camera.width, 640);
    assert_eq!(config.camera.fps, 15);
    // Unspecified fields keep their defaults
    assert_eq!(config.camera.device, 0);
    assert_eq!(config.pool, Config::default().pool);

    assert_eq!(config.plugins.len(), 2);
    let banner = &config.plugins[1];
    assert_eq!(banner.name, "banner");
    assert_eq!(banner.kind(), "text");
    assert_eq!(banner.position, 1);
    assert!(!banner.enabled);
    assert_eq!(banner.options.get("text"), Some(&OptionValue::Text("LIVE".into())));

    let clock = &config.plugins[0];
    assert_eq!(clock.kind(), "clock", "Kind defaults to the instance name");
    assert!(clock.enabled, "Plugins are enabled unless stated otherwise");

    assert_eq!(config.shortcuts.get("quit").map(String::as_str), Some("ctrl+q"));
    assert_eq!(config.hotkeys.get("t").map(String::as_str), Some("banner"));
}

#[test]
fn test_invalid_json_rejected() {
    assert!(Config::from_json("{ not json", "inline").is_err());
    assert!(Config::from_json(r#"{ "plugins": [ { "name": "x" } ] }"#, "inline").is_err());
}

#[test]
fn test_check_rejects_empty_values() {
    assert!(Config::from_json(r#"{ "camera": { "width": 0 } }"#, "inline").is_err());
    assert!(Config::from_json(r#"{ "pool": { "capacity": 0 } }"#, "inline").is_err());
    assert!(Config::from_json(r#"{ "control": { "bus_capacity": 0 } }"#, "inline").is_err());
}

#[test]
fn test_pool_capacity_minimum() {
    // A replacing plugin needs the captured frame, a stage copy and its output
    for capacity in [1, 2] {
        let text = format!(r#"{{ "pool": {{ "capacity": {capacity} }} }}"#);
        assert!(Config::from_json(&text, "inline").is_err(), "capacity {capacity}");
    }
    let config = Config::from_json(r#"{ "pool": { "capacity": 3 } }"#, "inline").unwrap();
    assert_eq!(config.pool.capacity, 3);
}

#[test]
fn test_policy_names() {
    let config = Config::from_json(
        r#"{ "pool": { "mode": "overflow" }, "engine": { "degrade_policy": "skip_slowest" } }"#,
        "inline",
    )
    .unwrap();
    assert_eq!(config.pool.mode, PoolMode::Overflow);
    assert_eq!(config.engine.degrade_policy, DegradePolicy::SkipSlowest);
}

#[test]
fn test_watch_interval() {
    let mut config = Config::default();
    config.control.watch_interval_ms = 250;
    assert_eq!(config.control.watch_interval(), Some(Duration::from_millis(250)));

    config.control.watch_interval_ms = 0;
    assert_eq!(config.control.watch_interval(), None, "Zero disables watching");
}

#[test]
fn test_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let source = JsonConfigSource::new(dir.path().join("absent.json"));

    assert_eq!(source.load().unwrap(), Config::default());
    assert!(source.watch_path().is_some());
}

#[test]
fn test_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");

    let mut config = Config::default();
    config.camera.fps = 24;
    config.plugins.push(
        overlaycam::PluginSpec::new("banner", 0)
            .with_kind("text")
            .with_option("text", "ON AIR"),
    );
    std::fs::write(&path, config.to_json()).unwrap();

    let loaded = JsonConfigSource::new(&path).load().unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_unreadable_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "[1, 2").unwrap();

    assert!(JsonConfigSource::new(&path).load().is_err());
}

#[test]
fn test_static_source() {
    let source = StaticConfigSource::default();
    assert_eq!(source.load().unwrap(), Config::default());
    assert!(source.watch_path().is_none());
}
