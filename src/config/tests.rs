//! Unit tests for configuration module
//!
//! Tests configuration parsing, validation, serialization/deserialization,
//! and edge cases in configuration handling.

use super::*;
use anyhow::Result;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_default_configuration_is_valid() {
    let config = WmConfig::default();

    assert!(config.validate().is_ok());
    assert_eq!(config.shm.initial_fill, 0xFF2BB3AA);
    assert_eq!(config.shm.resize_fill, 0xFF030303);
    assert_eq!(config.protocol.compositor_version, 4);
    assert_eq!(config.protocol.shm_version, 1);
    assert_eq!(config.protocol.wm_base_version, 1);
    assert_eq!(config.protocol.seat_version, 7);
    assert!(!config.general.debug);
}

#[test]
fn test_configuration_serialization_roundtrip() -> Result<()> {
    let original_config = WmConfig::default();

    let toml_string = toml::to_string(&original_config)?;
    let deserialized_config: WmConfig = toml::from_str(&toml_string)?;

    assert_eq!(original_config, deserialized_config);

    Ok(())
}

#[test]
fn test_configuration_from_file() -> Result<()> {
    let dir = tempdir()?;
    let file_path = dir.path().join("test_config.toml");

    let test_config = r#"
[shm]
initial_fill = 4278190335
resize_fill = 4278190080
name_prefix = "/demo-shm"

[protocol]
compositor_version = 5
shm_version = 1
wm_base_version = 2
seat_version = 5
show_roundtrip_limit = 8

[general]
debug = true
"#;

    fs::write(&file_path, test_config)?;

    let config = WmConfig::load(&file_path)?;

    assert_eq!(config.shm.initial_fill, 0xFF0000FF);
    assert_eq!(config.shm.resize_fill, 0xFF000000);
    assert_eq!(config.shm.name_prefix, "/demo-shm");
    assert_eq!(config.protocol.compositor_version, 5);
    assert_eq!(config.protocol.wm_base_version, 2);
    assert_eq!(config.protocol.show_roundtrip_limit, 8);
    assert!(config.general.debug);

    Ok(())
}

#[test]
fn test_partial_configuration_uses_defaults() -> Result<()> {
    let dir = tempdir()?;
    let file_path = dir.path().join("partial_config.toml");

    fs::write(&file_path, "[protocol]\nseat_version = 3\n")?;

    let config = WmConfig::load(&file_path)?;

    assert_eq!(config.protocol.seat_version, 3);
    assert_eq!(config.protocol.compositor_version, 4);
    assert_eq!(config.shm, ShmConfig::default());

    Ok(())
}

#[test]
fn test_invalid_toml_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let file_path = dir.path().join("broken.toml");

    fs::write(&file_path, "[shm\ninitial_fill = ")?;

    let err = WmConfig::load(&file_path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));

    Ok(())
}

#[test]
fn test_missing_file_is_rejected() {
    let err = WmConfig::load("/nonexistent/wlwindow/config.toml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn test_shm_prefix_validation() {
    let mut config = WmConfig::default();

    config.shm.name_prefix = "no-slash".to_string();
    assert!(config.validate().is_err());

    config.shm.name_prefix = "/nested/name".to_string();
    assert!(config.validate().is_err());

    config.shm.name_prefix = format!("/{}", "x".repeat(MAX_SHM_PREFIX_LEN));
    assert!(config.validate().is_err());

    config.shm.name_prefix = "/ok".to_string();
    assert!(config.validate().is_ok());
}

#[test]
fn test_zero_versions_are_rejected() {
    let mut config = WmConfig::default();
    config.protocol.seat_version = 0;
    assert!(config.validate().is_err());

    let mut config = WmConfig::default();
    config.protocol.show_roundtrip_limit = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_save_and_reload() -> Result<()> {
    let dir = tempdir()?;
    let file_path = dir.path().join("saved.toml");

    let mut config = WmConfig::default();
    config.shm.resize_fill = 0xFF112233;
    config.general.debug = true;
    config.save(&file_path)?;

    let reloaded = WmConfig::load(&file_path)?;
    assert_eq!(reloaded, config);

    Ok(())
}
