//! Configuration management for wlwindow
//!
//! This module handles loading, parsing, and validating configuration
//! from TOML files. It covers the shared-memory buffer settings, the
//! protocol versions the client binds, and general runtime switches.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Longest shm name prefix accepted; leaves room for the `-{pid}-{counter}` suffix
/// inside NAME_MAX.
const MAX_SHM_PREFIX_LEN: usize = 200;

/// Main configuration struct containing all wlwindow settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WmConfig {
    /// Shared-memory buffer settings
    #[serde(default)]
    pub shm: ShmConfig,

    /// Protocol versions and handshake limits
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,
}

/// Shared-memory buffer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShmConfig {
    /// Packed XRGB colour of the buffer allocated when a window is created
    pub initial_fill: u32,

    /// Packed XRGB colour of buffers allocated on resize
    pub resize_fill: u32,

    /// Prefix of the process-unique segment name, e.g. "/wlwindow-shm"
    pub name_prefix: String,
}

/// Versions this client was built against; bound versions are clamped to these
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProtocolConfig {
    /// wl_compositor
    pub compositor_version: u32,

    /// wl_shm
    pub shm_version: u32,

    /// xdg_wm_base
    pub wm_base_version: u32,

    /// wl_seat
    pub seat_version: u32,

    /// Upper bound on round-trips performed while blocking in `show_window`
    pub show_roundtrip_limit: u32,
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable debug logging
    pub debug: bool,
}

impl Default for ShmConfig {
    fn default() -> Self {
        Self {
            initial_fill: 0xFF2B_B3AA,
            resize_fill: 0xFF03_0303,
            name_prefix: "/wlwindow-shm".to_string(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            compositor_version: 4,
            shm_version: 1,
            wm_base_version: 1,
            seat_version: 7,
            show_roundtrip_limit: 64,
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { debug: false }
    }
}

impl WmConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Expand ~ to home directory
        let expanded_path = if path.to_string_lossy().starts_with('~') {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            let rest = path.strip_prefix("~").unwrap_or(path);
            Path::new(&home).join(rest)
        } else {
            path.to_path_buf()
        };

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: WmConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let prefix = &self.shm.name_prefix;
        if !prefix.starts_with('/') {
            anyhow::bail!("Invalid shm name_prefix {:?}: must start with '/'", prefix);
        }
        if prefix[1..].contains('/') {
            anyhow::bail!("Invalid shm name_prefix {:?}: only the leading '/' is allowed", prefix);
        }
        if prefix.contains('\0') {
            anyhow::bail!("Invalid shm name_prefix: contains a NUL byte");
        }
        if prefix.len() > MAX_SHM_PREFIX_LEN {
            anyhow::bail!(
                "Invalid shm name_prefix: {} bytes exceeds the {} byte limit",
                prefix.len(),
                MAX_SHM_PREFIX_LEN
            );
        }

        let versions = [
            ("compositor_version", self.protocol.compositor_version),
            ("shm_version", self.protocol.shm_version),
            ("wm_base_version", self.protocol.wm_base_version),
            ("seat_version", self.protocol.seat_version),
        ];
        for (name, version) in versions {
            if version == 0 {
                anyhow::bail!("Invalid {}: protocol versions start at 1", name);
            }
        }

        if self.protocol.show_roundtrip_limit == 0 {
            anyhow::bail!("Invalid show_roundtrip_limit: must be at least 1");
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests;
