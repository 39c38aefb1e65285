//! Device configuration
//!
//! A config file is a JSON list of device descriptors. Each descriptor
//! carries an id, a `type` string resolved by the factory, and the settings
//! blob the concrete device type deserializes for itself.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DeviceError, Result};

/// One device descriptor from a config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub device_type: String,
    /// Type-specific settings, deserialized by the factory
    #[serde(default)]
    pub settings: serde_json::Value,
}

/// Top-level config file shape
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl ConfigFile {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            DeviceError::Config(format!("can't read {}: {e}", path.as_ref().display()))
        })?;
        Self::parse(&text)
    }

    pub fn device(&self, id: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.id == id)
    }
}
