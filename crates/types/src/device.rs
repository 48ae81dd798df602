//! Device record types
//!
//! The device document is owned by the device management layer; the
//! build engine reads it once per build to validate ownership and to
//! obtain platform, MAC and encrypted network credentials.

use serde::{Deserialize, Serialize};

/// Per-device encrypted network credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceEnvironment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cssid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpass: Option<String>,
}

/// Managed device document (read-only to the build engine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub owner: String,
    pub udid: String,
    /// `family:mcu` composite, e.g. `espressif:esp32`.
    pub platform: String,
    pub mac: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fcid: Option<String>,
    #[serde(default)]
    pub auto_update: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<DeviceEnvironment>,
    /// Pointer to the device's current build, stamped at build start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_id: Option<String>,
}

impl Device {
    /// Platform family, the part before the `:` delimiter.
    #[must_use]
    pub fn platform_family(&self) -> &str {
        self.platform.split(':').next().unwrap_or(&self.platform)
    }

    /// Device MCU, the part after the `:` delimiter, if declared.
    #[must_use]
    pub fn platform_mcu(&self) -> Option<&str> {
        let mut parts = self.platform.splitn(2, ':');
        parts.next();
        parts.next().filter(|s| !s.is_empty())
    }
}
