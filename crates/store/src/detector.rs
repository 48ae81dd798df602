//! Marker-file platform detection
//!
//! Walks the top level of a fetched source tree and maps well-known
//! project markers to platform names. Marker precedence matters:
//! a PlatformIO project usually also contains `.ino` sketches, so the
//! more specific markers are checked first.

use std::path::Path;

use async_trait::async_trait;
use fwforge_errors::{BuildError, Error};
use tokio::fs;

use crate::traits::PlatformDetector;

/// Detects the platform from filesystem markers.
#[derive(Debug, Clone, Default)]
pub struct FsPlatformDetector;

impl FsPlatformDetector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PlatformDetector for FsPlatformDetector {
    async fn detect(&self, path: &Path) -> Result<String, Error> {
        if path.join("platformio.ini").exists() {
            return Ok("platformio".to_string());
        }
        if path.join("mos.yml").exists() {
            return Ok("mongoose".to_string());
        }
        if path.join("boot.py").exists() || path.join("main.py").exists() {
            return Ok("micropython".to_string());
        }
        if path.join("package.json").exists() {
            return Ok("nodejs".to_string());
        }
        if path.join("sdkconfig").exists() && path.join("CMakeLists.txt").exists() {
            return Ok("espidf".to_string());
        }

        // Arduino sketches carry no fixed-name marker; look for .ino
        let mut entries = fs::read_dir(path)
            .await
            .map_err(|e| Error::io_with_path(&e, path))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io_with_path(&e, path))?
        {
            if entry.path().extension().and_then(|e| e.to_str()) == Some("ino") {
                return Ok("arduino".to_string());
            }
        }

        Err(BuildError::UnknownPlatform {
            platform: "unknown".to_string(),
        }
        .into())
    }
}
