//! Build descriptor generation
//!
//! Merges device identity, owner API key, commit metadata and cloud
//! endpoint settings into the JSON descriptor the build toolchain
//! consumes, written to `thinx_build.json` inside the project
//! directory. The descriptor embeds the API key and is therefore on
//! the mandatory-cleanup path together with the other secrets.

use std::path::Path;

use fwforge_config::Config;
use fwforge_errors::{BuildError, Error};
use fwforge_types::Device;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::header::language_name_for_platform;

/// Descriptor file name inside the project directory.
pub const DESCRIPTOR_FILE: &str = "thinx_build.json";

/// Base descriptor template shipped with the engine.
const TEMPLATE: &str = include_str!("../templates/thinx.dist.json");

/// Inputs for one descriptor generation.
pub struct DescriptorContext<'a> {
    pub device: &'a Device,
    pub api_key: &'a str,
    pub commit_id: &'a str,
    pub git_tag: &'a str,
    pub xbuild_path: &'a Path,
    pub api_envs: &'a [(String, String)],
}

/// Produce the merged descriptor: template, then owner env vars, then
/// the identity/version/endpoint fields which always win.
///
/// # Errors
///
/// Returns an error if the embedded template is unreadable, which would
/// be a packaging defect.
pub fn generate(config: &Config, ctx: &DescriptorContext<'_>) -> Result<Value, Error> {
    let mut descriptor: Value = serde_json::from_str(TEMPLATE)?;
    let map = descriptor
        .as_object_mut()
        .ok_or_else(|| Error::internal("descriptor template is not an object"))?;

    if ctx.api_envs.is_empty() {
        tracing::debug!("no environment vars to apply");
    } else {
        for (key, value) in ctx.api_envs {
            tracing::debug!(key, "applying environment var");
            map.insert(key.clone(), Value::String(value.clone()));
        }
    }

    let commit_id = ctx.commit_id.trim();
    let git_tag = ctx.git_tag.trim();
    let repo = repo_name(ctx.xbuild_path);

    map.insert("THINX_ALIAS".into(), json!(ctx.device.alias));
    map.insert("THINX_API_KEY".into(), json!(ctx.api_key));
    map.insert("THINX_COMMIT_ID".into(), json!(commit_id));
    map.insert("THINX_FIRMWARE_VERSION_SHORT".into(), json!(git_tag));
    let firmware_version = format!("{repo}:{git_tag}");
    map.insert("THINX_FIRMWARE_VERSION".into(), json!(firmware_version));
    map.insert("THINX_APP_VERSION".into(), json!(firmware_version));
    map.insert("THINX_OWNER".into(), json!(ctx.device.owner));
    map.insert("THINX_PLATFORM".into(), json!(ctx.device.platform));
    map.insert(
        "LANGUAGE_NAME".into(),
        json!(language_name_for_platform(ctx.device.platform_family())),
    );
    map.insert("THINX_UDID".into(), json!(ctx.device.udid));

    map.insert(
        "THINX_CLOUD_URL".into(),
        json!(strip_scheme(&config.api.api_url)),
    );
    map.insert(
        "THINX_MQTT_URL".into(),
        json!(strip_scheme(&config.mqtt.server)),
    );
    map.insert("THINX_MQTT_PORT".into(), json!(config.mqtt.port));
    map.insert("THINX_API_PORT".into(), json!(config.api.port));
    if let Some(secure_port) = config.api.secure_port {
        map.insert("THINX_API_PORT_SECURE".into(), json!(secure_port));
    }
    map.insert("THINX_AUTO_UPDATE".into(), json!(ctx.device.auto_update));
    map.insert("THINX_FORCED_UPDATE".into(), json!(false));
    map.insert("THINX_ENV_SSID".into(), json!(""));
    map.insert("THINX_ENV_PASS".into(), json!(""));

    Ok(descriptor)
}

/// Write the descriptor into the project directory.
///
/// # Errors
///
/// Returns `error_configuring_build` when the file cannot be written.
pub fn write(project_dir: &Path, descriptor: &Value) -> Result<(), Error> {
    let path = project_dir.join(DESCRIPTOR_FILE);
    let content = serde_json::to_string(descriptor)?;
    std::fs::write(&path, content).map_err(|err| {
        tracing::warn!(%err, path = %path.display(), "descriptor write failed");
        Error::from(BuildError::ConfiguringBuild)
    })
}

/// Per-platform build metadata shipped under the platforms root.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformDescriptor {
    /// Name of the header file the firmware expects, e.g. `thinx.h`.
    pub header: String,
    #[serde(default)]
    pub extensions: Vec<String>,
}

/// Load the platform descriptor; a missing one is a terminal build
/// failure because the engine cannot know how to embed configuration.
///
/// # Errors
///
/// Returns `BuildError::MissingPlatformDescriptor` when the platform is
/// not installed, or a parse error for a corrupt descriptor.
pub fn load_platform_descriptor(
    config: &Config,
    platform: &str,
) -> Result<PlatformDescriptor, Error> {
    let path = config.platform_descriptor_path(platform);
    if !path.is_file() {
        return Err(BuildError::MissingPlatformDescriptor {
            path: path.display().to_string(),
        }
        .into());
    }
    let content = std::fs::read_to_string(&path).map_err(|e| Error::io_with_path(&e, &path))?;
    let descriptor: PlatformDescriptor = serde_json::from_str(&content)?;
    Ok(descriptor)
}

fn repo_name(xbuild_path: &Path) -> String {
    xbuild_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
        .trim_end_matches(".git")
        .to_string()
}

fn strip_scheme(url: &str) -> String {
    url.trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("mqtt://")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::{generate, load_platform_descriptor, DescriptorContext};
    use fwforge_config::Config;
    use fwforge_types::Device;
    use std::path::Path;

    fn device() -> Device {
        Device {
            owner: "cedc16bb6bb06daaa3ff6d30666d91aacd6e3efbf9abbc151b4dcade59af7c12".into(),
            udid: "f8e88e40-43c8-11e7-9ad3-b7281c2b9610".into(),
            platform: "espressif:esp8266".into(),
            mac: "AA:BB:CC:DD:EE:FF".into(),
            alias: "robodyn-d1-mini".into(),
            fcid: None,
            auto_update: true,
            environment: None,
            build_id: None,
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.api.api_url = "https://staging.thinx.cloud".into();
        config.api.secure_port = Some(7443);
        config.mqtt.server = "mqtt://staging.thinx.cloud".into();
        config
    }

    #[test]
    fn identity_fields_always_win() {
        let envs = vec![("THINX_ALIAS".to_string(), "spoofed".to_string())];
        let ctx = DescriptorContext {
            device: &device(),
            api_key: "key",
            commit_id: "269c6fa\n",
            git_tag: "1.6.92\n",
            xbuild_path: Path::new("/b/p/thinx-firmware-esp8266.git"),
            api_envs: &envs,
        };
        let descriptor = generate(&config(), &ctx).unwrap();
        assert_eq!(descriptor["THINX_ALIAS"], "robodyn-d1-mini");
        assert_eq!(descriptor["THINX_COMMIT_ID"], "269c6fa");
        assert_eq!(
            descriptor["THINX_FIRMWARE_VERSION"],
            "thinx-firmware-esp8266:1.6.92"
        );
        assert_eq!(descriptor["THINX_CLOUD_URL"], "staging.thinx.cloud");
        assert_eq!(descriptor["THINX_MQTT_URL"], "staging.thinx.cloud");
        assert_eq!(descriptor["THINX_API_PORT_SECURE"], 7443);
        assert_eq!(descriptor["THINX_AUTO_UPDATE"], true);
        assert_eq!(descriptor["LANGUAGE_NAME"], "C");
    }

    #[test]
    fn env_vars_overlay_non_identity_keys() {
        let envs = vec![("MY_FEATURE_FLAG".to_string(), "on".to_string())];
        let ctx = DescriptorContext {
            device: &device(),
            api_key: "key",
            commit_id: "c",
            git_tag: "1.0",
            xbuild_path: Path::new("/b/p/fw"),
            api_envs: &envs,
        };
        let descriptor = generate(&config(), &ctx).unwrap();
        assert_eq!(descriptor["MY_FEATURE_FLAG"], "on");
    }

    #[test]
    fn missing_platform_descriptor_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.paths.platforms_root = dir.path().to_path_buf();
        let err = load_platform_descriptor(&config, "arduino").unwrap_err();
        assert!(err.reason().contains("builder not found for platform"));
    }

    #[test]
    fn platform_descriptor_parses() {
        let dir = tempfile::tempdir().unwrap();
        let platform_dir = dir.path().join("arduino");
        std::fs::create_dir_all(&platform_dir).unwrap();
        std::fs::write(
            platform_dir.join("descriptor.json"),
            r#"{"header": "thinx.h", "extensions": [".ino"]}"#,
        )
        .unwrap();
        let mut config = Config::default();
        config.paths.platforms_root = dir.path().to_path_buf();
        let descriptor = load_platform_descriptor(&config, "arduino").unwrap();
        assert_eq!(descriptor.header, "thinx.h");
        assert_eq!(descriptor.extensions, vec![".ino".to_string()]);
    }
}
