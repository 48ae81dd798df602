//! Secret and artifact cleanup
//!
//! Credential-bearing files written during configuration must be
//! deleted after each build attempt regardless of outcome; the build
//! tree is otherwise readable by the build toolchain. Historical build
//! directories for a device are purged only on success, keeping the
//! latest build.

use std::path::Path;

use fwforge_config::Config;
use walkdir::WalkDir;

/// Files that must never survive a build attempt.
pub const SECRET_FILES: [&str; 3] = ["environment.json", "environment.h", "thinx.yml"];

/// Delete every secret-bearing file under the given path.
pub fn cleanup_secrets(path: &Path) {
    if !path.exists() {
        return;
    }
    for entry in WalkDir::new(path).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if SECRET_FILES.contains(&name.as_ref()) {
            tracing::debug!(file = %entry.path().display(), "cleaning up secret");
            if let Err(err) = std::fs::remove_file(entry.path()) {
                tracing::warn!(%err, file = %entry.path().display(), "secret cleanup failed");
            }
        }
    }
}

/// Delete all of a device's historical build directories except the one
/// being kept. Inputs are re-validated before touching the filesystem.
pub fn cleanup_device_repositories(config: &Config, owner: &str, udid: &str, keep_build_id: &str) {
    let (Some(owner), Some(udid), Some(keep)) = (
        fwforge_sanitize::owner(owner),
        fwforge_sanitize::udid(udid),
        fwforge_sanitize::path_component(keep_build_id),
    ) else {
        tracing::error!(owner, udid, keep_build_id, "repository cleanup rejected inputs");
        return;
    };

    let device_path = config.device_path(&owner, &udid);
    let entries = match std::fs::read_dir(&device_path) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(%err, path = %device_path.display(), "repository cleanup skipped");
            return;
        }
    };
    for entry in entries.filter_map(Result::ok) {
        let name = entry.file_name();
        if !entry.path().is_dir() || name.to_string_lossy() == keep.as_str() {
            continue;
        }
        tracing::debug!(dir = %entry.path().display(), "purging stale build");
        if let Err(err) = std::fs::remove_dir_all(entry.path()) {
            tracing::warn!(%err, dir = %entry.path().display(), "stale build purge failed");
        }
    }
}
