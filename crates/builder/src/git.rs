//! Git access layer
//!
//! Fetches are argv invocations of the git CLI — no shell is ever
//! involved, validated inputs are passed as discrete arguments. A
//! successful checkout is marked by a sentinel `basename.json` written
//! next to it; the sentinel is the preferred success signal, with a
//! fixed set of known-good output substrings as the fallback when no
//! path-based check is possible.
//!
//! Private repositories are handled by retrying the same fetch once per
//! registered owner SSH key, the identity supplied via
//! `GIT_SSH_COMMAND`.

use std::path::{Path, PathBuf};

use fwforge_config::Config;
use fwforge_errors::{Error, GitError};
use serde_json::json;
use tokio::process::Command;

/// Written next to a successful checkout, `{basename, branch}`.
pub const SENTINEL_FILE: &str = "basename.json";

/// Output substrings that indicate a usable fetch when the sentinel
/// cannot be consulted.
const KNOWN_GOOD_RESPONSES: [&str; 5] = [
    "already exists and is not an empty",
    "FETCH_HEAD",
    "up-to-date",
    "Checking out files: 100%",
    "done.",
];

/// Clone/pull driver for one build path.
pub struct GitFetcher<'a> {
    config: &'a Config,
}

impl<'a> GitFetcher<'a> {
    #[must_use]
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Whether a previous fetch already produced the sentinel.
    #[must_use]
    pub fn sentinel_exists(build_path: &Path) -> bool {
        build_path.join(SENTINEL_FILE).is_file()
    }

    /// Attempt the fetch without any added identity. Best-effort: a
    /// failure here just means the private fallback will run.
    pub async fn prefetch_public(&self, build_path: &Path, url: &str, branch: &str) -> bool {
        tracing::debug!(url, "attempting public git fetch");
        match run_fetch(build_path, url, branch, None).await {
            Ok(output) => Self::check_response(&output, build_path),
            Err(err) => {
                tracing::warn!(%err, "public git fetch failed, will try owner keys");
                false
            }
        }
    }

    /// Fetch using the owner's registered SSH keys, one at a time,
    /// until one succeeds. A sentinel left by an earlier successful
    /// public fetch short-circuits the whole attempt.
    pub async fn fetch_private(
        &self,
        owner: &str,
        build_path: &Path,
        url: &str,
        branch: &str,
    ) -> bool {
        if Self::sentinel_exists(build_path) {
            return true;
        }

        let key_paths = self.key_paths_for_owner(owner);
        if key_paths.is_empty() {
            tracing::debug!(owner, "no ssh keys registered, retrying plain fetch");
            return match run_fetch(build_path, url, branch, None).await {
                Ok(output) => Self::check_response(&output, build_path),
                Err(err) => {
                    tracing::warn!(%err, "plain fetch retry failed");
                    false
                }
            };
        }

        for key_path in key_paths {
            tracing::debug!(key = %key_path.display(), "trying ssh identity");
            match run_fetch(build_path, url, branch, Some(&key_path)).await {
                Ok(output) => {
                    if Self::check_response(&output, build_path) {
                        return true;
                    }
                }
                Err(err) => {
                    tracing::warn!(%err, key = %key_path.display(), "keyed fetch failed");
                }
            }
        }
        false
    }

    /// Success criterion: the sentinel at the build path decides when
    /// the path is known; output matching is the last resort.
    fn check_response(output: &str, build_path: &Path) -> bool {
        if Self::sentinel_exists(build_path) {
            return true;
        }
        KNOWN_GOOD_RESPONSES
            .iter()
            .any(|marker| output.contains(marker))
    }

    /// The owner's registered private keys: files in the key directory
    /// whose name starts with the owner id, excluding `.pub` halves.
    fn key_paths_for_owner(&self, owner: &str) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.config.paths.ssh_keys) else {
            return Vec::new();
        };
        let mut keys: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.extension().and_then(|e| e.to_str()) != Some("pub")
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(owner))
            })
            .collect();
        keys.sort();
        keys
    }
}

/// One fetch attempt: clear the target, clone the branch, pull with
/// submodules, defuse permissions, drop the sentinel.
async fn run_fetch(
    build_path: &Path,
    url: &str,
    branch: &str,
    identity: Option<&Path>,
) -> Result<String, Error> {
    clear_directory(build_path).await?;

    let mut clone = Command::new("git");
    clone
        .args(["clone", url, "-b", branch])
        .current_dir(build_path)
        .env("GIT_TERMINAL_PROMPT", "0");
    apply_identity(&mut clone, identity);
    let clone_out = clone.output().await.map_err(|e| GitError::SpawnFailed {
        message: e.to_string(),
    })?;

    let mut combined = String::new();
    combined.push_str(&String::from_utf8_lossy(&clone_out.stdout));
    combined.push_str(&String::from_utf8_lossy(&clone_out.stderr));

    if let Some(checkout) = first_subdirectory(build_path)? {
        let mut pull = Command::new("git");
        pull.args([
            "pull",
            "origin",
            branch,
            "--recurse-submodules",
            "--rebase",
        ])
        .current_dir(&checkout)
        .env("GIT_TERMINAL_PROMPT", "0");
        apply_identity(&mut pull, identity);
        if let Ok(pull_out) = pull.output().await {
            combined.push_str(&String::from_utf8_lossy(&pull_out.stdout));
            combined.push_str(&String::from_utf8_lossy(&pull_out.stderr));
        }

        make_tree_nonexecutable(&checkout);
        write_sentinel(build_path, &checkout, branch).await?;
    }

    Ok(combined)
}

fn apply_identity(cmd: &mut Command, identity: Option<&Path>) {
    if let Some(key) = identity {
        cmd.env(
            "GIT_SSH_COMMAND",
            format!(
                "ssh -i {} -o IdentitiesOnly=yes -o StrictHostKeyChecking=accept-new",
                key.display()
            ),
        );
    }
}

/// Remove everything inside the build path, keeping the path itself.
async fn clear_directory(path: &Path) -> Result<(), Error> {
    let mut entries = tokio::fs::read_dir(path)
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::io_with_path(&e, path))?
    {
        let target = entry.path();
        let result = if target.is_dir() {
            tokio::fs::remove_dir_all(&target).await
        } else {
            tokio::fs::remove_file(&target).await
        };
        if let Err(err) = result {
            tracing::warn!(%err, target = %target.display(), "failed to clear build path entry");
        }
    }
    Ok(())
}

/// Non-hidden directories directly under the build path — the
/// candidates for the extracted project directory.
pub(crate) fn extracted_directories(build_path: &Path) -> Result<Vec<PathBuf>, Error> {
    let entries = std::fs::read_dir(build_path).map_err(|e| Error::io_with_path(&e, build_path))?;
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.is_dir()
                && !p
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'))
        })
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Whether the build path contains anything at all after fetching.
pub(crate) fn checkout_is_empty(build_path: &Path) -> bool {
    std::fs::read_dir(build_path).map_or(true, |mut entries| entries.next().is_none())
}

fn first_subdirectory(build_path: &Path) -> Result<Option<PathBuf>, Error> {
    Ok(extracted_directories(build_path)?.into_iter().next())
}

/// Checked-out files become writable but not executable; the build
/// toolchain gets data, not programs.
fn make_tree_nonexecutable(checkout: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        for entry in walkdir::WalkDir::new(checkout)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.file_type().is_file() {
                let perms = std::fs::Permissions::from_mode(0o666);
                if let Err(err) = std::fs::set_permissions(entry.path(), perms) {
                    tracing::warn!(%err, file = %entry.path().display(), "chmod failed");
                }
            }
        }
    }
    #[cfg(not(unix))]
    let _ = checkout;
}

async fn write_sentinel(build_path: &Path, checkout: &Path, branch: &str) -> Result<(), Error> {
    let basename = checkout
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sentinel = json!({ "basename": basename, "branch": branch });
    let path = build_path.join(SENTINEL_FILE);
    tokio::fs::write(&path, sentinel.to_string())
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;
    Ok(())
}

/// Latest commit id in the checkout, or `unknown` when git metadata is
/// unavailable.
pub(crate) async fn commit_id(path: &Path) -> String {
    match Command::new("git")
        .args(["rev-list", "--all", "--max-count=1"])
        .current_dir(path)
        .output()
        .await
    {
        Ok(out) if out.status.success() => {
            String::from_utf8_lossy(&out.stdout).trim().to_string()
        }
        _ => {
            tracing::warn!(path = %path.display(), "commit id unavailable");
            "unknown".to_string()
        }
    }
}

/// Total revision count, `0` when unavailable.
pub(crate) async fn revision_count(path: &Path) -> String {
    match Command::new("git")
        .args(["rev-list", "--all", "--count"])
        .current_dir(path)
        .output()
        .await
    {
        Ok(out) if out.status.success() => {
            String::from_utf8_lossy(&out.stdout).trim().to_string()
        }
        _ => "0".to_string(),
    }
}

/// Last tag in the repository, falling back to `1.0` for untagged
/// trees.
pub(crate) async fn last_tag(path: &Path) -> String {
    match Command::new("git")
        .args(["describe", "--abbrev=0", "--tags"])
        .current_dir(path)
        .output()
        .await
    {
        Ok(out) if out.status.success() => {
            let tag = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if tag.is_empty() {
                "1.0".to_string()
            } else {
                tag
            }
        }
        _ => "1.0".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{extracted_directories, GitFetcher, KNOWN_GOOD_RESPONSES, SENTINEL_FILE};

    #[test]
    fn sentinel_beats_output_matching() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!GitFetcher::check_response("irrelevant", dir.path()));
        std::fs::write(dir.path().join(SENTINEL_FILE), "{}").unwrap();
        assert!(GitFetcher::check_response("", dir.path()));
    }

    #[test]
    fn output_matching_is_the_fallback() {
        let dir = tempfile::tempdir().unwrap();
        for marker in KNOWN_GOOD_RESPONSES {
            assert!(GitFetcher::check_response(marker, dir.path()));
        }
        assert!(!GitFetcher::check_response("fatal: repository not found", dir.path()));
    }

    #[test]
    fn extracted_directories_skip_hidden() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("project")).unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(SENTINEL_FILE), "{}").unwrap();
        let dirs = extracted_directories(dir.path()).unwrap();
        assert_eq!(dirs.len(), 1);
        assert!(dirs[0].ends_with("project"));
    }

    #[test]
    fn key_enumeration_filters_by_owner_and_kind() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fwforge_config::Config::default();
        config.paths.ssh_keys = dir.path().to_path_buf();
        std::fs::write(dir.path().join("owner1-key"), "k").unwrap();
        std::fs::write(dir.path().join("owner1-key.pub"), "p").unwrap();
        std::fs::write(dir.path().join("owner2-key"), "k").unwrap();

        let fetcher = GitFetcher::new(&config);
        let keys = fetcher.key_paths_for_owner("owner1");
        assert_eq!(keys.len(), 1);
        assert!(keys[0].ends_with("owner1-key"));
    }
}
