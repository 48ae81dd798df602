//! Build orchestration
//!
//! [`Builder::build`] resolves the target device and git coordinates
//! and stamps the device's current-build pointer; [`Builder::run_build`]
//! then drives the pipeline in strict order: fetch, verify, configure,
//! execute. The returned [`BuildStarted`] signals acceptance — terminal
//! status flows through the notifier and the durable build log only.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use fwforge_config::Config;
use fwforge_errors::{BuildError, Error};
use fwforge_events::{JobMessage, WorkerHandle};
use fwforge_store::{
    ApiKeyProvider, BuildLogStore, DeviceStore, EnvProvider, FsPlatformDetector, MemoryApiKeys,
    MemoryBuildLog, MemoryDeviceStore, MemoryEnvs, MemoryOwnerStore, MemoryStats, OwnerStore,
    PlatformDetector, SourceField, StatsEvent, StatsSink,
};
use fwforge_types::{new_build_id, status, BuildRequest, BuildStarted, BuildTrigger};

use crate::cleanup::cleanup_secrets;
use crate::command::{BuildCommand, CommandSpec};
use crate::descriptor::{self, DescriptorContext};
use crate::exec::{run_local, run_remote, ExecContext};
use crate::git::{self, GitFetcher};
use crate::header;
use crate::notify::{Notifier, Notifiers};
use crate::policy::BuildPolicy;

/// Firmware build orchestrator.
///
/// Holds the process-wide configuration and the collaborator stores.
/// Constructed once at startup; cheap to clone.
#[derive(Clone)]
pub struct Builder {
    config: Arc<Config>,
    devices: Arc<dyn DeviceStore>,
    owners: Arc<dyn OwnerStore>,
    api_keys: Arc<dyn ApiKeyProvider>,
    envs: Arc<dyn EnvProvider>,
    build_log: Arc<dyn BuildLogStore>,
    stats: Arc<dyn StatsSink>,
    detector: Arc<dyn PlatformDetector>,
}

impl Builder {
    /// Create a builder with in-memory collaborators. Production
    /// embeddings replace them with the `with_*` setters.
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            devices: Arc::new(MemoryDeviceStore::new()),
            owners: Arc::new(MemoryOwnerStore::new()),
            api_keys: Arc::new(MemoryApiKeys::new()),
            envs: Arc::new(MemoryEnvs::new()),
            build_log: Arc::new(MemoryBuildLog::new()),
            stats: Arc::new(MemoryStats::new()),
            detector: Arc::new(FsPlatformDetector::new()),
        }
    }

    /// Set the device store
    #[must_use]
    pub fn with_devices(mut self, devices: Arc<dyn DeviceStore>) -> Self {
        self.devices = devices;
        self
    }

    /// Set the owner store
    #[must_use]
    pub fn with_owners(mut self, owners: Arc<dyn OwnerStore>) -> Self {
        self.owners = owners;
        self
    }

    /// Set the API key provider
    #[must_use]
    pub fn with_api_keys(mut self, api_keys: Arc<dyn ApiKeyProvider>) -> Self {
        self.api_keys = api_keys;
        self
    }

    /// Set the environment variable provider
    #[must_use]
    pub fn with_envs(mut self, envs: Arc<dyn EnvProvider>) -> Self {
        self.envs = envs;
        self
    }

    /// Set the durable build log
    #[must_use]
    pub fn with_build_log(mut self, build_log: Arc<dyn BuildLogStore>) -> Self {
        self.build_log = build_log;
        self
    }

    /// Set the metrics sink
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<dyn StatsSink>) -> Self {
        self.stats = stats;
        self
    }

    /// Set the platform detector
    #[must_use]
    pub fn with_detector(mut self, detector: Arc<dyn PlatformDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Resolve a build trigger into a concrete build request and run
    /// it.
    ///
    /// Validates the trigger, finds the target device among the owner's
    /// devices, resolves git coordinates from the owner's stored
    /// sources, picks the transmit key, and stamps the device record
    /// with the new build id before any work starts — a concurrent
    /// reader observes the new pointer immediately.
    ///
    /// # Errors
    ///
    /// Returns the named failure reason for every rejected request; see
    /// `BuildError` for the full taxonomy.
    pub async fn build(
        &self,
        owner: &str,
        trigger: BuildTrigger,
        notifiers: Notifiers,
        worker: Option<WorkerHandle>,
    ) -> Result<BuildStarted, Error> {
        let build_id = new_build_id();

        let Some(raw_udid) = trigger.udid else {
            return Err(BuildError::MissingDeviceUdid.into());
        };
        let Some(source_id) = trigger.source_id else {
            return Err(BuildError::MissingSourceId.into());
        };
        if owner.is_empty() {
            return Err(BuildError::MissingOwner.into());
        }

        let udid =
            fwforge_sanitize::udid(&raw_udid).ok_or(BuildError::DeviceNotFound)?;

        let devices = self.devices.list_by_owner(owner).await?;
        let device = devices
            .into_iter()
            .find(|d| d.udid == udid)
            .ok_or(BuildError::DeviceNotFound)?;

        let owner_record = self
            .owners
            .get(owner)
            .await
            .map_err(|_| Error::from(BuildError::NoSuchOwner))?;

        // Global transmit key by default; the owner's own key wins.
        let transmit_key = owner_record
            .transmit_key
            .clone()
            .or_else(|| self.config.security.transmit_key.clone());

        let (git_url, branch, is_private) = match owner_record.source(&source_id) {
            Some((_, source)) => (
                source.url.clone(),
                source.branch.clone(),
                source.is_private,
            ),
            None => (String::new(), String::new(), false),
        };
        if git_url.is_empty() {
            return Err(BuildError::InvalidParams.into());
        }
        let branch = if branch.is_empty() {
            "origin/main".to_string()
        } else {
            branch
        };

        self.devices
            .set_current_build(&device.udid, &build_id)
            .await
            .map_err(|err| {
                tracing::error!(%err, "device build stamp failed");
                Error::from(BuildError::DeviceModFailed)
            })?;

        let request = BuildRequest {
            build_id,
            source_id,
            owner: owner.to_string(),
            git: git_url,
            branch,
            udid: device.udid.clone(),
            dryrun: trigger.dryrun,
            worker,
            is_private,
        };
        self.run_build(request, notifiers, transmit_key).await
    }

    /// Execute the build pipeline for an already-resolved request.
    ///
    /// Stages run strictly in order; every failure after the initial
    /// durable `started` record reaches the build log as `error` or a
    /// specific reason. Once credentials have been written into the
    /// build tree, every exit path sweeps them out again.
    ///
    /// # Errors
    ///
    /// Returns the named failure reason for the stage that rejected the
    /// build.
    #[allow(clippy::too_many_lines)]
    pub async fn run_build(
        &self,
        request: BuildRequest,
        notifiers: Notifiers,
        transmit_key: Option<String>,
    ) -> Result<BuildStarted, Error> {
        let start = Instant::now();
        let notifier = Notifier::new(notifiers, self.build_log.clone());

        tracing::info!(build_id = %request.build_id, owner = %request.owner, "build started");

        // A remote build without a connected worker fails before any
        // filesystem action; local execution exists for test mode only.
        if request.worker.is_none() && !self.config.build.test_mode {
            self.stats
                .stats_log(&request.owner, StatsEvent::BuildFailed, &request.build_id);
            return Err(BuildError::WorkersNotReady.into());
        }

        if request.owner.is_empty() {
            self.stats
                .stats_log(&request.owner, StatsEvent::BuildFailed, &request.build_id);
            return Err(BuildError::OwnerUndefined.into());
        }
        if request.git.is_empty() {
            self.stats
                .stats_log(&request.owner, StatsEvent::BuildFailed, &request.build_id);
            return Err(BuildError::GitUndefined.into());
        }
        if request.branch.is_empty() {
            self.stats
                .stats_log(&request.owner, StatsEvent::BuildFailed, &request.build_id);
            return Err(BuildError::BranchUndefined.into());
        }

        if request.build_id.len() > 64 {
            return Err(BuildError::InvalidBuildId.into());
        }
        // the build id becomes a path component below; re-validate
        let Some(path_build_id) = fwforge_sanitize::path_component(&request.build_id) else {
            return Err(BuildError::InvalidBuildId.into());
        };

        notifier
            .record_initial(
                &request.build_id,
                &request.owner,
                &request.udid,
                status::STARTED,
            )
            .await;

        tracing::debug!(udid = %request.udid, "fetching device");
        let device = self.devices.get(&request.udid).await.map_err(|err| {
            tracing::error!(%err, "device lookup failed");
            Error::from(BuildError::NoSuchUdid)
        })?;

        let build_path = self
            .config
            .build_path(&device.owner, &device.udid, &path_build_id);

        // Builds embed authentication; no key, no build.
        let api_key = match self.api_keys.last_api_key(&request.owner).await {
            Ok(Some(key)) => key,
            _ => {
                record_error(&notifier, &request).await;
                return Err(BuildError::RequiresApiKey.into());
            }
        };

        if let Err(err) = create_build_path(&build_path).await {
            record_error(&notifier, &request).await;
            return Err(err);
        }
        tracing::debug!(path = %build_path.display(), "build path created");

        notifier.notify(&request.udid, &request.build_id, status::PULLING, true);

        let Some(sanitized_branch) = fwforge_sanitize::branch(Some(request.branch.as_str())) else {
            record_error(&notifier, &request).await;
            return Err(BuildError::InvalidParams.into());
        };
        let Some(sanitized_url) = fwforge_sanitize::url(&request.git) else {
            record_error(&notifier, &request).await;
            return Err(BuildError::InvalidParams.into());
        };

        let fetcher = GitFetcher::new(&self.config);
        if !request.is_private {
            fetcher
                .prefetch_public(&build_path, &sanitized_url, &sanitized_branch)
                .await;
        }
        if !GitFetcher::sentinel_exists(&build_path) {
            let fetched = fetcher
                .fetch_private(
                    &request.owner,
                    &build_path,
                    &sanitized_url,
                    &sanitized_branch,
                )
                .await;
            if !fetched {
                tracing::error!(
                    build_id = %request.build_id,
                    owner = %request.owner,
                    "git fetch failed for all identities"
                );
                record_error(&notifier, &request).await;
                return Err(BuildError::GitFetchFailed.into());
            }
            // Keyed fetch succeeded where the public one did not; mark
            // the source private so future builds skip the public
            // attempt.
            if let Err(err) = self
                .owners
                .update_source(
                    &request.owner,
                    &request.source_id,
                    SourceField::IsPrivate(true),
                )
                .await
            {
                tracing::warn!(%err, "repo privacy status update failed");
            }
        }

        if git::checkout_is_empty(&build_path) {
            record_error(&notifier, &request).await;
            return Err(BuildError::GitFetchFailedPrivate.into());
        }

        // Exactly one non-hidden project directory is the contract.
        let mut dirs = match git::extracted_directories(&build_path) {
            Ok(dirs) => dirs,
            Err(err) => {
                record_error(&notifier, &request).await;
                return Err(err);
            }
        };
        if dirs.len() != 1 {
            let count = dirs.len();
            tracing::error!(count, "expected exactly one extracted project directory");
            record_error(&notifier, &request).await;
            return Err(BuildError::AmbiguousCheckout { count }.into());
        }
        let xbuild_path = dirs.remove(0);
        tracing::debug!(path = %xbuild_path.display(), "project directory");

        if let Err(err) = self.detector.detect(&xbuild_path).await {
            tracing::error!(%err, "platform detection failed");
            notifier.notify(
                &request.udid,
                &request.build_id,
                "error_platform_unknown",
                false,
            );
            record_error(&notifier, &request).await;
            return Err(BuildError::UnknownPlatform {
                platform: "unknown".to_string(),
            }
            .into());
        }

        // Firmware vs. device MCU compatibility, from the build policy.
        let policy = match BuildPolicy::load(&xbuild_path) {
            Ok(policy) => policy,
            Err(err) => {
                record_error(&notifier, &request).await;
                return Err(err);
            }
        };
        let mut y_platform = device.platform_family().to_string();
        if let Some(policy) = &policy {
            if let Some(platform_key) = policy.platform_key() {
                y_platform = platform_key;
            }
            if let (Some(arch), Some(mcu)) = (policy.arch(), device.platform_mcu()) {
                if arch.contains(mcu) {
                    tracing::debug!(arch, mcu, "MCU is compatible");
                } else {
                    let err = BuildError::McuIncompatible {
                        declared: arch,
                        device: mcu.to_string(),
                    };
                    notifier.notify(&request.udid, &request.build_id, &err.to_string(), false);
                    record_error(&notifier, &request).await;
                    return Err(err.into());
                }
            }
        }

        // Credentials go into the build tree here. From this point on,
        // every exit path must clear the repo secrets.
        if let Some(mut policy) = policy {
            if let Some(tkey) = transmit_key.as_deref() {
                let ssid = device
                    .environment
                    .as_ref()
                    .and_then(|e| e.cssid.as_deref())
                    .and_then(|c| fwforge_secrets::decrypt(tkey, c));
                let pass = device
                    .environment
                    .as_ref()
                    .and_then(|e| e.cpass.as_deref())
                    .and_then(|c| fwforge_secrets::decrypt(tkey, c));
                policy.inject_credentials(tkey, ssid.as_deref(), pass.as_deref());
                if let Err(err) = policy.save(&xbuild_path) {
                    tracing::error!(%err, "policy rewrite failed");
                    record_error(&notifier, &request).await;
                    cleanup_secrets(&xbuild_path);
                    return Err(BuildError::ConfiguringBuild.into());
                }
            } else {
                tracing::warn!(
                    "no transmit key; environment variables in build will not be secured"
                );
            }
        }

        // Device-specific envs exported for the toolchain; also on the
        // cleanup list.
        if let Some(environment) = &device.environment {
            let env_file = xbuild_path.join("environment.json");
            match serde_json::to_string(environment) {
                Ok(content) => {
                    if let Err(err) = std::fs::write(&env_file, content) {
                        tracing::warn!(%err, "environment export failed");
                    }
                }
                Err(err) => tracing::warn!(%err, "environment serialization failed"),
            }
        }

        let platform_descriptor =
            match descriptor::load_platform_descriptor(&self.config, &y_platform) {
                Ok(descriptor) => descriptor,
                Err(err) => {
                    tracing::error!(%err, platform = %y_platform, "no platform descriptor");
                    record_error(&notifier, &request).await;
                    cleanup_secrets(&xbuild_path);
                    return Err(err);
                }
            };

        let commit_id = git::commit_id(&xbuild_path).await;
        let revision = git::revision_count(&xbuild_path).await;
        let git_tag = git::last_tag(&xbuild_path).await;
        tracing::debug!(
            version = %format!("{}.{}", git_tag.trim(), revision.trim()),
            "repository version"
        );

        let (env_ok, api_envs) = match self.envs.list(&request.owner).await {
            Ok(envs) => (true, envs),
            Err(err) => {
                // must not be blocking
                tracing::warn!(%err, "environment listing failed");
                (false, Vec::new())
            }
        };

        let thinx_json = match descriptor::generate(
            &self.config,
            &DescriptorContext {
                device: &device,
                api_key: &api_key,
                commit_id: &commit_id,
                git_tag: &git_tag,
                xbuild_path: &xbuild_path,
                api_envs: &api_envs,
            },
        ) {
            Ok(value) => value,
            Err(err) => {
                tracing::error!(%err, "descriptor generation failed");
                record_error(&notifier, &request).await;
                cleanup_secrets(&xbuild_path);
                return Err(BuildError::ConfiguringBuild.into());
            }
        };

        if descriptor::write(&xbuild_path, &thinx_json).is_err() {
            record_error(&notifier, &request).await;
            notifier.notify(
                &request.udid,
                &request.build_id,
                "error_configuring_build",
                false,
            );
            cleanup_secrets(&xbuild_path);
            return Err(BuildError::ConfiguringBuild.into());
        }

        // Compiled platforms get the descriptor again as a header; a
        // missing header target degrades to "header not written".
        if !header::EXCLUDED_PLATFORMS.contains(&y_platform.as_str()) {
            match header::find_header_file(&xbuild_path, &platform_descriptor.header) {
                Some(header_path) => {
                    tracing::debug!(header = %header_path.display(), "generating header");
                    if let Err(err) = header::convert(&thinx_json, &header_path) {
                        tracing::warn!(%err, "header generation failed");
                        record_error(&notifier, &request).await;
                    }
                }
                None => {
                    tracing::error!(
                        header = %platform_descriptor.header,
                        platform = %y_platform,
                        "no header file to write"
                    );
                }
            }
        }

        let fcid = device.fcid.clone().unwrap_or_else(|| "000000".to_string());
        let spec = CommandSpec {
            owner: &request.owner,
            udid: &request.udid,
            fcid: &fcid,
            mac: &device.mac,
            git: &sanitized_url,
            branch: &sanitized_branch,
            build_id: &request.build_id,
            workdir: &xbuild_path,
            dry_run: request.dryrun,
            env_vars: if env_ok { api_envs.as_slice() } else { &[] },
        };
        let command = match if request.worker.is_some() {
            BuildCommand::remote(&spec)
        } else {
            BuildCommand::local(&self.config, &spec)
        } {
            Ok(command) => command,
            Err(err) => {
                record_error(&notifier, &request).await;
                cleanup_secrets(&xbuild_path);
                return Err(err);
            }
        };

        tracing::debug!(argv = ?command.argv(), "building with command");
        notifier.notify(&request.udid, &request.build_id, status::BUILDING, true);

        let seconds = start.elapsed().as_secs();
        tracing::debug!(seconds, "build preparation stage finished");

        self.stats
            .stats_log(&request.owner, StatsEvent::BuildStarted, &request.build_id);

        let ctx = Arc::new(ExecContext {
            config: self.config.clone(),
            owner: request.owner.clone(),
            build_id: request.build_id.clone(),
            udid: request.udid.clone(),
            source_id: request.source_id.clone(),
            version: git_tag.trim().to_string(),
            notifier,
            owners: self.owners.clone(),
            stats: self.stats.clone(),
        });

        // Acceptance is returned before the toolchain runs; the spawned
        // task owns all further status reporting.
        if let Some(worker) = request.worker.clone() {
            let job = JobMessage {
                mock: false,
                build_id: request.build_id.clone(),
                source_id: request.source_id.clone(),
                owner: request.owner.clone(),
                udid: request.udid.clone(),
                path: build_path.display().to_string(),
                cmd: command.argv(),
                secret: self.config.security.worker_secret.clone(),
            };
            tokio::spawn(run_remote(ctx, worker, job));
        } else {
            tokio::spawn(run_local(ctx, command, xbuild_path.clone()));
        }

        Ok(BuildStarted::new(request.build_id))
    }
}

/// Record the generic `error` terminal for a failure that happened
/// after the initial `started` log entry.
async fn record_error(notifier: &Notifier, request: &BuildRequest) {
    notifier
        .record(&request.build_id, &request.owner, &request.udid, status::ERROR)
        .await;
}

/// Create the per-build directory tree with group-writable leaf
/// permissions.
async fn create_build_path(path: &Path) -> Result<(), Error> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o766);
        if let Err(err) = std::fs::set_permissions(path, perms) {
            tracing::warn!(%err, path = %path.display(), "build path chmod failed");
        }
    }
    Ok(())
}
