//! Build command execution
//!
//! Local mode spawns the builder CLI and streams its output; remote
//! mode dispatches a job over the worker channel and consumes the
//! worker's log/status events. Both modes share the same line
//! processing: a success sentinel in the output wins immediately, and
//! secrets are cleaned from the build path on every terminal.

mod local;
mod remote;

pub(crate) use local::run_local;
pub(crate) use remote::run_remote;

use std::sync::Arc;

use fwforge_config::Config;
use fwforge_store::{OwnerStore, SourceField, StatsSink};
use fwforge_types::status;

use crate::cleanup::cleanup_device_repositories;
use crate::notify::Notifier;

/// Output lines signalling a successful build; the old and the new
/// spelling of the builder CLI.
const SUCCESS_SENTINELS: [&str; 2] = ["STATUS OK", "status: OK"];

/// Everything line/exit processing needs about the build in flight.
pub(crate) struct ExecContext {
    pub config: Arc<Config>,
    pub owner: String,
    pub build_id: String,
    pub udid: String,
    pub source_id: String,
    /// Git tag recorded as the source's `last_build` on success.
    pub version: String,
    pub notifier: Notifier,
    pub owners: Arc<dyn OwnerStore>,
    pub stats: Arc<dyn StatsSink>,
}

/// Handle one build output line: success sentinel detection plus
/// forwarding to the live client.
pub(crate) async fn process_line(ctx: &ExecContext, line: &str) {
    if line.len() <= 1 {
        return;
    }
    tracing::debug!(build_id = %ctx.build_id, "»» {line}");

    if SUCCESS_SENTINELS.iter().any(|s| line.contains(s)) {
        ctx.notifier
            .notify(&ctx.udid, &ctx.build_id, "Completed", true);
        ctx.notifier
            .record(&ctx.build_id, &ctx.owner, &ctx.udid, status::SUCCESS)
            .await;
        ctx.notifier.ws_ok("Build successful.", &ctx.udid);

        if let Err(err) = ctx
            .owners
            .update_source(
                &ctx.owner,
                &ctx.source_id,
                SourceField::LastBuild(ctx.version.clone()),
            )
            .await
        {
            tracing::warn!(%err, "last_build update failed");
        }
    }

    ctx.notifier.forward_line(line);
}

/// Handle a stderr line; a fatal git message marks the build failed in
/// the durable log.
pub(crate) async fn process_error_line(ctx: &ExecContext, line: &str) {
    tracing::debug!(build_id = %ctx.build_id, "[STDERR] {line}");
    if line.contains("fatal:") {
        ctx.notifier
            .record(&ctx.build_id, &ctx.owner, &ctx.udid, status::FAILED)
            .await;
    }
}

/// Handle the terminal status of a build: stale-repo purge on success,
/// notification, and a durable record for anything that is not `OK`.
pub(crate) async fn process_exit_status(ctx: &ExecContext, exit_status: &str) {
    if exit_status.starts_with(status::OK) {
        cleanup_device_repositories(&ctx.config, &ctx.owner, &ctx.udid, &ctx.build_id);
    }
    ctx.notifier
        .notify(&ctx.udid, &ctx.build_id, exit_status, false);
    if exit_status != status::OK {
        ctx.notifier
            .record(&ctx.build_id, &ctx.owner, &ctx.udid, exit_status)
            .await;
    }
    ctx.notifier.ws_ok(exit_status, &ctx.udid);
}
