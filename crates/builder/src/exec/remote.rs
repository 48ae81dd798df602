//! Remote build execution over the worker channel

use std::path::Path;
use std::sync::Arc;

use fwforge_events::{JobMessage, WorkerEvent, WorkerHandle};
use fwforge_store::StatsEvent;

use super::{process_exit_status, process_line, ExecContext};
use crate::cleanup::cleanup_secrets;

/// Dispatch the job to the connected worker and consume its events
/// until the terminal job status arrives. A worker that disconnects
/// without reporting leaves the build in progress from the log's
/// perspective; only the secrets are swept.
pub(crate) async fn run_remote(ctx: Arc<ExecContext>, worker: WorkerHandle, job: JobMessage) {
    let build_path = job.path.clone();
    tracing::debug!(job = ?job, "dispatching remote build");

    if !worker.dispatch(job) {
        tracing::error!("worker channel closed before dispatch");
        ctx.notifier.notify(
            &ctx.udid,
            &ctx.build_id,
            "ERROR: worker needs socket for remote builds",
            false,
        );
        ctx.stats
            .stats_log(&ctx.owner, StatsEvent::BuildFailed, &ctx.build_id);
        return;
    }

    loop {
        match worker.next_event().await {
            Some(WorkerEvent::Log { line }) => {
                process_line(&ctx, &line).await;
            }
            Some(WorkerEvent::JobStatus { status }) => {
                process_exit_status(&ctx, &status).await;
                cleanup_secrets(Path::new(&build_path));
                break;
            }
            None => {
                tracing::warn!(
                    build_id = %ctx.build_id,
                    "worker disconnected without job status"
                );
                cleanup_secrets(Path::new(&build_path));
                break;
            }
        }
    }
}
