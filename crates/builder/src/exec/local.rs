//! Local build execution

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use fwforge_store::StatsEvent;
use fwforge_types::status;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{process_error_line, process_exit_status, process_line, ExecContext};
use crate::cleanup::cleanup_secrets;
use crate::command::BuildCommand;

/// Spawn the builder CLI and drive it to completion. Output is
/// processed line by line as it arrives; the exit code only matters
/// when no success sentinel was seen. The build path is always swept
/// for secrets afterwards.
pub(crate) async fn run_local(ctx: Arc<ExecContext>, command: BuildCommand, xbuild_path: PathBuf) {
    let mut cmd = command.to_tokio();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            tracing::error!(%err, program = %command.program.display(), "builder spawn failed");
            ctx.notifier
                .notify(&ctx.udid, &ctx.build_id, "error_starting_build", false);
            ctx.notifier
                .record(&ctx.build_id, &ctx.owner, &ctx.udid, status::ERROR)
                .await;
            ctx.stats
                .stats_log(&ctx.owner, StatsEvent::BuildFailed, &ctx.build_id);
            cleanup_secrets(&xbuild_path);
            return;
        }
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let stderr_task = stderr.map(|stderr| {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                process_error_line(&ctx, &line).await;
            }
        })
    });

    if let Some(stdout) = stdout {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            process_line(&ctx, &line).await;
        }
    }

    let exit = child.wait().await;
    if let Some(task) = stderr_task {
        let _ = task.await;
    }

    match exit {
        Ok(exit_status) => {
            let code = exit_status.code().unwrap_or(-1);
            tracing::debug!(owner = %ctx.owner, code, "local build completed");
            // success is signalled by the sentinel line, not the code
            if code != 0 {
                process_exit_status(&ctx, &code.to_string()).await;
            }
        }
        Err(err) => {
            tracing::error!(%err, "builder wait failed");
            process_exit_status(&ctx, status::ERROR).await;
        }
    }

    cleanup_secrets(&xbuild_path);
}
