//! Status notification fan-out
//!
//! Every significant transition goes to two independent sinks: the live
//! socket (if a client is connected and alive) and the durable build
//! log. Either may fail without affecting the other or the pipeline.

use std::sync::Arc;

use fwforge_events::{BuildNotification, LiveSocket, StatusKind};
use fwforge_store::BuildLogStore;
use serde_json::json;

/// The interested parties of one build invocation.
#[derive(Debug, Clone, Default)]
pub struct Notifiers {
    pub websocket: Option<LiveSocket>,
}

/// Per-build notifier bound to a live socket and the build log.
#[derive(Clone)]
pub struct Notifier {
    live: Option<LiveSocket>,
    log: Arc<dyn BuildLogStore>,
}

impl Notifier {
    pub fn new(notifiers: Notifiers, log: Arc<dyn BuildLogStore>) -> Self {
        Self {
            live: notifiers.websocket,
            log,
        }
    }

    /// Push a structured status notification to the live client.
    pub fn notify(&self, udid: &str, build_id: &str, message: &str, success: bool) {
        if message.is_empty() {
            tracing::error!("no message given in notify()");
            return;
        }
        let kind = StatusKind::for_message(message, success);
        let notification = BuildNotification::new(message, kind, udid, build_id);
        if let Some(live) = &self.live {
            live.send_if_alive(notification.to_frame());
        }
    }

    /// Completion frame for the UI; carries the final message alongside
    /// the fixed "Completed" body.
    pub fn ws_ok(&self, message: &str, udid: &str) {
        let Some(live) = &self.live else { return };
        let frame = json!({
            "notification": {
                "title": "Build Status",
                "body": "Completed",
                "type": "success",
                "udid": udid,
                "message": message,
            }
        });
        live.send_if_alive(frame.to_string());
    }

    /// Forward a raw build log line to the live client.
    pub fn forward_line(&self, line: &str) {
        if let Some(live) = &self.live {
            live.send_if_alive(line);
        }
    }

    /// Record a durable build log state. Log failures are warned and
    /// swallowed; the pipeline must not stall on the log store.
    pub async fn record(&self, build_id: &str, owner: &str, udid: &str, state: &str) {
        if let Err(err) = self.log.state(build_id, owner, udid, state).await {
            tracing::warn!(%err, build_id, state, "build log update failed");
        }
    }

    /// Append the initial durable build log record.
    pub async fn record_initial(&self, build_id: &str, owner: &str, udid: &str, state: &str) {
        if let Err(err) = self.log.log(build_id, owner, udid, state).await {
            tracing::warn!(%err, build_id, state, "build log append failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Notifier, Notifiers};
    use fwforge_events::LiveSocket;
    use fwforge_store::{BuildLogStore, MemoryBuildLog};
    use std::sync::Arc;

    #[tokio::test]
    async fn notify_renders_status_kind() {
        let (socket, mut rx) = LiveSocket::channel();
        let notifier = Notifier::new(
            Notifiers {
                websocket: Some(socket),
            },
            Arc::new(MemoryBuildLog::new()),
        );

        notifier.notify("u", "b", "Pulling repository", true);
        notifier.notify("u", "b", "git_fetch_failed", false);
        notifier.notify("u", "b", "OK", false);

        let first: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(first["notification"]["type"], "success");
        let second: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(second["notification"]["type"], "error");
        let third: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(third["notification"]["type"], "success");
    }

    #[tokio::test]
    async fn record_reaches_build_log() {
        let log = Arc::new(MemoryBuildLog::new());
        let notifier = Notifier::new(Notifiers::default(), log.clone());
        notifier.record_initial("b", "o", "u", "started").await;
        notifier.record("b", "o", "u", "error").await;
        assert_eq!(log.get("b").await.unwrap().unwrap().state, "error");
    }

    #[tokio::test]
    async fn no_socket_is_fine() {
        let notifier = Notifier::new(Notifiers::default(), Arc::new(MemoryBuildLog::new()));
        notifier.notify("u", "b", "Building...", true);
        notifier.ws_ok("OK", "u");
        notifier.forward_line("line");
    }
}
