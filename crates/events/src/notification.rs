//! Build status notifications and the live socket sink

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Severity/kind of a status notification, rendered into the payload's
/// `type` field for the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Info,
    Success,
    Error,
}

impl StatusKind {
    /// Map a success flag to its display kind.
    #[must_use]
    pub fn from_success(success: bool) -> Self {
        if success {
            Self::Success
        } else {
            Self::Error
        }
    }

    /// Derive the kind for a status message: in-progress messages are
    /// informational, the literal `OK` is a success regardless of the
    /// flag, everything else follows the flag.
    #[must_use]
    pub fn for_message(message: &str, success: bool) -> Self {
        if message.contains("build_running") {
            return Self::Info;
        }
        if message == "OK" {
            return Self::Success;
        }
        Self::from_success(success)
    }
}

/// Structured build status notification delivered to the live client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildNotification {
    pub title: String,
    pub body: String,
    #[serde(rename = "type")]
    pub kind: StatusKind,
    pub udid: String,
    pub build_id: String,
}

impl BuildNotification {
    #[must_use]
    pub fn new(
        message: impl Into<String>,
        kind: StatusKind,
        udid: impl Into<String>,
        build_id: impl Into<String>,
    ) -> Self {
        Self {
            title: "Build Status".to_string(),
            body: message.into(),
            kind,
            udid: udid.into(),
            build_id: build_id.into(),
        }
    }

    /// Render the socket frame: `{"notification": {...}}`.
    #[must_use]
    pub fn to_frame(&self) -> String {
        #[derive(Serialize)]
        struct Envelope<'a> {
            notification: &'a BuildNotification,
        }
        serde_json::to_string(&Envelope { notification: self })
            .unwrap_or_else(|_| String::from("{}"))
    }
}

/// Receiving half of a live socket channel.
pub type LiveReceiver = mpsc::UnboundedReceiver<String>;

/// Best-effort text-frame sink representing a connected UI client.
///
/// The socket may die at any time; senders check liveness and swallow
/// send failures. Cloning shares the underlying channel and flag.
#[derive(Debug, Clone)]
pub struct LiveSocket {
    tx: mpsc::UnboundedSender<String>,
    alive: Arc<AtomicBool>,
}

impl LiveSocket {
    /// Create a connected socket pair; the receiver is handed to the
    /// transport layer that writes frames out.
    #[must_use]
    pub fn channel() -> (Self, LiveReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                alive: Arc::new(AtomicBool::new(true)),
            },
            rx,
        )
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Relaxed);
    }

    /// Push a frame if the client is still there. Dead sockets are
    /// skipped silently; a closed channel marks the socket dead.
    pub fn send_if_alive(&self, frame: impl Into<String>) {
        if !self.is_alive() {
            tracing::debug!("skipping dead socket notification");
            return;
        }
        if self.tx.send(frame.into()).is_err() {
            self.set_alive(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BuildNotification, LiveSocket, StatusKind};

    #[test]
    fn status_kind_derivation() {
        assert_eq!(StatusKind::for_message("build_running", true), StatusKind::Info);
        assert_eq!(StatusKind::for_message("OK", false), StatusKind::Success);
        assert_eq!(StatusKind::for_message("Completed", true), StatusKind::Success);
        assert_eq!(
            StatusKind::for_message("git_fetch_failed", false),
            StatusKind::Error
        );
    }

    #[test]
    fn frame_envelope_shape() {
        let n = BuildNotification::new("Pulling repository", StatusKind::Info, "u", "b");
        let frame = n.to_frame();
        let v: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(v["notification"]["title"], "Build Status");
        assert_eq!(v["notification"]["type"], "info");
        assert_eq!(v["notification"]["build_id"], "b");
    }

    #[test]
    fn dead_socket_is_skipped() {
        let (socket, mut rx) = LiveSocket::channel();
        socket.send_if_alive("one");
        socket.set_alive(false);
        socket.send_if_alive("two");
        assert_eq!(rx.try_recv().unwrap(), "one");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_receiver_marks_dead() {
        let (socket, rx) = LiveSocket::channel();
        drop(rx);
        socket.send_if_alive("frame");
        assert!(!socket.is_alive());
    }
}
