#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Event and notification plumbing for fwforge
//!
//! Status flows through two kinds of channels: a live socket carrying
//! text frames to an interested UI client, and a worker channel carrying
//! build jobs to a remote worker and log/status events back. Both are
//! tokio unbounded channels; delivery is best-effort and send errors are
//! swallowed — a closed receiver must never stall the build pipeline.

mod notification;
mod worker;

pub use notification::{BuildNotification, LiveReceiver, LiveSocket, StatusKind};
pub use worker::{JobMessage, WorkerEvent, WorkerHandle, WorkerJobReceiver};
