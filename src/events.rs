//! Backend push events and the subscription bus
//!
//! The supervisor emits lifecycle and progress events fire-and-forget; the
//! control plane consumes them through a broadcast bus. Subscriptions are
//! scoped: the guard returned from an attach releases the stream on drop.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::session::SessionState;

/// Named stage of the backend's long-running install operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallStage {
    DownloadRoblox,
    DownloadIpa,
    InstallRoblox,
    InstallIpa,
    DownloadInsertDylib,
    InstallInsertDylib,
    DownloadDylib,
    InsertDylib,
    ConvertIpa,
    ApplyCodesign,
    RemoveCodesign,
}

/// Progress event for an in-flight install. `progress` carries
/// `(downloaded, total)` bytes for the download stages, `None` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallProgress {
    pub stage: InstallStage,
    pub progress: Option<(u64, u64)>,
}

/// Close notification for a profile's external process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseEvent {
    pub profile_id: String,
    pub pid: u32,
    pub exit_code: i32,
}

/// Ad hoc operator notice pushed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub enum Event {
    ProcessOpened(SessionState),
    ProcessClosed(CloseEvent),
    InstallProgress(InstallProgress),
    Message(Message),
}

/// Broadcast fan-out for backend events. Publishing never blocks; events
/// published with no live subscriber are dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn publish(&self, event: Event) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Event published with no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped handle for an attached event pump. Dropping it releases the
/// subscription; handlers receive nothing past that point.
#[derive(Debug)]
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn new(handle: JoinHandle<()>) -> Self {
        Self { handle }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
