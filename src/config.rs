//! Persisted configuration and its read/write flows

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::bridge::Bridge;
use crate::clients::ClientVariant;
use crate::notifications::{NotificationQueue, UserAction};

pub const DECOMPILERS: [&str; 2] = ["medal", "konstant"];

/// A tracked installation: present in `clients` iff the variant is installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRecord {
    pub name: String,
    pub version: String,
}

/// Persisted settings, written back through the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Must name an installed client or stay null.
    #[serde(rename = "activeClientName")]
    pub active_client: Option<String>,
    pub clients: Vec<InstallRecord>,
    #[serde(rename = "decompilerChoice")]
    pub decompiler: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            active_client: None,
            clients: Vec::new(),
            decompiler: "medal".into(),
        }
    }
}

/// Plain in-memory holder for the persisted config.
#[derive(Debug, Default)]
pub struct ConfigStore {
    config: Mutex<Config>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Config {
        self.config.lock().clone()
    }

    pub fn set(&self, config: Config) {
        *self.config.lock() = config;
    }

    pub fn installed(&self) -> Vec<InstallRecord> {
        self.config.lock().clients.clone()
    }

    pub fn is_installed(&self, client: ClientVariant) -> bool {
        self.config
            .lock()
            .clients
            .iter()
            .any(|record| record.name == client.as_str())
    }

    pub fn record_of(&self, client: ClientVariant) -> Option<InstallRecord> {
        self.config
            .lock()
            .clients
            .iter()
            .find(|record| record.name == client.as_str())
            .cloned()
    }

    pub fn active_client(&self) -> Option<ClientVariant> {
        self.config
            .lock()
            .active_client
            .as_deref()
            .and_then(|name| name.parse().ok())
    }
}

/// Config round-trips through the backend, with the local store as the view
/// of record in between.
#[derive(Clone)]
pub struct ConfigService {
    bridge: Arc<dyn Bridge>,
    store: Arc<ConfigStore>,
    queue: Arc<NotificationQueue>,
}

impl ConfigService {
    pub fn new(
        bridge: Arc<dyn Bridge>,
        store: Arc<ConfigStore>,
        queue: Arc<NotificationQueue>,
    ) -> Self {
        Self {
            bridge,
            store,
            queue,
        }
    }

    /// Loads the persisted config. On failure the user is offered a reset,
    /// which dispatches `UserAction::ResetConfig`.
    pub async fn read(&self) -> bool {
        match self.bridge.read_config().await {
            Ok(config) => {
                self.store.set(config);
                true
            }
            Err(err) => {
                self.queue.show_confirmation(
                    "Failed to read config",
                    format!("{err} Would you like to reset the config?"),
                    Some(UserAction::ResetConfig),
                );
                false
            }
        }
    }

    /// Applies the config locally first, then persists it. A failed persist
    /// surfaces one modal and reports false; the local state keeps the new
    /// value so the UI stays consistent with what the user chose.
    pub async fn write(&self, config: Config) -> bool {
        self.store.set(config.clone());

        if let Err(err) = self.bridge.write_config(&config).await {
            self.queue.show_error("Failed to write config", err);
            return false;
        }
        true
    }

    pub async fn reset(&self) -> bool {
        self.write(Config::default()).await
    }

    /// Rotates the active client through the installed list, ending on none.
    pub async fn cycle_active_client(&self) {
        let config = self.store.get();
        if config.clients.is_empty() {
            self.queue.show_error(
                "No client installation found",
                "Please install a client from the settings tab before selecting one!",
            );
            return;
        }

        let position = config
            .active_client
            .as_deref()
            .and_then(|name| config.clients.iter().position(|record| record.name == name));

        let next = match position {
            None => config.clients.first().map(|record| record.name.clone()),
            Some(index) => {
                let wrapped = (index + 1) % config.clients.len();
                if wrapped == 0 {
                    None
                } else {
                    config.clients.get(wrapped).map(|record| record.name.clone())
                }
            }
        };

        self.write(Config {
            active_client: next,
            ..config
        })
        .await;
    }

    /// Rotates the decompiler choice, informing the backend before persisting.
    pub async fn switch_decompiler(&self) {
        let config = self.store.get();
        let index = DECOMPILERS
            .iter()
            .position(|choice| *choice == config.decompiler)
            .unwrap_or(0);
        let next = DECOMPILERS[(index + 1) % DECOMPILERS.len()].to_owned();

        if let Err(err) = self.bridge.update_decompiler(&next).await {
            self.queue.show_error("Failed to switch decompiler", err);
            return;
        }

        self.write(Config {
            decompiler: next,
            ..config
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::mock::MockBridge;

    fn service(bridge: Arc<MockBridge>) -> (ConfigService, Arc<ConfigStore>, Arc<NotificationQueue>) {
        let store = Arc::new(ConfigStore::new());
        let queue = Arc::new(NotificationQueue::new());
        (
            ConfigService::new(bridge, Arc::clone(&store), Arc::clone(&queue)),
            store,
            queue,
        )
    }

    fn installed(names: &[&str]) -> Vec<InstallRecord> {
        names
            .iter()
            .map(|name| InstallRecord {
                name: (*name).to_owned(),
                version: "1".into(),
            })
            .collect()
    }

    #[test]
    fn persisted_field_names() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("\"activeClientName\":null"));
        assert!(json.contains("\"decompilerChoice\":\"medal\""));
    }

    #[tokio::test]
    async fn read_failure_offers_reset() {
        let bridge = Arc::new(MockBridge::new());
        bridge.fail_on("read_config", "corrupt");
        let (service, _store, queue) = service(bridge);

        assert!(!service.read().await);
        let modal = queue.active().unwrap();
        assert_eq!(modal.title, "Failed to read config");
        assert_eq!(
            queue.press(modal.id, 1),
            Some(UserAction::ResetConfig)
        );
    }

    #[tokio::test]
    async fn write_failure_keeps_local_state_and_reports_once() {
        let bridge = Arc::new(MockBridge::new());
        bridge.fail_on("write_config", "read-only volume");
        let (service, store, queue) = service(bridge);

        let config = Config {
            clients: installed(&["Vanilla"]),
            ..Config::default()
        };
        assert!(!service.write(config.clone()).await);
        assert_eq!(store.get(), config);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.active().unwrap().title, "Failed to write config");
    }

    #[tokio::test]
    async fn cycling_walks_installed_then_none() {
        let bridge = Arc::new(MockBridge::new());
        let (service, store, _queue) = service(bridge);
        store.set(Config {
            clients: installed(&["Vanilla", "MacSploit"]),
            ..Config::default()
        });

        service.cycle_active_client().await;
        assert_eq!(store.get().active_client.as_deref(), Some("Vanilla"));
        service.cycle_active_client().await;
        assert_eq!(store.get().active_client.as_deref(), Some("MacSploit"));
        service.cycle_active_client().await;
        assert_eq!(store.get().active_client, None);
    }

    #[tokio::test]
    async fn cycling_with_nothing_installed_notifies() {
        let bridge = Arc::new(MockBridge::new());
        let (service, store, queue) = service(bridge);

        service.cycle_active_client().await;
        assert_eq!(store.get().active_client, None);
        assert_eq!(
            queue.active().unwrap().title,
            "No client installation found"
        );
    }

    #[tokio::test]
    async fn decompiler_switch_round_trips_the_backend() {
        let bridge = Arc::new(MockBridge::new());
        let (service, store, _queue) = service(Arc::clone(&bridge));

        service.switch_decompiler().await;
        assert_eq!(store.get().decompiler, "konstant");
        assert_eq!(bridge.call_count("update_decompiler"), 1);

        service.switch_decompiler().await;
        assert_eq!(store.get().decompiler, "medal");
    }
}
