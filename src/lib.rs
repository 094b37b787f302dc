//! Control plane for managing alternate Roblox accounts and their isolated
//! client installations.
//!
//! The crate owns profiles, per-profile session state, the persisted config,
//! the staged install pipeline and the single-active notification queue. All
//! IO goes through the [`Bridge`] trait; a hosting shell provides the bridge,
//! feeds backend pushes through an [`EventBus`], renders
//! [`NotificationQueue::active`] and dispatches the [`UserAction`]s that
//! button presses hand back.

mod bridge;
mod clients;
mod config;
mod error;
mod events;
mod installer;
mod notifications;
mod profiles;
mod session;
mod versions;

use std::sync::Arc;

pub use bridge::Bridge;
pub use clients::{ClientVariant, CLIENT_VARIANTS};
pub use config::{Config, ConfigService, ConfigStore, InstallRecord, DECOMPILERS};
pub use error::{Error, Result};
pub use events::{
    CloseEvent, Event, EventBus, InstallProgress, InstallStage, Message, Subscription,
};
pub use installer::InstallPipeline;
pub use notifications::{Modal, ModalButton, ModalId, ModalPatch, NotificationQueue, UserAction};
pub use profiles::{generate_profile_id, Profile, ProfileService, ProfileStore};
pub use session::{SessionController, SessionState};
pub use versions::{ResolvedInstall, VersionSet, VersionStore};

/// The assembled control plane. Cheap to clone; every clone shares the same
/// stores and queue.
#[derive(Clone)]
pub struct Manager {
    pub queue: Arc<NotificationQueue>,
    pub profile_store: Arc<ProfileStore>,
    pub config_store: Arc<ConfigStore>,
    pub version_store: Arc<VersionStore>,
    pub profiles: ProfileService,
    pub config: ConfigService,
    pub session: Arc<SessionController>,
    pub installer: Arc<InstallPipeline>,
    bridge: Arc<dyn Bridge>,
}

impl Manager {
    pub fn new(bridge: Arc<dyn Bridge>) -> Self {
        let queue = Arc::new(NotificationQueue::new());
        let profile_store = Arc::new(ProfileStore::new());
        let config_store = Arc::new(ConfigStore::new());
        let version_store = Arc::new(VersionStore::new());

        let profiles = ProfileService::new(
            Arc::clone(&bridge),
            Arc::clone(&profile_store),
            Arc::clone(&queue),
        );
        let config = ConfigService::new(
            Arc::clone(&bridge),
            Arc::clone(&config_store),
            Arc::clone(&queue),
        );
        let session = Arc::new(SessionController::new(
            Arc::clone(&bridge),
            Arc::clone(&profile_store),
            Arc::clone(&config_store),
            Arc::clone(&queue),
        ));
        let installer = Arc::new(InstallPipeline::new(
            Arc::clone(&bridge),
            Arc::clone(&version_store),
            config.clone(),
            Arc::clone(&config_store),
            Arc::clone(&queue),
        ));

        Self {
            queue,
            profile_store,
            config_store,
            version_store,
            profiles,
            config,
            session,
            installer,
            bridge,
        }
    }

    /// Loads the persisted config and profiles, then the remote version
    /// documents. Each failure has already raised its own notice; the return
    /// value says whether everything loaded cleanly.
    pub async fn bootstrap(&self) -> bool {
        let config = self.config.read().await;
        let profiles = self.profiles.reload().await;
        let versions = self
            .version_store
            .fetch_all(&self.bridge, &self.queue)
            .await;
        config && profiles && versions
    }

    /// Routes one backend push to its handler.
    pub async fn handle_event(&self, event: Event) {
        match event {
            Event::ProcessOpened(state) => self.session.on_process_opened(state).await,
            Event::ProcessClosed(close) => self.session.on_process_closed(&close),
            Event::InstallProgress(progress) => self.installer.on_progress(&progress),
            Event::Message(message) => {
                self.queue.show_error(message.title, message.description);
            }
        }
    }

    /// Spawns a pump feeding the bus into [`Manager::handle_event`] until
    /// the returned subscription is dropped. A lagged receiver skips to the
    /// present rather than stopping.
    pub fn attach(&self, bus: &EventBus) -> Subscription {
        let mut rx = bus.subscribe();
        let manager = self.clone();
        Subscription::new(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => manager.handle_event(event).await,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Event pump lagged, skipped {skipped} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }

    /// Runs the action a modal button handed back.
    pub async fn dispatch(&self, action: UserAction) {
        match action {
            UserAction::RemoveProfile(id) => {
                self.profiles.delete_profile(&id).await;
            }
            UserAction::ResetConfig => {
                self.config.reset().await;
            }
            UserAction::Launch { profile_id, client } => {
                self.session.launch(&profile_id, Some(client)).await;
            }
        }
    }

    /// Presses a modal button and dispatches whatever it hands back.
    pub async fn press(&self, id: ModalId, button_index: usize) {
        if let Some(action) = self.queue.press(id, button_index) {
            self.dispatch(action).await;
        }
    }
}

/// Installs the global tracing subscriber, filtered by `RUST_LOG`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::mock::MockBridge;

    fn profile(id: &str) -> Profile {
        Profile {
            id: id.into(),
            name: None,
            cookie: "cookie".into(),
            user_id: 1,
            display_name: "Builderman".into(),
            username: "builderman".into(),
            thumbnail: Some("token".into()),
            note: String::new(),
            last_played_at: 0,
        }
    }

    #[tokio::test]
    async fn full_session_round_trip_stays_quiet() {
        let bridge = Arc::new(MockBridge::new());
        bridge.set_profiles(vec![profile("a")]);
        bridge.set_config(Config {
            active_client: Some("Vanilla".into()),
            clients: vec![InstallRecord {
                name: "Vanilla".into(),
                version: "0.712.0.7120556".into(),
            }],
            ..Config::default()
        });

        let bus = EventBus::new();
        let manager = Manager::new(Arc::clone(&bridge) as Arc<dyn Bridge>);
        let _pump = manager.attach(&bus);

        assert!(manager.bootstrap().await);
        assert!(manager.config_store.is_installed(ClientVariant::Vanilla));

        // Launch with the active selection; the backend confirms the open.
        manager.session.launch("a", None).await;
        let state = manager.profile_store.state_of("a").unwrap();
        assert!(state.is_launching());
        let pid = state.pid.unwrap();

        bus.publish(Event::ProcessOpened(SessionState {
            profile_id: "a".into(),
            connected: true,
            pid: Some(pid),
            client: Some(ClientVariant::Vanilla),
            port: Some(6767),
        }));
        for _ in 0..50 {
            if manager
                .profile_store
                .state_of("a")
                .is_some_and(|state| state.connected)
            {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        assert!(manager.profile_store.state_of("a").unwrap().connected);

        // A clean close settles back to offline without a notice.
        bus.publish(Event::ProcessClosed(CloseEvent {
            profile_id: "a".into(),
            pid,
            exit_code: 0,
        }));
        for _ in 0..50 {
            if manager
                .profile_store
                .state_of("a")
                .is_some_and(|state| state.pid.is_none())
            {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        let state = manager.profile_store.state_of("a").unwrap();
        assert!(!state.connected);
        assert!(state.pid.is_none());
        assert!(manager.queue.is_empty());
    }

    #[tokio::test]
    async fn pressing_a_confirmation_dispatches_its_action() {
        let bridge = Arc::new(MockBridge::new());
        bridge.fail_on("read_config", "corrupt");

        let manager = Manager::new(Arc::clone(&bridge) as Arc<dyn Bridge>);
        assert!(!manager.config.read().await);

        let modal = manager.queue.active().unwrap();
        assert_eq!(modal.title, "Failed to read config");

        // Yes resets the config through the backend.
        manager.press(modal.id, 1).await;
        assert!(manager.queue.is_empty());
        assert_eq!(bridge.call_count("write_config"), 1);
    }

    #[tokio::test]
    async fn backend_messages_surface_as_notices() {
        let bridge = Arc::new(MockBridge::new());
        let manager = Manager::new(bridge as Arc<dyn Bridge>);

        manager
            .handle_event(Event::Message(Message {
                title: "Maintenance".into(),
                description: "Feeds are read-only for an hour.".into(),
            }))
            .await;

        assert_eq!(manager.queue.active().unwrap().title, "Maintenance");
    }

    #[tokio::test]
    async fn dropping_the_subscription_detaches_the_pump() {
        let bridge = Arc::new(MockBridge::new());
        let manager = Manager::new(bridge as Arc<dyn Bridge>);
        let bus = EventBus::new();

        let pump = manager.attach(&bus);
        drop(pump);
        tokio::task::yield_now().await;

        bus.publish(Event::Message(Message {
            title: "lost".into(),
            description: "never handled".into(),
        }));
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(manager.queue.is_empty());
    }
}
