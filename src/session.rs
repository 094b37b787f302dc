//! Per-profile session state machine
//!
//! States: Offline (no pid) → Launching (pid, not connected) → Connected →
//! Offline. User intent drives launches and stops; backend push events are
//! the source of truth for the resulting state.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::bridge::Bridge;
use crate::clients::{ClientVariant, SANDBOX_ENTITLEMENTS};
use crate::config::ConfigStore;
use crate::error::{Error, Result};
use crate::events::CloseEvent;
use crate::notifications::{NotificationQueue, UserAction};
use crate::profiles::{Profile, ProfileStore};

/// Live, never-persisted status of a profile's external process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub profile_id: String,
    pub connected: bool,
    pub pid: Option<u32>,
    pub client: Option<ClientVariant>,
    pub port: Option<u16>,
}

impl SessionState {
    pub fn offline(profile_id: &str) -> Self {
        Self {
            profile_id: profile_id.to_owned(),
            connected: false,
            pid: None,
            client: None,
            port: None,
        }
    }

    /// Launching means the process exists but has not reported in yet.
    pub fn is_launching(&self) -> bool {
        !self.connected && self.pid.is_some()
    }
}

#[derive(Debug, Default)]
struct SharedContext {
    /// Profile currently owning the shared bridge context.
    owner: Option<String>,
    /// Profiles that have already had their first shared-context opening.
    attached: HashSet<String>,
}

/// Orchestrates launch/stop and reconciles backend open/close events
/// against user intent.
pub struct SessionController {
    bridge: Arc<dyn Bridge>,
    store: Arc<ProfileStore>,
    config: Arc<ConfigStore>,
    queue: Arc<NotificationQueue>,
    /// Profiles whose next close event was requested by the user, so it is
    /// not misreported as a crash.
    expected_stops: Mutex<HashSet<String>>,
    context: Mutex<SharedContext>,
}

impl SessionController {
    pub fn new(
        bridge: Arc<dyn Bridge>,
        store: Arc<ProfileStore>,
        config: Arc<ConfigStore>,
        queue: Arc<NotificationQueue>,
    ) -> Self {
        Self {
            bridge,
            store,
            config,
            queue,
            expected_stops: Mutex::new(HashSet::new()),
            context: Mutex::new(SharedContext::default()),
        }
    }

    pub fn context_owner(&self) -> Option<String> {
        self.context.lock().owner.clone()
    }

    /// Launches a client for the profile. With no requested variant, the
    /// active selection is used; an ambiguous selection prompts the user to
    /// pick among installed clients, and an empty install list is rejected
    /// with a notice. Any step failure surfaces one modal and aborts; no
    /// completed step is rolled back.
    pub async fn launch(&self, profile_id: &str, requested: Option<ClientVariant>) {
        let Some(profile) = self.store.get(profile_id) else {
            self.queue.show_error(
                "Failed to launch client",
                "Profile not found. Please try again.",
            );
            return;
        };

        let state = self
            .store
            .state_of(profile_id)
            .unwrap_or_else(|| SessionState::offline(profile_id));
        if state.is_launching() {
            // Re-entry while a launch is in flight is refused here, not in
            // the backend; the pending open event settles the state.
            tracing::debug!("Launch for {profile_id} ignored, already launching");
            return;
        }
        if state.connected {
            self.queue
                .show_error("Failed to launch client", "Client is already connected.");
            return;
        }

        let installed = self.config.installed();
        if installed.is_empty() {
            self.queue.show_error(
                "No client installation found",
                "Please install a client from the settings tab before selecting one!",
            );
            return;
        }

        let Some(client) = requested.or_else(|| self.config.active_client()) else {
            let buttons = installed
                .iter()
                .filter_map(|record| {
                    let client: ClientVariant = record.name.parse().ok()?;
                    Some((
                        record.name.clone(),
                        UserAction::Launch {
                            profile_id: profile_id.to_owned(),
                            client,
                        },
                    ))
                })
                .collect();
            self.queue
                .show_actions("Client Selection", "Please select a client to run!", buttons);
            return;
        };

        tracing::info!("Launching {client} for profile {profile_id}");
        let launched = match self.run_launch_steps(client, &profile).await {
            Ok(launched) => launched,
            Err(err) => {
                self.queue.show_error("Failed to launch client", err.to_string());
                return;
            }
        };

        self.touch_last_played(profile).await;
        self.store.update_state(launched);
    }

    /// The sequential backend steps of a launch. Sandboxed variants take the
    /// sandboxed endpoints and carry the sandbox entitlements; everything
    /// else unlocks the profile keychain first.
    async fn run_launch_steps(
        &self,
        client: ClientVariant,
        profile: &Profile,
    ) -> Result<SessionState> {
        let id = profile.id.as_str();

        if !client.is_sandboxed() {
            let code = self
                .bridge
                .unlock_keychain(id)
                .await
                .map_err(Error::Bridge)?;
            if code == 50 {
                return Err(Error::validation(
                    "Keychain was not found. It seems like your profile is corrupted, please remove the profile and create it again.",
                ));
            }
            if code != 0 {
                return Err(Error::validation(format!(
                    "Could not unlock keychain with code {code}."
                )));
            }
        }

        if client.is_sandboxed() {
            self.bridge
                .create_sandboxed_environment(id)
                .await
                .map_err(Error::Bridge)?;
            self.bridge
                .write_sandboxed_cookies(id, &profile.cookie)
                .await
                .map_err(Error::Bridge)?;
        } else {
            self.bridge
                .create_environment(id)
                .await
                .map_err(Error::Bridge)?;
            self.bridge
                .write_cookies(id, &profile.cookie)
                .await
                .map_err(Error::Bridge)?;
        }

        let entitlements = client.is_sandboxed().then_some(SANDBOX_ENTITLEMENTS);
        self.bridge
            .modify_bundle_identifier(client, id, entitlements)
            .await
            .map_err(Error::Bridge)?;

        let launched = if client.is_sandboxed() {
            self.bridge.launch_sandboxed_client(client, id).await
        } else {
            self.bridge.launch_client(client, id).await
        }
        .map_err(Error::Bridge)?;

        Ok(launched)
    }

    /// Persists the launch timestamp. A failed persist surfaces its modal
    /// but does not undo the launch.
    async fn touch_last_played(&self, mut profile: Profile) {
        profile.last_played_at = Utc::now().timestamp_millis();

        let profiles: Vec<_> = self
            .store
            .profiles()
            .into_iter()
            .map(|p| if p.id == profile.id { profile.clone() } else { p })
            .collect();
        if let Err(err) = self.bridge.write_profiles(&profiles).await {
            self.queue.show_error("Failed to write profile", err);
            return;
        }
        self.store.update_profile(profile);
    }

    /// Stops the profile's running client. Valid only when connected with a
    /// known pid; a null pid raises a local validation error and no backend
    /// call is made.
    pub async fn stop(&self, profile_id: &str) {
        let state = self
            .store
            .state_of(profile_id)
            .unwrap_or_else(|| SessionState::offline(profile_id));

        if !state.connected {
            self.queue
                .show_error("Failed to stop client", "Client is not connected.");
            return;
        }
        let Some(pid) = state.pid else {
            self.queue.show_error(
                "Failed to stop client",
                "Client process id is unknown. Please try again.",
            );
            return;
        };

        // Marked before the backend call so the ensuing close event is not
        // misreported as a crash.
        self.expected_stops.lock().insert(profile_id.to_owned());

        match self.bridge.stop_client(pid).await {
            Ok(true) => {}
            Ok(false) => {
                self.queue.show_error(
                    "Failed to stop client",
                    "Client could not be stopped due to an unknown error.",
                );
            }
            Err(err) => {
                self.queue.show_error("Failed to stop client", err);
            }
        }
    }

    /// Backend reported a process opening. The reported state overwrites
    /// ours unconditionally; the backend is the source of truth. A first
    /// shared-context opening also designates this profile as the context
    /// owner.
    pub async fn on_process_opened(&self, state: SessionState) {
        tracing::debug!("Process opened for {}", state.profile_id);
        let client = state.client;
        let profile_id = state.profile_id.clone();
        self.store.update_state(state);

        if client.is_some_and(ClientVariant::uses_shared_context) {
            let first_opening = !self.context.lock().attached.contains(&profile_id);
            if first_opening {
                self.attach_context(&profile_id).await;
            }
        }
    }

    /// Two-phase shared-context designation: both bridge endpoints are
    /// called independently, local state commits only when both succeed,
    /// and each failing endpoint is reported with its own error text.
    async fn attach_context(&self, profile_id: &str) {
        let hydro = self.bridge.update_hydrobridge(profile_id).await;
        let cryptic = self.bridge.update_crypticbridge(profile_id).await;

        let mut committed = true;
        if let Err(err) = hydro {
            self.queue
                .show_error("Failed to set hydrobridge context", err);
            committed = false;
        }
        if let Err(err) = cryptic {
            self.queue
                .show_error("Failed to set crypticbridge context", err);
            committed = false;
        }
        if !committed {
            return;
        }

        let mut context = self.context.lock();
        context.owner = Some(profile_id.to_owned());
        context.attached.insert(profile_id.to_owned());
    }

    /// Backend reported a process closing. The state is reset to offline;
    /// an exit the user did not request with a non-zero code raises a single
    /// crash notice. The expected-stop mark is consumed exactly once,
    /// whichever branch is taken.
    pub fn on_process_closed(&self, close: &CloseEvent) {
        tracing::debug!(
            "Process closed for {} with code {}",
            close.profile_id,
            close.exit_code
        );
        self.store
            .update_state(SessionState::offline(&close.profile_id));

        let expected = self.expected_stops.lock().remove(&close.profile_id);
        if expected || close.exit_code == 0 {
            return;
        }

        let label = self
            .store
            .get(&close.profile_id)
            .map(|profile| profile.label())
            .unwrap_or_else(|| format!("Profile: {}", close.profile_id));
        self.queue.show_error(
            "Client Crashed",
            format!("{label} has crashed with code {}.", close.exit_code),
        );
    }
}
