//! Profile registry and persistence flows
//!
//! `ProfileStore` is the authoritative in-memory registry of profiles and
//! their live per-profile session state. `ProfileService` wraps the bridge
//! round-trips (persist, environment, keychain) that precede store mutation.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::bridge::Bridge;
use crate::notifications::NotificationQueue;
use crate::session::SessionState;

/// A saved account identity with its credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Opaque, sortable, time-derived token.
    pub id: String,
    /// Optional custom name shown in place of the display name.
    pub name: Option<String>,
    /// Session cookie used to authenticate the launched client.
    pub cookie: String,
    pub user_id: u64,
    pub display_name: String,
    pub username: String,
    pub thumbnail: Option<String>,
    pub note: String,
    /// Milliseconds since the epoch; bumped on every successful launch.
    pub last_played_at: i64,
}

impl Profile {
    /// Display label: the custom name when set, otherwise `Profile: {id}`.
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Profile: {}", self.id))
    }
}

/// Base-36 encoding of the creation timestamp in milliseconds, matching the
/// persisted id format.
pub fn generate_profile_id() -> String {
    let mut millis = Utc::now().timestamp_millis().unsigned_abs();
    if millis == 0 {
        return "0".into();
    }
    let digits = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::new();
    while millis > 0 {
        let index = usize::try_from(millis % 36).unwrap_or(0);
        out.push(digits[index]);
        millis /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[derive(Debug, Default)]
struct Inner {
    profiles: Vec<Profile>,
    states: Vec<SessionState>,
    selected: Option<usize>,
}

#[derive(Debug, Default)]
pub struct ProfileStore {
    inner: Mutex<Inner>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a profile plus its default offline session state.
    pub fn add_profile(&self, profile: Profile) {
        let mut inner = self.inner.lock();
        inner.states.push(SessionState::offline(&profile.id));
        inner.profiles.push(profile);
    }

    /// Replaces the profile with the same id; no-op if unknown.
    pub fn update_profile(&self, profile: Profile) {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.profiles.iter_mut().find(|p| p.id == profile.id) {
            *existing = profile;
        }
    }

    /// Removes the profile and its session state.
    pub fn remove_profile(&self, id: &str) {
        let mut inner = self.inner.lock();
        inner.profiles.retain(|profile| profile.id != id);
        inner.states.retain(|state| state.profile_id != id);
        let remaining = inner.profiles.len();
        if let Some(selected) = inner.selected {
            if selected >= remaining {
                inner.selected = None;
            }
        }
    }

    /// Replaces the matching session state by profile id. Never creates an
    /// entry: states for unknown profiles are dropped.
    pub fn update_state(&self, state: SessionState) {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner
            .states
            .iter_mut()
            .find(|s| s.profile_id == state.profile_id)
        {
            *existing = state;
        }
    }

    /// Sets the selection; out-of-bounds indexes are rejected.
    pub fn set_selected_index(&self, index: Option<usize>) {
        let mut inner = self.inner.lock();
        match index {
            Some(i) if i >= inner.profiles.len() => {
                tracing::warn!("Ignoring out-of-bounds selection {i}");
            }
            _ => inner.selected = index,
        }
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.inner.lock().selected
    }

    pub fn profiles(&self) -> Vec<Profile> {
        self.inner.lock().profiles.clone()
    }

    pub fn get(&self, id: &str) -> Option<Profile> {
        self.inner.lock().profiles.iter().find(|p| p.id == id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().profiles.iter().any(|p| p.id == id)
    }

    pub fn state_of(&self, profile_id: &str) -> Option<SessionState> {
        self.inner
            .lock()
            .states
            .iter()
            .find(|s| s.profile_id == profile_id)
            .cloned()
    }
}

/// Profile flows that round-trip through the backend before mutating the
/// store. Failures surface one modal each and abort the flow; completed
/// steps are not rolled back.
#[derive(Clone)]
pub struct ProfileService {
    bridge: Arc<dyn Bridge>,
    store: Arc<ProfileStore>,
    queue: Arc<NotificationQueue>,
}

impl ProfileService {
    pub fn new(
        bridge: Arc<dyn Bridge>,
        store: Arc<ProfileStore>,
        queue: Arc<NotificationQueue>,
    ) -> Self {
        Self {
            bridge,
            store,
            queue,
        }
    }

    /// Persists a new profile, provisions its isolated environment and
    /// keychain, then registers it locally.
    pub async fn create_profile(&self, profile: Profile) -> bool {
        let mut profiles = self.store.profiles();
        profiles.push(profile.clone());
        if let Err(err) = self.bridge.write_profiles(&profiles).await {
            self.queue.show_error("Failed to write profile", err);
            return false;
        }

        if let Err(err) = self.bridge.create_environment(&profile.id).await {
            self.queue.show_error("Failed to create environment", err);
            return false;
        }

        match self.bridge.create_keychain(&profile.id).await {
            Err(err) => {
                self.queue.show_error("Failed to create Keychain", err);
                return false;
            }
            Ok(code) if code != 0 => {
                self.queue.show_error(
                    "Failed to create keychain",
                    format!("Could not create keychain with code {code}."),
                );
                return false;
            }
            Ok(_) => {}
        }

        tracing::info!("Created profile {}", profile.id);
        self.store.add_profile(profile);
        true
    }

    /// Persists an edited profile, then updates the store.
    pub async fn save_profile(&self, profile: Profile) -> bool {
        let profiles: Vec<Profile> = self
            .store
            .profiles()
            .into_iter()
            .map(|p| if p.id == profile.id { profile.clone() } else { p })
            .collect();
        if let Err(err) = self.bridge.write_profiles(&profiles).await {
            self.queue.show_error("Failed to write profile", err);
            return false;
        }

        self.store.update_profile(profile);
        true
    }

    /// Persists the removal and tears down the profile's backend environment
    /// before dropping it from the store.
    pub async fn delete_profile(&self, id: &str) -> bool {
        let profiles: Vec<Profile> = self
            .store
            .profiles()
            .into_iter()
            .filter(|p| p.id != id)
            .collect();
        if let Err(err) = self.bridge.write_profiles(&profiles).await {
            self.queue.show_error("Failed to remove profile", err);
            return false;
        }

        if let Err(err) = self.bridge.remove_environment(id).await {
            self.queue.show_error("Failed to remove profile", err);
            return false;
        }

        tracing::info!("Removed profile {id}");
        self.store.remove_profile(id);
        true
    }

    /// Loads profiles from storage, merging by id. Locally known profiles
    /// are never overwritten so an in-flight edit cannot be clobbered.
    /// Loaded profiles without a thumbnail get a fire-and-forget backfill.
    pub async fn reload(&self) -> bool {
        let loaded = match self.bridge.read_profiles().await {
            Ok(profiles) => profiles,
            Err(err) => {
                self.queue.show_confirmation(
                    "Failed to read profiles",
                    format!("{err} Would you like to reset profiles?"),
                    None,
                );
                return false;
            }
        };

        for profile in loaded {
            if self.store.contains(&profile.id) {
                continue;
            }
            let wants_thumbnail = profile.thumbnail.is_none();
            let user_id = profile.user_id;
            let profile_id = profile.id.clone();
            self.store.add_profile(profile);

            if wants_thumbnail {
                let service = self.clone();
                tokio::spawn(async move {
                    service.backfill_thumbnail(&profile_id, user_id).await;
                });
            }
        }

        true
    }

    /// Best-effort thumbnail fetch for a profile loaded without one.
    /// Failures are silent; the profile may have been removed meanwhile.
    async fn backfill_thumbnail(&self, profile_id: &str, user_id: u64) {
        let url = match self.bridge.get_roblox_thumbnail(user_id).await {
            Ok(Some(url)) => url,
            Ok(None) => return,
            Err(err) => {
                tracing::debug!("Thumbnail backfill for {profile_id} failed: {err}");
                return;
            }
        };

        if let Some(mut profile) = self.store.get(profile_id) {
            profile.thumbnail = Some(thumbnail_token(&url));
            self.store.update_profile(profile);
        }
    }
}

/// Reduces a thumbnail URL to the stored reference token (the CDN path
/// segment), falling back to the full URL for unexpected shapes.
fn thumbnail_token(url: &str) -> String {
    url.split('/')
        .nth(3)
        .filter(|segment| !segment.is_empty())
        .unwrap_or(url)
        .to_owned()
}
