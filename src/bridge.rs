//! Backend command seam
//!
//! Everything that touches the disk, the keychain, a child process or the
//! network lives behind this trait. The control plane never does IO of its
//! own; it sequences these commands and folds their results into state and
//! notifications. Errors cross the seam as plain strings, already phrased
//! for the user.

use async_trait::async_trait;

use crate::clients::ClientVariant;
use crate::config::Config;
use crate::profiles::Profile;
use crate::session::SessionState;
use crate::versions::{CrypticVersion, HydrogenVersion, MacsploitVersion, RobloxVersion};

type CommandResult<T> = std::result::Result<T, String>;

#[async_trait]
pub trait Bridge: Send + Sync {
    /// Unlocks the profile's keychain, returning the tool's exit code.
    async fn unlock_keychain(&self, profile_id: &str) -> CommandResult<i32>;

    /// Creates the profile's keychain, returning the tool's exit code.
    async fn create_keychain(&self, profile_id: &str) -> CommandResult<i32>;

    async fn create_environment(&self, profile_id: &str) -> CommandResult<()>;

    async fn create_sandboxed_environment(&self, profile_id: &str) -> CommandResult<()>;

    async fn remove_environment(&self, profile_id: &str) -> CommandResult<()>;

    async fn write_cookies(&self, profile_id: &str, cookie: &str) -> CommandResult<()>;

    async fn write_sandboxed_cookies(&self, profile_id: &str, cookie: &str) -> CommandResult<()>;

    /// Rewrites the client bundle's identifier for the profile, optionally
    /// re-signing with the given entitlements plist.
    async fn modify_bundle_identifier(
        &self,
        client: ClientVariant,
        profile_id: &str,
        entitlements: Option<&str>,
    ) -> CommandResult<()>;

    /// Spawns the client process; the returned state carries the pid.
    async fn launch_client(
        &self,
        client: ClientVariant,
        profile_id: &str,
    ) -> CommandResult<SessionState>;

    async fn launch_sandboxed_client(
        &self,
        client: ClientVariant,
        profile_id: &str,
    ) -> CommandResult<SessionState>;

    /// Terminates the process. `Ok(false)` means the backend could not kill
    /// it without knowing why.
    async fn stop_client(&self, pid: u32) -> CommandResult<bool>;

    async fn read_config(&self) -> CommandResult<Config>;

    async fn write_config(&self, config: &Config) -> CommandResult<()>;

    async fn read_profiles(&self) -> CommandResult<Vec<Profile>>;

    async fn write_profiles(&self, profiles: &[Profile]) -> CommandResult<()>;

    /// Runs the staged installation for the client at the given version key.
    /// Progress arrives separately as pushed events.
    async fn install_client(&self, client: ClientVariant, version: &str) -> CommandResult<()>;

    /// The ipa variant of the staged installation, for sideloaded clients.
    async fn install_ipa(&self, client: ClientVariant, version: &str) -> CommandResult<()>;

    async fn remove_client(&self, client: ClientVariant) -> CommandResult<()>;

    async fn get_roblox_version(&self) -> CommandResult<RobloxVersion>;

    async fn get_macsploit_version(&self) -> CommandResult<MacsploitVersion>;

    async fn get_hydrogen_version(&self) -> CommandResult<HydrogenVersion>;

    async fn get_cryptic_version(&self) -> CommandResult<CrypticVersion>;

    /// Fetches the avatar headshot url for the user, when one exists.
    async fn get_roblox_thumbnail(&self, user_id: u64) -> CommandResult<Option<String>>;

    /// Points the hydrogen-family shared context at the profile.
    async fn update_hydrobridge(&self, profile_id: &str) -> CommandResult<()>;

    /// Points the cryptic shared context at the profile.
    async fn update_crypticbridge(&self, profile_id: &str) -> CommandResult<()>;

    async fn update_decompiler(&self, choice: &str) -> CommandResult<()>;

    /// Removes all installation caches, returning the bytes freed.
    async fn clean_cache(&self) -> CommandResult<u64>;

    /// Removes cached install artifacts not matching any of the given
    /// pinned versions.
    async fn clean_leftover_cache(&self, keep_versions: &[String]) -> CommandResult<()>;
}
