//! Fetched remote version documents and per-variant resolution
//!
//! Each variant publishes its version metadata in a different shape. The
//! resolver table maps a variant to a pure function over its document,
//! producing the version key handed to the installer and the version string
//! shown (and pinned) for the installation.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::bridge::Bridge;
use crate::clients::ClientVariant;
use crate::error::{Error, Result};
use crate::notifications::NotificationQueue;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobloxVersion {
    pub version: String,
    pub client_version_upload: String,
    pub bootstrapper_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacsploitVersion {
    pub client_version_upload: String,
    pub app_version: String,
    pub client_version: String,
    pub rel_version: String,
    pub channel: String,
    pub changelog: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HydrogenPlatformVersion {
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub exploit_version: Option<String>,
    #[serde(default)]
    pub roblox_version: Option<String>,
    #[serde(default)]
    pub changelog: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HydrogenGlobal {
    #[serde(default)]
    pub globallogs: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HydrogenVersion {
    #[serde(default)]
    pub global: HydrogenGlobal,
    #[serde(default)]
    pub windows: HydrogenPlatformVersion,
    #[serde(default)]
    pub macos: HydrogenPlatformVersion,
    #[serde(default)]
    pub ios: HydrogenPlatformVersion,
    #[serde(default)]
    pub android: HydrogenPlatformVersion,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrypticVersions {
    #[serde(rename = "Software")]
    pub software: String,
    #[serde(rename = "Roblox")]
    pub roblox: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrypticVersion {
    #[serde(rename = "Platform")]
    pub platform: String,
    #[serde(rename = "Versions")]
    pub versions: CrypticVersions,
    #[serde(rename = "Changelog")]
    pub changelog: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpiumwareVersion {
    #[serde(rename = "CurrentVersion")]
    pub current_version: String,
    #[serde(rename = "SupportedRobloxVersion")]
    pub supported_roblox_version: String,
    #[serde(rename = "Changelog")]
    pub changelog: String,
    #[serde(rename = "RequiredUpd")]
    pub required_update: bool,
}

/// Snapshot of every variant's fetched version document. Ronix publishes
/// through the Hydrogen feed, so the two fields alias the same document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionSet {
    pub roblox: RobloxVersion,
    pub macsploit: MacsploitVersion,
    pub hydrogen: HydrogenVersion,
    pub ronix: HydrogenVersion,
    pub cryptic: CrypticVersion,
    pub opiumware: OpiumwareVersion,
    pub delta: String,
}

/// Resolution of a variant's documents into the pair the install pipeline
/// needs: the key passed to the backend installer, and the version string
/// pinned in the config (and shown to the user).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInstall {
    pub install_version: String,
    pub display_version: String,
}

type Resolver = fn(&VersionSet) -> Option<ResolvedInstall>;

fn non_empty(install: &str, display: &str) -> Option<ResolvedInstall> {
    if install.is_empty() || display.is_empty() {
        return None;
    }
    Some(ResolvedInstall {
        install_version: install.to_owned(),
        display_version: display.to_owned(),
    })
}

fn resolve_vanilla(versions: &VersionSet) -> Option<ResolvedInstall> {
    non_empty(&versions.roblox.client_version_upload, &versions.roblox.version)
}

fn resolve_macsploit(versions: &VersionSet) -> Option<ResolvedInstall> {
    non_empty(
        &versions.macsploit.client_version_upload,
        &versions.macsploit.rel_version,
    )
}

fn resolve_hydrogen(versions: &VersionSet) -> Option<ResolvedInstall> {
    non_empty(
        versions.hydrogen.macos.roblox_version.as_deref()?,
        versions.hydrogen.macos.exploit_version.as_deref()?,
    )
}

fn resolve_ronix(versions: &VersionSet) -> Option<ResolvedInstall> {
    non_empty(
        versions.ronix.macos.roblox_version.as_deref()?,
        versions.ronix.macos.exploit_version.as_deref()?,
    )
}

fn resolve_cryptic(versions: &VersionSet) -> Option<ResolvedInstall> {
    non_empty(
        &versions.cryptic.versions.roblox,
        &versions.cryptic.versions.software,
    )
}

fn resolve_opiumware(versions: &VersionSet) -> Option<ResolvedInstall> {
    non_empty(
        &versions.opiumware.supported_roblox_version,
        &versions.opiumware.current_version,
    )
}

fn resolve_delta(versions: &VersionSet) -> Option<ResolvedInstall> {
    non_empty(&versions.delta, &versions.delta)
}

/// Registered resolver table, keyed by variant.
pub const RESOLVERS: [(ClientVariant, Resolver); 7] = [
    (ClientVariant::Vanilla, resolve_vanilla),
    (ClientVariant::MacSploit, resolve_macsploit),
    (ClientVariant::Hydrogen, resolve_hydrogen),
    (ClientVariant::Ronix, resolve_ronix),
    (ClientVariant::Cryptic, resolve_cryptic),
    (ClientVariant::Opiumware, resolve_opiumware),
    (ClientVariant::Delta, resolve_delta),
];

/// The feed name used in "… version is not fetched yet." messages.
fn feed_name(client: ClientVariant) -> &'static str {
    match client {
        ClientVariant::Vanilla => "Roblox",
        other => other.as_str(),
    }
}

#[derive(Debug, Default)]
pub struct VersionStore {
    versions: Mutex<VersionSet>,
}

impl VersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> VersionSet {
        self.versions.lock().clone()
    }

    pub fn set_roblox(&self, version: RobloxVersion) {
        self.versions.lock().roblox = version;
    }

    pub fn set_macsploit(&self, version: MacsploitVersion) {
        self.versions.lock().macsploit = version;
    }

    /// Ronix ships the Hydrogen document; both fields take the same value.
    pub fn set_hydrogen(&self, version: HydrogenVersion) {
        let mut versions = self.versions.lock();
        versions.ronix = version.clone();
        versions.hydrogen = version;
    }

    pub fn set_cryptic(&self, version: CrypticVersion) {
        self.versions.lock().cryptic = version;
    }

    pub fn set_opiumware(&self, version: OpiumwareVersion) {
        self.versions.lock().opiumware = version;
    }

    pub fn set_delta(&self, version: String) {
        self.versions.lock().delta = version;
    }

    /// Resolves the install/display pair for a variant, or a validation
    /// error when its metadata has not been fetched yet.
    pub fn resolve(&self, client: ClientVariant) -> Result<ResolvedInstall> {
        let versions = self.snapshot();
        let resolver = RESOLVERS
            .into_iter()
            .find(|(variant, _)| *variant == client)
            .map(|(_, resolver)| resolver);
        resolver
            .and_then(|resolver| resolver(&versions))
            .ok_or_else(|| {
                Error::validation(format!("{} version is not fetched yet.", feed_name(client)))
            })
    }

    /// Fetches the remote version documents concurrently, then applies them
    /// in feed order, stopping at the first failure with one modal naming
    /// the failing feed.
    pub async fn fetch_all(&self, bridge: &Arc<dyn Bridge>, queue: &NotificationQueue) -> bool {
        let (roblox, macsploit, hydrogen, cryptic) = tokio::join!(
            bridge.get_roblox_version(),
            bridge.get_macsploit_version(),
            bridge.get_hydrogen_version(),
            bridge.get_cryptic_version(),
        );

        match roblox {
            Ok(version) => self.set_roblox(version),
            Err(err) => {
                queue.show_error("Failed to fetch Roblox version", err);
                return false;
            }
        }
        match macsploit {
            Ok(version) => self.set_macsploit(version),
            Err(err) => {
                queue.show_error("Failed to fetch MacSploit version", err);
                return false;
            }
        }
        match hydrogen {
            Ok(version) => self.set_hydrogen(version),
            Err(err) => {
                queue.show_error("Failed to fetch Hydrogen version", err);
                return false;
            }
        }
        match cryptic {
            Ok(version) => self.set_cryptic(version),
            Err(err) => {
                queue.show_error("Failed to fetch Cryptic version", err);
                return false;
            }
        }

        tracing::debug!("Fetched client version documents");
        true
    }
}
