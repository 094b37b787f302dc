//! Staged client installation and removal
//!
//! An install resolves the variant's fetched version metadata, hands the
//! backend a version key, and tracks the staged progress the backend pushes
//! back into a single progress modal. Success pins the displayed version in
//! the config; failure preserves the progress modal underneath its error so
//! the user sees where the pipeline stopped.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::bridge::Bridge;
use crate::clients::ClientVariant;
use crate::config::{ConfigService, ConfigStore, InstallRecord};
use crate::events::{InstallProgress, InstallStage};
use crate::notifications::{ModalId, NotificationQueue};
use crate::versions::VersionStore;

/// Nominal completion per stage, used when a stage carries no byte counts.
fn stage_percent(stage: InstallStage) -> f64 {
    match stage {
        InstallStage::DownloadRoblox | InstallStage::DownloadIpa => 10.0,
        InstallStage::DownloadInsertDylib => 30.0,
        InstallStage::InstallInsertDylib => 35.0,
        InstallStage::InstallRoblox | InstallStage::InstallIpa => 45.0,
        InstallStage::DownloadDylib => 60.0,
        InstallStage::RemoveCodesign => 70.0,
        InstallStage::InsertDylib => 80.0,
        InstallStage::ApplyCodesign => 90.0,
        InstallStage::ConvertIpa => 95.0,
    }
}

fn stage_label(stage: InstallStage) -> &'static str {
    match stage {
        InstallStage::DownloadRoblox => "Downloading Roblox",
        InstallStage::DownloadIpa => "Downloading ipa",
        InstallStage::InstallRoblox => "Installing Roblox",
        InstallStage::InstallIpa => "Installing ipa",
        InstallStage::DownloadInsertDylib => "Downloading insert_dylib",
        InstallStage::InstallInsertDylib => "Installing insert_dylib",
        InstallStage::DownloadDylib => "Downloading dylib",
        InstallStage::InsertDylib => "Inserting dylib",
        InstallStage::ConvertIpa => "Converting ipa",
        InstallStage::ApplyCodesign => "Applying codesign",
        InstallStage::RemoveCodesign => "Removing codesign",
    }
}

/// Percentage for a pushed progress event. Byte-counted stages report their
/// real ratio; every other stage reports its nominal table value. Always
/// within 0 to 100.
fn event_percent(progress: &InstallProgress) -> f64 {
    let percent = match progress.progress {
        Some((_, 0)) => 0.0,
        Some((downloaded, total)) => (downloaded as f64 / total as f64 * 100.0).round(),
        None => stage_percent(progress.stage),
    };
    percent.clamp(0.0, 100.0)
}

pub struct InstallPipeline {
    bridge: Arc<dyn Bridge>,
    versions: Arc<VersionStore>,
    config: ConfigService,
    store: Arc<ConfigStore>,
    queue: Arc<NotificationQueue>,
    /// Progress modal of the install currently in flight, if any. A second
    /// install takes over the slot; pushed progress without a live modal is
    /// dropped.
    active_modal: Mutex<Option<ModalId>>,
}

impl InstallPipeline {
    pub fn new(
        bridge: Arc<dyn Bridge>,
        versions: Arc<VersionStore>,
        config: ConfigService,
        store: Arc<ConfigStore>,
        queue: Arc<NotificationQueue>,
    ) -> Self {
        Self {
            bridge,
            versions,
            config,
            store,
            queue,
            active_modal: Mutex::new(None),
        }
    }

    /// Installs the variant at its currently fetched version. An existing
    /// installation is removed first, so the config never tracks the same
    /// variant twice.
    pub async fn install(&self, client: ClientVariant) {
        let resolved = match self.versions.resolve(client) {
            Ok(resolved) => resolved,
            Err(err) => {
                self.queue
                    .show_error(format!("Failed to install {client}"), err.to_string());
                return;
            }
        };

        // Unconditional removal first: an on-disk installation may exist
        // even when the config no longer tracks it.
        if !self.remove(client).await {
            return;
        }

        tracing::info!(
            "Installing {client} {} ({})",
            resolved.display_version,
            resolved.install_version
        );
        let progress_id = self.queue.show_progress(
            format!("Installing {client}"),
            "Please do not close the application until the installation finishes.",
        );
        *self.active_modal.lock() = Some(progress_id);

        let result = if client.installs_as_ipa() {
            self.bridge
                .install_ipa(client, &resolved.install_version)
                .await
        } else {
            self.bridge
                .install_client(client, &resolved.install_version)
                .await
        };

        if let Err(err) = result {
            self.queue
                .show_error_closing(format!("Failed to install {client}"), err, &[progress_id]);
            *self.active_modal.lock() = None;
            return;
        }

        let mut config = self.store.get();
        config.clients.push(InstallRecord {
            name: client.as_str().to_owned(),
            version: resolved.display_version,
        });
        let pinned: Vec<String> = config
            .clients
            .iter()
            .map(|record| record.version.clone())
            .collect();
        self.config.write(config).await;

        // Artifacts for versions no longer pinned are swept opportunistically;
        // a failed sweep does not taint a finished install.
        if let Err(err) = self.bridge.clean_leftover_cache(&pinned).await {
            tracing::debug!("Leftover cache sweep failed: {err}");
        }

        self.queue
            .update_progress(progress_id, Some(100.0), Some("Installed".into()));
        self.queue.show_error_closing(
            format!("Installed {client}"),
            format!("{client} is now installed on your device!"),
            &[progress_id],
        );
        *self.active_modal.lock() = None;
    }

    /// Removes the variant's installation. The config entry and a matching
    /// active selection are cleared and persisted even when the variant was
    /// not tracked, keeping the persisted state consistent with the disk.
    pub async fn remove(&self, client: ClientVariant) -> bool {
        if let Err(err) = self.bridge.remove_client(client).await {
            self.queue
                .show_error(format!("Failed to remove {client}"), err);
            return false;
        }

        let mut config = self.store.get();
        config.active_client = config
            .active_client
            .take()
            .filter(|name| name != client.as_str());
        config
            .clients
            .retain(|record| record.name != client.as_str());
        self.config.write(config).await
    }

    pub async fn remove_with_notice(&self, client: ClientVariant) {
        if self.remove(client).await {
            self.queue.show_error(
                format!("Removed {client}"),
                format!("{client} is now removed from your device!"),
            );
        }
    }

    /// Folds a pushed progress event into the in-flight install's modal.
    /// Events arriving with no live progress modal are stale and dropped.
    pub fn on_progress(&self, progress: &InstallProgress) {
        let modal = { *self.active_modal.lock() };
        let Some(modal) = modal.filter(|id| self.queue.contains(*id)) else {
            tracing::debug!("Dropping stale install progress: {:?}", progress.stage);
            return;
        };
        self.queue.update_progress(
            modal,
            Some(event_percent(progress)),
            Some(stage_label(progress.stage).to_owned()),
        );
    }

    /// Removes all installation caches and reports how much was freed.
    pub async fn clean_cache(&self) {
        match self.bridge.clean_cache().await {
            Err(err) => {
                self.queue.show_error("Failed to clean cache", err);
            }
            Ok(0) => {
                self.queue.show_error(
                    "No Cache",
                    "You do not have any installation cache left on your device!",
                );
            }
            Ok(bytes) => {
                self.queue.show_error(
                    "Cleaned Cache",
                    format!("Freed {:.1} MB from your device!", bytes as f64 / 1_048_576.0),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::mock::MockBridge;
    use crate::config::Config;
    use crate::versions::RobloxVersion;

    struct Fixture {
        bridge: Arc<MockBridge>,
        store: Arc<ConfigStore>,
        queue: Arc<NotificationQueue>,
        pipeline: InstallPipeline,
    }

    fn fixture() -> Fixture {
        let bridge = Arc::new(MockBridge::new());
        let versions = Arc::new(VersionStore::new());
        versions.set_roblox(RobloxVersion {
            version: "0.712.0.7120556".into(),
            client_version_upload: "version-abc123".into(),
            bootstrapper_version: String::new(),
        });
        let store = Arc::new(ConfigStore::new());
        let queue = Arc::new(NotificationQueue::new());
        let config = ConfigService::new(
            Arc::clone(&bridge) as Arc<dyn Bridge>,
            Arc::clone(&store),
            Arc::clone(&queue),
        );
        let pipeline = InstallPipeline::new(
            Arc::clone(&bridge) as Arc<dyn Bridge>,
            versions,
            config,
            Arc::clone(&store),
            Arc::clone(&queue),
        );
        Fixture {
            bridge,
            store,
            queue,
            pipeline,
        }
    }

    #[tokio::test]
    async fn install_removes_first_then_pins_the_display_version() {
        let f = fixture();

        f.pipeline.install(ClientVariant::Vanilla).await;

        // Removal runs even with nothing tracked: an on-disk installation
        // may predate the config. The cache sweep keeps the pinned version.
        assert_eq!(
            f.bridge.calls(),
            vec![
                "remove_client Vanilla",
                "write_config",
                "install_client Vanilla version-abc123",
                "write_config",
                "clean_leftover_cache 0.712.0.7120556",
            ]
        );
        let record = f.store.record_of(ClientVariant::Vanilla).unwrap();
        assert_eq!(record.version, "0.712.0.7120556");

        // Success notice on top; its button also dismisses the progress
        // modal left at 100%.
        assert_eq!(f.queue.len(), 2);
        let notice = f.queue.active().unwrap();
        assert_eq!(notice.title, "Installed Vanilla");
        f.queue.press(notice.id, 0);
        assert!(f.queue.is_empty());
    }

    #[tokio::test]
    async fn failed_removal_aborts_the_install() {
        let f = fixture();
        f.bridge.fail_on("remove_client", "bundle is locked");

        f.pipeline.install(ClientVariant::Vanilla).await;

        assert_eq!(f.bridge.call_count("install_client"), 0);
        assert_eq!(f.queue.active().unwrap().title, "Failed to remove Vanilla");
    }

    #[tokio::test]
    async fn reinstall_removes_first_and_never_duplicates() {
        let f = fixture();
        f.store.set(Config {
            active_client: Some("Vanilla".into()),
            clients: vec![InstallRecord {
                name: "Vanilla".into(),
                version: "0.700.0.1".into(),
            }],
            ..Config::default()
        });

        f.pipeline.install(ClientVariant::Vanilla).await;

        assert_eq!(f.bridge.call_count("remove_client"), 1);
        let config = f.store.get();
        assert_eq!(config.clients.len(), 1);
        assert_eq!(config.clients[0].version, "0.712.0.7120556");
        // The removal half clears a matching active selection.
        assert_eq!(config.active_client, None);
    }

    #[tokio::test]
    async fn unresolved_version_refuses_the_install() {
        let f = fixture();

        f.pipeline.install(ClientVariant::Hydrogen).await;

        assert_eq!(f.bridge.call_count("install_client"), 0);
        let modal = f.queue.active().unwrap();
        assert_eq!(modal.title, "Failed to install Hydrogen");
        assert!(modal.text.contains("not fetched yet"));
    }

    #[tokio::test]
    async fn failed_install_keeps_the_progress_context_under_the_error() {
        let f = fixture();
        f.bridge.fail_on("install_client", "stage download-roblox died");

        f.pipeline.install(ClientVariant::Vanilla).await;

        assert!(f.store.record_of(ClientVariant::Vanilla).is_none());
        assert_eq!(f.queue.len(), 2);
        let error = f.queue.active().unwrap();
        assert_eq!(error.title, "Failed to install Vanilla");
        f.queue.press(error.id, 0);
        assert!(f.queue.is_empty());
    }

    #[tokio::test]
    async fn remove_persists_even_when_untracked() {
        let f = fixture();

        assert!(f.pipeline.remove(ClientVariant::MacSploit).await);

        assert_eq!(f.bridge.call_count("remove_client"), 1);
        assert_eq!(f.bridge.call_count("write_config"), 1);
    }

    #[tokio::test]
    async fn remove_with_notice_reports_once() {
        let f = fixture();
        f.store.set(Config {
            clients: vec![InstallRecord {
                name: "MacSploit".into(),
                version: "3.2.1".into(),
            }],
            ..Config::default()
        });

        f.pipeline.remove_with_notice(ClientVariant::MacSploit).await;

        assert!(f.store.installed().is_empty());
        let modal = f.queue.active().unwrap();
        assert_eq!(modal.title, "Removed MacSploit");
    }

    #[tokio::test]
    async fn progress_folds_bytes_and_stage_table_into_the_modal() {
        let f = fixture();
        let id = f.queue.show_progress("Installing Vanilla", "wait");
        *f.pipeline.active_modal.lock() = Some(id);

        f.pipeline.on_progress(&InstallProgress {
            stage: InstallStage::DownloadRoblox,
            progress: Some((50, 200)),
        });
        let modal = f.queue.active().unwrap();
        assert_eq!(modal.render_progress(), Some(25.0));
        assert_eq!(modal.progress_text.as_deref(), Some("Downloading Roblox"));

        f.pipeline.on_progress(&InstallProgress {
            stage: InstallStage::ApplyCodesign,
            progress: None,
        });
        assert_eq!(f.queue.active().unwrap().render_progress(), Some(90.0));

        // Oversized byte counts and zero totals stay within range.
        f.pipeline.on_progress(&InstallProgress {
            stage: InstallStage::DownloadDylib,
            progress: Some((300, 200)),
        });
        assert_eq!(f.queue.active().unwrap().render_progress(), Some(100.0));
        f.pipeline.on_progress(&InstallProgress {
            stage: InstallStage::DownloadDylib,
            progress: Some((0, 0)),
        });
        assert_eq!(f.queue.active().unwrap().render_progress(), Some(0.0));
    }

    #[tokio::test]
    async fn stale_progress_without_a_live_modal_is_dropped() {
        let f = fixture();

        f.pipeline.on_progress(&InstallProgress {
            stage: InstallStage::DownloadRoblox,
            progress: Some((1, 2)),
        });
        assert!(f.queue.is_empty());

        // A modal that was already dismissed no longer accepts progress.
        let id = f.queue.show_progress("Installing Vanilla", "wait");
        *f.pipeline.active_modal.lock() = Some(id);
        f.queue.remove(id);
        f.pipeline.on_progress(&InstallProgress {
            stage: InstallStage::DownloadRoblox,
            progress: Some((1, 2)),
        });
        assert!(f.queue.is_empty());
    }

    #[tokio::test]
    async fn clean_cache_reports_freed_bytes_or_absence() {
        let f = fixture();

        f.pipeline.clean_cache().await;
        assert_eq!(f.queue.active().unwrap().title, "No Cache");

        f.bridge.set_cache_bytes(3 * 1_048_576 / 2);
        f.pipeline.clean_cache().await;
        let modal = f.queue.active().unwrap();
        assert_eq!(modal.title, "Cleaned Cache");
        assert!(modal.text.contains("1.5 MB"));

        f.bridge.fail_on("clean_cache", "cache directory busy");
        f.pipeline.clean_cache().await;
        assert_eq!(f.queue.active().unwrap().title, "Failed to clean cache");
    }
}
