//! Single-active modal notification channel
//!
//! Every component surfaces errors, confirmations and progress through this
//! queue. Only the head-of-queue modal is rendered; advancing requires the
//! user to press one of its buttons.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clients::ClientVariant;

pub type ModalId = Uuid;

/// Deferred intent carried by a modal button, dispatched by the shell after
/// the press is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserAction {
    RemoveProfile(String),
    ResetConfig,
    Launch {
        profile_id: String,
        client: ClientVariant,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModalButton {
    pub label: String,
    /// Modal ids removed when this button is pressed (the button's own modal
    /// included, by construction).
    pub closes: Vec<ModalId>,
    pub action: Option<UserAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Modal {
    pub id: ModalId,
    pub title: String,
    pub text: String,
    pub buttons: Vec<ModalButton>,
    pub progress: Option<f64>,
    pub progress_text: Option<String>,
}

impl Modal {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            text: text.into(),
            buttons: Vec::new(),
            progress: None,
            progress_text: None,
        }
    }

    /// Body text as independently rendered lines.
    pub fn body_lines(&self) -> Vec<&str> {
        self.text.split('\n').collect()
    }

    /// Progress as rendered, clamped to `[0, 100]`. The stored value is left
    /// untouched.
    pub fn render_progress(&self) -> Option<f64> {
        self.progress.map(|value| value.clamp(0.0, 100.0))
    }
}

/// Partial modal update, merged into the modal at its current position.
#[derive(Debug, Clone, Default)]
pub struct ModalPatch {
    pub title: Option<String>,
    pub text: Option<String>,
    pub buttons: Option<Vec<ModalButton>>,
    pub progress: Option<f64>,
    pub progress_text: Option<String>,
}

#[derive(Debug, Default)]
pub struct NotificationQueue {
    modals: Mutex<Vec<Modal>>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a modal. Known quirk, preserved deliberately: insertion is at
    /// the front of the pending list, so a newly raised modal is shown before
    /// anything already queued but not yet displayed.
    pub fn add(&self, modal: Modal) -> ModalId {
        let id = modal.id;
        self.modals.lock().insert(0, modal);
        id
    }

    /// Removes by id wherever positioned; no-op if absent.
    pub fn remove(&self, id: ModalId) {
        self.modals.lock().retain(|modal| modal.id != id);
    }

    /// Merges fields into the modal at its current position; no-op if absent.
    pub fn update(&self, id: ModalId, patch: ModalPatch) {
        let mut modals = self.modals.lock();
        let Some(modal) = modals.iter_mut().find(|modal| modal.id == id) else {
            return;
        };
        if let Some(title) = patch.title {
            modal.title = title;
        }
        if let Some(text) = patch.text {
            modal.text = text;
        }
        if let Some(buttons) = patch.buttons {
            modal.buttons = buttons;
        }
        if let Some(progress) = patch.progress {
            modal.progress = Some(progress);
        }
        if let Some(progress_text) = patch.progress_text {
            modal.progress_text = Some(progress_text);
        }
    }

    /// The one modal currently rendered, if any.
    pub fn active(&self) -> Option<Modal> {
        self.modals.lock().first().cloned()
    }

    pub fn len(&self) -> usize {
        self.modals.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modals.lock().is_empty()
    }

    pub fn contains(&self, id: ModalId) -> bool {
        self.modals.lock().iter().any(|modal| modal.id == id)
    }

    /// Resolves a button press: removes every modal the button closes and
    /// hands the button's action back for the shell to dispatch.
    pub fn press(&self, id: ModalId, button_index: usize) -> Option<UserAction> {
        let button = {
            let modals = self.modals.lock();
            let modal = modals.iter().find(|modal| modal.id == id)?;
            modal.buttons.get(button_index)?.clone()
        };
        let mut modals = self.modals.lock();
        modals.retain(|modal| !button.closes.contains(&modal.id));
        drop(modals);
        button.action
    }

    /// Error/notice modal with a single acknowledgement button.
    pub fn show_error(&self, title: impl Into<String>, text: impl Into<String>) -> ModalId {
        self.show_error_closing(title, text, &[])
    }

    /// Acknowledgement modal whose button also closes `extra` modals, used to
    /// tear down an install's preserved progress context in one press.
    pub fn show_error_closing(
        &self,
        title: impl Into<String>,
        text: impl Into<String>,
        extra: &[ModalId],
    ) -> ModalId {
        let mut modal = Modal::new(title, text);
        let mut closes = vec![modal.id];
        closes.extend_from_slice(extra);
        modal.buttons.push(ModalButton {
            label: "Okay".into(),
            closes,
            action: None,
        });
        self.add(modal)
    }

    /// Yes/No confirmation; Yes dispatches `on_confirm`.
    pub fn show_confirmation(
        &self,
        title: impl Into<String>,
        text: impl Into<String>,
        on_confirm: Option<UserAction>,
    ) -> ModalId {
        let mut modal = Modal::new(title, text);
        modal.buttons.push(ModalButton {
            label: "No".into(),
            closes: vec![modal.id],
            action: None,
        });
        modal.buttons.push(ModalButton {
            label: "Yes".into(),
            closes: vec![modal.id],
            action: on_confirm,
        });
        self.add(modal)
    }

    /// Modal with one button per `(label, action)` pair.
    pub fn show_actions(
        &self,
        title: impl Into<String>,
        text: impl Into<String>,
        buttons: Vec<(String, UserAction)>,
    ) -> ModalId {
        let mut modal = Modal::new(title, text);
        for (label, action) in buttons {
            modal.buttons.push(ModalButton {
                label,
                closes: vec![modal.id],
                action: Some(action),
            });
        }
        self.add(modal)
    }

    /// Button-less progress modal; the returned id is used for updates.
    pub fn show_progress(&self, title: impl Into<String>, text: impl Into<String>) -> ModalId {
        let mut modal = Modal::new(title, text);
        modal.progress = Some(0.0);
        self.add(modal)
    }

    pub fn update_progress(
        &self,
        id: ModalId,
        progress: Option<f64>,
        progress_text: Option<String>,
    ) {
        self.update(
            id,
            ModalPatch {
                progress,
                progress_text,
                ..ModalPatch::default()
            },
        );
    }
}
