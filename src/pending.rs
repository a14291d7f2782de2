use std::collections::HashMap;

use url::Url;

use crate::event::MediaKind;
use crate::telegram::ChatId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingKind {
    Magnet,
    Media(MediaKind),
}

/// A download waiting for the user to pick where it goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub kind: PendingKind,
    /// Magnet URI or transport file id.
    pub payload: String,
    pub name: String,
    pub disk_idx: usize,
}

impl PendingAction {
    pub fn magnet(uri: &str, disk_idx: usize) -> Self {
        Self {
            kind: PendingKind::Magnet,
            payload: uri.to_string(),
            name: magnet_display_name(uri).unwrap_or_else(|| "magnet".to_string()),
            disk_idx,
        }
    }

    pub fn media(kind: MediaKind, file_id: &str, name: &str, disk_idx: usize) -> Self {
        Self {
            kind: PendingKind::Media(kind),
            payload: file_id.to_string(),
            name: name.to_string(),
            disk_idx,
        }
    }
}

/// In-memory, per-chat slot. Holds at most one action per chat; nothing here
/// survives a restart.
#[derive(Debug, Default)]
pub struct PendingStore {
    actions: HashMap<ChatId, PendingAction>,
}

impl PendingStore {
    /// Stores `action`, returning whatever unconsumed action it replaced.
    pub fn set(&mut self, chat_id: ChatId, action: PendingAction) -> Option<PendingAction> {
        self.actions.insert(chat_id, action)
    }

    pub fn get(&self, chat_id: ChatId) -> Option<&PendingAction> {
        self.actions.get(&chat_id)
    }

    pub fn update_disk_choice(&mut self, chat_id: ChatId, disk_idx: usize) -> bool {
        match self.actions.get_mut(&chat_id) {
            Some(action) => {
                action.disk_idx = disk_idx;
                true
            }
            None => false,
        }
    }

    pub fn take(&mut self, chat_id: ChatId) -> Option<PendingAction> {
        self.actions.remove(&chat_id)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

fn magnet_display_name(uri: &str) -> Option<String> {
    let url = Url::parse(uri).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "dn")
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
