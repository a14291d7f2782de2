use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, error};

use crate::config::Config;
use crate::pending::PendingStore;
use crate::schedule::DeletionQueue;
use crate::snapshot::{Snapshot, SnapshotError, SnapshotStore};
use crate::telegram::{ChatId, MessageId};

pub const STATUS_HISTORY_LIMIT: usize = 5;

/// Message ids of earlier status renders, newest last.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StatusHistory {
    ids: BTreeMap<ChatId, Vec<MessageId>>,
}

impl StatusHistory {
    pub fn get(&self, chat_id: ChatId) -> &[MessageId] {
        self.ids.get(&chat_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Empties the chat's history and hands back what was in it.
    pub fn take(&mut self, chat_id: ChatId) -> Vec<MessageId> {
        self.ids
            .get_mut(&chat_id)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    pub fn record(&mut self, chat_id: ChatId, message_id: MessageId) {
        let ids = self.ids.entry(chat_id).or_default();
        ids.push(message_id);
        if ids.len() > STATUS_HISTORY_LIMIT {
            let excess = ids.len() - STATUS_HISTORY_LIMIT;
            ids.drain(..excess);
        }
    }
}

/// Process-wide mutable state. Owned by the loop and lent to one component at a time.
#[derive(Debug, Default)]
pub struct BridgeState {
    pub known_chats: Vec<ChatId>,
    pub notified: BTreeSet<String>,
    pub status: StatusHistory,
    pub pending: PendingStore,
    pub deletions: DeletionQueue,
    /// Next update id to request from the transport.
    pub offset: i64,
}

impl BridgeState {
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut state = Self::default();
        for chat_id in snapshot.known_chats {
            state.remember_chat(chat_id);
        }
        state.notified = snapshot.notified_torrents.into_iter().collect();
        for (chat_id, ids) in snapshot.last_status_ids {
            for id in ids {
                state.status.record(chat_id, id);
            }
        }
        state
    }

    pub fn snapshot(&self, now: i64) -> Snapshot {
        Snapshot {
            known_chats: self.known_chats.clone(),
            notified_torrents: self.notified.iter().cloned().collect(),
            last_status_ids: self.status.ids.clone(),
            timestamp: now,
        }
    }

    /// Returns `true` when the chat had not been seen before.
    pub fn remember_chat(&mut self, chat_id: ChatId) -> bool {
        if self.known_chats.contains(&chat_id) {
            return false;
        }
        self.known_chats.push(chat_id);
        true
    }

    pub fn is_notified(&self, hash: &str) -> bool {
        self.notified.contains(hash)
    }

    pub fn mark_notified(&mut self, hash: &str) -> bool {
        self.notified.insert(hash.to_string())
    }
}

/// Everything a component may touch during one tick.
pub struct Context<C, D> {
    pub config: Config,
    pub chat: C,
    pub daemon: D,
    pub state: BridgeState,
    pub store: SnapshotStore,
}

impl<C, D> Context<C, D> {
    pub fn new(config: Config, chat: C, daemon: D, store: SnapshotStore) -> Result<Self, SnapshotError> {
        let state = BridgeState::from_snapshot(store.load()?);
        debug!(
            known_chats = state.known_chats.len(),
            notified = state.notified.len(),
            path = %store.path().display(),
            "loaded snapshot"
        );
        Ok(Self {
            config,
            chat,
            daemon,
            state,
            store,
        })
    }

    pub fn persist(&self, now: i64) -> Result<(), SnapshotError> {
        self.store.save(&self.state.snapshot(now))
    }

    /// Saves the snapshot; a failure is logged and the in-memory state kept.
    pub fn persist_or_log(&self, now: i64, reason: &str) {
        if let Err(err) = self.persist(now) {
            error!(reason, error = %err, "failed to save snapshot");
        }
    }
}
