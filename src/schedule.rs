//! Timer bookkeeping for the main loop, kept free of I/O and real clocks.

use crate::telegram::{ChatId, MessageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueAction {
    CheckCompletions,
    SaveSnapshot,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    check_interval: i64,
    save_interval: i64,
    last_check: i64,
    last_save: i64,
}

impl Scheduler {
    /// Both timers start expired so the first tick checks and saves.
    pub fn new(check_interval: i64, save_interval: i64) -> Self {
        Self {
            check_interval,
            save_interval,
            last_check: 0,
            last_save: 0,
        }
    }

    /// Actions whose interval has elapsed at `now`; their timers restart at `now`.
    pub fn due(&mut self, now: i64) -> Vec<DueAction> {
        let mut actions = Vec::new();
        if now - self.last_check >= self.check_interval {
            self.last_check = now;
            actions.push(DueAction::CheckCompletions);
        }
        if now - self.last_save >= self.save_interval {
            self.last_save = now;
            actions.push(DueAction::SaveSnapshot);
        }
        actions
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredDeletion {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub expires_at: i64,
}

#[derive(Debug, Default)]
pub struct DeletionQueue {
    entries: Vec<DeferredDeletion>,
}

impl DeletionQueue {
    pub fn push(&mut self, chat_id: ChatId, message_id: MessageId, expires_at: i64) {
        self.entries.push(DeferredDeletion {
            chat_id,
            message_id,
            expires_at,
        });
    }

    /// Removes and returns every entry that has expired by `now`.
    pub fn take_due(&mut self, now: i64) -> Vec<DeferredDeletion> {
        let (due, pending): (Vec<_>, Vec<_>) = self
            .entries
            .drain(..)
            .partition(|entry| now >= entry.expires_at);
        self.entries = pending;
        due
    }

    pub fn entries(&self) -> &[DeferredDeletion] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
