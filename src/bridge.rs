//! The main loop: one long-poll, then whatever timers have come due.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::event::InboundEvent;
use crate::flow;
use crate::qbit::TorrentDaemon;
use crate::schedule::{DueAction, Scheduler};
use crate::snapshot::SnapshotError;
use crate::state::Context;
use crate::telegram::{ChatGateway, TelegramError, Update};
use crate::watcher;

const IDLE_PAUSE: Duration = Duration::from_millis(100);
const ERROR_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("polling failed: {0}")]
    Poll(#[from] TelegramError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

pub struct Bridge<C, D> {
    ctx: Context<C, D>,
    scheduler: Scheduler,
}

impl<C: ChatGateway, D: TorrentDaemon> Bridge<C, D> {
    pub fn new(ctx: Context<C, D>) -> Self {
        let scheduler = Scheduler::new(ctx.config.check_interval, ctx.config.state_save_interval);
        Self { ctx, scheduler }
    }

    pub fn context(&self) -> &Context<C, D> {
        &self.ctx
    }

    /// Runs until the process is killed.
    pub async fn run(&mut self) {
        info!(
            known_chats = self.ctx.state.known_chats.len(),
            disks = self.ctx.config.disks.len(),
            "bridge started"
        );
        loop {
            if let Err(err) = self.tick().await {
                error!(error = %err, "tick failed");
                tokio::time::sleep(ERROR_BACKOFF).await;
            }
            tokio::time::sleep(IDLE_PAUSE).await;
        }
    }

    /// One pass: poll, dispatch in arrival order, then the timed work.
    pub async fn tick(&mut self) -> Result<(), BridgeError> {
        let updates = self
            .ctx
            .chat
            .get_updates(self.ctx.state.offset, self.ctx.config.poll_timeout)
            .await?;
        let now = chrono::Utc::now().timestamp();
        self.dispatch(updates, now).await;
        self.run_due(now).await
    }

    pub async fn dispatch(&mut self, updates: Vec<Update>, now: i64) {
        for update in updates {
            self.ctx.state.offset = update.update_id + 1;
            match InboundEvent::from_update(&update) {
                Some(event) => flow::handle_event(&mut self.ctx, event, now).await,
                None => debug!(update_id = update.update_id, "ignoring update"),
            }
        }
    }

    pub async fn run_due(&mut self, now: i64) -> Result<(), BridgeError> {
        for action in self.scheduler.due(now) {
            match action {
                DueAction::CheckCompletions => {
                    watcher::check_completions(&mut self.ctx, now).await;
                }
                DueAction::SaveSnapshot => {
                    self.ctx.persist(now)?;
                    debug!("snapshot saved");
                }
            }
        }

        for deletion in self.ctx.state.deletions.take_due(now) {
            if let Err(err) = self
                .ctx
                .chat
                .delete_message(deletion.chat_id, deletion.message_id)
                .await
            {
                debug!(chat_id = deletion.chat_id, message_id = deletion.message_id, error = %err, "deferred deletion failed");
            }
        }
        Ok(())
    }
}
