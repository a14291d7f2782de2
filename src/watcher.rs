use tracing::{info, warn};

use crate::config::CompletionAction;
use crate::qbit::{TorrentDaemon, TorrentFilter};
use crate::state::Context;
use crate::telegram::{ChatGateway, ParseMode};

/// Announces every completed job that has not been announced before.
/// Returns how many jobs were newly announced.
pub async fn check_completions<C: ChatGateway, D: TorrentDaemon>(ctx: &mut Context<C, D>, now: i64) -> usize {
    let completed = match ctx.daemon.torrents(TorrentFilter::Completed).await {
        Ok(completed) => completed,
        Err(err) => {
            warn!(error = %err, "completion check failed");
            return 0;
        }
    };

    let mut announced = 0;
    for job in completed {
        if job.hash.is_empty() || ctx.state.is_notified(&job.hash) {
            continue;
        }

        let settled = match ctx.config.action_on_complete {
            CompletionAction::Remove => ctx.daemon.remove(&job.hash).await,
            CompletionAction::Pause => ctx.daemon.pause(&job.hash).await,
        };
        if let Err(err) = settled {
            warn!(hash = %job.hash, action = ?ctx.config.action_on_complete, error = %err, "could not settle finished job");
        }

        let text = format!("✅ *Finished:* `{}`", job.name);
        for &chat_id in &ctx.state.known_chats {
            if let Err(err) = ctx
                .chat
                .send_message(chat_id, &text, Some(ParseMode::Markdown), None)
                .await
            {
                warn!(chat_id, error = %err, "failed to send completion notice");
            }
        }

        info!(hash = %job.hash, name = %job.name, "job finished");
        ctx.state.mark_notified(&job.hash);
        ctx.persist_or_log(now, "completion");
        announced += 1;
    }
    announced
}
