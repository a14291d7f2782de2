use tracing::{debug, info, warn};

use crate::config::StatusFilter;
use crate::qbit::{TorrentDaemon, TorrentFilter, TorrentInfo};
use crate::render::strip_markdown;
use crate::state::Context;
use crate::telegram::{ChatGateway, ChatId, ParseMode};

const HEADER: &str = "📊 *qBit Status*\n\n";
const EMPTY: &str = "📭 No active torrents.";

/// Replaces earlier status messages in the chat with a fresh listing.
pub async fn report<C: ChatGateway, D: TorrentDaemon>(ctx: &mut Context<C, D>, chat_id: ChatId) {
    for message_id in ctx.state.status.take(chat_id) {
        if let Err(err) = ctx.chat.delete_message(chat_id, message_id).await {
            debug!(chat_id, message_id, error = %err, "could not delete old status");
        }
    }

    let torrents = match ctx.daemon.torrents(TorrentFilter::All).await {
        Ok(torrents) => torrents,
        Err(err) => {
            warn!(chat_id, error = %err, "could not fetch torrent list");
            return;
        }
    };

    let text = render(&torrents, ctx.config.status_filter, ctx.config.status_show_limit);
    match ctx
        .chat
        .send_message(chat_id, &text, Some(ParseMode::Markdown), None)
        .await
    {
        Ok(sent) => {
            info!(chat_id, message_id = sent.message_id, "status sent");
            ctx.state.status.record(chat_id, sent.message_id);
        }
        Err(err) => warn!(chat_id, error = %err, "failed to send status"),
    }
}

pub fn render(torrents: &[TorrentInfo], filter: StatusFilter, limit: usize) -> String {
    let limit = if limit == 0 { usize::MAX } else { limit };
    let lines: Vec<String> = torrents
        .iter()
        .filter(|torrent| matches_filter(torrent, filter))
        .take(limit)
        .map(|torrent| {
            let percent = (torrent.progress * 1000.0).round() / 10.0;
            format!(
                "• `{}`\n  {}% | {}",
                strip_markdown(&torrent.name),
                percent,
                torrent.state
            )
        })
        .collect();

    if lines.is_empty() {
        return EMPTY.to_string();
    }
    format!("{HEADER}{}", lines.join("\n"))
}

fn matches_filter(torrent: &TorrentInfo, filter: StatusFilter) -> bool {
    match filter {
        StatusFilter::All => true,
        StatusFilter::Downloading => {
            torrent.state.contains("DL") || torrent.state == "downloading"
        }
    }
}
