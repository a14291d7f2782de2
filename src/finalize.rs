use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::event::MediaKind;
use crate::pending::{PendingAction, PendingKind};
use crate::qbit::{QbitError, TorrentDaemon};
use crate::state::Context;
use crate::telegram::{ChatGateway, ChatId, ParseMode, TelegramError};

static UNSAFE_FILE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9._\-]").expect("valid file name regex"));

#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("could not fetch file: {0}")]
    Fetch(#[source] TelegramError),
    #[error("daemon did not take the job: {0}")]
    Daemon(#[source] QbitError),
    #[error("could not move media to {target}: {source}")]
    Move { target: PathBuf, source: io::Error },
}

impl FinalizeError {
    pub fn user_message(&self) -> String {
        match self {
            FinalizeError::Fetch(_) => "❌ Could not get file from Telegram (Check 20MB limit).".to_string(),
            FinalizeError::Daemon(_) => "❌ qBittorrent did not accept the download.".to_string(),
            FinalizeError::Move { target, .. } => {
                format!("❌ Could not save media to {}.", target.display())
            }
        }
    }
}

/// Submits a consumed pending action to `dir` and reports back to the chat.
/// Success confirmations are queued for deletion after the configured TTL.
pub async fn finalize<C: ChatGateway, D: TorrentDaemon>(
    ctx: &mut Context<C, D>,
    chat_id: ChatId,
    action: PendingAction,
    dir: &str,
    now: i64,
) {
    if let Err(err) = fs::create_dir_all(dir) {
        warn!(dir, error = %err, "could not create destination directory");
    }

    match submit(ctx, &action, dir).await {
        Ok(text) => {
            info!(chat_id, name = %action.name, dir, "download finalized");
            match ctx
                .chat
                .send_message(chat_id, &text, Some(ParseMode::Markdown), None)
                .await
            {
                Ok(sent) => {
                    let expires_at = now + ctx.config.notification_cleanup_time;
                    ctx.state.deletions.push(chat_id, sent.message_id, expires_at);
                }
                Err(err) => warn!(chat_id, error = %err, "failed to send confirmation"),
            }
        }
        Err(err) => {
            warn!(chat_id, name = %action.name, error = %err, "finalization failed");
            if let Err(err) = ctx
                .chat
                .send_message(chat_id, &err.user_message(), None, None)
                .await
            {
                warn!(chat_id, error = %err, "failed to send failure notice");
            }
        }
    }
}

async fn submit<C: ChatGateway, D: TorrentDaemon>(
    ctx: &mut Context<C, D>,
    action: &PendingAction,
    dir: &str,
) -> Result<String, FinalizeError> {
    let media_kind = match action.kind {
        PendingKind::Magnet => {
            ctx.daemon
                .add_magnet(&action.payload, dir)
                .await
                .map_err(FinalizeError::Daemon)?;
            return Ok(format!("✅ Magnet added to qBit.\nDir: `{dir}`"));
        }
        PendingKind::Media(kind) => kind,
    };

    let staged = ctx.config.staging_dir.join(sanitize_file_name(&action.name));
    ctx.chat
        .download_file(&action.payload, &staged)
        .await
        .map_err(FinalizeError::Fetch)?;

    match media_kind {
        MediaKind::File => {
            let result = ctx.daemon.add_torrent_file(&staged, dir).await;
            if let Err(err) = fs::remove_file(&staged) {
                debug!(path = %staged.display(), error = %err, "could not remove staged file");
            }
            result.map_err(FinalizeError::Daemon)?;
            Ok(format!("✅ Torrent added.\nDir: `{dir}`"))
        }
        MediaKind::Video | MediaKind::Photo => {
            let file_name = staged.file_name().unwrap_or_default();
            let target = Path::new(dir).join(file_name);
            move_file(&staged, &target).map_err(|source| FinalizeError::Move {
                target: target.clone(),
                source,
            })?;
            Ok(format!("✅ Media saved to `{dir}`"))
        }
    }
}

pub fn sanitize_file_name(name: &str) -> String {
    let sanitized = UNSAFE_FILE_CHARS.replace_all(name, "_").into_owned();
    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        return "file".to_string();
    }
    sanitized
}

// Falls back to copy + remove when the rename crosses filesystems.
fn move_file(from: &Path, to: &Path) -> Result<(), io::Error> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    if let Err(err) = fs::remove_file(from) {
        debug!(path = %from.display(), error = %err, "could not remove staged file");
    }
    Ok(())
}
