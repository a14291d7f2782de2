//! Per-chat conversation: intake of magnets and media, destination menus,
//! and hand-off to finalization.
//!
//! A chat is idle until it sends a magnet or media message. That creates a
//! pending action and shows the category menu; disk buttons update the
//! pending action in place and a category button consumes it.

use tracing::{debug, info, warn};

use crate::event::{CallbackAction, CallbackEvent, Command, EventKind, InboundEvent, MediaKind, MediaMessage};
use crate::finalize;
use crate::pending::PendingAction;
use crate::qbit::TorrentDaemon;
use crate::render::{category_keyboard, megabytes, strip_markdown};
use crate::state::Context;
use crate::status;
use crate::telegram::{ChatGateway, ChatId, MessageId, ParseMode};

pub async fn handle_event<C: ChatGateway, D: TorrentDaemon>(
    ctx: &mut Context<C, D>,
    event: InboundEvent,
    now: i64,
) {
    let chat_id = event.chat_id;
    let authorized = event
        .sender_id
        .is_some_and(|sender_id| ctx.config.is_allowed(sender_id));
    if !authorized {
        debug!(chat_id, sender_id = ?event.sender_id, "dropping event from unauthorized sender");
        return;
    }

    if !matches!(event.kind, EventKind::Callback(_)) && ctx.state.remember_chat(chat_id) {
        info!(chat_id, "new chat registered");
        ctx.persist_or_log(now, "new chat");
    }

    match event.kind {
        EventKind::Command(Command::Status { message_id }) => {
            info!(chat_id, "status command received");
            if let Err(err) = ctx.chat.delete_message(chat_id, message_id).await {
                debug!(chat_id, message_id, error = %err, "could not delete status command");
            }
            status::report(ctx, chat_id).await;
        }
        EventKind::Magnet(uri) => accept_magnet(ctx, chat_id, &uri).await,
        EventKind::Media(media) => accept_media(ctx, chat_id, media, now).await,
        EventKind::Callback(callback) => handle_callback(ctx, chat_id, callback, now).await,
        EventKind::Other => {}
    }
}

async fn accept_magnet<C: ChatGateway, D: TorrentDaemon>(ctx: &mut Context<C, D>, chat_id: ChatId, uri: &str) {
    let disk_idx = ctx.config.default_disk_idx;
    let action = PendingAction::magnet(uri, disk_idx);
    debug!(chat_id, name = %action.name, "magnet received");
    store_pending(ctx, chat_id, action);

    let keyboard = category_keyboard(&ctx.config, disk_idx);
    let text = "🔗 Magnet detected. Choose destination:";
    if let Err(err) = ctx
        .chat
        .send_message(chat_id, text, Some(ParseMode::Markdown), Some(&keyboard))
        .await
    {
        warn!(chat_id, error = %err, "failed to send destination menu");
    }
}

async fn accept_media<C: ChatGateway, D: TorrentDaemon>(
    ctx: &mut Context<C, D>,
    chat_id: ChatId,
    media: MediaMessage,
    now: i64,
) {
    if media.file_size > ctx.config.max_file_size {
        info!(chat_id, size = media.file_size, "rejecting oversize media");
        let text = format!(
            "⚠️ *File too large* ({}MB).\nBot API limit is *{}MB*.",
            megabytes(media.file_size),
            megabytes(ctx.config.max_file_size)
        );
        if let Err(err) = ctx
            .chat
            .send_message(chat_id, &text, Some(ParseMode::Markdown), None)
            .await
        {
            warn!(chat_id, error = %err, "failed to send size rejection");
        }
        return;
    }

    let name = match media.kind {
        MediaKind::Photo => format!("photo_{now}.jpg"),
        MediaKind::Video => media.file_name.unwrap_or_else(|| "video.mp4".to_string()),
        MediaKind::File => media.file_name.unwrap_or_else(|| "file".to_string()),
    };
    let disk_idx = ctx.config.default_disk_idx;
    debug!(chat_id, name = %name, kind = ?media.kind, "media received");
    store_pending(
        ctx,
        chat_id,
        PendingAction::media(media.kind, &media.file_id, &name, disk_idx),
    );

    let keyboard = category_keyboard(&ctx.config, disk_idx);
    let text = format!("📥 Received: `{}`\nChoose destination:", strip_markdown(&name));
    if let Err(err) = ctx
        .chat
        .send_message(chat_id, &text, Some(ParseMode::Markdown), Some(&keyboard))
        .await
    {
        warn!(chat_id, error = %err, "failed to send destination menu");
    }
}

fn store_pending<C, D>(ctx: &mut Context<C, D>, chat_id: ChatId, action: PendingAction) {
    if let Some(replaced) = ctx.state.pending.set(chat_id, action) {
        debug!(chat_id, name = %replaced.name, "replaced unconsumed pending action");
    }
}

async fn handle_callback<C: ChatGateway, D: TorrentDaemon>(
    ctx: &mut Context<C, D>,
    chat_id: ChatId,
    callback: CallbackEvent,
    now: i64,
) {
    if let Err(err) = ctx.chat.answer_callback_query(&callback.query_id).await {
        debug!(chat_id, error = %err, "failed to answer callback");
    }

    match callback.action {
        CallbackAction::SetDisk(disk_idx) => choose_disk(ctx, chat_id, callback.message_id, disk_idx).await,
        CallbackAction::Download(key) => {
            choose_category(ctx, chat_id, callback.message_id, &key, now).await
        }
        CallbackAction::Unknown(data) => debug!(chat_id, data = %data, "ignoring unknown callback"),
    }
}

async fn choose_disk<C: ChatGateway, D: TorrentDaemon>(
    ctx: &mut Context<C, D>,
    chat_id: ChatId,
    message_id: MessageId,
    disk_idx: usize,
) {
    let Some(disk) = ctx.config.disks.get(disk_idx) else {
        debug!(chat_id, disk_idx, "ignoring out of range disk");
        return;
    };
    if !ctx.state.pending.update_disk_choice(chat_id, disk_idx) {
        debug!(chat_id, "disk chosen with nothing pending");
        return;
    }

    let text = format!("💿 Disk: {disk}\nChoose category:");
    let keyboard = category_keyboard(&ctx.config, disk_idx);
    if let Err(err) = ctx
        .chat
        .edit_message_text(chat_id, message_id, &text, Some(&keyboard))
        .await
    {
        warn!(chat_id, error = %err, "failed to re-render destination menu");
    }
}

async fn choose_category<C: ChatGateway, D: TorrentDaemon>(
    ctx: &mut Context<C, D>,
    chat_id: ChatId,
    message_id: MessageId,
    key: &str,
    now: i64,
) {
    let Some(disk_idx) = ctx.state.pending.get(chat_id).map(|action| action.disk_idx) else {
        debug!(chat_id, "category chosen with nothing pending");
        return;
    };
    let Some(dir) = ctx.config.destination(disk_idx, key) else {
        warn!(chat_id, key, disk_idx, "ignoring unknown destination");
        return;
    };
    let Some(action) = ctx.state.pending.take(chat_id) else {
        return;
    };

    if let Err(err) = ctx.chat.delete_message(chat_id, message_id).await {
        debug!(chat_id, message_id, error = %err, "could not delete destination menu");
    }
    finalize::finalize(ctx, chat_id, action, &dir, now).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pending::PendingKind;
    use crate::testing::{self, torrent};

    const OWNER: i64 = 42;
    const CHAT: i64 = 7;

    fn event(sender: i64, kind: EventKind) -> InboundEvent {
        InboundEvent {
            chat_id: CHAT,
            sender_id: Some(sender),
            kind,
        }
    }

    fn callback(action: CallbackAction) -> EventKind {
        EventKind::Callback(CallbackEvent {
            query_id: "q".to_string(),
            message_id: 55,
            action,
        })
    }

    fn media(kind: MediaKind, size: u64) -> EventKind {
        EventKind::Media(MediaMessage {
            kind,
            file_id: "FILE".to_string(),
            file_name: Some("clip.mp4".to_string()),
            file_size: size,
        })
    }

    const MAGNET: &str = "magnet:?xt=urn:btih:abc&dn=Ubuntu";

    #[tokio::test]
    async fn unauthorized_magnet_is_silently_dropped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ctx = testing::context(dir.path());

        handle_event(&mut ctx, event(999, EventKind::Magnet(MAGNET.to_string())), 10).await;

        assert!(ctx.state.pending.is_empty());
        assert!(ctx.chat.sent.borrow().is_empty());
        assert!(ctx.state.known_chats.is_empty());
    }

    #[tokio::test]
    async fn first_message_registers_chat_and_saves() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ctx = testing::context(dir.path());

        handle_event(&mut ctx, event(OWNER, EventKind::Other), 10).await;

        assert_eq!(ctx.state.known_chats, vec![CHAT]);
        assert_eq!(ctx.store.load().expect("load").known_chats, vec![CHAT]);
        assert!(ctx.chat.sent.borrow().is_empty());
    }

    #[tokio::test]
    async fn magnet_creates_pending_action_and_menu() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ctx = testing::context(dir.path());

        handle_event(&mut ctx, event(OWNER, EventKind::Magnet(MAGNET.to_string())), 10).await;

        let pending = ctx.state.pending.get(CHAT).expect("pending");
        assert_eq!(pending.kind, PendingKind::Magnet);
        assert_eq!(pending.disk_idx, 0);
        assert_eq!(pending.name, "Ubuntu");
        let sent = ctx.chat.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.starts_with("🔗 Magnet detected"));
        assert_eq!(sent[0].keyboard, Some(category_keyboard(&ctx.config, 0)));
    }

    #[tokio::test]
    async fn second_item_replaces_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ctx = testing::context(dir.path());

        handle_event(&mut ctx, event(OWNER, EventKind::Magnet(MAGNET.to_string())), 10).await;
        handle_event(&mut ctx, event(OWNER, media(MediaKind::Video, 1024)), 11).await;

        assert_eq!(ctx.state.pending.len(), 1);
        let pending = ctx.state.pending.get(CHAT).expect("pending");
        assert_eq!(pending.kind, PendingKind::Media(MediaKind::Video));
        assert_eq!(pending.name, "clip.mp4");
    }

    #[tokio::test]
    async fn oversize_media_is_rejected_without_state_change() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ctx = testing::context(dir.path());

        handle_event(&mut ctx, event(OWNER, media(MediaKind::File, 25 * 1024 * 1024)), 10).await;

        assert!(ctx.state.pending.is_empty());
        let texts = ctx.chat.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("File too large"));
        assert!(texts[0].contains("(25MB)"));
        assert!(texts[0].contains("*20MB*"));
    }

    #[tokio::test]
    async fn photo_gets_timestamped_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ctx = testing::context(dir.path());

        handle_event(&mut ctx, event(OWNER, media(MediaKind::Photo, 100)), 1_700_000_000).await;

        let pending = ctx.state.pending.get(CHAT).expect("pending");
        assert_eq!(pending.name, "photo_1700000000.jpg");
    }

    #[tokio::test]
    async fn disk_choice_keeps_pending_and_rerenders() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ctx = testing::context(dir.path());
        handle_event(&mut ctx, event(OWNER, EventKind::Magnet(MAGNET.to_string())), 10).await;

        handle_event(&mut ctx, event(OWNER, callback(CallbackAction::SetDisk(1))), 11).await;

        assert_eq!(ctx.state.pending.get(CHAT).map(|action| action.disk_idx), Some(1));
        assert_eq!(*ctx.chat.answered.borrow(), vec!["q".to_string()]);
        let edited = ctx.chat.edited.borrow();
        assert_eq!(edited.len(), 1);
        assert_eq!(edited[0].1, 55);
        assert!(edited[0].2.contains("disk2"));
    }

    #[tokio::test]
    async fn out_of_range_disk_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ctx = testing::context(dir.path());
        handle_event(&mut ctx, event(OWNER, EventKind::Magnet(MAGNET.to_string())), 10).await;

        handle_event(&mut ctx, event(OWNER, callback(CallbackAction::SetDisk(9))), 11).await;

        assert_eq!(ctx.state.pending.get(CHAT).map(|action| action.disk_idx), Some(0));
        assert!(ctx.chat.edited.borrow().is_empty());
    }

    #[tokio::test]
    async fn magnet_finalizes_to_chosen_disk_and_category() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ctx = testing::context_with(dir.path(), |config| config.notification_cleanup_time = 60);
        handle_event(&mut ctx, event(OWNER, EventKind::Magnet(MAGNET.to_string())), 10).await;
        handle_event(&mut ctx, event(OWNER, callback(CallbackAction::SetDisk(1))), 11).await;

        handle_event(
            &mut ctx,
            event(OWNER, callback(CallbackAction::Download("movies".to_string()))),
            1_000,
        )
        .await;

        let expected_dir = format!("{}/movies", ctx.config.disks[1]);
        assert_eq!(ctx.daemon.magnets, vec![(MAGNET.to_string(), expected_dir.clone())]);
        assert!(ctx.state.pending.is_empty());
        assert!(std::path::Path::new(&expected_dir).is_dir());
        assert!(ctx.chat.deleted.borrow().contains(&(CHAT, 55)));

        let sent = ctx.chat.sent.borrow();
        let confirmation = sent.last().expect("confirmation");
        assert!(confirmation.text.contains("Magnet added"));
        let deletions = ctx.state.deletions.entries();
        assert_eq!(deletions.len(), 1);
        assert_eq!(deletions[0].chat_id, CHAT);
        assert_eq!(deletions[0].message_id, confirmation.message_id);
        assert_eq!(deletions[0].expires_at, 1_060);
    }

    #[tokio::test]
    async fn stale_category_press_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ctx = testing::context(dir.path());

        handle_event(
            &mut ctx,
            event(OWNER, callback(CallbackAction::Download("movies".to_string()))),
            10,
        )
        .await;

        assert!(ctx.daemon.magnets.is_empty());
        assert!(ctx.chat.sent.borrow().is_empty());
        assert!(ctx.chat.deleted.borrow().is_empty());
    }

    #[tokio::test]
    async fn unknown_category_keeps_pending() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ctx = testing::context(dir.path());
        handle_event(&mut ctx, event(OWNER, EventKind::Magnet(MAGNET.to_string())), 10).await;

        handle_event(
            &mut ctx,
            event(OWNER, callback(CallbackAction::Download("../../etc".to_string()))),
            11,
        )
        .await;

        assert!(ctx.state.pending.get(CHAT).is_some());
        assert!(ctx.daemon.magnets.is_empty());
    }

    #[tokio::test]
    async fn callbacks_from_strangers_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ctx = testing::context(dir.path());
        handle_event(&mut ctx, event(OWNER, EventKind::Magnet(MAGNET.to_string())), 10).await;

        handle_event(
            &mut ctx,
            event(999, callback(CallbackAction::Download("movies".to_string()))),
            11,
        )
        .await;

        assert!(ctx.state.pending.get(CHAT).is_some());
        assert!(ctx.chat.answered.borrow().is_empty());
    }

    #[tokio::test]
    async fn status_command_deletes_command_and_reports() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ctx = testing::context(dir.path());
        ctx.daemon.all = vec![torrent("h1", "Ubuntu", 0.5, "downloading")];

        handle_event(
            &mut ctx,
            event(OWNER, EventKind::Command(Command::Status { message_id: 77 })),
            10,
        )
        .await;

        assert_eq!(*ctx.chat.deleted.borrow(), vec![(CHAT, 77)]);
        let texts = ctx.chat.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("Ubuntu"));
        assert_eq!(ctx.state.status.get(CHAT).len(), 1);
    }
}
