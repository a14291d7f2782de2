//! Typed view of raw chat updates.
//!
//! Updates are validated here once; everything past this module works on
//! [`InboundEvent`] and never touches the transport payload again.

use crate::telegram::{CallbackQuery, ChatId, Message, MessageId, Update, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub chat_id: ChatId,
    pub sender_id: Option<UserId>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Command(Command),
    Magnet(String),
    Media(MediaMessage),
    Callback(CallbackEvent),
    /// An ordinary message that carries nothing actionable.
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status { message_id: MessageId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    File,
    Video,
    Photo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaMessage {
    pub kind: MediaKind,
    pub file_id: String,
    pub file_name: Option<String>,
    pub file_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEvent {
    pub query_id: String,
    pub message_id: MessageId,
    pub action: CallbackAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    SetDisk(usize),
    Download(String),
    Unknown(String),
}

impl CallbackAction {
    pub fn parse(data: &str) -> Self {
        if let Some(idx) = data.strip_prefix("set_disk:") {
            if let Ok(idx) = idx.parse() {
                return CallbackAction::SetDisk(idx);
            }
        } else if let Some(key) = data.strip_prefix("dl:") {
            return CallbackAction::Download(key.to_string());
        }
        CallbackAction::Unknown(data.to_string())
    }

    pub fn encode(&self) -> String {
        match self {
            CallbackAction::SetDisk(idx) => format!("set_disk:{idx}"),
            CallbackAction::Download(key) => format!("dl:{key}"),
            CallbackAction::Unknown(data) => data.clone(),
        }
    }
}

impl InboundEvent {
    /// Returns `None` for updates the bridge has no use for (edits, inline
    /// queries, callbacks detached from a message).
    pub fn from_update(update: &Update) -> Option<Self> {
        if let Some(query) = &update.callback_query {
            return Self::from_callback(query);
        }
        update.message.as_ref().map(Self::from_message)
    }

    fn from_callback(query: &CallbackQuery) -> Option<Self> {
        let message = query.message.as_ref()?;
        let data = query.data.as_deref().unwrap_or_default();
        Some(Self {
            chat_id: message.chat.id,
            sender_id: Some(query.from.id),
            kind: EventKind::Callback(CallbackEvent {
                query_id: query.id.clone(),
                message_id: message.message_id,
                action: CallbackAction::parse(data),
            }),
        })
    }

    fn from_message(message: &Message) -> Self {
        Self {
            chat_id: message.chat.id,
            sender_id: message.from.as_ref().map(|user| user.id),
            kind: message_kind(message),
        }
    }
}

fn message_kind(message: &Message) -> EventKind {
    if let Some(text) = message.text.as_deref() {
        let text = text.trim();
        if is_status_command(text) {
            return EventKind::Command(Command::Status {
                message_id: message.message_id,
            });
        }
        if is_magnet(text) {
            return EventKind::Magnet(text.to_string());
        }
    }
    media(message).map(EventKind::Media).unwrap_or(EventKind::Other)
}

fn media(message: &Message) -> Option<MediaMessage> {
    if let Some(document) = &message.document {
        return Some(MediaMessage {
            kind: MediaKind::File,
            file_id: document.file_id.clone(),
            file_name: document.file_name.clone(),
            file_size: document.file_size.unwrap_or_default(),
        });
    }
    if let Some(video) = &message.video {
        return Some(MediaMessage {
            kind: MediaKind::Video,
            file_id: video.file_id.clone(),
            file_name: video.file_name.clone(),
            file_size: video.file_size.unwrap_or_default(),
        });
    }
    // Telegram lists photo sizes smallest first.
    let largest = message.photo.as_ref()?.last()?;
    Some(MediaMessage {
        kind: MediaKind::Photo,
        file_id: largest.file_id.clone(),
        file_name: None,
        file_size: largest.file_size.unwrap_or_default(),
    })
}

fn is_status_command(text: &str) -> bool {
    let command = text.split('@').next().unwrap_or(text);
    command == "/status"
}

pub fn is_magnet(text: &str) -> bool {
    text.get(..8)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("magnet:?"))
}
