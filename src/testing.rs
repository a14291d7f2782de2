//! In-memory stand-ins for the chat transport and the download daemon.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use async_trait::async_trait;

use crate::config::{Config, test_config};
use crate::qbit::{QbitError, TorrentDaemon, TorrentFilter, TorrentInfo};
use crate::snapshot::SnapshotStore;
use crate::state::Context;
use crate::telegram::{
    Chat, ChatGateway, ChatId, InlineKeyboardMarkup, Message, MessageId, ParseMode, TelegramError,
    Update,
};

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub text: String,
    pub parse_mode: Option<ParseMode>,
    pub keyboard: Option<InlineKeyboardMarkup>,
}

#[derive(Default)]
pub struct FakeChat {
    pub updates: RefCell<VecDeque<Vec<Update>>>,
    pub sent: RefCell<Vec<SentMessage>>,
    pub edited: RefCell<Vec<(ChatId, MessageId, String)>>,
    pub deleted: RefCell<Vec<(ChatId, MessageId)>>,
    pub answered: RefCell<Vec<String>>,
    pub offsets: RefCell<Vec<i64>>,
    pub file_bytes: RefCell<Vec<u8>>,
    pub fail_downloads: Cell<bool>,
    pub fail_polls: Cell<bool>,
    next_message_id: Cell<MessageId>,
}

impl FakeChat {
    pub fn texts(&self) -> Vec<String> {
        self.sent.borrow().iter().map(|sent| sent.text.clone()).collect()
    }
}

#[async_trait(?Send)]
impl ChatGateway for FakeChat {
    async fn get_updates(&self, offset: i64, _timeout: u64) -> Result<Vec<Update>, TelegramError> {
        self.offsets.borrow_mut().push(offset);
        if self.fail_polls.get() {
            return Err(TelegramError::Status(502));
        }
        Ok(self.updates.borrow_mut().pop_front().unwrap_or_default())
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        parse_mode: Option<ParseMode>,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message, TelegramError> {
        let message_id = self.next_message_id.get() + 100;
        self.next_message_id.set(self.next_message_id.get() + 1);
        self.sent.borrow_mut().push(SentMessage {
            chat_id,
            message_id,
            text: text.to_string(),
            parse_mode,
            keyboard: keyboard.cloned(),
        });
        Ok(Message {
            message_id,
            from: None,
            chat: Chat { id: chat_id },
            text: Some(text.to_string()),
            document: None,
            video: None,
            photo: None,
        })
    }

    async fn edit_message_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        _keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), TelegramError> {
        self.edited
            .borrow_mut()
            .push((chat_id, message_id, text.to_string()));
        Ok(())
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<(), TelegramError> {
        self.deleted.borrow_mut().push((chat_id, message_id));
        Ok(())
    }

    async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), TelegramError> {
        self.answered.borrow_mut().push(callback_query_id.to_string());
        Ok(())
    }

    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<(), TelegramError> {
        if self.fail_downloads.get() {
            return Err(TelegramError::MissingFilePath(file_id.to_string()));
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, self.file_bytes.borrow().as_slice())?;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeDaemon {
    pub all: Vec<TorrentInfo>,
    pub completed: Vec<TorrentInfo>,
    pub magnets: Vec<(String, String)>,
    pub files: Vec<(String, Vec<u8>, String)>,
    pub removed: Vec<String>,
    pub paused: Vec<String>,
    pub unreachable: bool,
}

impl FakeDaemon {
    fn check(&self) -> Result<(), QbitError> {
        if self.unreachable {
            return Err(QbitError::LoginFailed);
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl TorrentDaemon for FakeDaemon {
    async fn add_magnet(&mut self, uri: &str, savepath: &str) -> Result<(), QbitError> {
        self.check()?;
        self.magnets.push((uri.to_string(), savepath.to_string()));
        Ok(())
    }

    async fn add_torrent_file(&mut self, path: &Path, savepath: &str) -> Result<(), QbitError> {
        self.check()?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.files.push((name, fs::read(path)?, savepath.to_string()));
        Ok(())
    }

    async fn torrents(&mut self, filter: TorrentFilter) -> Result<Vec<TorrentInfo>, QbitError> {
        self.check()?;
        Ok(match filter {
            TorrentFilter::All => self.all.clone(),
            TorrentFilter::Completed => self.completed.clone(),
        })
    }

    async fn remove(&mut self, hash: &str) -> Result<(), QbitError> {
        self.check()?;
        self.removed.push(hash.to_string());
        Ok(())
    }

    async fn pause(&mut self, hash: &str) -> Result<(), QbitError> {
        self.check()?;
        self.paused.push(hash.to_string());
        Ok(())
    }
}

pub fn torrent(hash: &str, name: &str, progress: f64, state: &str) -> TorrentInfo {
    TorrentInfo {
        hash: hash.to_string(),
        name: name.to_string(),
        progress,
        state: state.to_string(),
    }
}

/// A context rooted in `dir`: snapshot, staging and disk paths all live below it.
pub fn context(dir: &Path) -> Context<FakeChat, FakeDaemon> {
    context_with(dir, |_| {})
}

pub fn context_with(dir: &Path, tweak: impl FnOnce(&mut Config)) -> Context<FakeChat, FakeDaemon> {
    let mut config = test_config();
    config.disks = vec![
        dir.join("disk1").to_string_lossy().into_owned(),
        dir.join("disk2").to_string_lossy().into_owned(),
    ];
    config.state_file = dir.join("state.json");
    config.staging_dir = dir.join("staging");
    tweak(&mut config);
    let store = SnapshotStore::new(config.state_file.clone());
    Context::new(config, FakeChat::default(), FakeDaemon::default(), store).expect("context")
}
