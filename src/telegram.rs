use std::fs;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

pub type ChatId = i64;
pub type MessageId = i64;
pub type UserId = i64;

const FILE_DOWNLOAD_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected status: {0}")]
    Status(u16),
    #[error("api error {code}: {description}")]
    Api { code: i32, description: String },
    #[error("file {0} has no download path")]
    MissingFilePath(String),
}

/// Outbound and inbound operations of the chat transport.
#[async_trait(?Send)]
pub trait ChatGateway {
    async fn get_updates(&self, offset: i64, timeout: u64) -> Result<Vec<Update>, TelegramError>;

    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        parse_mode: Option<ParseMode>,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message, TelegramError>;

    async fn edit_message_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), TelegramError>;

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<(), TelegramError>;

    async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), TelegramError>;

    /// Resolves `file_id` through `getFile` and writes the content to `dest`.
    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<(), TelegramError>;
}

#[derive(Clone)]
pub struct TelegramClient {
    api_url: String,
    file_url: String,
    http: Client,
}

impl TelegramClient {
    pub fn new(base_url: &str, bot_token: &str, timeout: Duration) -> Result<Self, TelegramError> {
        let base_url = base_url.trim_end_matches('/');
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_url: format!("{base_url}/bot{bot_token}"),
            file_url: format!("{base_url}/file/bot{bot_token}"),
            http,
        })
    }

    pub async fn get_file(&self, file_id: &str) -> Result<File, TelegramError> {
        let mut payload = serde_json::Map::new();
        payload.insert("file_id".to_string(), json!(file_id));
        self.post("getFile", payload).await
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        payload: serde_json::Map<String, Value>,
    ) -> Result<T, TelegramError> {
        let url = format!("{}/{method}", self.api_url);
        let response = self.http.post(url).json(&payload).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        let api_response: ApiResponse<T> = match serde_json::from_slice(&body) {
            Ok(api_response) => api_response,
            Err(_) if !status.is_success() => return Err(TelegramError::Status(status.as_u16())),
            Err(err) => {
                debug!(method, error = %err, "undecodable telegram response");
                return Err(TelegramError::Status(status.as_u16()));
            }
        };
        match api_response {
            ApiResponse::Ok { result, .. } => Ok(result),
            ApiResponse::Err {
                error_code,
                description,
                ..
            } => Err(TelegramError::Api {
                code: error_code.unwrap_or_else(|| i32::from(status.as_u16())),
                description: description.unwrap_or_else(|| "Unknown error".to_string()),
            }),
        }
    }
}

#[async_trait(?Send)]
impl ChatGateway for TelegramClient {
    async fn get_updates(&self, offset: i64, timeout: u64) -> Result<Vec<Update>, TelegramError> {
        let mut payload = serde_json::Map::new();
        payload.insert("offset".to_string(), json!(offset));
        payload.insert("timeout".to_string(), json!(timeout));
        self.post("getUpdates", payload).await
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        parse_mode: Option<ParseMode>,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message, TelegramError> {
        let mut payload = serde_json::Map::new();
        payload.insert("chat_id".to_string(), json!(chat_id));
        payload.insert("text".to_string(), json!(text));
        if let Some(parse_mode) = parse_mode {
            payload.insert("parse_mode".to_string(), json!(parse_mode.as_str()));
        }
        if let Some(keyboard) = keyboard {
            payload.insert("reply_markup".to_string(), json!(keyboard));
        }
        self.post("sendMessage", payload).await
    }

    async fn edit_message_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), TelegramError> {
        let mut payload = serde_json::Map::new();
        payload.insert("chat_id".to_string(), json!(chat_id));
        payload.insert("message_id".to_string(), json!(message_id));
        payload.insert("text".to_string(), json!(text));
        if let Some(keyboard) = keyboard {
            payload.insert("reply_markup".to_string(), json!(keyboard));
        }
        let _: Value = self.post("editMessageText", payload).await?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<(), TelegramError> {
        let mut payload = serde_json::Map::new();
        payload.insert("chat_id".to_string(), json!(chat_id));
        payload.insert("message_id".to_string(), json!(message_id));
        let _: bool = self.post("deleteMessage", payload).await?;
        Ok(())
    }

    async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), TelegramError> {
        let mut payload = serde_json::Map::new();
        payload.insert("callback_query_id".to_string(), json!(callback_query_id));
        let _: bool = self.post("answerCallbackQuery", payload).await?;
        Ok(())
    }

    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<(), TelegramError> {
        let file = self.get_file(file_id).await?;
        let file_path = file
            .file_path
            .ok_or_else(|| TelegramError::MissingFilePath(file_id.to_string()))?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let response = self
            .http
            .get(format!("{}/{file_path}", self.file_url))
            .timeout(Duration::from_secs(FILE_DOWNLOAD_TIMEOUT_SECS))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TelegramError::Status(status.as_u16()));
        }
        let bytes = response.bytes().await?;
        fs::write(dest, &bytes)?;
        debug!(file_id, size = bytes.len(), "downloaded telegram file");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Markdown,
}

impl ParseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMode::Markdown => "Markdown",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: MessageId,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
    pub document: Option<Document>,
    pub video: Option<Video>,
    pub photo: Option<Vec<PhotoSize>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: UserId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub file_id: String,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Video {
    pub file_id: String,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct File {
    pub file_id: String,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiResponse<T> {
    Ok {
        #[allow(dead_code)]
        ok: bool,
        result: T,
    },
    Err {
        #[allow(dead_code)]
        ok: bool,
        error_code: Option<i32>,
        description: Option<String>,
    },
}
