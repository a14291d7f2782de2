use std::fs;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{REFERER, SET_COOKIE};
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::session::{self, Session, SessionEvent, Verdict};

#[derive(Debug, Error)]
pub enum QbitError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("login failed: no session cookie in response")]
    LoginFailed,
    #[error("session rejected after re-authentication")]
    Unauthorized,
    #[error("unexpected status: {0}")]
    Status(u16),
    #[error("daemon refused the request: {0}")]
    Refused(String),
    #[error("unexpected response body for {0}")]
    UnexpectedBody(String),
}

/// Job operations the bridge needs from the download daemon.
#[async_trait(?Send)]
pub trait TorrentDaemon {
    async fn add_magnet(&mut self, uri: &str, savepath: &str) -> Result<(), QbitError>;

    async fn add_torrent_file(&mut self, path: &Path, savepath: &str) -> Result<(), QbitError>;

    async fn torrents(&mut self, filter: TorrentFilter) -> Result<Vec<TorrentInfo>, QbitError>;

    async fn remove(&mut self, hash: &str) -> Result<(), QbitError>;

    async fn pause(&mut self, hash: &str) -> Result<(), QbitError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorrentFilter {
    All,
    Completed,
}

impl TorrentFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            TorrentFilter::All => "all",
            TorrentFilter::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TorrentInfo {
    pub hash: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub state: String,
}

/// Request shape: reads go out as a query string, writes as a form or multipart body.
#[derive(Debug, Clone)]
pub enum Payload {
    Query(Vec<(String, String)>),
    Form(Vec<(String, String)>),
    Multipart {
        fields: Vec<(String, String)>,
        file: FileUpload,
    },
}

#[derive(Debug, Clone)]
pub struct FileUpload {
    pub field: String,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(Value),
    Text(String),
}

pub struct QbitClient {
    base_url: String,
    username: String,
    password: String,
    http: Client,
    session: Session,
}

impl QbitClient {
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, QbitError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            http: Client::builder().timeout(timeout).build()?,
            session: Session::default(),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Issues an authenticated request, logging in first when no session is
    /// held and re-authenticating exactly once if the daemon rejects it.
    pub async fn call(&mut self, endpoint: &str, payload: &Payload) -> Result<Body, QbitError> {
        for attempt in 0..session::MAX_ATTEMPTS {
            let token = self.ensure_session().await?;
            let response = self.send(endpoint, payload, &token).await?;
            let status = response.status().as_u16();
            match session::classify(status, attempt) {
                Verdict::Accept => {
                    let text = response.text().await?;
                    return Ok(parse_body(text));
                }
                Verdict::Reauthenticate => {
                    warn!(endpoint, status, "session rejected, re-authenticating");
                    self.apply(SessionEvent::Rejected);
                }
                Verdict::Unauthorized => {
                    self.apply(SessionEvent::Rejected);
                    return Err(QbitError::Unauthorized);
                }
                Verdict::Failed(status) => return Err(QbitError::Status(status)),
            }
        }
        Err(QbitError::Unauthorized)
    }

    async fn ensure_session(&mut self) -> Result<String, QbitError> {
        if let Some(token) = self.session.token() {
            return Ok(token.to_string());
        }
        let token = self.login().await;
        match token {
            Ok(Some(token)) => {
                info!("authenticated with download daemon");
                self.apply(SessionEvent::LoggedIn(token.clone()));
                Ok(token)
            }
            Ok(None) => {
                self.apply(SessionEvent::LoginFailed);
                Err(QbitError::LoginFailed)
            }
            Err(err) => {
                self.apply(SessionEvent::LoginFailed);
                Err(err)
            }
        }
    }

    async fn login(&self) -> Result<Option<String>, QbitError> {
        let url = format!("{}/api/v2/auth/login", self.base_url);
        let response = self
            .http
            .post(url)
            .header(REFERER, &self.base_url)
            .form(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await?;
        let token = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(session::extract_sid);
        if token.is_none() {
            debug!(status = response.status().as_u16(), "login response carried no session cookie");
        }
        Ok(token)
    }

    async fn send(&self, endpoint: &str, payload: &Payload, token: &str) -> Result<Response, QbitError> {
        let url = format!("{}{endpoint}", self.base_url);
        let method = match payload {
            Payload::Query(_) => Method::GET,
            Payload::Form(_) | Payload::Multipart { .. } => Method::POST,
        };
        let request = self
            .http
            .request(method, url)
            .header(reqwest::header::COOKIE, token)
            .header(REFERER, &self.base_url);
        let request = match payload {
            Payload::Query(params) => request.query(params),
            Payload::Form(params) => request.form(params),
            Payload::Multipart { fields, file } => {
                let mut form = reqwest::multipart::Form::new();
                for (key, value) in fields {
                    form = form.text(key.clone(), value.clone());
                }
                let part = reqwest::multipart::Part::bytes(file.bytes.clone())
                    .file_name(file.file_name.clone())
                    .mime_str(&file.mime_type)?;
                request.multipart(form.part(file.field.clone(), part))
            }
        };
        Ok(request.send().await?)
    }

    fn apply(&mut self, event: SessionEvent) {
        self.session = std::mem::take(&mut self.session).apply(event);
    }

    async fn write(&mut self, endpoint: &str, params: Vec<(String, String)>) -> Result<(), QbitError> {
        let body = self.call(endpoint, &Payload::Form(params)).await?;
        ensure_accepted(endpoint, body)
    }
}

#[async_trait(?Send)]
impl TorrentDaemon for QbitClient {
    async fn add_magnet(&mut self, uri: &str, savepath: &str) -> Result<(), QbitError> {
        self.write("/api/v2/torrents/add", pairs(&[("urls", uri), ("savepath", savepath)]))
            .await
    }

    async fn add_torrent_file(&mut self, path: &Path, savepath: &str) -> Result<(), QbitError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload.torrent")
            .to_string();
        let file = FileUpload {
            field: "torrents".to_string(),
            file_name,
            mime_type: mime_guess::from_path(path).first_or_octet_stream().to_string(),
            bytes: fs::read(path)?,
        };
        let payload = Payload::Multipart {
            fields: pairs(&[("savepath", savepath)]),
            file,
        };
        let body = self.call("/api/v2/torrents/add", &payload).await?;
        ensure_accepted("/api/v2/torrents/add", body)
    }

    async fn torrents(&mut self, filter: TorrentFilter) -> Result<Vec<TorrentInfo>, QbitError> {
        let endpoint = "/api/v2/torrents/info";
        let payload = Payload::Query(pairs(&[("filter", filter.as_str())]));
        match self.call(endpoint, &payload).await? {
            Body::Json(value) => serde_json::from_value(value)
                .map_err(|_| QbitError::UnexpectedBody(endpoint.to_string())),
            Body::Text(_) => Err(QbitError::UnexpectedBody(endpoint.to_string())),
        }
    }

    async fn remove(&mut self, hash: &str) -> Result<(), QbitError> {
        self.write(
            "/api/v2/torrents/delete",
            pairs(&[("hashes", hash), ("deleteFiles", "false")]),
        )
        .await
    }

    async fn pause(&mut self, hash: &str) -> Result<(), QbitError> {
        self.write("/api/v2/torrents/pause", pairs(&[("hashes", hash)]))
            .await
    }
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn parse_body(text: String) -> Body {
    match serde_json::from_str(&text) {
        Ok(value) => Body::Json(value),
        Err(_) => Body::Text(text),
    }
}

fn ensure_accepted(endpoint: &str, body: Body) -> Result<(), QbitError> {
    match body {
        Body::Text(text) if text.trim().eq_ignore_ascii_case("fails.") => {
            Err(QbitError::Refused(format!("{endpoint} answered {}", text.trim())))
        }
        _ => Ok(()),
    }
}
