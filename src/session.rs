//! Credential lifecycle for the download daemon.
//!
//! The token is soft state: any authorization rejection drops it and the
//! next call logs in again. A call gets at most one re-authentication.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Session {
    #[default]
    Unauthenticated,
    Authenticated(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn(String),
    LoginFailed,
    Rejected,
}

impl Session {
    pub fn apply(self, event: SessionEvent) -> Session {
        match event {
            SessionEvent::LoggedIn(token) => Session::Authenticated(token),
            SessionEvent::LoginFailed | SessionEvent::Rejected => Session::Unauthenticated,
        }
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Session::Unauthenticated => None,
            Session::Authenticated(token) => Some(token),
        }
    }
}

/// What to do with a daemon response, given how many attempts preceded it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reauthenticate,
    Unauthorized,
    Failed(u16),
}

pub const MAX_ATTEMPTS: u8 = 2;

pub fn classify(status: u16, attempt: u8) -> Verdict {
    match status {
        200 | 201 => Verdict::Accept,
        401 | 403 if attempt + 1 < MAX_ATTEMPTS => Verdict::Reauthenticate,
        401 | 403 => Verdict::Unauthorized,
        other => Verdict::Failed(other),
    }
}

/// Pulls the session cookie pair (`SID=..`, or `QBT_SID_<port>=..` on newer
/// daemons) out of a `Set-Cookie` header value.
pub fn extract_sid(set_cookie: &str) -> Option<String> {
    let pair = set_cookie.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    let is_session = name.eq_ignore_ascii_case("SID") || name.starts_with("QBT_SID_");
    if !is_session || value.is_empty() {
        return None;
    }
    Some(format!("{name}={value}"))
}
