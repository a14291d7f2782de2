use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::telegram::{ChatId, MessageId};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The only state that survives a restart.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Snapshot {
    #[serde(default)]
    pub known_chats: Vec<ChatId>,
    #[serde(default)]
    pub notified_torrents: Vec<String>,
    #[serde(default, deserialize_with = "status_ids")]
    pub last_status_ids: BTreeMap<ChatId, Vec<MessageId>>,
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Snapshot, SnapshotError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Snapshot::default()),
            Err(err) => return Err(SnapshotError::Io(err)),
        };
        Ok(serde_json::from_str(&contents)?)
    }

    /// Replaces the file wholesale.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent)?;
        }
        let payload = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, payload)?;
        set_file_permissions(&tmp, 0o600)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

// Older snapshots stored a single id per chat, and an empty map may have been
// written as `[]`.
fn status_ids<'de, D>(deserializer: D) -> Result<BTreeMap<ChatId, Vec<MessageId>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Ids {
        One(MessageId),
        Many(Vec<MessageId>),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Field {
        Map(BTreeMap<String, Ids>),
        List(Vec<serde_json::Value>),
    }

    let map = match Field::deserialize(deserializer)? {
        Field::Map(map) => map,
        Field::List(_) => BTreeMap::new(),
    };
    // Keys are parsed by hand: buffered untagged content will not coerce
    // string keys into integers.
    Ok(map
        .into_iter()
        .filter_map(|(chat_id, ids)| {
            let chat_id = chat_id.parse::<ChatId>().ok()?;
            let ids = match ids {
                Ids::One(id) => vec![id],
                Ids::Many(ids) => ids,
            };
            Some((chat_id, ids))
        })
        .collect())
}

fn ensure_dir(path: &Path) -> Result<(), io::Error> {
    if path.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(path)
}

#[cfg(unix)]
fn set_file_permissions(path: &Path, mode: u32) -> Result<(), io::Error> {
    use std::os::unix::fs::PermissionsExt;
    let perm = fs::Permissions::from_mode(mode);
    fs::set_permissions(path, perm)
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path, _mode: u32) -> Result<(), io::Error> {
    Ok(())
}
