//! Bearer-token session shared by every request.
//!
//! The holder itself keeps nothing: all reads go to a [`SessionStorage`], so several
//! holders over one storage (tabs of the same origin) always agree, and each of them
//! can [`watch`](SessionHolder::watch) for changes made by the others.

use crate::error::GardenClientError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tempfile::NamedTempFile;
use tokio::sync::broadcast;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const USERNAME_KEY: &str = "username";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

const EVENT_CAPACITY: usize = 64;
const SESSION_FILE_NAME: &str = ".garden_session.json";

/// One key changing in session storage. `value` is `None` when the key was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub value: Option<String>,
}

/// Key/value storage behind the session.
pub trait SessionStorage: Send + Sync + std::fmt::Debug {
    fn get(&self, key: &str) -> Result<Option<String>, GardenClientError>;

    /// Applies all changes as one replacement; readers never observe half of them.
    fn apply(&self, changes: &[(&str, Option<String>)]) -> Result<(), GardenClientError>;

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent>;
}

fn publish(
    events: &broadcast::Sender<StorageEvent>,
    changes: &[(&str, Option<String>)],
) {
    for (key, value) in changes {
        // No receivers is fine.
        let _ = events.send(StorageEvent {
            key: key.to_string(),
            value: value.clone(),
        });
    }
}

fn apply_to_map(map: &mut BTreeMap<String, String>, changes: &[(&str, Option<String>)]) {
    for (key, value) in changes {
        match value {
            Some(value) => {
                map.insert(key.to_string(), value.clone());
            }
            None => {
                map.remove(*key);
            }
        }
    }
}

#[derive(Debug)]
pub struct MemoryStorage {
    values: RwLock<BTreeMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            values: RwLock::new(BTreeMap::new()),
            events,
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, GardenClientError> {
        let values = self
            .values
            .read()
            .map_err(|_| GardenClientError::Storage("session lock poisoned".into()))?;
        Ok(values.get(key).cloned())
    }

    fn apply(&self, changes: &[(&str, Option<String>)]) -> Result<(), GardenClientError> {
        {
            let mut values = self
                .values
                .write()
                .map_err(|_| GardenClientError::Storage("session lock poisoned".into()))?;
            apply_to_map(&mut values, changes);
        }
        publish(&self.events, changes);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    #[serde(flatten)]
    values: BTreeMap<String, String>,
}

/// Session persisted as a small JSON file, readable only by the owner on unix.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: RwLock<()>,
    events: broadcast::Sender<StorageEvent>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            path: path.into(),
            lock: RwLock::new(()),
            events,
        }
    }

    /// `~/.garden_session.json`
    pub fn default_path() -> Result<PathBuf, GardenClientError> {
        let home = dirs::home_dir()
            .ok_or_else(|| GardenClientError::Storage("Failed to get home directory".into()))?;
        Ok(home.join(SESSION_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<SessionFile, GardenClientError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(SessionFile::default()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SessionFile::default()),
            Err(e) => Err(GardenClientError::Storage(format!(
                "Failed to read {:?}: {}",
                self.path, e
            ))),
        }
    }

    fn write(&self, file: &SessionFile) -> Result<(), GardenClientError> {
        let storage_error =
            |e: std::io::Error| GardenClientError::Storage(format!("{:?}: {}", self.path, e));

        if file.values.is_empty() {
            return match fs::remove_file(&self.path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(storage_error(e)),
                _ => Ok(()),
            };
        }

        let raw = serde_json::to_string_pretty(file)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        // Readers never see a partial file or one with wider permissions.
        let mut tmp = NamedTempFile::new_in(dir).map_err(storage_error)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(storage_error)?;
        }
        tmp.write_all(raw.as_bytes()).map_err(storage_error)?;
        tmp.as_file().sync_all().map_err(storage_error)?;
        tmp.persist(&self.path).map_err(|e| storage_error(e.error))?;

        Ok(())
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, GardenClientError> {
        let _guard = self
            .lock
            .read()
            .map_err(|_| GardenClientError::Storage("session lock poisoned".into()))?;
        Ok(self.read()?.values.get(key).cloned())
    }

    fn apply(&self, changes: &[(&str, Option<String>)]) -> Result<(), GardenClientError> {
        {
            let _guard = self
                .lock
                .write()
                .map_err(|_| GardenClientError::Storage("session lock poisoned".into()))?;
            let mut file = self.read()?;
            apply_to_map(&mut file.values, changes);
            self.write(&file)?;
        }
        publish(&self.events, changes);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    SignedIn { username: Option<String> },
    SignedOut,
}

/// Single source of truth for the bearer token. Cheap to clone; clones share storage.
#[derive(Debug, Clone)]
pub struct SessionHolder {
    storage: Arc<dyn SessionStorage>,
}

impl SessionHolder {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self { storage }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    pub fn storage(&self) -> Arc<dyn SessionStorage> {
        self.storage.clone()
    }

    pub fn set_session(
        &self,
        token: impl Into<String>,
        username: impl Into<String>,
    ) -> Result<(), GardenClientError> {
        let username = username.into();
        self.storage.apply(&[
            (ACCESS_TOKEN_KEY, Some(token.into())),
            (USERNAME_KEY, Some(username.clone())),
        ])?;
        tracing::info!("Session started for {}", username);
        Ok(())
    }

    pub fn set_refresh_token(&self, token: Option<String>) -> Result<(), GardenClientError> {
        self.storage.apply(&[(REFRESH_TOKEN_KEY, token)])
    }

    /// Point-in-time replacement of the access token; the username is kept.
    pub fn replace_access_token(&self, token: impl Into<String>) -> Result<(), GardenClientError> {
        self.storage
            .apply(&[(ACCESS_TOKEN_KEY, Some(token.into()))])?;
        tracing::debug!("Access token replaced");
        Ok(())
    }

    pub fn clear_session(&self) -> Result<(), GardenClientError> {
        self.storage.apply(&[
            (ACCESS_TOKEN_KEY, None),
            (USERNAME_KEY, None),
            (REFRESH_TOKEN_KEY, None),
        ])?;
        tracing::info!("Session cleared");
        Ok(())
    }

    pub fn has_session(&self) -> bool {
        self.token().is_some()
    }

    /// Current non-empty access token. Storage failures read as "no session".
    pub fn token(&self) -> Option<String> {
        match self.storage.get(ACCESS_TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.trim().is_empty()),
            Err(e) => {
                tracing::warn!("Failed to read access token: {}", e);
                None
            }
        }
    }

    pub fn username(&self) -> Option<String> {
        self.storage.get(USERNAME_KEY).ok().flatten()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.storage
            .get(REFRESH_TOKEN_KEY)
            .ok()
            .flatten()
            .filter(|t| !t.trim().is_empty())
    }

    pub fn snapshot(&self) -> Option<Session> {
        self.token().map(|access_token| Session {
            access_token,
            username: self.username(),
        })
    }

    pub fn watch(&self) -> SessionWatcher {
        SessionWatcher {
            holder: self.clone(),
            events: self.storage.subscribe(),
        }
    }
}

/// Observes token changes made through any holder sharing the same storage.
#[derive(Debug)]
pub struct SessionWatcher {
    holder: SessionHolder,
    events: broadcast::Receiver<StorageEvent>,
}

impl SessionWatcher {
    /// Waits for the next access-token change. `None` once the storage is gone.
    pub async fn changed(&mut self) -> Option<SessionChange> {
        loop {
            match self.events.recv().await {
                Ok(event) if event.key == ACCESS_TOKEN_KEY => return Some(self.classify(event)),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Session watcher skipped {} events", skipped);
                    return Some(self.current());
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`changed`](Self::changed).
    pub fn try_changed(&mut self) -> Option<SessionChange> {
        loop {
            match self.events.try_recv() {
                Ok(event) if event.key == ACCESS_TOKEN_KEY => return Some(self.classify(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(_)) => return Some(self.current()),
                Err(_) => return None,
            }
        }
    }

    fn classify(&self, event: StorageEvent) -> SessionChange {
        match event.value.filter(|t| !t.trim().is_empty()) {
            Some(_) => SessionChange::SignedIn {
                username: self.holder.username(),
            },
            None => SessionChange::SignedOut,
        }
    }

    fn current(&self) -> SessionChange {
        if self.holder.has_session() {
            SessionChange::SignedIn {
                username: self.holder.username(),
            }
        } else {
            SessionChange::SignedOut
        }
    }
}
