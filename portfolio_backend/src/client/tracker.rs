use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// Key under which the owned comment set is persisted.
pub const OWNED_COMMENTS_KEY: &str = "my_comment_ids";

/// String-to-string storage scoped to one client, in the manner of a
/// browser's local storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: String) -> Result<()>;
}

/// Keeps every key in a single JSON object on disk.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a JSON object of strings", self.path.display()))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        let mut all = self.read_all().unwrap_or_else(|err| {
            tracing::warn!(error = ?err, "discarding unreadable client state");
            BTreeMap::new()
        });
        all.insert(key.to_string(), value);
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(&all)?;
        fs::write(&self.path, json)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store poisoned"))?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

/// Older state files hold bare identifiers; newer ones carry the ownership
/// token the server issued alongside.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Legacy(String),
    Owned {
        id: String,
        #[serde(default)]
        token: Option<String>,
    },
}

impl StoredEntry {
    fn into_parts(self) -> (String, Option<String>) {
        match self {
            StoredEntry::Legacy(id) => (id, None),
            StoredEntry::Owned { id, token } => (id, token),
        }
    }
}

/// The comments this client believes it wrote. This drives which comments
/// offer edit and delete; the server checks the token independently.
pub struct OwnershipTracker {
    store: Box<dyn KeyValueStore>,
    entries: Vec<(String, Option<String>)>,
}

impl OwnershipTracker {
    /// Unparseable state is logged and treated as empty.
    pub fn load(store: Box<dyn KeyValueStore>) -> Result<Self> {
        let entries = match store.get(OWNED_COMMENTS_KEY)? {
            None => Vec::new(),
            Some(raw) => match serde_json::from_str::<Vec<StoredEntry>>(&raw) {
                Ok(stored) => stored.into_iter().map(StoredEntry::into_parts).collect(),
                Err(err) => {
                    tracing::warn!(error = %err, "ignoring malformed owned comment list");
                    Vec::new()
                }
            },
        };
        Ok(Self { store, entries })
    }

    pub fn is_mine(&self, id: &str) -> bool {
        self.entries.iter().any(|(owned, _)| owned == id)
    }

    pub fn token_for(&self, id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(owned, _)| owned == id)
            .and_then(|(_, token)| token.as_deref())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    /// Adds `id` (or refreshes its token) and re-persists the whole set.
    pub fn remember(&mut self, id: &str, token: Option<String>) -> Result<()> {
        match self.entries.iter_mut().find(|(owned, _)| owned == id) {
            Some((_, existing)) => {
                if token.is_some() {
                    *existing = token;
                }
            }
            None => self.entries.push((id.to_string(), token)),
        }
        self.persist()
    }

    /// Returns whether `id` was tracked.
    pub fn forget(&mut self, id: &str) -> Result<bool> {
        let before = self.entries.len();
        self.entries.retain(|(owned, _)| owned != id);
        if self.entries.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    fn persist(&self) -> Result<()> {
        let stored: Vec<StoredEntry> = self
            .entries
            .iter()
            .map(|(id, token)| StoredEntry::Owned {
                id: id.clone(),
                token: token.clone(),
            })
            .collect();
        self.store
            .set(OWNED_COMMENTS_KEY, serde_json::to_string(&stored)?)
    }
}
