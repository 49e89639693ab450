//! Favorite channels, persisted through a small key-value port.
//!
//! The set is read once when loaded and written back wholesale on every
//! change (last writer wins).

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

/// Storage key holding the JSON array of favorite channel ids.
pub const FAVORITES_KEY: &str = "iptv_favs_v2";

/// Minimal persistence port, so tests can swap the file store for memory.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// All keys in one JSON object file.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_all(&self) -> BTreeMap<String, String> {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return BTreeMap::new();
        };
        match serde_json::from_str(&content) {
            Ok(all) => all,
            Err(e) => {
                warn!(
                    "favorites: store file {:?} is corrupt, next write replaces it: {}",
                    self.path, e
                );
                BTreeMap::new()
            }
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.read_all().remove(key)
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut all = self.read_all();
        all.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&all)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

/// In-memory store; clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub struct Favorites<S: KeyValueStore> {
    store: S,
    ids: Vec<String>,
}

impl<S: KeyValueStore> Favorites<S> {
    /// Read the persisted set. A missing or unreadable value is an empty set;
    /// repeated ids keep their first position.
    pub fn load(store: S) -> Self {
        let ids = match store.get(FAVORITES_KEY) {
            Some(raw) => match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(ids) => dedup_in_order(ids),
                Err(e) => {
                    warn!("favorites: ignoring corrupt value: {}", e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        debug!("favorites: loaded {} ids", ids.len());
        Self { store, ids }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|x| x == id)
    }

    /// Ids in the order they were added.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Add `id` if absent, remove it if present, then persist. Returns whether
    /// the channel is a favorite afterwards.
    /// The in-memory set only changes once the store accepted the write.
    pub fn toggle(&mut self, id: &str) -> anyhow::Result<bool> {
        let mut next = self.ids.clone();
        let now_favorite = if let Some(pos) = next.iter().position(|x| x == id) {
            next.remove(pos);
            false
        } else {
            next.push(id.to_string());
            true
        };
        self.save(&next)?;
        self.ids = next;
        Ok(now_favorite)
    }

    fn save(&self, ids: &[String]) -> anyhow::Result<()> {
        let json = serde_json::to_string(ids)?;
        self.store.set(FAVORITES_KEY, &json)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

fn dedup_in_order(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
