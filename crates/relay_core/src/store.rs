//! Identity and usage stores.
//!
//! Shared state is kept behind these traits instead of process-wide maps;
//! every component receives its store by injection. Two implementations are
//! provided: an in-memory store for tests and single-process deployments,
//! and a JSON file store with the layout:
//!
//! ```text
//! <data_dir>/
//! ├── identities.json      # All known identities, keyed by id
//! └── usage/
//!     └── <identity>.json  # Per-identity usage history
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use crate::error::{CoreError, CoreResult};
use crate::types::{Identity, UsageHistory};

/// Row-oriented store of identities, keyed by identity id.
///
/// Implementations must be safe to call from concurrent tasks.
pub trait IdentityStore: Send + Sync {
    /// Look up an identity by id.
    fn get(&self, id: &str) -> CoreResult<Option<Identity>>;

    /// Insert or replace an identity.
    fn put(&self, identity: &Identity) -> CoreResult<()>;

    /// List all known identities.
    fn list(&self) -> CoreResult<Vec<Identity>>;
}

/// Store of per-identity usage histories.
///
/// `update` is the only mutation entry point; it applies a read-modify-write
/// atomically for the given identity so that concurrent tasks cannot lose
/// increments. Updates for different identities are independent.
pub trait UsageStore: Send + Sync {
    /// Load the usage history for an identity, if any exists.
    fn load(&self, identity_id: &str) -> CoreResult<Option<UsageHistory>>;

    /// Atomically apply a mutation to the identity's history, creating an
    /// empty history on first write, and return the updated state.
    fn update(
        &self,
        identity_id: &str,
        apply: &mut dyn FnMut(&mut UsageHistory),
    ) -> CoreResult<UsageHistory>;
}

// =============================================================================
// In-memory store
// =============================================================================

/// In-memory store backed by locked maps.
#[derive(Default)]
pub struct MemoryStore {
    identities: RwLock<HashMap<String, Identity>>,
    usage: Mutex<HashMap<String, UsageHistory>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityStore for MemoryStore {
    fn get(&self, id: &str) -> CoreResult<Option<Identity>> {
        let identities = self
            .identities
            .read()
            .map_err(|_| CoreError::Store("identity lock poisoned".to_string()))?;
        Ok(identities.get(id).cloned())
    }

    fn put(&self, identity: &Identity) -> CoreResult<()> {
        let mut identities = self
            .identities
            .write()
            .map_err(|_| CoreError::Store("identity lock poisoned".to_string()))?;
        identities.insert(identity.id.clone(), identity.clone());
        Ok(())
    }

    fn list(&self) -> CoreResult<Vec<Identity>> {
        let identities = self
            .identities
            .read()
            .map_err(|_| CoreError::Store("identity lock poisoned".to_string()))?;
        let mut all: Vec<Identity> = identities.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}

impl UsageStore for MemoryStore {
    fn load(&self, identity_id: &str) -> CoreResult<Option<UsageHistory>> {
        let usage = self
            .usage
            .lock()
            .map_err(|_| CoreError::Store("usage lock poisoned".to_string()))?;
        Ok(usage.get(identity_id).cloned())
    }

    fn update(
        &self,
        identity_id: &str,
        apply: &mut dyn FnMut(&mut UsageHistory),
    ) -> CoreResult<UsageHistory> {
        let mut usage = self
            .usage
            .lock()
            .map_err(|_| CoreError::Store("usage lock poisoned".to_string()))?;
        let history = usage
            .entry(identity_id.to_string())
            .or_insert_with(|| UsageHistory::new(identity_id));
        apply(history);
        Ok(history.clone())
    }
}

// =============================================================================
// File-backed store
// =============================================================================

/// Convert an identity id to a safe file name component.
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// JSON file store under a data directory.
///
/// A single mutex serializes read-modify-write cycles; the store is treated
/// as best-effort per the metering policy, so no journaling is attempted.
pub struct FileStore {
    data_dir: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Create a file store rooted at `data_dir`, creating it if needed.
    pub fn new(data_dir: impl AsRef<Path>) -> CoreResult<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(data_dir.join("usage"))?;
        Ok(Self {
            data_dir,
            lock: Mutex::new(()),
        })
    }

    fn identities_path(&self) -> PathBuf {
        self.data_dir.join("identities.json")
    }

    fn usage_path(&self, identity_id: &str) -> PathBuf {
        self.data_dir
            .join("usage")
            .join(format!("{}.json", sanitize(identity_id)))
    }

    fn load_identities(&self) -> CoreResult<HashMap<String, Identity>> {
        let path = self.identities_path();
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save_identities(&self, identities: &HashMap<String, Identity>) -> CoreResult<()> {
        let content = serde_json::to_string_pretty(identities)?;
        fs::write(self.identities_path(), content)?;
        Ok(())
    }
}

impl IdentityStore for FileStore {
    fn get(&self, id: &str) -> CoreResult<Option<Identity>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| CoreError::Store("file store lock poisoned".to_string()))?;
        Ok(self.load_identities()?.remove(id))
    }

    fn put(&self, identity: &Identity) -> CoreResult<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| CoreError::Store("file store lock poisoned".to_string()))?;
        let mut identities = self.load_identities()?;
        identities.insert(identity.id.clone(), identity.clone());
        self.save_identities(&identities)
    }

    fn list(&self) -> CoreResult<Vec<Identity>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| CoreError::Store("file store lock poisoned".to_string()))?;
        let mut all: Vec<Identity> = self.load_identities()?.into_values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}

impl UsageStore for FileStore {
    fn load(&self, identity_id: &str) -> CoreResult<Option<UsageHistory>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| CoreError::Store("file store lock poisoned".to_string()))?;
        let path = self.usage_path(identity_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn update(
        &self,
        identity_id: &str,
        apply: &mut dyn FnMut(&mut UsageHistory),
    ) -> CoreResult<UsageHistory> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| CoreError::Store("file store lock poisoned".to_string()))?;
        let path = self.usage_path(identity_id);
        let mut history = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            UsageHistory::new(identity_id)
        };
        apply(&mut history);
        let content = serde_json::to_string_pretty(&history)?;
        fs::write(&path, content)?;
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_memory_store_identity_round_trip() {
        let store = MemoryStore::new();
        assert!(store.get("1").unwrap().is_none());

        store.put(&Identity::new("1", "alice")).unwrap();
        let loaded = store.get("1").unwrap().unwrap();
        assert_eq!(loaded.display_name, "alice");
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_memory_store_usage_update_creates_lazily() {
        let store = MemoryStore::new();
        assert!(store.load("1").unwrap().is_none());

        let updated = store
            .update("1", &mut |h| {
                h.days.entry("2024-01-01".to_string()).or_default().tokens += 10;
            })
            .unwrap();
        assert_eq!(updated.days["2024-01-01"].tokens, 10);
        assert!(store.load("1").unwrap().is_some());
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let temp = tempdir().unwrap();

        {
            let store = FileStore::new(temp.path()).unwrap();
            store.put(&Identity::new("42", "bob")).unwrap();
            store
                .update("42", &mut |h| {
                    h.months.entry("2024-01".to_string()).or_default().cost += 0.5;
                })
                .unwrap();
        }

        let store = FileStore::new(temp.path()).unwrap();
        assert_eq!(store.get("42").unwrap().unwrap().display_name, "bob");
        let history = store.load("42").unwrap().unwrap();
        assert!((history.months["2024-01"].cost - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sanitize_keeps_files_flat() {
        assert_eq!(sanitize("user/42"), "user-42");
        assert_eq!(sanitize("../escape"), "escape");
        assert_eq!(sanitize("Alice Bob"), "alice-bob");
    }
}
