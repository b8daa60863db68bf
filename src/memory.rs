//! Persistent key→value memory, stored as JSON in the config directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::Result;

/// On-disk memory store. Every mutation is persisted immediately.
#[derive(Debug)]
pub struct MemoryStore {
    path: PathBuf,
    data: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Load the store from `<config_dir>/memory.json`; a missing file
    /// yields an empty store.
    pub fn load(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join("memory.json");
        let data = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn get(&self, key: &str) -> String {
        let data = self.data.read().expect("memory lock poisoned");
        data.get(key).cloned().unwrap_or_default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        {
            let mut data = self.data.write().expect("memory lock poisoned");
            data.insert(key.into(), value.into());
        }
        self.save()
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        {
            let mut data = self.data.write().expect("memory lock poisoned");
            data.remove(key);
        }
        self.save()
    }

    pub fn all(&self) -> BTreeMap<String, String> {
        self.data.read().expect("memory lock poisoned").clone()
    }

    /// Markdown section injected into the system message; empty when the
    /// store is empty.
    pub fn as_markdown(&self) -> String {
        let data = self.data.read().expect("memory lock poisoned");
        if data.is_empty() {
            return String::new();
        }
        let mut md = String::from("\n---\n## Learned Information\n");
        for (k, v) in data.iter() {
            md.push_str("- ");
            md.push_str(k);
            md.push_str(": ");
            md.push_str(v);
            md.push('\n');
        }
        md
    }

    fn save(&self) -> Result<()> {
        let json = {
            let data = self.data.read().expect("memory lock poisoned");
            serde_json::to_vec_pretty(&*data)?
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::load(dir.path()).unwrap();

        store.set("editor", "helix").unwrap();
        assert_eq!(store.get("editor"), "helix");

        store.delete("editor").unwrap();
        assert_eq!(store.get("editor"), "");
        assert!(store.all().is_empty());
    }

    #[test]
    fn mutations_persist_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = MemoryStore::load(dir.path()).unwrap();
            store.set("lang", "rust").unwrap();
        }
        let reloaded = MemoryStore::load(dir.path()).unwrap();
        assert_eq!(reloaded.get("lang"), "rust");
    }

    #[test]
    fn markdown_lists_entries_or_stays_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::load(dir.path()).unwrap();
        assert_eq!(store.as_markdown(), "");

        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        let md = store.as_markdown();
        assert!(md.contains("## Learned Information"));
        assert!(md.contains("- a: 1"));
        assert!(md.contains("- b: 2"));
    }
}
