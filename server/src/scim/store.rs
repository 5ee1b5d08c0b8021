use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::sync::Mutex;

/// Key → JSON document store for SCIM resources, backed by a single JSON
/// file that is rewritten whole on every mutation. Keys are namespaced by
/// resource type ("User/<id>", "Group/<id>").
///
/// All access goes through one mutex held across mutate-and-rewrite, so
/// concurrent SCIM writes within the process serialize instead of losing
/// updates.
pub struct JsonStore {
    path: PathBuf,
    records: Mutex<BTreeMap<String, Value>>,
}

impl JsonStore {
    /// Open the store, loading any existing records. A missing file is an
    /// empty store, not an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read store file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("failed to parse store file {}", path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.records.lock().await.get(key).cloned()
    }

    /// Insert or replace a record and rewrite the backing file.
    pub async fn put(&self, key: &str, value: Value) -> Result<()> {
        let mut records = self.records.lock().await;
        records.insert(key.to_string(), value);
        self.persist(&records).await
    }

    /// Delete a record and rewrite the backing file. Returns whether the
    /// record existed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let mut records = self.records.lock().await;
        let existed = records.remove(key).is_some();
        if existed {
            self.persist(&records).await?;
        }
        Ok(existed)
    }

    /// All records whose key starts with `prefix`, in key order.
    pub async fn list(&self, prefix: &str) -> Vec<(String, Value)> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    async fn persist(&self, records: &BTreeMap<String, Value>) -> Result<()> {
        let contents =
            serde_json::to_vec_pretty(records).context("failed to serialize store")?;
        tokio::fs::write(&self.path, contents)
            .await
            .with_context(|| format!("failed to write store file {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_get_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path().join("store.json")).unwrap();

        store
            .put("User/1", json!({ "userName": "alice" }))
            .await
            .unwrap();
        assert_eq!(
            store.get("User/1").await,
            Some(json!({ "userName": "alice" }))
        );

        assert!(store.delete("User/1").await.unwrap());
        assert!(!store.delete("User/1").await.unwrap());
        assert_eq!(store.get("User/1").await, None);
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        {
            let store = JsonStore::open(&path).unwrap();
            store
                .put("Group/g1", json!({ "displayName": "engineering" }))
                .await
                .unwrap();
        }

        let reopened = JsonStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("Group/g1").await,
            Some(json!({ "displayName": "engineering" }))
        );
    }

    #[tokio::test]
    async fn list_filters_by_prefix_in_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path().join("store.json")).unwrap();

        store.put("User/b", json!({})).await.unwrap();
        store.put("User/a", json!({})).await.unwrap();
        store.put("Group/g", json!({})).await.unwrap();

        let users: Vec<String> = store
            .list("User/")
            .await
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(users, vec!["User/a", "User/b"]);
    }
}
