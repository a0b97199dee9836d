//! File-based state store: a single pretty-printed JSON document.
//!
//! Storage location: `~/.sessionloom/session_memory.json` by default.
//!
//! The whole `PersistedState` is loaded at session start and replaced on
//! every save: the new document is written to a sibling temp file, synced,
//! then renamed over the old one, so a reader never sees a half-written file.
//!
//! There is no locking. Exactly one writer process per file is supported;
//! two sessions sharing a state file will overwrite each other's
//! consolidations.

use async_trait::async_trait;
use sessionloom_core::error::StorageError;
use sessionloom_core::memory::{PersistedState, StateStore, SCHEMA_VERSION};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// A JSON-file-backed `StateStore`.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, e: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            reason: e.to_string(),
        }
    }

    /// Delete the state file. Returns `false` if there was nothing to delete.
    ///
    /// Operational reset only; the pipeline itself never deletes state.
    pub async fn remove(&self) -> Result<bool, StorageError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "Persisted state removed");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// Parse a state document, rejecting versions newer than this build.
fn parse_state(path: &Path, content: &str) -> Result<PersistedState, StorageError> {
    let mut state: PersistedState =
        serde_json::from_str(content).map_err(|e| StorageError::Corrupted {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if state.schema_version > SCHEMA_VERSION {
        return Err(StorageError::UnsupportedVersion {
            found: state.schema_version,
            supported: SCHEMA_VERSION,
        });
    }
    state.schema_version = SCHEMA_VERSION;
    Ok(state)
}

#[async_trait]
impl StateStore for JsonFileStore {
    fn name(&self) -> &str {
        "json_file"
    }

    async fn load(&self) -> Result<PersistedState, StorageError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No persisted state yet, starting empty");
                return Ok(PersistedState::default());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let state = parse_state(&self.path, &content)?;
        debug!(
            path = %self.path.display(),
            facts = state.profile.len(),
            constraints = state.constraints.len(),
            batches = state.batches,
            "Persisted state loaded"
        );
        Ok(state)
    }

    async fn save(&self, state: &PersistedState) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.io_error(e))?;
            }
        }

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| StorageError::Serialize(e.to_string()))?;

        let temp = self.temp_path();
        let mut file = tokio::fs::File::create(&temp)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(json.as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        file.sync_all().await.map_err(|e| self.io_error(e))?;
        drop(file);

        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        info!(path = %self.path.display(), batches = state.batches, "Persisted state saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessionloom_core::memory::{FactUpdate, StateUpdate};

    fn sample_state() -> PersistedState {
        let mut state = PersistedState::default();
        state.merge(&StateUpdate {
            profile_updates: vec![FactUpdate {
                key: "name".into(),
                value: "Huy".into(),
            }],
            constraint_updates: vec!["No Java code".into()],
            summary: "User introduced themselves; studies CS in Vietnam.".into(),
            consumed_turns: 6,
            ..StateUpdate::default()
        });
        state
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("memory.json"));

        let state = sample_state();
        store.save(&state).await.unwrap();

        let loaded = JsonFileStore::new(store.path()).load().await.unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn missing_file_loads_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        let state = store.load().await.unwrap();
        assert!(state.is_empty());
        assert_eq!(state.schema_version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn corrupted_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        std::fs::write(&path, "{ this is not json").unwrap();

        let err = JsonFileStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupted { .. }));
    }

    #[tokio::test]
    async fn newer_schema_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        std::fs::write(&path, r#"{"schema_version": 99}"#).unwrap();

        let err = JsonFileStore::new(&path).load().await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::UnsupportedVersion { found: 99, supported: SCHEMA_VERSION }
        ));
    }

    #[tokio::test]
    async fn save_replaces_whole_document_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("memory.json"));

        store.save(&sample_state()).await.unwrap();
        store.save(&PersistedState::default()).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert!(loaded.is_empty());
        assert!(!store.temp_path().exists());
        let content = std::fs::read_to_string(store.path()).unwrap();
        assert!(!content.contains("Huy"));
    }

    #[tokio::test]
    async fn remove_deletes_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("memory.json"));
        store.save(&sample_state()).await.unwrap();

        assert!(store.remove().await.unwrap());
        assert!(!store.remove().await.unwrap());
        assert!(store.load().await.unwrap().is_empty());
    }

    #[test]
    fn temp_path_is_a_sibling() {
        let store = JsonFileStore::new("/data/session_memory.json");
        assert_eq!(store.temp_path(), PathBuf::from("/data/session_memory.json.tmp"));
    }
}
