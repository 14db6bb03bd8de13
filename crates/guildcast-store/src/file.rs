use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::StoreError;
use crate::{TokenStore, TokenTable};

/// Token table persisted as a single JSON document on disk.
/// A missing file loads as an empty table so a fresh deployment starts
/// with no valid credentials rather than an error.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<TokenTable, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "token file absent, empty table");
                return Ok(TokenTable::new());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn store(&self, table: &TokenTable) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(table)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guildcast_core::GuildId;

    fn scratch_path() -> PathBuf {
        std::env::temp_dir().join(format!("guildcast-tokens-{}.json", uuid::Uuid::now_v7()))
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let store = FileTokenStore::new(scratch_path());
        let table = store.load().await.unwrap();
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn store_then_load_roundtrip() {
        let path = scratch_path();
        let store = FileTokenStore::new(&path);

        let mut table = TokenTable::new();
        table.insert("tok-1".into(), GuildId::from_raw("guild-42"));
        table.insert("tok-2".into(), GuildId::from_raw("guild-7"));
        store.store(&table).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["tok-1"], GuildId::from_raw("guild-42"));

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let path = scratch_path();
        tokio::fs::write(&path, b"not json").await.unwrap();

        let store = FileTokenStore::new(&path);
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn store_creates_parent_dirs() {
        let dir = std::env::temp_dir().join(format!("guildcast-{}", uuid::Uuid::now_v7()));
        let path = dir.join("nested").join("tokens.json");
        let store = FileTokenStore::new(&path);

        store.store(&TokenTable::new()).await.unwrap();
        assert!(path.exists());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
