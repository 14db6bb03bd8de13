use async_trait::async_trait;
use guildcast_core::GuildId;
use parking_lot::RwLock;

use crate::error::StoreError;
use crate::{TokenStore, TokenTable};

/// In-memory token table, for tests and embedded provisioning.
#[derive(Default)]
pub struct MemoryTokenStore {
    table: RwLock<TokenTable>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style seeding: `MemoryTokenStore::new().with_token("t", "g")`.
    pub fn with_token(self, token: impl Into<String>, guild: impl Into<String>) -> Self {
        self.table
            .write()
            .insert(token.into(), GuildId::from_raw(guild.into()));
        self
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<TokenTable, StoreError> {
        Ok(self.table.read().clone())
    }

    async fn store(&self, table: &TokenTable) -> Result<(), StoreError> {
        *self.table.write() = table.clone();
        Ok(())
    }
}

/// Store whose loads always fail. Lets tests drive the "store outage is
/// indistinguishable from an unknown credential" path.
pub struct FailingTokenStore;

#[async_trait]
impl TokenStore for FailingTokenStore {
    async fn load(&self) -> Result<TokenTable, StoreError> {
        Err(StoreError::Io("store unavailable".into()))
    }

    async fn store(&self, _table: &TokenTable) -> Result<(), StoreError> {
        Err(StoreError::Io("store unavailable".into()))
    }
}
