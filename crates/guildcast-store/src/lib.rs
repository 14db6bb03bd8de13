//! Credential storage for the relay. The store owns the token table; the
//! relay only reads snapshots via [`TokenStore::load`], once per
//! authentication attempt, so external updates are picked up without any
//! cache invalidation protocol.

pub mod error;
pub mod file;
pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use guildcast_core::GuildId;

pub use error::StoreError;
pub use file::FileTokenStore;
pub use memory::{FailingTokenStore, MemoryTokenStore};

/// Full credential mapping: bearer token -> guild it authorizes.
/// Keyed by token so resolution is a single O(1) lookup.
pub type TokenTable = HashMap<String, GuildId>;

/// Load/store contract for the credential table. `store` exists for
/// provisioning tooling and tests; the relay itself never writes.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Return the full current table. No partial or incremental loads.
    async fn load(&self) -> Result<TokenTable, StoreError>;

    /// Replace the table wholesale.
    async fn store(&self, table: &TokenTable) -> Result<(), StoreError>;
}
