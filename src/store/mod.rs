//! Persistence for the identity record
//!
//! A store holds at most one `IdentityPackage`; `save` overwrites it. The
//! manager funnels every write through a single task, so implementations
//! never see concurrent writers.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::InMemoryStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::identity::IdentityPackage;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// The stored record, or `None` if nothing has been saved.
    async fn load(&self) -> Result<Option<IdentityPackage>, StoreError>;

    async fn save(&self, package: &IdentityPackage) -> Result<(), StoreError>;

    /// Remove the stored record. Clearing an empty store succeeds.
    async fn clear(&self) -> Result<(), StoreError>;
}
