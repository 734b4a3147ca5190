//! Process-local identity store

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{IdentityStore, StoreError};
use crate::identity::IdentityPackage;

/// Keeps the record in memory. Nothing survives the process.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    record: Mutex<Option<IdentityPackage>>,
    writes: Mutex<usize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a record already stored.
    pub fn with_record(package: IdentityPackage) -> Self {
        Self {
            record: Mutex::new(Some(package)),
            writes: Mutex::new(0),
        }
    }

    /// Number of `save` and `clear` calls so far.
    pub async fn write_count(&self) -> usize {
        *self.writes.lock().await
    }
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn load(&self) -> Result<Option<IdentityPackage>, StoreError> {
        Ok(self.record.lock().await.clone())
    }

    async fn save(&self, package: &IdentityPackage) -> Result<(), StoreError> {
        *self.record.lock().await = Some(package.clone());
        *self.writes.lock().await += 1;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.record.lock().await = None;
        *self.writes.lock().await += 1;
        Ok(())
    }
}
