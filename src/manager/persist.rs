//! Single-writer persistence queue
//!
//! All store access runs on one task, in submission order. In-memory state
//! is updated first; the write is queued and happens afterwards.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::identity::IdentityPackage;
use crate::store::{IdentityStore, StoreError};

type Loaded = Result<Option<IdentityPackage>, StoreError>;

enum PersistOp {
    Load(oneshot::Sender<Loaded>),
    Save(IdentityPackage),
    Clear,
    /// Delete whatever is stored, then write the record.
    ClearThenSave(IdentityPackage),
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct PersistQueue {
    tx: mpsc::UnboundedSender<PersistOp>,
}

impl PersistQueue {
    /// Spawn the writer task. It exits once every queue handle is dropped.
    pub fn spawn(store: Arc<dyn IdentityStore>, logging: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(store, rx, logging));
        Self { tx }
    }

    pub async fn load(&self) -> Loaded {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(PersistOp::Load(tx)).is_err() {
            return Err(StoreError::Io("persistence task stopped".into()));
        }
        rx.await
            .unwrap_or_else(|_| Err(StoreError::Io("persistence task stopped".into())))
    }

    pub fn save(&self, package: IdentityPackage) {
        let _ = self.tx.send(PersistOp::Save(package));
    }

    pub fn clear(&self) {
        let _ = self.tx.send(PersistOp::Clear);
    }

    pub fn clear_then_save(&self, package: IdentityPackage) {
        let _ = self.tx.send(PersistOp::ClearThenSave(package));
    }

    /// Wait until everything queued so far has been written.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(PersistOp::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

/// What the store holds as far as this task knows. `None` means unknown.
type Known = Option<Option<IdentityPackage>>;

async fn run(
    store: Arc<dyn IdentityStore>,
    mut rx: mpsc::UnboundedReceiver<PersistOp>,
    logging: bool,
) {
    let mut known: Known = None;

    while let Some(op) = rx.recv().await {
        match op {
            PersistOp::Load(reply) => {
                let loaded = store.load().await;
                known = loaded.as_ref().ok().cloned();
                let _ = reply.send(loaded);
            }
            PersistOp::Save(package) => {
                known = save(store.as_ref(), known, package, logging).await;
            }
            PersistOp::Clear => {
                known = clear(store.as_ref(), known, logging).await;
            }
            PersistOp::ClearThenSave(package) => {
                // Clear unconditionally, even if the store is believed empty.
                known = clear(store.as_ref(), None, logging).await;
                known = save(store.as_ref(), known, package, logging).await;
            }
            PersistOp::Flush(reply) => {
                let _ = reply.send(());
            }
        }
    }
}

async fn save(
    store: &dyn IdentityStore,
    known: Known,
    package: IdentityPackage,
    logging: bool,
) -> Known {
    if known.as_ref() == Some(&Some(package.clone())) {
        return known;
    }
    match store.save(&package).await {
        Ok(()) => Some(Some(package)),
        Err(e) => {
            log_if!(logging, warn, "Failed to save identity: {}", e);
            None
        }
    }
}

async fn clear(store: &dyn IdentityStore, known: Known, logging: bool) -> Known {
    if known == Some(None) {
        return known;
    }
    match store.clear().await {
        Ok(()) => Some(None),
        Err(e) => {
            log_if!(logging, warn, "Failed to clear stored identity: {}", e);
            None
        }
    }
}
