//! IdentityManager: state owner, refresh scheduler and change feed
//!
//! All state mutation happens under one async mutex. Network calls and
//! sleeps run outside it; every transition bumps an epoch and replaces the
//! three background jobs, and a job that wakes up to a newer epoch does
//! nothing.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;

use super::broadcaster::{Broadcaster, Subscription};
use super::init::InitLatch;
use super::jobs::{JobHandle, JobKind, Jobs};
use super::persist::PersistQueue;
use crate::client::{
    GenerationError, HttpTransport, IdentityClient, RefreshError, RefreshOutcome,
    ServerCredentials,
};
use crate::clock::Clock;
use crate::config::Settings;
use crate::crypto::{EnvelopeCrypto, LiveCrypto};
use crate::identity::{
    derive_package, Identity, IdentityInput, IdentityPackage, IdentityStatus, Millis, State,
};
use crate::store::{IdentityStore, StoreError};

struct Inner {
    state: State,
    /// Incremented on every reschedule; jobs carry the value they were spawned under.
    epoch: u64,
    /// Set by the first state change; a later load must not overwrite it.
    transitioned: bool,
    jobs: Jobs,
    automatic_refresh: bool,
    shut_down: bool,
}

pub struct IdentityManager {
    client: IdentityClient,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
    broadcaster: Broadcaster<State>,
    persist: PersistQueue,
    init: InitLatch,
    logging: bool,
    me: Weak<IdentityManager>,
}

impl IdentityManager {
    /// Create a manager and start loading the stored identity.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(
        settings: Settings,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn IdentityStore>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Self::with_crypto(settings, transport, Arc::new(LiveCrypto), store, clock)
    }

    pub fn with_crypto(
        settings: Settings,
        transport: Arc<dyn HttpTransport>,
        crypto: Arc<dyn EnvelopeCrypto>,
        store: Arc<dyn IdentityStore>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let client = IdentityClient::new(&settings, transport, crypto, clock.clone());
        let persist = PersistQueue::spawn(store, settings.logging_enabled);

        let manager = Arc::new_cyclic(|me| Self {
            client,
            clock,
            inner: Mutex::new(Inner {
                state: State::NoIdentity,
                epoch: 0,
                transitioned: false,
                jobs: Jobs::default(),
                automatic_refresh: settings.automatic_refresh,
                shut_down: false,
            }),
            broadcaster: Broadcaster::new(),
            persist,
            init: InitLatch::new(),
            logging: settings.logging_enabled,
            me: me.clone(),
        });

        let weak = Arc::downgrade(&manager);
        let persist = manager.persist.clone();
        tokio::spawn(async move {
            let loaded = persist.load().await;
            if let Some(manager) = weak.upgrade() {
                manager.restore(loaded).await;
                manager.init.complete();
            }
        });

        manager
    }

    async fn restore(&self, loaded: Result<Option<IdentityPackage>, StoreError>) {
        let mut inner = self.inner.lock().await;
        if inner.transitioned {
            log_if!(self.logging, debug, "Identity changed before load finished; keeping it");
            return;
        }

        match loaded {
            Ok(Some(package)) if package.status == IdentityStatus::OptOut => {
                inner.state = State::OptOut;
                self.broadcaster.send(State::OptOut);
            }
            Ok(Some(package)) => {
                if let Some(identity) = package.identity {
                    self.apply(&mut inner, Some(identity), None, None);
                }
            }
            Ok(None) => {}
            Err(e) => {
                log_if!(self.logging, warn, "Failed to load stored identity: {}", e);
            }
        }
        log_if!(self.logging, info, "Identity loaded: {}", inner.state.status());
    }

    /// Validate and adopt a new state. Runs entirely under the state lock and
    /// never awaits.
    fn apply(
        &self,
        inner: &mut Inner,
        identity: Option<Identity>,
        explicit: Option<IdentityStatus>,
        message: Option<String>,
    ) -> Option<Identity> {
        inner.transitioned = true;
        match (explicit, identity) {
            (Some(IdentityStatus::OptOut), _) => {
                inner.state = State::OptOut;
                self.persist.clear_then_save(IdentityPackage::opt_out());
            }
            (Some(IdentityStatus::Established), Some(identity)) => {
                self.persist
                    .save(IdentityPackage::established(identity.clone()));
                inner.state = State::Established(identity);
            }
            (Some(IdentityStatus::RefreshExpired), _) => {
                inner.state = State::RefreshExpired;
                self.persist
                    .save(IdentityPackage::refresh_expired(message.as_deref()));
            }
            (_, identity) => {
                let is_new = inner.state.identity().is_none();
                let package = derive_package(identity.as_ref(), self.clock.now_millis(), is_new);
                inner.state = State::from_package(&package);
                self.persist.save(package);
            }
        }

        log_if!(self.logging, info, "Identity status: {}", inner.state.status());
        self.broadcaster.send(inner.state.clone());
        self.reschedule(inner);
        inner.state.identity().cloned()
    }

    /// Cancel all jobs and spawn the ones the current identity needs.
    fn reschedule(&self, inner: &mut Inner) {
        inner.epoch += 1;
        inner.jobs.cancel_all();
        if inner.shut_down {
            return;
        }
        let Some(identity) = inner.state.identity() else {
            return;
        };

        let now = self.clock.now_millis();
        let epoch = inner.epoch;
        // Timestamps come from the wire or the store and may be anywhere in i64.
        let until = |at: Millis| at.saturating_sub(now);

        let refresh_delay = if identity.is_due_for_refresh(now) {
            0
        } else {
            until(identity.refresh_from)
        };
        let refresh_expiry_delay =
            (!identity.is_refresh_expired(now)).then(|| until(identity.refresh_expires));
        let identity_expiry_delay =
            (!identity.is_identity_expired(now)).then(|| until(identity.identity_expires));

        if inner.automatic_refresh {
            inner.jobs.refresh = self.spawn_job(epoch, JobKind::Refresh, refresh_delay);
        }
        if let Some(delay) = refresh_expiry_delay {
            inner.jobs.refresh_expiry = self.spawn_job(epoch, JobKind::RefreshExpiry, delay);
        }
        if let Some(delay) = identity_expiry_delay {
            inner.jobs.identity_expiry = self.spawn_job(epoch, JobKind::IdentityExpiry, delay);
        }
    }

    fn spawn_job(&self, epoch: u64, kind: JobKind, delay: Millis) -> JobHandle {
        let me = self.me.clone();
        JobHandle::spawn(async move {
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay as u64)).await;
            }
            let Some(manager) = me.upgrade() else {
                return;
            };
            match kind {
                JobKind::Refresh => manager.run_scheduled_refresh(epoch).await,
                JobKind::RefreshExpiry | JobKind::IdentityExpiry => {
                    manager.run_expiry_watch(epoch, kind).await
                }
            }
        })
    }

    async fn run_scheduled_refresh(&self, epoch: u64) {
        let identity = {
            let inner = self.inner.lock().await;
            if inner.epoch != epoch {
                return;
            }
            match inner.state.identity() {
                Some(identity) => identity.clone(),
                None => return,
            }
        };

        let result = self
            .client
            .refresh(&identity.refresh_token, &identity.refresh_response_key)
            .await;

        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            log_if!(self.logging, debug, "Scheduled refresh superseded; result dropped");
            return;
        }
        inner.jobs.refresh.detach();

        match result {
            Ok(outcome) => {
                self.apply_outcome(&mut inner, outcome);
            }
            Err(e) => {
                log_if!(self.logging, warn, "Scheduled refresh failed: {}", e);
            }
        }
    }

    async fn run_expiry_watch(&self, epoch: u64, kind: JobKind) {
        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            return;
        }
        inner.jobs.slot(kind).detach();

        log_if!(self.logging, debug, "{:?} reached; revalidating", kind);
        let identity = inner.state.identity().cloned();
        self.apply(&mut inner, identity, None, None);
    }

    fn apply_outcome(&self, inner: &mut Inner, outcome: RefreshOutcome) -> Option<Identity> {
        self.apply(inner, outcome.identity, Some(outcome.status), outcome.message)
    }

    /// Adopt an identity obtained elsewhere. Returns the identity if it is
    /// still held after validation.
    pub async fn set_identity(&self, identity: Identity) -> Option<Identity> {
        let mut inner = self.inner.lock().await;
        self.apply(&mut inner, Some(identity), None, None)
    }

    /// Forget the identity, clear the store and stop all jobs.
    pub async fn reset_identity(&self) {
        let mut inner = self.inner.lock().await;
        inner.transitioned = true;
        inner.state = State::NoIdentity;
        self.persist.clear();
        self.broadcaster.send(State::NoIdentity);
        self.reschedule(&mut inner);
    }

    /// Refresh now. If the identity changes while the request is in flight
    /// the result is dropped.
    pub async fn refresh_identity(&self) -> Result<(), RefreshError> {
        let identity = {
            let inner = self.inner.lock().await;
            match inner.state.identity() {
                Some(identity) => identity.clone(),
                None => {
                    log_if!(self.logging, debug, "No identity to refresh");
                    return Ok(());
                }
            }
        };

        let outcome = self
            .client
            .refresh(&identity.refresh_token, &identity.refresh_response_key)
            .await?;

        let mut inner = self.inner.lock().await;
        let current_token = inner.state.identity().map(|i| i.refresh_token.as_str());
        if current_token != Some(identity.refresh_token.as_str()) {
            log_if!(self.logging, debug, "Identity changed during refresh; result dropped");
            return Ok(());
        }
        self.apply_outcome(&mut inner, outcome);
        Ok(())
    }

    /// Generate a new identity through the client-side endpoint.
    pub async fn generate_identity(
        &self,
        input: IdentityInput,
        subscription_id: &str,
        server_public_key: &str,
        app_name: &str,
    ) -> Result<(), GenerationError> {
        let outcome = self
            .client
            .generate(&input, subscription_id, server_public_key, app_name)
            .await?;
        let mut inner = self.inner.lock().await;
        self.apply_outcome(&mut inner, outcome);
        Ok(())
    }

    /// Generate a new identity through the server-side endpoint.
    pub async fn generate_identity_with_credentials(
        &self,
        input: IdentityInput,
        credentials: &ServerCredentials,
    ) -> Result<(), GenerationError> {
        let outcome = self
            .client
            .generate_with_credentials(&input, credentials)
            .await?;
        let mut inner = self.inner.lock().await;
        self.apply_outcome(&mut inner, outcome);
        Ok(())
    }

    pub async fn set_automatic_refresh_enabled(&self, enabled: bool) {
        let mut inner = self.inner.lock().await;
        inner.automatic_refresh = enabled;
        self.reschedule(&mut inner);
    }

    pub async fn automatic_refresh_enabled(&self) -> bool {
        self.inner.lock().await.automatic_refresh
    }

    pub async fn current_state(&self) -> State {
        self.inner.lock().await.state.clone()
    }

    pub async fn current_identity(&self) -> Option<Identity> {
        self.inner.lock().await.state.identity().cloned()
    }

    pub async fn current_status(&self) -> IdentityStatus {
        self.inner.lock().await.state.status()
    }

    /// Background jobs currently pending.
    pub async fn scheduled_jobs(&self) -> Vec<JobKind> {
        self.inner.lock().await.jobs.active()
    }

    /// State changes from now on. The current state is not replayed.
    pub fn subscribe(&self) -> Subscription<State> {
        self.broadcaster.subscribe()
    }

    /// Run `listener` once the stored identity has been loaded.
    pub fn on_initialized(&self, listener: impl FnOnce() + Send + 'static) {
        self.init.on_complete(listener);
    }

    pub fn is_initialized(&self) -> bool {
        self.init.is_complete()
    }

    pub async fn initialized(&self) {
        self.init.wait().await;
    }

    /// Wait for every queued store write to finish.
    pub async fn flush_storage(&self) {
        self.persist.flush().await;
    }

    /// Stop all jobs and complete every subscription. State stays readable.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        inner.shut_down = true;
        self.reschedule(&mut inner);
        self.broadcaster.close();
    }
}

impl Drop for IdentityManager {
    fn drop(&mut self) {
        self.inner.get_mut().jobs.cancel_all();
    }
}
