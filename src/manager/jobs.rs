//! Handles for the scheduler's background jobs

use std::future::Future;

use tokio::task::JoinHandle;

/// At most one live task; cancelling aborts it at its next await point.
#[derive(Debug, Default)]
pub struct JobHandle(Option<JoinHandle<()>>);

impl JobHandle {
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self(Some(tokio::spawn(future)))
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }

    /// Forget the task without aborting it. A job calls this on its own
    /// handle before it changes state, so the reschedule that follows
    /// doesn't abort the job running it.
    pub fn detach(&mut self) {
        self.0.take();
    }

    pub fn is_active(&self) -> bool {
        self.0.as_ref().map_or(false, |h| !h.is_finished())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Refresh,
    RefreshExpiry,
    IdentityExpiry,
}

/// The scheduler's three job slots.
#[derive(Debug, Default)]
pub struct Jobs {
    pub refresh: JobHandle,
    pub refresh_expiry: JobHandle,
    pub identity_expiry: JobHandle,
}

impl Jobs {
    pub fn slot(&mut self, kind: JobKind) -> &mut JobHandle {
        match kind {
            JobKind::Refresh => &mut self.refresh,
            JobKind::RefreshExpiry => &mut self.refresh_expiry,
            JobKind::IdentityExpiry => &mut self.identity_expiry,
        }
    }

    pub fn cancel_all(&mut self) {
        self.refresh.cancel();
        self.refresh_expiry.cancel();
        self.identity_expiry.cancel();
    }

    pub fn active(&self) -> Vec<JobKind> {
        [
            (JobKind::Refresh, &self.refresh),
            (JobKind::RefreshExpiry, &self.refresh_expiry),
            (JobKind::IdentityExpiry, &self.identity_expiry),
        ]
        .into_iter()
        .filter(|(_, handle)| handle.is_active())
        .map(|(kind, _)| kind)
        .collect()
    }
}
