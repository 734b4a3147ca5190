//! One-shot initialization latch
//!
//! Listeners registered before the initial load are queued and run once, in
//! registration order, when it completes. Later registrations run at once.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;

type Listener = Box<dyn FnOnce() + Send>;

enum LatchState {
    Pending(Vec<Listener>),
    Complete,
}

pub struct InitLatch {
    state: Mutex<LatchState>,
}

impl InitLatch {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LatchState::Pending(Vec::new())),
        }
    }

    fn state(&self) -> MutexGuard<'_, LatchState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_complete(&self) -> bool {
        matches!(*self.state(), LatchState::Complete)
    }

    pub fn on_complete(&self, listener: impl FnOnce() + Send + 'static) {
        {
            let mut state = self.state();
            if let LatchState::Pending(listeners) = &mut *state {
                listeners.push(Box::new(listener));
                return;
            }
        }
        listener();
    }

    /// Mark complete and run queued listeners. Later calls do nothing.
    pub fn complete(&self) {
        let listeners = match std::mem::replace(&mut *self.state(), LatchState::Complete) {
            LatchState::Pending(listeners) => listeners,
            LatchState::Complete => Vec::new(),
        };
        // Run outside the lock so a listener may register another.
        for listener in listeners {
            listener();
        }
    }

    pub async fn wait(&self) {
        let (tx, rx) = oneshot::channel();
        self.on_complete(move || {
            let _ = tx.send(());
        });
        let _ = rx.await;
    }
}

impl Default for InitLatch {
    fn default() -> Self {
        Self::new()
    }
}
