//! Multi-subscriber fan-out of state changes
//!
//! Each subscriber gets its own unbounded channel, so a slow reader never
//! blocks emission or other readers. Values are not replayed: a subscriber
//! sees only what is sent after it attaches.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use uuid::Uuid;

/// `None` once closed.
type Registry<T> = Mutex<Option<HashMap<Uuid, mpsc::UnboundedSender<T>>>>;

pub struct Broadcaster<T> {
    subscribers: Arc<Registry<T>>,
}

fn lock<T>(registry: &Registry<T>) -> MutexGuard<'_, Option<HashMap<Uuid, mpsc::UnboundedSender<T>>>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T: Clone + Send + 'static> Broadcaster<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Some(HashMap::new()))),
        }
    }

    /// Attach a new subscriber. After `close` the subscription ends immediately.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        if let Some(subscribers) = lock(&self.subscribers).as_mut() {
            subscribers.insert(id, tx);
        }
        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.subscribers),
        }
    }

    /// Deliver `value` to every live subscriber.
    pub fn send(&self, value: T) {
        if let Some(subscribers) = lock(&self.subscribers).as_mut() {
            subscribers.retain(|_, tx| tx.send(value.clone()).is_ok());
        }
    }

    /// Complete every open subscription and refuse new ones.
    pub fn close(&self) {
        lock(&self.subscribers).take();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.subscribers).is_none()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).as_ref().map_or(0, HashMap::len)
    }
}

impl<T: Clone + Send + 'static> Default for Broadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A live sequence of broadcast values. Dropping it detaches.
pub struct Subscription<T> {
    id: Uuid,
    rx: mpsc::UnboundedReceiver<T>,
    registry: Weak<Registry<T>>,
}

impl<T> Subscription<T> {
    /// Next value, or `None` once the broadcaster is closed.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Next value if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if let Some(subscribers) = lock(&registry).as_mut() {
                subscribers.remove(&self.id);
            }
        }
    }
}
