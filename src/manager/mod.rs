//! Identity lifecycle management
//!
//! `IdentityManager` owns the current `State`, persists every transition
//! through a single-writer queue, keeps the refresh and expiry jobs in step
//! with the held identity and publishes each new state to subscribers.

pub mod broadcaster;
pub mod identity_manager;
pub mod init;
pub mod jobs;
pub mod persist;

pub use broadcaster::{Broadcaster, Subscription};
pub use identity_manager::IdentityManager;
pub use init::InitLatch;
pub use jobs::{JobHandle, JobKind};
pub use persist::PersistQueue;

pub use crate::clock::{Clock, SystemClock, TokioClock};
