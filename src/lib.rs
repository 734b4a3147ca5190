//! Client-side UID2 / EUID identity lifecycle
//!
//! Generates an advertising identity from an email or phone number, keeps it
//! valid by refreshing it on schedule, persists it across restarts and
//! publishes every state change.
//!
//! ```no_run
//! # async fn run() -> Result<(), uid2::client::GenerationError> {
//! use std::sync::Arc;
//! use uid2::client::ReqwestTransport;
//! use uid2::config::{Environment, Settings};
//! use uid2::identity::{IdentityInput, NormalizedEmail};
//! use uid2::manager::{IdentityManager, SystemClock};
//! use uid2::store::FileStore;
//!
//! let manager = IdentityManager::new(
//!     Settings::default().with_environment(Environment::integration()),
//!     Arc::new(ReqwestTransport::new()),
//!     Arc::new(FileStore::in_dir("/var/lib/myapp")),
//!     Arc::new(SystemClock),
//! );
//! manager.initialized().await;
//!
//! if let Some(email) = NormalizedEmail::new("User@Example.com") {
//!     manager
//!         .generate_identity(IdentityInput::Email(email), "subscription", "UID2-X-I-...", "com.example")
//!         .await?;
//! }
//! # Ok(())
//! # }
//! ```

/// `log` call that only fires when logging is enabled in `Settings`.
macro_rules! log_if {
    ($enabled:expr, $level:ident, $($arg:tt)+) => {
        if $enabled {
            log::$level!($($arg)+);
        }
    };
}

pub mod client;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod identity;
pub mod manager;
pub mod store;

pub use client::{GenerationError, RefreshError};
pub use config::{Environment, Settings};
pub use identity::{Identity, IdentityStatus, State};
pub use manager::IdentityManager;
