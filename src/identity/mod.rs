//! Identity data model and validation
//!
//! - `Identity`: the token set issued by the operator
//! - `IdentityStatus`: status codes shared with the persisted record
//! - `IdentityPackage`: the persisted record, and `derive_package` which
//!   computes it from an identity and the wall clock
//! - `State`: the authoritative lifecycle state held by the manager
//! - `IdentityInput`: the personal identifier a new identity is generated from

pub mod identity;
pub mod input;
pub mod package;
pub mod state;
pub mod status;

pub use identity::Identity;
pub use input::{IdentityInput, NormalizedEmail, NormalizedPhone};
pub use package::{derive_package, IdentityPackage};
pub use state::State;
pub use status::IdentityStatus;

/// Milliseconds since the Unix epoch.
pub type Millis = i64;
