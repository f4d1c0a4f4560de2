//! Service and agent registration
//!
//! Registration resolves the stable service id the session connects with.
//! The id is persisted through an [`IdentityStore`] so restarts keep it.

mod client;
mod identity;
mod store;

pub use client::RegistrationClient;
pub use identity::{RegistrationOptions, ServiceIdentity, ServiceKind};
pub use store::{CallbackIdentityStore, FileIdentityStore, IdentityStore, DEFAULT_IDENTITY_FILE};
