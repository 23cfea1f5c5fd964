//! Consistency layer for collaboratively edited documents
//!
//! Roles and their rules live in [`core_access`], persistence in
//! [`core_store`], and the workflows that combine them in [`core_collab`].
//! External collaborators (identity, mail, object storage) sit behind the
//! traits in [`ports`].

pub mod config;
pub mod core_access;
pub mod core_collab;
pub mod core_store;
pub mod logging;
pub mod ports;
pub mod shutdown;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::Config;
pub use core_access::{CollabError, CollabResult, Role, RoleAuthorizer};
pub use logging::{init_logging, LogLevel};
