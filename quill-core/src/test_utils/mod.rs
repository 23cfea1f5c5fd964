//! Test utilities and helpers for Quill
//!
//! In-memory fakes for the external ports, fixtures that seed the access
//! store, and helpers for draining connection outboxes.

pub mod async_helpers;
pub mod fakes;
pub mod fixtures;

pub use async_helpers::*;
pub use fakes::*;
pub use fixtures::*;
