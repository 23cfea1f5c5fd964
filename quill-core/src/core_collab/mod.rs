//! Collaboration workflows built on the access store
//!
//! - [`OwnershipTransferWorkflow`]: atomic owner swap with bounded retries
//! - [`InviteLifecycle`]: invite / accept / decline
//! - [`DocumentService`]: creation, reads and direct access management
//! - [`CollaborationGateway`]: authenticated rooms and edit relay
//! - [`CleanupScheduler`]: expiry of generated artifacts

pub mod cleanup;
pub mod gateway;
pub mod invite;
pub mod sharing;
pub mod transfer;

pub use cleanup::{BatchReport, CleanupScheduler};
pub use gateway::{ClientEvent, CollaborationGateway, ServerEvent, Session};
pub use invite::{generate_token, AcceptOutcome, InviteLifecycle, InviteOutcome, NextStep};
pub use sharing::DocumentService;
pub use transfer::OwnershipTransferWorkflow;
