//! Documents, collaborators and roles
//!
//! ## Invariants
//!
//! 1. Exactly one `Creator` access row per document, held by the document owner
//! 2. At most one access row per (document, collaborator) pair
//! 3. At most one `Pending` invite per (document, email) pair
//! 4. Role decisions are made only by [`RoleAuthorizer`]

pub mod errors;
pub mod model;
pub mod role;
pub mod types;

pub use errors::{CollabError, CollabResult};
pub use model::{
    normalize_email, Document, DocumentAccess, DocumentMedia, DocumentState, Invite, InviteStatus,
    MediaLocator, User,
};
pub use role::{Role, RoleAuthorizer};
pub use types::{AccessId, DocumentId, InviteId, MediaId, Timestamp, UserId};
