//! Document roles and the authorization rules over them
//!
//! Every permission decision in the crate goes through [`RoleAuthorizer`];
//! callers never compare roles themselves.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::{CollabError, CollabResult};

/// Role a collaborator holds on a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Singleton per document; owns transfer rights
    Creator,
    /// Can read and write
    #[serde(alias = "edit")]
    Editor,
    /// Read-only
    #[serde(alias = "read")]
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Creator => "creator",
            Role::Editor => "editor",
            Role::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CollabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "creator" => Ok(Role::Creator),
            "editor" | "edit" => Ok(Role::Editor),
            "viewer" | "read" => Ok(Role::Viewer),
            other => Err(CollabError::InvalidRequest(format!("invalid role: {}", other))),
        }
    }
}

/// Pure authorization rules over [`Role`] values
pub struct RoleAuthorizer;

impl RoleAuthorizer {
    /// A Creator's access can never be revoked.
    pub fn can_revoke(target: Role) -> CollabResult<()> {
        if target == Role::Creator {
            return Err(CollabError::Forbidden(
                "the creator's access cannot be revoked".to_string(),
            ));
        }
        Ok(())
    }

    /// Role changes are made by the Creator, never mint a second Creator,
    /// and never touch the Creator's own row.
    pub fn can_modify_role(
        requester: Role,
        target_is_self_creator: bool,
        new_role: Role,
    ) -> CollabResult<()> {
        if target_is_self_creator {
            return Err(CollabError::Forbidden(
                "the creator cannot modify their own role".to_string(),
            ));
        }
        if requester != Role::Creator {
            return Err(CollabError::Forbidden(
                "only the creator can modify roles".to_string(),
            ));
        }
        if new_role == Role::Creator {
            return Err(CollabError::Forbidden(
                "a document can only have one creator".to_string(),
            ));
        }
        Ok(())
    }

    /// Roles that may be granted through invites or role changes
    pub fn is_valid_assignable_role(role: Role) -> bool {
        matches!(role, Role::Editor | Role::Viewer)
    }

    /// `None` means the user holds no access row at all.
    pub fn can_edit(role: Option<Role>) -> bool {
        matches!(role, Some(Role::Creator) | Some(Role::Editor))
    }

    pub fn can_read(role: Option<Role>, document_is_public: bool) -> bool {
        document_is_public || role.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creator_is_never_revocable() {
        assert!(matches!(
            RoleAuthorizer::can_revoke(Role::Creator),
            Err(CollabError::Forbidden(_))
        ));
        assert!(RoleAuthorizer::can_revoke(Role::Editor).is_ok());
        assert!(RoleAuthorizer::can_revoke(Role::Viewer).is_ok());
    }

    #[test]
    fn test_modify_role_rules() {
        assert!(RoleAuthorizer::can_modify_role(Role::Creator, false, Role::Viewer).is_ok());
        assert!(RoleAuthorizer::can_modify_role(Role::Creator, false, Role::Editor).is_ok());

        // Only the creator may change roles
        assert!(RoleAuthorizer::can_modify_role(Role::Editor, false, Role::Viewer).is_err());
        assert!(RoleAuthorizer::can_modify_role(Role::Viewer, false, Role::Editor).is_err());

        // No second creator through role assignment
        assert!(RoleAuthorizer::can_modify_role(Role::Creator, false, Role::Creator).is_err());

        // The creator cannot demote themself
        assert!(RoleAuthorizer::can_modify_role(Role::Creator, true, Role::Editor).is_err());
    }

    #[test]
    fn test_assignable_roles() {
        assert!(RoleAuthorizer::is_valid_assignable_role(Role::Editor));
        assert!(RoleAuthorizer::is_valid_assignable_role(Role::Viewer));
        assert!(!RoleAuthorizer::is_valid_assignable_role(Role::Creator));
    }

    #[test]
    fn test_edit_and_read() {
        assert!(RoleAuthorizer::can_edit(Some(Role::Creator)));
        assert!(RoleAuthorizer::can_edit(Some(Role::Editor)));
        assert!(!RoleAuthorizer::can_edit(Some(Role::Viewer)));
        assert!(!RoleAuthorizer::can_edit(None));

        assert!(RoleAuthorizer::can_read(None, true));
        assert!(RoleAuthorizer::can_read(Some(Role::Viewer), false));
        assert!(!RoleAuthorizer::can_read(None, false));
    }

    #[test]
    fn test_role_wire_format() {
        assert_eq!(serde_json::to_string(&Role::Editor).unwrap(), "\"editor\"");
        let legacy: Role = serde_json::from_str("\"read\"").unwrap();
        assert_eq!(legacy, Role::Viewer);
        assert_eq!("edit".parse::<Role>().unwrap(), Role::Editor);
        assert!("owner".parse::<Role>().is_err());
    }
}
