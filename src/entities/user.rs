// 🔑 User Role & Session - caller identity passed explicitly into every call
//
// An admin has no fixed unit and may act on any. Everyone else is scoped
// to their assigned unit.

use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRole {
    pub uid: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub assigned_bial: Option<String>,
}

impl UserRole {
    pub fn admin(uid: &str, email: &str) -> Self {
        UserRole {
            uid: uid.to_string(),
            email: email.to_string(),
            display_name: String::new(),
            is_admin: true,
            assigned_bial: None,
        }
    }

    pub fn member(uid: &str, email: &str, bial: &str) -> Self {
        UserRole {
            uid: uid.to_string(),
            email: email.to_string(),
            display_name: String::new(),
            is_admin: false,
            assigned_bial: Some(bial.to_string()),
        }
    }

    /// assigned_bial and is_admin are mutually exclusive
    pub fn validate(&self) -> Result<()> {
        if self.uid.trim().is_empty() {
            return Err(LedgerError::validation("user uid must not be empty"));
        }
        if self.is_admin && self.assigned_bial.is_some() {
            return Err(LedgerError::validation(
                "an admin cannot have an assigned Upa Bial",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// Who is calling. Built by the outer surface (CLI, server) per request.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: UserRole,
}

impl Session {
    pub fn new(user: UserRole) -> Self {
        Session { user }
    }

    /// Operator running the CLI against a local database
    pub fn local_admin() -> Self {
        Session::new(UserRole {
            uid: "local-cli".to_string(),
            email: String::new(),
            display_name: "Local operator".to_string(),
            is_admin: true,
            assigned_bial: None,
        })
    }

    pub fn actor(&self) -> &str {
        &self.user.uid
    }

    pub fn is_admin(&self) -> bool {
        self.user.is_admin
    }

    pub fn can_access_bial(&self, bial: &str) -> bool {
        self.user.is_admin || self.user.assigned_bial.as_deref() == Some(bial)
    }

    pub fn require_bial(&self, bial: &str) -> Result<()> {
        if self.can_access_bial(bial) {
            Ok(())
        } else {
            Err(LedgerError::permission(format!(
                "user {} is not assigned to {}",
                self.user.uid, bial
            )))
        }
    }

    pub fn require_admin(&self) -> Result<()> {
        if self.user.is_admin {
            Ok(())
        } else {
            Err(LedgerError::permission(format!(
                "user {} is not an admin",
                self.user.uid
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_can_access_any_bial() {
        let session = Session::new(UserRole::admin("u1", "admin@example.org"));

        assert!(session.require_bial("Bial 1").is_ok());
        assert!(session.require_bial("Bial 9").is_ok());
        assert!(session.require_admin().is_ok());
    }

    #[test]
    fn test_member_scoped_to_assigned_bial() {
        let session = Session::new(UserRole::member("u2", "m@example.org", "Bial 1"));

        assert!(session.require_bial("Bial 1").is_ok());
        assert!(matches!(
            session.require_bial("Bial 2"),
            Err(LedgerError::Permission(_))
        ));
        assert!(session.require_admin().is_err());
    }

    #[test]
    fn test_admin_with_assigned_bial_is_invalid() {
        let mut role = UserRole::admin("u1", "a@example.org");
        role.assigned_bial = Some("Bial 1".to_string());

        assert!(role.validate().is_err());
        assert!(UserRole::member("u2", "", "Bial 1").validate().is_ok());
    }
}
