//! Domain entities.
//!
//! These mirror the rows the CRUD repositories own. Only the fields the
//! authorization layer reads are modelled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::subject::Subject;

/// Default permission type.
pub const DEFAULT_PERMISSION_KIND: &str = "feature";

/// An organization (tenant).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    /// Organization id.
    pub id: i32,
    /// Display name.
    pub name: String,
}

/// A user belonging to an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User id.
    pub id: i32,
    /// Unique email address.
    pub email: String,
    /// Owning organization.
    pub organization_id: i32,
}

impl User {
    /// Creates a user.
    pub fn new(id: i32, email: impl Into<String>, organization_id: i32) -> Self {
        Self {
            id,
            email: email.into(),
            organization_id,
        }
    }

    /// The namespaced subject for this user.
    pub fn subject(&self) -> Subject {
        Subject::user(self.id)
    }
}

/// A named action on a resource, granted to groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Permission id.
    pub id: i32,
    /// Display name.
    pub name: String,
    /// Owning organization.
    pub organization_id: i32,
    /// Action the permission allows (e.g. `read`).
    pub action: String,
    /// Permission type.
    #[serde(default = "default_permission_kind")]
    pub kind: String,
}

fn default_permission_kind() -> String {
    DEFAULT_PERMISSION_KIND.to_string()
}

impl Permission {
    /// Creates a permission of the default type.
    pub fn new(
        id: i32,
        name: impl Into<String>,
        organization_id: i32,
        action: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            organization_id,
            action: action.into(),
            kind: default_permission_kind(),
        }
    }

    /// The namespaced subject for this permission.
    pub fn subject(&self) -> Subject {
        Subject::permission(self.id)
    }
}

/// A group of users holding a set of permissions.
///
/// `users` and `permissions` are not stored with the group row; they are
/// derived from the policy engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group id.
    pub id: i32,
    /// Name, unique within the organization.
    pub name: String,
    /// Owning organization.
    pub organization_id: i32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Members.
    #[serde(default)]
    pub users: Vec<User>,
    /// Granted permissions.
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl Group {
    /// Creates an empty group.
    pub fn new(id: i32, name: impl Into<String>, organization_id: i32) -> Self {
        Self {
            id,
            name: name.into(),
            organization_id,
            created_at: Utc::now(),
            users: Vec::new(),
            permissions: Vec::new(),
        }
    }

    /// The namespaced subject for this group.
    pub fn subject(&self) -> Subject {
        Subject::group(self.id)
    }
}
