//! Permission grants and elevation requests

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::text_enum;

text_enum! {
    /// Named domain noun subject to access control
    Resource as "resource" {
        Orders => "orders",
        Users => "users",
        Permissions => "permissions",
        Tasks => "tasks",
    }
}

text_enum! {
    /// Capability on a resource
    Action as "action" {
        Create => "create",
        Read => "read" | "readonly",
        Update => "update",
        Delete => "delete",
        Write => "write",
    }
}

text_enum! {
    /// Lifecycle of a permission request
    RequestStatus as "status" {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

/// Terminal outcome an admin may set on a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    /// Parse the `status` field of an approval call; only terminal states are accepted
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "approved" => Some(Decision::Approved),
            "rejected" => Some(Decision::Rejected),
            _ => None,
        }
    }

    pub fn status(self) -> RequestStatus {
        match self {
            Decision::Approved => RequestStatus::Approved,
            Decision::Rejected => RequestStatus::Rejected,
        }
    }
}

/// Actions granted to one user on one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub resource: Resource,
    pub actions: Vec<Action>,
}

impl PermissionGrant {
    pub fn allows(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }
}

/// Whether any grant in `grants` covers `(resource, action)`
pub fn grants_allow(grants: &[PermissionGrant], resource: Resource, action: Action) -> bool {
    grants
        .iter()
        .find(|grant| grant.resource == resource)
        .is_some_and(|grant| grant.allows(action))
}

/// Stored permission row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: Uuid,
    pub user_id: Uuid,
    pub resource: Resource,
    pub actions: Vec<Action>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Permission> for PermissionGrant {
    fn from(permission: Permission) -> Self {
        PermissionGrant {
            resource: permission.resource,
            actions: permission.actions,
        }
    }
}

/// User snapshot stored on requests and notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub user_id: Uuid,
    pub username: String,
}

/// Elevation request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    pub id: Uuid,
    pub requester: UserRef,
    pub resource: Resource,
    pub action: Action,
    pub description: String,
    pub status: RequestStatus,
    pub responded_by: Option<UserRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /user/api/user-request-permission`
///
/// Kept as raw strings so unknown values map to a 400 with a readable message.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestPermissionBody {
    pub resource: String,
    pub action: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Body of `POST /user/api/admin-check-permission`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPermissionBody {
    pub request_id: Uuid,
    pub status: String,
}
