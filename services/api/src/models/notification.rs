//! Notification records and the live event pushed to connected clients

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::permission::UserRef;
use super::text_enum;

text_enum! {
    /// Kind of event a notification describes
    NotificationType as "notification type" {
        PermissionRequest => "permission_request",
        PermissionApproved => "permission_approved",
        PermissionRejected => "permission_rejected",
        OrderCreate => "order_create",
        OrderUpdate => "order_update",
        OrderDelete => "order_delete",
        OrderRestore => "order_restore",
        TaskCreate => "task_create",
    }
}

text_enum! {
    /// Entity kind a notification points at
    ReferenceKind as "reference kind" {
        PermissionRequest => "PermissionRequest",
        Order => "Order",
        Task => "Task",
    }
}

/// One addressee of a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub user_id: Uuid,
    pub is_read: bool,
}

/// Persisted notification
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub message: String,
    pub sender: UserRef,
    pub recipients: Vec<Recipient>,
    pub reference_id: Uuid,
    pub reference_kind: ReferenceKind,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Payload of the live `notification` event
    pub fn payload(&self) -> NotificationPayload {
        NotificationPayload {
            id: self.id,
            kind: self.kind,
            message: self.message.clone(),
            sender: self.sender.clone(),
            created_at: self.created_at,
        }
    }
}

/// `data` of a live `notification` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub message: String,
    pub sender: UserRef,
    pub created_at: DateTime<Utc>,
}

/// Frame sent over a live connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum LiveEvent {
    Notification(NotificationPayload),
}
