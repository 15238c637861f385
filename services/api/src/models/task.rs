//! Task models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::text_enum;

text_enum! {
    /// Progress of a task
    TaskStatus as "task status" {
        Completed => "completed",
        Pending => "pending",
        Canceled => "canceled",
    }
}

text_enum! {
    /// Field-service category of a task
    TaskType as "task type" {
        Installation => "installation",
        Maintenance => "maintenance",
        Calibration => "calibration",
        Repair => "repair",
        Inspection => "inspection",
    }
}

/// Assignee as returned with a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

/// Task entity
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub mark_status: bool,
    pub task_type: TaskType,
    pub assigned_users: Vec<AssignedUser>,
    pub po_id: Uuid,
    pub po_number: Option<String>,
    pub task_deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Reference to a user in a create-task body
#[derive(Debug, Clone, Deserialize)]
pub struct AssigneeRef {
    #[serde(rename = "_id", alias = "id")]
    pub id: Uuid,
    #[serde(default)]
    pub username: Option<String>,
}

/// Body of `POST /task/api/admin-subadmin-create-task`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub po_id: Uuid,
    pub title: String,
    pub description: String,
    pub task_type: TaskType,
    pub task_deadline: Option<DateTime<Utc>>,
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub assigned_users: Vec<AssigneeRef>,
}

impl CreateTaskRequest {
    /// Assignee ids with duplicates removed, first occurrence wins
    pub fn unique_assignees(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = Vec::with_capacity(self.assigned_users.len());
        for assignee in &self.assigned_users {
            if !ids.contains(&assignee.id) {
                ids.push(assignee.id);
            }
        }
        ids
    }
}

/// Validated insert payload
#[derive(Debug, Clone)]
pub struct NewTask {
    pub po_id: Uuid,
    pub title: String,
    pub description: String,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub task_deadline: Option<DateTime<Utc>>,
    pub assignees: Vec<Uuid>,
}

/// Body of `PUT /task/api/admin-subadmin-update-status/:taskId`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskStatusRequest {
    pub mark_status: bool,
}
