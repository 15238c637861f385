//! Permission store and permission request persistence

use common::error::DatabaseResult;
use sqlx::{PgExecutor, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::{get_enum, get_enum_list};
use crate::models::{
    permission::{
        Action, Permission, PermissionRequest, RequestStatus, Resource, UserRef,
    },
    user::User,
};

const PERMISSION_COLUMNS: &str = "id, user_id, resource, actions, created_at, updated_at";

const REQUEST_COLUMNS: &str = "id, requester_id, requester_username, resource, action, \
                               description, status, responded_by_id, responded_by_username, \
                               created_at, updated_at";

/// Durable `(user, resource) -> actions` mapping
#[derive(Clone)]
pub struct PermissionRepository {
    pool: PgPool,
}

impl PermissionRepository {
    /// Create a new permission repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All permission rows of a user, always read from the database
    pub async fn find_by_user(&self, user_id: Uuid) -> DatabaseResult<Vec<Permission>> {
        let rows = sqlx::query(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE user_id = $1 ORDER BY resource"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(map_permission).collect::<Result<_, _>>()?)
    }

    /// Add `action` to the user's action set on `resource`, creating the row if needed.
    ///
    /// A single `INSERT ... ON CONFLICT DO UPDATE` statement: the row lock taken by the
    /// conflict path makes concurrent grants serialize, and the action is only appended
    /// when absent, so the set never shrinks and never holds duplicates.
    pub async fn grant<'e, E>(
        executor: E,
        user_id: Uuid,
        resource: Resource,
        action: Action,
    ) -> DatabaseResult<Permission>
    where
        E: PgExecutor<'e>,
    {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO permissions (user_id, resource, actions)
            VALUES ($1, $2, ARRAY[$3]::TEXT[])
            ON CONFLICT (user_id, resource) DO UPDATE
            SET actions = CASE
                    WHEN $3 = ANY(permissions.actions) THEN permissions.actions
                    ELSE array_append(permissions.actions, $3)
                END,
                updated_at = NOW()
            RETURNING {PERMISSION_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(resource.as_str())
        .bind(action.as_str())
        .fetch_one(executor)
        .await?;

        Ok(map_permission(&row)?)
    }
}

/// Elevation requests
#[derive(Clone)]
pub struct PermissionRequestRepository {
    pool: PgPool,
}

impl PermissionRequestRepository {
    /// Create a new permission request repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a pending request on behalf of `requester`
    pub async fn insert<'e, E>(
        executor: E,
        requester: &User,
        resource: Resource,
        action: Action,
        description: &str,
    ) -> DatabaseResult<PermissionRequest>
    where
        E: PgExecutor<'e>,
    {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO permission_requests (requester_id, requester_username, resource, action, description, status)
            VALUES ($1, $2, $3, $4, $5, 'pending')
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(requester.id)
        .bind(&requester.username)
        .bind(resource.as_str())
        .bind(action.as_str())
        .bind(description)
        .fetch_one(executor)
        .await?;

        Ok(map_request(&row)?)
    }

    /// Find a request by ID
    pub async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<PermissionRequest>> {
        Self::fetch_by_id(&self.pool, id).await
    }

    /// Find a request by ID on any executor
    pub async fn fetch_by_id<'e, E>(executor: E, id: Uuid) -> DatabaseResult<Option<PermissionRequest>>
    where
        E: PgExecutor<'e>,
    {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM permission_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(row.as_ref().map(map_request).transpose()?)
    }

    /// Move a pending request to `status`, recording the responder.
    ///
    /// Returns `None` when the request is no longer pending, so a request is
    /// decided exactly once even under concurrent reviews.
    pub async fn decide(
        &self,
        id: Uuid,
        status: RequestStatus,
        responder: &UserRef,
    ) -> DatabaseResult<Option<PermissionRequest>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE permission_requests
            SET status = $2, responded_by_id = $3, responded_by_username = $4, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(responder.user_id)
        .bind(&responder.username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(map_request).transpose()?)
    }

    /// Number of requests, used to check rollbacks
    pub async fn count_for_requester(&self, requester_id: Uuid) -> DatabaseResult<i64> {
        let count =
            sqlx::query_scalar("SELECT COUNT(*) FROM permission_requests WHERE requester_id = $1")
                .bind(requester_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

fn map_permission(row: &PgRow) -> Result<Permission, sqlx::Error> {
    Ok(Permission {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        resource: get_enum(row, "resource")?,
        actions: get_enum_list(row, "actions")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_request(row: &PgRow) -> Result<PermissionRequest, sqlx::Error> {
    let responded_by_id: Option<Uuid> = row.try_get("responded_by_id")?;
    let responded_by_username: Option<String> = row.try_get("responded_by_username")?;

    Ok(PermissionRequest {
        id: row.try_get("id")?,
        requester: UserRef {
            user_id: row.try_get("requester_id")?,
            username: row.try_get("requester_username")?,
        },
        resource: get_enum(row, "resource")?,
        action: get_enum(row, "action")?,
        description: row.try_get("description")?,
        status: get_enum(row, "status")?,
        responded_by: responded_by_id.map(|user_id| UserRef {
            user_id,
            username: responded_by_username.unwrap_or_default(),
        }),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
