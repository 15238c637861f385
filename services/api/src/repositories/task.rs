//! Task persistence

use common::error::DatabaseResult;
use sqlx::{PgExecutor, PgPool, Row, postgres::PgRow, types::Json};
use tracing::info;
use uuid::Uuid;

use super::get_enum;
use crate::models::task::{AssignedUser, NewTask, Task};

/// Tasks joined with their order number and ordered assignee list
const TASK_SELECT: &str = r#"
    SELECT t.id, t.title, t.description, t.status, t.mark_status, t.task_type, t.po_id,
           t.task_deadline, t.created_at, o.order_number AS po_number,
           COALESCE((
               SELECT json_agg(
                          json_build_object('id', u.id, 'username', u.username, 'email', u.email)
                          ORDER BY a.position
                      )
               FROM task_assignees a
               JOIN users u ON u.id = a.user_id
               WHERE a.task_id = t.id
           ), '[]'::json) AS assigned_users
    FROM tasks t
    LEFT JOIN orders o ON o.id = t.po_id
"#;

/// Task repository
#[derive(Clone)]
pub struct TaskRepository {
    pool: PgPool,
}

impl TaskRepository {
    /// Create a new task repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a task and its assignees in one transaction
    pub async fn create(&self, task: &NewTask) -> DatabaseResult<Task> {
        info!("Creating task '{}' for order {}", task.title, task.po_id);

        let mut tx = self.pool.begin().await?;

        let task_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO tasks (title, description, status, task_type, po_id, task_deadline)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.task_type.as_str())
        .bind(task.po_id)
        .bind(task.task_deadline)
        .fetch_one(&mut *tx)
        .await?;

        if !task.assignees.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO task_assignees (task_id, user_id, position)
                SELECT $1, assignee.user_id, assignee.position::INT
                FROM UNNEST($2::UUID[]) WITH ORDINALITY AS assignee(user_id, position)
                "#,
            )
            .bind(task_id)
            .bind(&task.assignees)
            .execute(&mut *tx)
            .await?;
        }

        let created = Self::fetch_by_id(&mut *tx, task_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        tx.commit().await?;

        Ok(created)
    }

    /// Find a task by ID
    pub async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Task>> {
        Self::fetch_by_id(&self.pool, id).await
    }

    /// Find a task by ID on any executor
    pub async fn fetch_by_id<'e, E>(executor: E, id: Uuid) -> DatabaseResult<Option<Task>>
    where
        E: PgExecutor<'e>,
    {
        let row = sqlx::query(&format!("{TASK_SELECT} WHERE t.id = $1"))
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(row.as_ref().map(map_task).transpose()?)
    }

    /// Tasks attached to a purchase order, oldest first
    pub async fn list_by_order(&self, po_id: Uuid) -> DatabaseResult<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "{TASK_SELECT} WHERE t.po_id = $1 ORDER BY t.created_at"
        ))
        .bind(po_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(map_task).collect::<Result<_, _>>()?)
    }

    /// Set the completion mark of a task
    pub async fn set_mark_status(&self, id: Uuid, mark_status: bool) -> DatabaseResult<Option<Task>> {
        let updated: Option<Uuid> = sqlx::query_scalar(
            "UPDATE tasks SET mark_status = $2, updated_at = NOW() WHERE id = $1 RETURNING id",
        )
        .bind(id)
        .bind(mark_status)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(id) => self.find_by_id(id).await,
            None => Ok(None),
        }
    }
}

fn map_task(row: &PgRow) -> Result<Task, sqlx::Error> {
    let Json(assigned_users): Json<Vec<AssignedUser>> = row.try_get("assigned_users")?;

    Ok(Task {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status: get_enum(row, "status")?,
        mark_status: row.try_get("mark_status")?,
        task_type: get_enum(row, "task_type")?,
        assigned_users,
        po_id: row.try_get("po_id")?,
        po_number: row.try_get("po_number")?,
        task_deadline: row.try_get("task_deadline")?,
        created_at: row.try_get("created_at")?,
    })
}
