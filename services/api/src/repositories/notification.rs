//! Notification persistence

use common::error::DatabaseResult;
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow, types::Json};
use uuid::Uuid;

use super::get_enum;
use crate::models::{
    notification::{Notification, NotificationType, Recipient, ReferenceKind},
    permission::UserRef,
};

const NOTIFICATION_SELECT: &str = r#"
    SELECT n.id, n.type, n.message, n.sender_id, n.sender_username, n.reference_id,
           n.reference_kind, n.created_at,
           COALESCE((
               SELECT json_agg(
                          json_build_object('userId', r.user_id, 'isRead', r.is_read)
                          ORDER BY r.position
                      )
               FROM notification_recipients r
               WHERE r.notification_id = n.id
           ), '[]'::json) AS recipients
    FROM notifications n
"#;

/// Fields of a notification about to be written
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub kind: NotificationType,
    pub message: String,
    pub sender: UserRef,
    pub reference_id: Uuid,
    pub reference_kind: ReferenceKind,
    pub recipients: Vec<Uuid>,
}

/// Notification repository
#[derive(Clone)]
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    /// Create a new notification repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Write a notification and its ordered recipient rows on `conn`
    pub async fn insert(
        conn: &mut PgConnection,
        notification: &NewNotification,
    ) -> DatabaseResult<Notification> {
        let row = sqlx::query(
            r#"
            INSERT INTO notifications (type, message, sender_id, sender_username, reference_id, reference_kind)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, created_at
            "#,
        )
        .bind(notification.kind.as_str())
        .bind(&notification.message)
        .bind(notification.sender.user_id)
        .bind(&notification.sender.username)
        .bind(notification.reference_id)
        .bind(notification.reference_kind.as_str())
        .fetch_one(&mut *conn)
        .await?;

        let id: Uuid = row.try_get("id")?;

        sqlx::query(
            r#"
            INSERT INTO notification_recipients (notification_id, user_id, position)
            SELECT $1, recipient.user_id, recipient.position::INT
            FROM UNNEST($2::UUID[]) WITH ORDINALITY AS recipient(user_id, position)
            "#,
        )
        .bind(id)
        .bind(&notification.recipients)
        .execute(&mut *conn)
        .await?;

        Ok(Notification {
            id,
            kind: notification.kind,
            message: notification.message.clone(),
            sender: notification.sender.clone(),
            recipients: notification
                .recipients
                .iter()
                .map(|&user_id| Recipient {
                    user_id,
                    is_read: false,
                })
                .collect(),
            reference_id: notification.reference_id,
            reference_kind: notification.reference_kind,
            created_at: row.try_get("created_at")?,
        })
    }

    /// Notifications pointing at `reference_id`, oldest first
    pub async fn list_by_reference(&self, reference_id: Uuid) -> DatabaseResult<Vec<Notification>> {
        let rows = sqlx::query(&format!(
            "{NOTIFICATION_SELECT} WHERE n.reference_id = $1 ORDER BY n.created_at"
        ))
        .bind(reference_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(map_notification).collect::<Result<_, _>>()?)
    }

    /// Notifications addressed to `user_id`, newest first
    pub async fn list_for_user(&self, user_id: Uuid) -> DatabaseResult<Vec<Notification>> {
        let rows = sqlx::query(&format!(
            r#"
            {NOTIFICATION_SELECT}
            WHERE EXISTS (
                SELECT 1 FROM notification_recipients r
                WHERE r.notification_id = n.id AND r.user_id = $1
            )
            ORDER BY n.created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(map_notification).collect::<Result<_, _>>()?)
    }
}

fn map_notification(row: &PgRow) -> Result<Notification, sqlx::Error> {
    let Json(recipients): Json<Vec<Recipient>> = row.try_get("recipients")?;

    Ok(Notification {
        id: row.try_get("id")?,
        kind: get_enum(row, "type")?,
        message: row.try_get("message")?,
        sender: UserRef {
            user_id: row.try_get("sender_id")?,
            username: row.try_get("sender_username")?,
        },
        recipients,
        reference_id: row.try_get("reference_id")?,
        reference_kind: get_enum(row, "reference_kind")?,
        created_at: row.try_get("created_at")?,
    })
}
