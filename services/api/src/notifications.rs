//! Notification fan-out
//!
//! Every notifying event goes through [`NotificationService::publish`]:
//!
//! 1. begin a transaction and load the acting user
//! 2. let the [`DomainEvent`] compose its subject, recipients and message
//! 3. persist the notification with its ordered recipient list
//! 4. commit, then push the live event to connected recipients
//! 5. hand the committed notification to the optional observer
//!
//! Anything failing before the commit rolls the whole unit back. Pushing
//! happens after the commit so a client never sees a notification that was
//! later rolled back.

use std::sync::Arc;

use sqlx::{PgConnection, PgPool};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{
        notification::{LiveEvent, Notification, NotificationType, ReferenceKind},
        order::Order,
        permission::{Action, Decision, PermissionRequest, Resource, UserRef},
        task::Task,
        user::{Role, User},
    },
    registry::ConnectionRegistry,
    repositories::{
        OrderRepository, PermissionRequestRepository, TaskRepository, UserRepository,
        notification::{NewNotification, NotificationRepository},
    },
};

/// What happened to an order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderChange {
    Created,
    Updated,
    Deleted,
    Restored,
}

impl OrderChange {
    fn notification_type(self) -> NotificationType {
        match self {
            OrderChange::Created => NotificationType::OrderCreate,
            OrderChange::Updated => NotificationType::OrderUpdate,
            OrderChange::Deleted => NotificationType::OrderDelete,
            OrderChange::Restored => NotificationType::OrderRestore,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            OrderChange::Created => "created",
            OrderChange::Updated => "updated",
            OrderChange::Deleted => "deleted",
            OrderChange::Restored => "restored",
        }
    }
}

/// Event that produces a notification
#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// The actor asks for `action` on `resource`; the request row is created
    /// inside the notification transaction.
    PermissionRequested {
        resource: Resource,
        action: Action,
        description: Option<String>,
    },
    /// An admin decided a request
    PermissionResolved { request_id: Uuid, decision: Decision },
    /// An order was created, updated, deleted or restored
    Order { order_id: Uuid, change: OrderChange },
    /// A task was created
    TaskCreated { task_id: Uuid },
}

/// Entity a notification was composed for
#[derive(Debug, Clone)]
pub enum Subject {
    PermissionRequest(PermissionRequest),
    Order(Order),
    Task(Task),
}

/// Composed notification before it is written
#[derive(Debug, Clone)]
struct Draft {
    kind: NotificationType,
    message: String,
    reference_id: Uuid,
    reference_kind: ReferenceKind,
    recipients: Vec<Uuid>,
    subject: Subject,
}

impl DomainEvent {
    async fn compose(&self, conn: &mut PgConnection, actor: &User) -> ApiResult<Draft> {
        match self {
            DomainEvent::PermissionRequested {
                resource,
                action,
                description,
            } => {
                let description = description
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| default_description(*action, *resource, &actor.username));

                let request = PermissionRequestRepository::insert(
                    &mut *conn,
                    actor,
                    *resource,
                    *action,
                    &description,
                )
                .await?;
                let recipients = UserRepository::ids_by_role(&mut *conn, Role::Admin).await?;

                Ok(Draft {
                    kind: NotificationType::PermissionRequest,
                    message: permission_request_message(&actor.username, &description),
                    reference_id: request.id,
                    reference_kind: ReferenceKind::PermissionRequest,
                    recipients,
                    subject: Subject::PermissionRequest(request),
                })
            }
            DomainEvent::PermissionResolved {
                request_id,
                decision,
            } => {
                let request = PermissionRequestRepository::fetch_by_id(&mut *conn, *request_id)
                    .await?
                    .ok_or_else(|| ApiError::not_found("Permission request not found."))?;
                let recipients =
                    UserRepository::existing_ids(&mut *conn, &[request.requester.user_id]).await?;

                let kind = match decision {
                    Decision::Approved => NotificationType::PermissionApproved,
                    Decision::Rejected => NotificationType::PermissionRejected,
                };

                Ok(Draft {
                    kind,
                    message: permission_resolved_message(request.resource, *decision),
                    reference_id: request.id,
                    reference_kind: ReferenceKind::PermissionRequest,
                    recipients,
                    subject: Subject::PermissionRequest(request),
                })
            }
            DomainEvent::Order { order_id, change } => {
                let order = OrderRepository::fetch_by_id(&mut *conn, *order_id)
                    .await?
                    .ok_or_else(|| ApiError::not_found("Order not found"))?;
                let recipients = UserRepository::all_ids(&mut *conn).await?;

                Ok(Draft {
                    kind: change.notification_type(),
                    message: order_message(&actor.username, *change, &order.order_number),
                    reference_id: order.id,
                    reference_kind: ReferenceKind::Order,
                    recipients,
                    subject: Subject::Order(order),
                })
            }
            DomainEvent::TaskCreated { task_id } => {
                let task = TaskRepository::fetch_by_id(&mut *conn, *task_id)
                    .await?
                    .ok_or_else(|| ApiError::not_found("Task not found"))?;
                let recipients = task.assigned_users.iter().map(|user| user.id).collect();

                Ok(Draft {
                    kind: NotificationType::TaskCreate,
                    message: task_message(&actor.username, &task.title),
                    reference_id: task.id,
                    reference_kind: ReferenceKind::Task,
                    recipients,
                    subject: Subject::Task(task),
                })
            }
        }
    }
}

/// Receives every notification after its transaction committed
pub trait NotificationObserver: Send + Sync {
    fn notification_committed(&self, notification: &Notification);
}

/// Result of a publish
#[derive(Debug, Clone)]
pub struct Published {
    pub subject: Subject,
    /// `None` when the event had no recipients
    pub notification: Option<Notification>,
    /// Live frames accepted by connected clients
    pub delivered: usize,
}

/// Transactional notification envelope
#[derive(Clone)]
pub struct NotificationService {
    pool: PgPool,
    registry: ConnectionRegistry,
    observer: Option<Arc<dyn NotificationObserver>>,
}

impl NotificationService {
    pub fn new(pool: PgPool, registry: ConnectionRegistry) -> Self {
        Self {
            pool,
            registry,
            observer: None,
        }
    }

    /// Install a post-commit observer
    pub fn with_observer(mut self, observer: Arc<dyn NotificationObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run one event through the envelope on behalf of `actor_id`
    pub async fn publish(&self, actor_id: Uuid, event: DomainEvent) -> ApiResult<Published> {
        let mut tx = self.pool.begin().await?;

        let actor = UserRepository::fetch_by_id(&mut *tx, actor_id)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?;

        let draft = event.compose(&mut tx, &actor).await.inspect_err(|e| {
            error!("Failed to compose {:?} for user {}: {}", event, actor_id, e);
        })?;

        let notification = if draft.recipients.is_empty() {
            debug!("No recipients for {}, nothing to notify", draft.kind);
            None
        } else {
            let new_notification = NewNotification {
                kind: draft.kind,
                message: draft.message,
                sender: UserRef {
                    user_id: actor.id,
                    username: actor.username.clone(),
                },
                reference_id: draft.reference_id,
                reference_kind: draft.reference_kind,
                recipients: draft.recipients,
            };
            Some(NotificationRepository::insert(&mut tx, &new_notification).await?)
        };

        tx.commit().await?;

        let delivered = match &notification {
            Some(notification) => {
                let recipients: Vec<Uuid> = notification
                    .recipients
                    .iter()
                    .map(|recipient| recipient.user_id)
                    .collect();
                let event = LiveEvent::Notification(notification.payload());
                let delivered = self.registry.push(&recipients, &event).await;

                info!(
                    "Notification {} ({}) stored for {} recipient(s), {} delivered live",
                    notification.id,
                    notification.kind,
                    recipients.len(),
                    delivered
                );

                if let Some(observer) = &self.observer {
                    observer.notification_committed(notification);
                }
                delivered
            }
            None => 0,
        };

        Ok(Published {
            subject: draft.subject,
            notification,
            delivered,
        })
    }
}

/// Description used when a permission request comes without one
pub fn default_description(action: Action, resource: Resource, username: &str) -> String {
    format!("Permission to {} {} requested by {}.", action, resource, username)
}

fn permission_request_message(username: &str, description: &str) -> String {
    format!("Permission request from {}: {}", username, description)
}

fn permission_resolved_message(resource: Resource, decision: Decision) -> String {
    format!(
        "Your permission request for '{}' has been {}.",
        resource,
        decision.status()
    )
}

fn order_message(username: &str, change: OrderChange, order_number: &str) -> String {
    format!("User {} {} order #{}", username, change.verb(), order_number)
}

fn task_message(username: &str, title: &str) -> String {
    format!("User {} created task: {}", username, title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_messages() {
        assert_eq!(
            default_description(Action::Create, Resource::Orders, "meera"),
            "Permission to create orders requested by meera."
        );
        assert_eq!(
            permission_request_message("meera", "need to raise POs"),
            "Permission request from meera: need to raise POs"
        );
        assert_eq!(
            permission_resolved_message(Resource::Orders, Decision::Approved),
            "Your permission request for 'orders' has been approved."
        );
        assert_eq!(
            permission_resolved_message(Resource::Tasks, Decision::Rejected),
            "Your permission request for 'tasks' has been rejected."
        );
    }

    #[test]
    fn test_order_messages_use_past_tense() {
        assert_eq!(
            order_message("ravi", OrderChange::Created, "01/QESPL/JUN/25"),
            "User ravi created order #01/QESPL/JUN/25"
        );
        assert_eq!(
            order_message("ravi", OrderChange::Updated, "PO-9"),
            "User ravi updated order #PO-9"
        );
        assert_eq!(
            order_message("ravi", OrderChange::Deleted, "PO-9"),
            "User ravi deleted order #PO-9"
        );
        assert_eq!(
            order_message("ravi", OrderChange::Restored, "PO-9"),
            "User ravi restored order #PO-9"
        );
    }

    #[test]
    fn test_order_change_types() {
        assert_eq!(
            OrderChange::Created.notification_type(),
            NotificationType::OrderCreate
        );
        assert_eq!(
            OrderChange::Restored.notification_type().as_str(),
            "order_restore"
        );
    }

    #[test]
    fn test_task_message() {
        assert_eq!(
            task_message("anita", "Calibrate sensor"),
            "User anita created task: Calibrate sensor"
        );
    }

    mod live {
        use super::*;
        use crate::models::task::{NewTask, TaskStatus, TaskType};
        use crate::test_support::{create_order, create_user, database_state};
        use crate::registry::live_channel;

        #[tokio::test]
        #[ignore = "requires a running PostgreSQL instance"]
        async fn test_order_event_reaches_only_connected_recipients() {
            let state = database_state().await;
            let author = create_user(&state, Role::User).await;
            let online = create_user(&state, Role::Subadmin).await;
            let offline = create_user(&state, Role::User).await;
            let order = create_order(&state, &author).await;

            let (tx, mut rx) = live_channel();
            state.registry.connect(online.id, online.role, tx).await;

            let published = state
                .notifications
                .publish(
                    author.id,
                    DomainEvent::Order {
                        order_id: order.id,
                        change: OrderChange::Created,
                    },
                )
                .await
                .unwrap();

            let notification = published.notification.unwrap();
            let recipients: Vec<Uuid> = notification
                .recipients
                .iter()
                .map(|recipient| recipient.user_id)
                .collect();
            assert!(recipients.contains(&online.id));
            assert!(recipients.contains(&offline.id));
            assert!(notification.recipients.iter().all(|r| !r.is_read));
            assert!(published.delivered >= 1);

            let LiveEvent::Notification(payload) = rx.recv().await.unwrap();
            assert_eq!(payload.id, notification.id);
            assert_eq!(payload.kind, NotificationType::OrderCreate);
            assert_eq!(payload.sender.user_id, author.id);

            let stored = state
                .notification_repository
                .list_by_reference(order.id)
                .await
                .unwrap();
            assert_eq!(stored.len(), 1);
        }

        #[tokio::test]
        #[ignore = "requires a running PostgreSQL instance"]
        async fn test_missing_subject_rolls_back() {
            let state = database_state().await;
            let author = create_user(&state, Role::Admin).await;
            let ghost = Uuid::new_v4();

            let err = state
                .notifications
                .publish(
                    author.id,
                    DomainEvent::Order {
                        order_id: ghost,
                        change: OrderChange::Deleted,
                    },
                )
                .await
                .unwrap_err();

            assert!(matches!(err, ApiError::NotFound(_)));
            assert!(state
                .notification_repository
                .list_by_reference(ghost)
                .await
                .unwrap()
                .is_empty());
        }

        #[tokio::test]
        #[ignore = "requires a running PostgreSQL instance"]
        async fn test_unknown_actor_creates_nothing() {
            let state = database_state().await;
            let ghost = Uuid::new_v4();

            let err = state
                .notifications
                .publish(
                    ghost,
                    DomainEvent::PermissionRequested {
                        resource: Resource::Orders,
                        action: Action::Create,
                        description: None,
                    },
                )
                .await
                .unwrap_err();

            assert!(matches!(err, ApiError::NotFound(_)));
            assert_eq!(
                state
                    .permission_request_repository
                    .count_for_requester(ghost)
                    .await
                    .unwrap(),
                0
            );
        }

        #[tokio::test]
        #[ignore = "requires a running PostgreSQL instance"]
        async fn test_unassigned_task_commits_without_notification() {
            let state = database_state().await;
            let admin = create_user(&state, Role::Admin).await;
            let order = create_order(&state, &admin).await;

            let task = state
                .task_repository
                .create(&NewTask {
                    po_id: order.id,
                    title: "Site survey".to_string(),
                    description: "Check the mounting points".to_string(),
                    task_type: TaskType::Inspection,
                    status: TaskStatus::Pending,
                    task_deadline: None,
                    assignees: Vec::new(),
                })
                .await
                .unwrap();

            let published = state
                .notifications
                .publish(admin.id, DomainEvent::TaskCreated { task_id: task.id })
                .await
                .unwrap();

            assert!(published.notification.is_none());
            assert_eq!(published.delivered, 0);
            assert!(matches!(published.subject, Subject::Task(ref t) if t.id == task.id));
        }
    }
}
