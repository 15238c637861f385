//! Permission request workflow

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    middleware::AuthContext,
    models::permission::{Decision, PermissionRequest, RequestPermissionBody, RequestStatus},
    notifications::{DomainEvent, Subject},
    repositories::PermissionRepository,
    state::AppState,
    validation::{parse_action, parse_resource},
};

const INVALID_STATUS: &str = "Invalid status specified. Must be 'approved' or 'rejected'.";

/// Record a pending request and notify every admin, all in one transaction
pub async fn request_permission(
    state: &AppState,
    user_id: Uuid,
    body: RequestPermissionBody,
) -> ApiResult<PermissionRequest> {
    let resource = parse_resource(&body.resource).map_err(ApiError::Validation)?;
    let action = parse_action(&body.action).map_err(ApiError::Validation)?;

    let published = state
        .notifications
        .publish(
            user_id,
            DomainEvent::PermissionRequested {
                resource,
                action,
                description: body.description,
            },
        )
        .await?;

    match published.subject {
        Subject::PermissionRequest(request) => {
            info!(
                "User {} requested '{}' on '{}' ({})",
                user_id, action, resource, request.id
            );
            Ok(request)
        }
        _ => Err(ApiError::internal("Unexpected notification subject")),
    }
}

/// Decide a pending request.
///
/// The decision is saved before the grant runs, and the grant is not part of
/// the same transaction.
pub async fn review_permission_request(
    state: &AppState,
    admin: &AuthContext,
    request_id: Uuid,
    status: &str,
) -> ApiResult<PermissionRequest> {
    let decision = Decision::parse(status).ok_or_else(|| ApiError::validation(INVALID_STATUS))?;

    let request = state
        .permission_request_repository
        .find_by_id(request_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Permission request not found."))?;

    if request.status != RequestStatus::Pending {
        return Err(already_decided(&request));
    }

    let responder = admin.user_ref();

    let Some(decided) = state
        .permission_request_repository
        .decide(request.id, decision.status(), &responder)
        .await?
    else {
        warn!("Permission request {} was decided concurrently", request.id);
        return Err(ApiError::Conflict(
            "Permission request has already been processed.".to_string(),
        ));
    };

    if decision == Decision::Approved {
        let permission = PermissionRepository::grant(
            &state.db_pool,
            decided.requester.user_id,
            decided.resource,
            decided.action,
        )
        .await?;
        info!(
            "Granted '{}' on '{}' to user {}, actions now {:?}",
            decided.action, decided.resource, permission.user_id, permission.actions
        );
    }

    state
        .notifications
        .publish(
            admin.id,
            DomainEvent::PermissionResolved {
                request_id: decided.id,
                decision,
            },
        )
        .await?;

    Ok(decided)
}

fn already_decided(request: &PermissionRequest) -> ApiError {
    ApiError::Conflict(format!(
        "Permission request has already been {}.",
        request.status
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            notification::{LiveEvent, NotificationType},
            permission::{Action, Resource},
            user::{Role, User},
        },
        test_support::{create_user, database_state, grant},
    };
    use crate::registry::live_channel;

    fn admin_context(admin: &User) -> AuthContext {
        AuthContext {
            id: admin.id,
            role: admin.role,
            username: admin.username.clone(),
            permissions: Vec::new(),
        }
    }

    fn body(resource: &str, action: &str) -> RequestPermissionBody {
        RequestPermissionBody {
            resource: resource.to_string(),
            action: action.to_string(),
            description: Some("Need to raise purchase orders".to_string()),
        }
    }

    async fn actions_on(state: &AppState, user_id: Uuid, resource: Resource) -> Vec<Action> {
        state
            .permission_repository
            .find_by_user(user_id)
            .await
            .unwrap()
            .into_iter()
            .find(|permission| permission.resource == resource)
            .map(|permission| permission.actions)
            .unwrap_or_default()
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL instance"]
    async fn test_request_then_approve_grants_and_notifies() {
        let state = database_state().await;
        let admin = create_user(&state, Role::Admin).await;
        let user = create_user(&state, Role::User).await;

        let (admin_tx, mut admin_rx) = live_channel();
        state.registry.connect(admin.id, admin.role, admin_tx).await;
        let (user_tx, mut user_rx) = live_channel();
        state.registry.connect(user.id, user.role, user_tx).await;

        let request = request_permission(&state, user.id, body("orders", "create"))
            .await
            .unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.requester.user_id, user.id);

        let LiveEvent::Notification(payload) = admin_rx.recv().await.unwrap();
        assert_eq!(payload.kind, NotificationType::PermissionRequest);
        assert_eq!(
            payload.message,
            format!("Permission request from {}: Need to raise purchase orders", user.username)
        );

        let decided =
            review_permission_request(&state, &admin_context(&admin), request.id, "approved")
                .await
                .unwrap();
        assert_eq!(decided.status, RequestStatus::Approved);
        assert_eq!(decided.responded_by.unwrap().user_id, admin.id);
        assert_eq!(
            actions_on(&state, user.id, Resource::Orders).await,
            vec![Action::Create]
        );

        let LiveEvent::Notification(payload) = user_rx.recv().await.unwrap();
        assert_eq!(payload.kind, NotificationType::PermissionApproved);
        assert_eq!(
            payload.message,
            "Your permission request for 'orders' has been approved."
        );

        let stored = state
            .notification_repository
            .list_by_reference(request.id)
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL instance"]
    async fn test_grants_only_grow_and_never_duplicate() {
        let state = database_state().await;
        let admin = create_user(&state, Role::Admin).await;
        let user = create_user(&state, Role::User).await;
        grant(&state, user.id, Resource::Orders, Action::Read).await;

        for action in ["create", "create", "update"] {
            let request = request_permission(&state, user.id, body("orders", action))
                .await
                .unwrap();
            review_permission_request(&state, &admin_context(&admin), request.id, "approved")
                .await
                .unwrap();
        }

        assert_eq!(
            actions_on(&state, user.id, Resource::Orders).await,
            vec![Action::Read, Action::Create, Action::Update]
        );
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL instance"]
    async fn test_rejection_leaves_grants_untouched() {
        let state = database_state().await;
        let admin = create_user(&state, Role::Admin).await;
        let user = create_user(&state, Role::User).await;

        let request = request_permission(&state, user.id, body("tasks", "delete"))
            .await
            .unwrap();
        let decided =
            review_permission_request(&state, &admin_context(&admin), request.id, "rejected")
                .await
                .unwrap();

        assert_eq!(decided.status, RequestStatus::Rejected);
        assert!(actions_on(&state, user.id, Resource::Tasks).await.is_empty());
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL instance"]
    async fn test_second_review_is_a_conflict() {
        let state = database_state().await;
        let admin = create_user(&state, Role::Admin).await;
        let user = create_user(&state, Role::User).await;
        let context = admin_context(&admin);

        let request = request_permission(&state, user.id, body("orders", "update"))
            .await
            .unwrap();
        review_permission_request(&state, &context, request.id, "approved")
            .await
            .unwrap();

        let err = review_permission_request(&state, &context, request.id, "rejected")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(
            err.to_string(),
            "Permission request has already been approved."
        );
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL instance"]
    async fn test_invalid_inputs_are_rejected_before_any_write() {
        let state = database_state().await;
        let admin = create_user(&state, Role::Admin).await;
        let user = create_user(&state, Role::User).await;

        let err = request_permission(&state, user.id, body("invoices", "create"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(
            state
                .permission_request_repository
                .count_for_requester(user.id)
                .await
                .unwrap(),
            0
        );

        let err = review_permission_request(&state, &admin_context(&admin), Uuid::new_v4(), "pending")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), INVALID_STATUS);

        let err =
            review_permission_request(&state, &admin_context(&admin), Uuid::new_v4(), "approved")
                .await
                .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
