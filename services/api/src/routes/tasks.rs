//! Task routes (`/task/api`), open to admins and subadmins

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Response,
    routing::{get, post, put},
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;

use super::{STAFF, respond};
use crate::{
    error::{ApiError, ApiResult},
    middleware::{AuthContext, RoleGate, authenticate, restrict_to},
    models::task::{CreateTaskRequest, NewTask, TaskStatus, UpdateTaskStatusRequest},
    notifications::DomainEvent,
    repositories::UserRepository,
    state::AppState,
};

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/admin-subadmin-create-task", post(create_task))
        .route("/admin-subadmin-update-status/:taskId", put(update_status))
        .route("/admin-subadmin-getTask-By-po/:poId", get(tasks_by_order))
        .route_layer(from_fn_with_state(RoleGate::new(STAFF), restrict_to))
        .route_layer(from_fn_with_state(state.clone(), authenticate))
}

async fn create_task(
    State(state): State<AppState>,
    context: AuthContext,
    WithRejection(Json(payload), _): WithRejection<Json<CreateTaskRequest>, ApiError>,
) -> ApiResult<Response> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::validation("Task title is required"));
    }

    if state.order_repository.find_by_id(payload.po_id).await?.is_none() {
        return Err(ApiError::not_found("Purchase order not found"));
    }

    let assignees = payload.unique_assignees();
    if !assignees.is_empty() {
        let existing = UserRepository::existing_ids(&state.db_pool, &assignees).await?;
        if existing.len() != assignees.len() {
            return Err(ApiError::validation(
                "One or more assigned user IDs are invalid",
            ));
        }
    }

    let task = state
        .task_repository
        .create(&NewTask {
            po_id: payload.po_id,
            title: payload.title,
            description: payload.description,
            task_type: payload.task_type,
            status: payload.status.unwrap_or(TaskStatus::Pending),
            task_deadline: payload.task_deadline,
            assignees,
        })
        .await?;

    state
        .notifications
        .publish(context.id, DomainEvent::TaskCreated { task_id: task.id })
        .await?;

    Ok(respond(StatusCode::CREATED, "Task created successfully", task))
}

async fn update_status(
    State(state): State<AppState>,
    WithRejection(Path(task_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(payload), _): WithRejection<Json<UpdateTaskStatusRequest>, ApiError>,
) -> ApiResult<Response> {
    let task = state
        .task_repository
        .set_mark_status(task_id, payload.mark_status)
        .await?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;

    Ok(respond(StatusCode::OK, "Task status updated successfully", task))
}

async fn tasks_by_order(
    State(state): State<AppState>,
    WithRejection(Path(po_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> ApiResult<Response> {
    let tasks = state.task_repository.list_by_order(po_id).await?;
    Ok(respond(StatusCode::OK, "Tasks retrieved successfully", tasks))
}
