//! Account and permission routes (`/user/api`)

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::WithRejection;
use serde_json::json;
use tracing::info;

use super::{STAFF, respond};
use crate::{
    error::{ApiError, ApiResult},
    middleware::{AuthContext, RoleGate, TOKEN_COOKIE, authenticate, restrict_to},
    models::{
        permission::{RequestPermissionBody, ReviewPermissionBody},
        user::{AdminSignupRequest, CreateUserRequest, LoginRequest, LoginResponse, NewUser, Role},
    },
    permissions,
    state::AppState,
    validation::{validate_email, validate_password, validate_username},
};

pub fn router(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/admin-signup", post(admin_signup))
        .route("/login", post(login));

    let identified = Router::new()
        .route("/user-request-permission", post(request_permission))
        .route("/notifications", get(my_notifications))
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    let staff = Router::new()
        .route("/admin-check-permission", post(review_permission))
        .route("/admin-create-user", post(create_user))
        .route("/admin-get-all-user", get(list_users))
        .route_layer(from_fn_with_state(RoleGate::new(STAFF), restrict_to))
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    public.merge(identified).merge(staff)
}

fn validate_account(username: &str, email: &str, password: &str) -> ApiResult<()> {
    validate_username(username).map_err(ApiError::Validation)?;
    validate_email(email).map_err(ApiError::Validation)?;
    validate_password(password).map_err(ApiError::Validation)?;
    Ok(())
}

/// Create the first admin account
async fn admin_signup(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<AdminSignupRequest>, ApiError>,
) -> ApiResult<Response> {
    validate_account(&payload.username, &payload.email, &payload.password)?;

    if state.user_repository.count_by_role(Role::Admin).await? > 0 {
        return Err(ApiError::Conflict(
            "An admin account already exists".to_string(),
        ));
    }

    let user = state
        .user_repository
        .create(&NewUser {
            username: payload.username,
            email: payload.email,
            password: payload.password,
            role: Role::Admin,
            department: None,
            employee_id: None,
            designation: None,
        })
        .await?;

    info!("Admin account {} created", user.username);

    Ok(respond(
        StatusCode::CREATED,
        "Admin registered successfully",
        user,
    ))
}

/// Exchange credentials for an identity token, also set as the `jwt` cookie
async fn login(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> ApiResult<Response> {
    info!("Login attempt for user: {}", payload.username_or_email);

    let user = state
        .user_repository
        .find_by_username_or_email(payload.username_or_email.trim())
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    if !state
        .user_repository
        .verify_password(&user, &payload.password)?
    {
        return Err(ApiError::InvalidCredentials);
    }

    let token = state
        .jwt_service
        .generate_token(user.id, user.role.as_str())?;

    let cookie = format!(
        "{}={}; HttpOnly; Path=/; Max-Age={}; SameSite=Lax",
        TOKEN_COOKIE,
        token,
        state.jwt_service.expiry()
    );

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(json!({
            "success": true,
            "message": "Login successful",
            "data": LoginResponse { token, user },
        })),
    )
        .into_response())
}

/// Admin or subadmin creates an account
async fn create_user(
    State(state): State<AppState>,
    context: AuthContext,
    WithRejection(Json(payload), _): WithRejection<Json<CreateUserRequest>, ApiError>,
) -> ApiResult<Response> {
    let role = payload.role.unwrap_or(Role::User);

    match role {
        Role::Admin => {
            return Err(ApiError::validation(
                "Admin accounts can only be created through admin signup",
            ));
        }
        Role::Subadmin if context.role != Role::Admin => return Err(ApiError::Forbidden),
        _ => {}
    }

    validate_account(&payload.username, &payload.email, &payload.password)?;

    let user = state
        .user_repository
        .create(&NewUser {
            username: payload.username,
            email: payload.email,
            password: payload.password,
            role,
            department: payload.department,
            employee_id: payload.employee_id,
            designation: payload.designation,
        })
        .await?;

    info!(
        "User {} ({}) created by {}",
        user.username, user.role, context.username
    );

    Ok(respond(StatusCode::CREATED, "User created successfully", user))
}

async fn list_users(State(state): State<AppState>) -> ApiResult<Response> {
    let users = state.user_repository.get_all().await?;
    Ok(respond(StatusCode::OK, "Users retrieved successfully", users))
}

async fn request_permission(
    State(state): State<AppState>,
    context: AuthContext,
    WithRejection(Json(payload), _): WithRejection<Json<RequestPermissionBody>, ApiError>,
) -> ApiResult<Response> {
    let request = permissions::request_permission(&state, context.id, payload).await?;

    Ok(respond(
        StatusCode::CREATED,
        "Permission request submitted successfully",
        request,
    ))
}

async fn review_permission(
    State(state): State<AppState>,
    context: AuthContext,
    WithRejection(Json(payload), _): WithRejection<Json<ReviewPermissionBody>, ApiError>,
) -> ApiResult<Response> {
    let request = permissions::review_permission_request(
        &state,
        &context,
        payload.request_id,
        &payload.status,
    )
    .await?;

    Ok(respond(
        StatusCode::OK,
        format!("Permission request {} successfully", request.status),
        request,
    ))
}

/// Notifications addressed to the caller
async fn my_notifications(
    State(state): State<AppState>,
    context: AuthContext,
) -> ApiResult<Response> {
    let notifications = state
        .notification_repository
        .list_for_user(context.id)
        .await?;

    Ok(respond(
        StatusCode::OK,
        "Notifications retrieved successfully",
        notifications,
    ))
}
