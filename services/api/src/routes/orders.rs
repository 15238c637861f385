//! Purchase order routes (`/order/api`)

use std::collections::HashSet;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Response,
    routing::{delete, get, post, put},
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::{ALL_ROLES, respond};
use crate::{
    error::{ApiError, ApiResult},
    middleware::{
        AuthContext, PermissionGate, RoleGate, authenticate, require_permission, restrict_to,
    },
    models::{
        order::{
            CreateOrderRequest, NewOrder, Order, OrderIdsRequest, OrderListQuery, OrderListResponse,
            OrderSearchQuery, PageQuery, Pagination, Party, UpdateOrderRequest, page_offset,
        },
        permission::{Action, Resource},
    },
    notifications::{DomainEvent, OrderChange},
    state::AppState,
    validation::validate_products,
};

const PAGE_SIZE: i64 = 10;
const ORDER_NUMBER_ATTEMPTS: u32 = 2;
const ORDER_NUMBER_CONSTRAINT: &str = "orders_order_number_key";

pub fn router(state: &AppState) -> Router<AppState> {
    let creating = Router::new()
        .route("/order-create-api", post(create_order))
        .route_layer(from_fn_with_state(
            PermissionGate::new(state, Resource::Orders, Action::Create),
            require_permission,
        ));

    let updating = Router::new()
        .route("/update-order/:id", put(update_order))
        .route("/restore-order/:id", post(restore_order))
        .route("/restore-orders", post(restore_orders))
        .route_layer(from_fn_with_state(
            PermissionGate::new(state, Resource::Orders, Action::Update),
            require_permission,
        ));

    let purging = Router::new()
        .route("/delete-permanently/:id", delete(purge_order))
        .route("/delete-permanently", delete(purge_orders))
        .route_layer(from_fn_with_state(
            PermissionGate::new(state, Resource::Orders, Action::Delete),
            require_permission,
        ));

    let deleting = Router::new()
        .route("/delete-order/:id", delete(delete_order))
        .route_layer(from_fn_with_state(
            PermissionGate::new(state, Resource::Orders, Action::Delete),
            require_permission,
        ))
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    let listing = Router::new()
        .route("/get-all-orders", get(list_orders))
        .route_layer(from_fn_with_state(RoleGate::new(ALL_ROLES), restrict_to))
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    let identified = Router::new()
        .route("/get-order-details/:id", get(order_details))
        .route("/search-order", get(search_orders))
        .route("/recycle-bin", get(recycle_bin))
        .route("/get-order-login-user", get(my_orders))
        .route("/po-counts", get(order_counts))
        .route("/get-last-po-number", get(last_order_number))
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    creating
        .merge(updating)
        .merge(purging)
        .merge(deleting)
        .merge(listing)
        .merge(identified)
}

/// Validate a create body and fill in the server-side fields
fn new_order(
    payload: CreateOrderRequest,
    order_number: String,
    context: &AuthContext,
) -> ApiResult<NewOrder> {
    let (Some(order_date), Some(generated_by)) = (payload.order_date, payload.generated_by) else {
        return Err(ApiError::validation("Missing or invalid required fields"));
    };
    if payload.client_name.trim().is_empty() {
        return Err(ApiError::validation("Missing or invalid required fields"));
    }
    validate_products(&payload.products).map_err(ApiError::Validation)?;

    Ok(NewOrder {
        order_number,
        order_date,
        invoice_number: payload.invoice_number,
        client_name: payload.client_name,
        company_name: payload.company_name,
        gst_number: payload.gst_number,
        contact: payload.contact,
        address: payload.address,
        zip_code: payload.zip_code,
        products: payload.products,
        estimated_dispatch_date: payload.estimated_dispatch_date,
        generated_by: Party {
            user_id: Some(context.id),
            ..generated_by
        },
        order_through: Party {
            user_id: None,
            ..payload.order_through.unwrap_or_default()
        },
    })
}

/// Deduplicated, non-empty id list of a batch body
fn batch_ids(payload: &OrderIdsRequest) -> ApiResult<Vec<Uuid>> {
    let mut seen = HashSet::new();
    let ids: Vec<Uuid> = payload
        .ids
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect();

    if ids.is_empty() {
        return Err(ApiError::validation("No order ID(s) provided"));
    }
    Ok(ids)
}

async fn create_order(
    State(state): State<AppState>,
    context: AuthContext,
    WithRejection(Json(payload), _): WithRejection<Json<CreateOrderRequest>, ApiError>,
) -> ApiResult<Response> {
    let requested = payload
        .order_number
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    let order = match requested {
        Some(number) => {
            let new_order = new_order(payload, number, &context)?;
            state.order_repository.create(&new_order).await?
        }
        None => {
            let mut new_order = new_order(payload, String::new(), &context)?;
            insert_with_generated_number(&state, &mut new_order).await?
        }
    };

    state
        .notifications
        .publish(
            context.id,
            DomainEvent::Order {
                order_id: order.id,
                change: OrderChange::Created,
            },
        )
        .await?;

    Ok(respond(StatusCode::CREATED, "Order created successfully", order))
}

/// Insert under a generated number, generating again once if a concurrent
/// create claimed the same number first
async fn insert_with_generated_number(state: &AppState, order: &mut NewOrder) -> ApiResult<Order> {
    let mut attempt = 1;
    loop {
        order.order_number = state
            .order_repository
            .next_order_number(Utc::now())
            .await?
            .ok_or_else(|| {
                ApiError::Conflict(
                    "No order numbers left for this month, please supply an order number"
                        .to_string(),
                )
            })?;

        match state.order_repository.create(order).await {
            Err(err)
                if attempt < ORDER_NUMBER_ATTEMPTS
                    && err.constraint() == Some(ORDER_NUMBER_CONSTRAINT) =>
            {
                warn!(
                    "Generated order number {} was taken concurrently, retrying",
                    order.order_number
                );
                attempt += 1;
            }
            result => return Ok(result?),
        }
    }
}

async fn order_details(
    State(state): State<AppState>,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, ApiError>,
) -> ApiResult<Response> {
    let order = state
        .order_repository
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    Ok(respond(
        StatusCode::OK,
        "Order details retrieved successfully",
        order,
    ))
}

async fn list_orders(
    State(state): State<AppState>,
    WithRejection(Query(query), _): WithRejection<Query<OrderListQuery>, ApiError>,
) -> ApiResult<Response> {
    let page = query.page.unwrap_or(1);
    if page < 1 {
        return Err(ApiError::validation(
            "Page number must be a positive integer",
        ));
    }

    let total = state.order_repository.count_active(query.status).await?;
    let pagination = Pagination::new(page, total, PAGE_SIZE);

    if page > pagination.total_pages && total > 0 {
        return Err(ApiError::validation(format!(
            "Page {} exceeds total pages ({})",
            page, pagination.total_pages
        )));
    }

    let offset = pagination.offset().ok_or_else(page_too_large)?;
    let orders = state
        .order_repository
        .list_active(query.status, pagination.limit, offset)
        .await?;

    Ok(respond(
        StatusCode::OK,
        "Orders retrieved successfully",
        OrderListResponse { orders, pagination },
    ))
}

async fn search_orders(
    State(state): State<AppState>,
    WithRejection(Query(query), _): WithRejection<Query<OrderSearchQuery>, ApiError>,
) -> ApiResult<Response> {
    let orders = state.order_repository.search(&query).await?;
    Ok(respond(StatusCode::OK, "Orders retrieved successfully", orders))
}

async fn update_order(
    State(state): State<AppState>,
    context: AuthContext,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(payload), _): WithRejection<Json<UpdateOrderRequest>, ApiError>,
) -> ApiResult<Response> {
    validate_products(&payload.products).map_err(ApiError::Validation)?;

    let order = state
        .order_repository
        .update(id, &payload)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    state
        .notifications
        .publish(
            context.id,
            DomainEvent::Order {
                order_id: order.id,
                change: OrderChange::Updated,
            },
        )
        .await?;

    Ok(respond(StatusCode::OK, "Order updated successfully", order))
}

/// Soft delete: the order moves to the recycle bin with status `rejected`
async fn delete_order(
    State(state): State<AppState>,
    context: AuthContext,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, ApiError>,
) -> ApiResult<Response> {
    let Some(order) = state.order_repository.soft_delete(id).await? else {
        return match state.order_repository.find_by_id(id).await? {
            Some(_) => Err(ApiError::validation("Order is already in the Recycle Bin")),
            None => Err(ApiError::not_found("Order not found")),
        };
    };

    info!("Order {} moved to recycle bin by {}", order.order_number, context.username);

    state
        .notifications
        .publish(
            context.id,
            DomainEvent::Order {
                order_id: order.id,
                change: OrderChange::Deleted,
            },
        )
        .await?;

    Ok(respond(
        StatusCode::OK,
        "Order moved to Recycle Bin successfully",
        order,
    ))
}

async fn restore_order(
    State(state): State<AppState>,
    context: AuthContext,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, ApiError>,
) -> ApiResult<Response> {
    let order = state
        .order_repository
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    if !order.is_deleted {
        return Err(ApiError::validation("Order is not in Recycle Bin"));
    }

    let restored = state.order_repository.restore(&[id]).await?;

    for order in &restored {
        state
            .notifications
            .publish(
                context.id,
                DomainEvent::Order {
                    order_id: order.id,
                    change: OrderChange::Restored,
                },
            )
            .await?;
    }

    Ok(respond(
        StatusCode::OK,
        "Order restored successfully",
        restored,
    ))
}

async fn restore_orders(
    State(state): State<AppState>,
    context: AuthContext,
    WithRejection(Json(payload), _): WithRejection<Json<OrderIdsRequest>, ApiError>,
) -> ApiResult<Response> {
    let ids = batch_ids(&payload)?;

    if state.order_repository.count_in_bin(&ids).await? != ids.len() as i64 {
        return Err(ApiError::not_found(
            "One or more orders not found or not in Recycle Bin",
        ));
    }

    let restored = state.order_repository.restore(&ids).await?;

    for order in &restored {
        state
            .notifications
            .publish(
                context.id,
                DomainEvent::Order {
                    order_id: order.id,
                    change: OrderChange::Restored,
                },
            )
            .await?;
    }

    Ok(respond(
        StatusCode::OK,
        format!("{} order(s) restored successfully", restored.len()),
        restored,
    ))
}

async fn recycle_bin(State(state): State<AppState>) -> ApiResult<Response> {
    let orders = state.order_repository.recycle_bin().await?;
    let message = if orders.is_empty() {
        "No orders found in Recycle Bin"
    } else {
        "Recycle Bin orders retrieved successfully"
    };
    Ok(respond(StatusCode::OK, message, orders))
}

async fn purge_order(
    State(state): State<AppState>,
    context: AuthContext,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, ApiError>,
) -> ApiResult<Response> {
    let order = state
        .order_repository
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    if !order.is_deleted {
        return Err(ApiError::not_found("Order is not in the recycle bin"));
    }

    state.order_repository.purge(&[id]).await?;
    info!("Order {} permanently deleted by {}", order.order_number, context.username);

    Ok(respond(
        StatusCode::OK,
        "Order permanently deleted successfully",
        json!({ "id": id }),
    ))
}

async fn purge_orders(
    State(state): State<AppState>,
    context: AuthContext,
    WithRejection(Json(payload), _): WithRejection<Json<OrderIdsRequest>, ApiError>,
) -> ApiResult<Response> {
    let ids = batch_ids(&payload)?;

    let deleted = state.order_repository.purge(&ids).await?;
    if deleted == 0 {
        return Err(ApiError::not_found("No orders found in the recycle bin"));
    }

    info!("{} order(s) permanently deleted by {}", deleted, context.username);

    Ok(respond(
        StatusCode::OK,
        format!("{} order(s) permanently deleted successfully", deleted),
        json!({ "deletedCount": deleted }),
    ))
}

fn page_too_large() -> ApiError {
    ApiError::validation("Page number is too large")
}

/// Orders generated by the caller
async fn my_orders(
    State(state): State<AppState>,
    context: AuthContext,
    WithRejection(Query(query), _): WithRejection<Query<PageQuery>, ApiError>,
) -> ApiResult<Response> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(PAGE_SIZE).clamp(1, 100);

    let offset = page_offset(page, limit).ok_or_else(page_too_large)?;
    let (orders, total) = state
        .order_repository
        .list_generated_by(context.id, limit, offset)
        .await?;

    let message = if orders.is_empty() {
        "No orders found for this user"
    } else {
        "Orders retrieved successfully"
    };

    Ok(respond(
        StatusCode::OK,
        message,
        OrderListResponse {
            orders,
            pagination: Pagination::new(page, total, limit),
        },
    ))
}

async fn order_counts(State(state): State<AppState>) -> ApiResult<Response> {
    let counts = state.order_repository.counts().await?;
    Ok(respond(StatusCode::OK, "PO counts retrieved successfully", counts))
}

async fn last_order_number(State(state): State<AppState>) -> ApiResult<Response> {
    let order_number = state
        .order_repository
        .last_order_number()
        .await?
        .ok_or_else(|| ApiError::not_found("No purchase orders found"))?;

    Ok(respond(
        StatusCode::OK,
        "Last PO number retrieved successfully",
        json!({ "lastPoNumber": order_number }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{order::Product, user::Role};

    fn context() -> AuthContext {
        AuthContext {
            id: Uuid::new_v4(),
            role: Role::User,
            username: "ravi".to_string(),
            permissions: Vec::new(),
        }
    }

    fn create_body() -> serde_json::Value {
        json!({
            "orderDate": "2025-06-14T10:00:00Z",
            "clientName": "Hydro Works",
            "products": [{ "name": "Flow meter", "quantity": 2, "price": 1500.0 }],
            "generatedBy": { "username": "ravi", "employeeId": "E-7", "userId": Uuid::new_v4() },
            "orderThrough": { "username": "desk", "employeeId": "E-1" },
        })
    }

    #[test]
    fn test_new_order_stamps_caller_as_generator() {
        let caller = context();
        let payload: CreateOrderRequest = serde_json::from_value(create_body()).unwrap();

        let order = new_order(payload, "01/QESPL/JUN/25".to_string(), &caller).unwrap();
        assert_eq!(order.generated_by.user_id, Some(caller.id));
        assert_eq!(order.generated_by.employee_id.as_deref(), Some("E-7"));
        assert_eq!(order.order_through.username.as_deref(), Some("desk"));
        assert_eq!(
            order.products,
            vec![Product {
                name: "Flow meter".to_string(),
                quantity: 2.0,
                price: Some(1500.0),
                remark: None,
            }]
        );
    }

    #[test]
    fn test_new_order_requires_date_generator_and_client() {
        for field in ["orderDate", "generatedBy", "clientName"] {
            let mut body = create_body();
            body.as_object_mut().unwrap().remove(field);
            let payload: CreateOrderRequest = serde_json::from_value(body).unwrap();

            let err = new_order(payload, "01/QESPL/JUN/25".to_string(), &context()).unwrap_err();
            assert_eq!(err.to_string(), "Missing or invalid required fields", "{}", field);
        }
    }

    #[test]
    fn test_new_order_rejects_empty_products() {
        let mut body = create_body();
        body["products"] = json!([]);
        let payload: CreateOrderRequest = serde_json::from_value(body).unwrap();

        assert!(matches!(
            new_order(payload, "X".to_string(), &context()),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn test_batch_ids_are_deduplicated() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let ids = batch_ids(&OrderIdsRequest { ids: vec![a, b, a] }).unwrap();
        assert_eq!(ids, vec![a, b]);

        assert!(batch_ids(&OrderIdsRequest { ids: vec![] }).is_err());
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL instance"]
    async fn test_huge_page_is_a_bad_request() {
        use crate::test_support::{bearer, create_user, database_state};
        use axum::body::Body;
        use http_body_util::BodyExt;
        use tower::ServiceExt;

        let state = database_state().await;
        let user = create_user(&state, Role::User).await;
        let app = crate::routes::create_router(state.clone());

        let request = axum::http::Request::builder()
            .method("GET")
            .uri(format!(
                "/order/api/get-order-login-user?page={}",
                i64::MAX
            ))
            .header("authorization", bearer(&state, &user))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], "Page number is too large");
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL instance"]
    async fn test_concurrent_creates_get_distinct_generated_numbers() {
        use crate::test_support::{bearer, create_user, database_state, grant};
        use axum::body::Body;
        use http_body_util::BodyExt;
        use tower::ServiceExt;

        let state = database_state().await;
        let user = create_user(&state, Role::User).await;
        grant(&state, user.id, Resource::Orders, Action::Create).await;
        let app = crate::routes::create_router(state.clone());

        let create = |app: axum::Router| {
            let request = axum::http::Request::builder()
                .method("POST")
                .uri("/order/api/order-create-api")
                .header("authorization", bearer(&state, &user))
                .header("content-type", "application/json")
                .body(Body::from(create_body().to_string()))
                .unwrap();
            async move {
                let response = app.oneshot(request).await.unwrap();
                let status = response.status();
                let bytes = response.into_body().collect().await.unwrap().to_bytes();
                let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
                (status, body)
            }
        };

        let ((first_status, first), (second_status, second)) =
            tokio::join!(create(app.clone()), create(app));

        assert_eq!(first_status, StatusCode::CREATED, "{}", first);
        assert_eq!(second_status, StatusCode::CREATED, "{}", second);
        assert_ne!(first["data"]["orderNumber"], second["data"]["orderNumber"]);
    }
}
