//! Fixtures for tests that run against a live PostgreSQL instance

use chrono::Utc;
use common::jwt::{JwtConfig, JwtService};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::{
    models::{
        order::{NewOrder, Order, Party, Product},
        permission::{Action, Resource},
        user::{NewUser, Role, User},
    },
    repositories::PermissionRepository,
    state::AppState,
};

/// State backed by `DATABASE_URL`, with migrations applied
pub async fn database_state() -> AppState {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("failed to connect to DATABASE_URL");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    AppState::new(
        pool,
        JwtService::new(&JwtConfig {
            secret: "integration-secret".to_string(),
            expiry: 3600,
        }),
    )
}

/// Insert a user with a unique name
pub async fn create_user(state: &AppState, role: Role) -> User {
    let tag = Uuid::new_v4().simple().to_string()[..12].to_string();

    state
        .user_repository
        .create(&NewUser {
            username: format!("{}_{}", role, tag),
            email: format!("{}@example.com", tag),
            password: "warehouse42".to_string(),
            role,
            department: None,
            employee_id: None,
            designation: None,
        })
        .await
        .unwrap()
}

pub async fn grant(state: &AppState, user_id: Uuid, resource: Resource, action: Action) {
    PermissionRepository::grant(&state.db_pool, user_id, resource, action)
        .await
        .unwrap();
}

pub fn bearer(state: &AppState, user: &User) -> String {
    let token = state
        .jwt_service
        .generate_token(user.id, user.role.as_str())
        .unwrap();
    format!("Bearer {}", token)
}

/// Insert an order generated by `user`
pub async fn create_order(state: &AppState, user: &User) -> Order {
    state
        .order_repository
        .create(&order_fixture(user, format!("T-{}", Uuid::new_v4().simple())))
        .await
        .unwrap()
}

/// Order generated by `user` under `order_number`
pub fn order_fixture(user: &User, order_number: String) -> NewOrder {
    NewOrder {
        order_number,
        order_date: Utc::now(),
        invoice_number: None,
        client_name: "Hydro Works".to_string(),
        company_name: None,
        gst_number: None,
        contact: None,
        address: None,
        zip_code: None,
        products: vec![Product {
            name: "Flow meter".to_string(),
            quantity: 1.0,
            price: Some(1500.0),
            remark: None,
        }],
        estimated_dispatch_date: None,
        generated_by: Party {
            user_id: Some(user.id),
            username: Some(user.username.clone()),
            employee_id: None,
        },
        order_through: Party::default(),
    }
}
