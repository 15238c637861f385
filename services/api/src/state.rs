//! Application state shared across handlers

use common::jwt::JwtService;
use sqlx::PgPool;

use crate::{
    notifications::NotificationService,
    registry::ConnectionRegistry,
    repositories::{
        NotificationRepository, OrderRepository, PermissionRepository,
        PermissionRequestRepository, TaskRepository, UserRepository,
    },
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub jwt_service: JwtService,
    pub user_repository: UserRepository,
    pub permission_repository: PermissionRepository,
    pub permission_request_repository: PermissionRequestRepository,
    pub order_repository: OrderRepository,
    pub task_repository: TaskRepository,
    pub notification_repository: NotificationRepository,
    pub registry: ConnectionRegistry,
    pub notifications: NotificationService,
}

impl AppState {
    /// Wire repositories and services around one pool and a fresh registry
    pub fn new(pool: PgPool, jwt_service: JwtService) -> Self {
        let registry = ConnectionRegistry::new();

        Self {
            jwt_service,
            user_repository: UserRepository::new(pool.clone()),
            permission_repository: PermissionRepository::new(pool.clone()),
            permission_request_repository: PermissionRequestRepository::new(pool.clone()),
            order_repository: OrderRepository::new(pool.clone()),
            task_repository: TaskRepository::new(pool.clone()),
            notification_repository: NotificationRepository::new(pool.clone()),
            notifications: NotificationService::new(pool.clone(), registry.clone()),
            registry,
            db_pool: pool,
        }
    }
}
