//! User model and account payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::text_enum;

text_enum! {
    /// Coarse role used by the role gate
    Role as "role" {
        Admin => "admin",
        Subadmin => "subadmin",
        User => "user",
    }
}

text_enum! {
    /// Department a user works in
    Department as "department" {
        Sales => "sales",
        Production => "production",
        Accounts => "Accounts",
        ResearchAndDevelopment => "R&D",
    }
}

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    #[serde(rename = "userType")]
    pub role: Role,
    pub department: Option<Department>,
    pub employee_id: Option<String>,
    pub designation: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to insert a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub department: Option<Department>,
    pub employee_id: Option<String>,
    pub designation: Option<String>,
}

/// Request for the bootstrap admin account
#[derive(Debug, Clone, Deserialize)]
pub struct AdminSignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Request for an admin creating an account
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(rename = "userType")]
    pub role: Option<Role>,
    pub department: Option<Department>,
    pub employee_id: Option<String>,
    pub designation: Option<String>,
}

/// Request for user login
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(alias = "username", alias = "email")]
    pub username_or_email: String,
    pub password: String,
}

/// Response for user login
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}
