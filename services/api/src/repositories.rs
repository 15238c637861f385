//! Repositories for database operations
//!
//! Each repository owns a pool handle for standalone calls. Queries that must
//! also run inside a caller's transaction are associated functions taking any
//! [`sqlx::PgExecutor`], so the same SQL serves `&PgPool` and `&mut *tx`.

pub mod notification;
pub mod order;
pub mod permission;
pub mod task;
pub mod user;

pub use notification::NotificationRepository;
pub use order::OrderRepository;
pub use permission::{PermissionRepository, PermissionRequestRepository};
pub use task::TaskRepository;
pub use user::UserRepository;

use sqlx::{Row, postgres::PgRow};
use std::str::FromStr;

use crate::models::UnknownVariant;

/// Read a TEXT column into one of the model enums
fn get_enum<T>(row: &PgRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = UnknownVariant>,
{
    let raw: String = row.try_get(column)?;
    Ok(raw.parse::<T>()?)
}

/// Read a nullable TEXT column into one of the model enums
fn get_optional_enum<T>(row: &PgRow, column: &str) -> Result<Option<T>, sqlx::Error>
where
    T: FromStr<Err = UnknownVariant>,
{
    let raw: Option<String> = row.try_get(column)?;
    Ok(raw.map(|value| value.parse::<T>()).transpose()?)
}

/// Read a TEXT[] column into a list of model enums
fn get_enum_list<T>(row: &PgRow, column: &str) -> Result<Vec<T>, sqlx::Error>
where
    T: FromStr<Err = UnknownVariant>,
{
    let raw: Vec<String> = row.try_get(column)?;
    raw.iter()
        .map(|value| value.parse::<T>().map_err(sqlx::Error::from))
        .collect()
}
