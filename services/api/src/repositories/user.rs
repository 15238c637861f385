//! User repository for database operations

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use common::error::{DatabaseError, DatabaseResult};
use sqlx::{PgExecutor, PgPool, Row, postgres::PgRow};
use tracing::info;
use uuid::Uuid;

use super::{get_enum, get_optional_enum};
use crate::models::user::{NewUser, Role, User};

const USER_COLUMNS: &str = "id, username, email, password_hash, role, department, \
                            employee_id, designation, created_at, updated_at";

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new user, hashing the plain-text password
    pub async fn create(&self, new_user: &NewUser) -> DatabaseResult<User> {
        info!("Creating new user: {}", new_user.username);

        let password_hash = hash_password(&new_user.password)?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, role, department, employee_id, designation)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&password_hash)
        .bind(new_user.role.as_str())
        .bind(new_user.department.map(|d| d.as_str()))
        .bind(&new_user.employee_id)
        .bind(&new_user.designation)
        .fetch_one(&self.pool)
        .await?;

        Ok(map_user(&row)?)
    }

    /// Find a user by ID
    pub async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>> {
        Self::fetch_by_id(&self.pool, id).await
    }

    /// Find a user by ID on any executor
    pub async fn fetch_by_id<'e, E>(executor: E, id: Uuid) -> DatabaseResult<Option<User>>
    where
        E: PgExecutor<'e>,
    {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(row.as_ref().map(map_user).transpose()?)
    }

    /// Find a user by username or email
    pub async fn find_by_username_or_email(
        &self,
        username_or_email: &str,
    ) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = $1"
        ))
        .bind(username_or_email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(map_user).transpose()?)
    }

    /// Get all users
    pub async fn get_all(&self) -> DatabaseResult<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(map_user).collect::<Result<_, _>>()?)
    }

    /// Number of users holding `role`
    pub async fn count_by_role(&self, role: Role) -> DatabaseResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = $1")
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Ids of every user, oldest account first
    pub async fn all_ids<'e, E>(executor: E) -> DatabaseResult<Vec<Uuid>>
    where
        E: PgExecutor<'e>,
    {
        let ids = sqlx::query_scalar("SELECT id FROM users ORDER BY created_at, id")
            .fetch_all(executor)
            .await?;
        Ok(ids)
    }

    /// Ids of every user holding `role`, oldest account first
    pub async fn ids_by_role<'e, E>(executor: E, role: Role) -> DatabaseResult<Vec<Uuid>>
    where
        E: PgExecutor<'e>,
    {
        let ids = sqlx::query_scalar("SELECT id FROM users WHERE role = $1 ORDER BY created_at, id")
            .bind(role.as_str())
            .fetch_all(executor)
            .await?;
        Ok(ids)
    }

    /// Subset of `ids` that reference existing users
    pub async fn existing_ids<'e, E>(executor: E, ids: &[Uuid]) -> DatabaseResult<Vec<Uuid>>
    where
        E: PgExecutor<'e>,
    {
        let found = sqlx::query_scalar("SELECT id FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(executor)
            .await?;
        Ok(found)
    }

    /// Verify a user's password
    pub fn verify_password(&self, user: &User, password: &str) -> DatabaseResult<bool> {
        let parsed_hash = PasswordHash::new(&user.password_hash).map_err(|e| {
            DatabaseError::Configuration(format!("Failed to parse password hash: {}", e))
        })?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }
}

fn hash_password(password: &str) -> DatabaseResult<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DatabaseError::Configuration(format!("Failed to hash password: {}", e)))
}

fn map_user(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: get_enum(row, "role")?,
        department: get_optional_enum(row, "department")?,
        employee_id: row.try_get("employee_id")?,
        designation: row.try_get("designation")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashed_password_verifies() {
        let hash = hash_password("S3cure!pass").unwrap();
        let parsed = PasswordHash::new(&hash).unwrap();

        assert!(
            Argon2::default()
                .verify_password(b"S3cure!pass", &parsed)
                .is_ok()
        );
        assert!(Argon2::default().verify_password(b"wrong", &parsed).is_err());
    }
}
