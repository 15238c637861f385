//! Common library for the opsdesk backend
//!
//! Shared pieces used by the API service: database connectivity, error types
//! and the identity-token service.
//!
//! ```rust,no_run
//! use common::database::{DatabaseConfig, health_check, init_pool};
//! use common::jwt::{JwtConfig, JwtService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = init_pool(&DatabaseConfig::from_env()?).await?;
//!     assert!(health_check(&pool).await?);
//!
//!     let tokens = JwtService::new(&JwtConfig::from_env()?);
//!     let token = tokens.generate_token(uuid::Uuid::new_v4(), "admin")?;
//!     println!("{}", tokens.validate_token(&token)?.user_type);
//!     Ok(())
//! }
//! ```

pub mod database;
pub mod error;
pub mod jwt;
