//! Input validation utilities

use regex::Regex;
use std::sync::OnceLock;

use crate::models::{
    order::Product,
    permission::{Action, Resource},
};

/// Validate username
pub fn validate_username(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("Username is required".to_string());
    }

    if username.len() < 3 {
        return Err("Username must be at least 3 characters long".to_string());
    }

    if username.len() > 32 {
        return Err("Username must be at most 32 characters long".to_string());
    }

    static USERNAME_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = USERNAME_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9_.-]+$").expect("Failed to compile username regex")
    });

    if !regex.is_match(username) {
        return Err(
            "Username can only contain letters, numbers, dots, hyphens and underscores".to_string(),
        );
    }

    Ok(())
}

/// Validate email
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email must be at most 254 characters long".to_string());
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

/// Validate password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    if password.len() < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }

    if password.len() > 128 {
        return Err("Password must be at most 128 characters long".to_string());
    }

    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if !has_letter || !has_digit {
        return Err("Password must contain at least one letter and one digit".to_string());
    }

    Ok(())
}

/// Validate the product lines of an order
pub fn validate_products(products: &[Product]) -> Result<(), String> {
    if products.is_empty() {
        return Err("Products array is required and cannot be empty".to_string());
    }

    for product in products {
        if product.name.trim().is_empty() {
            return Err("Each product must have a valid name".to_string());
        }
        if !product.quantity.is_finite() || product.quantity < 0.0 {
            return Err("Each product must have a valid quantity (non-negative number)".to_string());
        }
        if product.price.is_some_and(|price| !price.is_finite() || price < 0.0) {
            return Err("Product price must be a non-negative number".to_string());
        }
    }

    Ok(())
}

/// Parse the `action` of a permission request, accepting `readonly` for `read`
pub fn parse_action(action: &str) -> Result<Action, String> {
    action.trim().parse::<Action>().map_err(|_| {
        format!(
            "Invalid action '{}'. Must be one of: {}.",
            action,
            Action::ALL
                .iter()
                .map(Action::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        )
    })
}

/// Parse the `resource` of a permission request
pub fn parse_resource(resource: &str) -> Result<Resource, String> {
    resource.trim().parse::<Resource>().map_err(|_| {
        format!(
            "Invalid resource '{}'. Must be one of: {}.",
            resource,
            Resource::ALL
                .iter()
                .map(Resource::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(name: &str, quantity: f64) -> Product {
        Product {
            name: name.to_string(),
            quantity,
            price: Some(10.0),
            remark: None,
        }
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("meera.k").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"a".repeat(33)).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ops@example.com").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("a@b").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("warehouse42").is_ok());
        assert!(validate_password("short1").is_err());
        assert!(validate_password("onlyletters").is_err());
        assert!(validate_password("1234567890").is_err());
    }

    #[test]
    fn test_validate_products() {
        assert!(validate_products(&[product("Flow meter", 2.0)]).is_ok());
        assert!(validate_products(&[product("Flow meter", 0.0)]).is_ok());
        assert_eq!(
            validate_products(&[]).unwrap_err(),
            "Products array is required and cannot be empty"
        );
        assert!(validate_products(&[product(" ", 1.0)]).is_err());
        assert!(validate_products(&[product("Valve", -1.0)]).is_err());
    }

    #[test]
    fn test_parse_action_accepts_alias() {
        assert_eq!(parse_action("readonly").unwrap(), Action::Read);
        assert_eq!(parse_action("create").unwrap(), Action::Create);

        let err = parse_action("approve").unwrap_err();
        assert!(err.starts_with("Invalid action 'approve'"));
        assert!(err.contains("create, read, update, delete, write"));
    }

    #[test]
    fn test_parse_resource() {
        assert_eq!(parse_resource("orders").unwrap(), Resource::Orders);
        assert!(parse_resource("invoices").is_err());
    }
}
