//! API models for request and response payloads
//!
//! Wire format is camelCase JSON. Enumerated columns are stored as TEXT and
//! mapped through [`text_enum!`] so that the database and the wire share one
//! spelling per variant.

use thiserror::Error;

pub mod notification;
pub mod order;
pub mod permission;
pub mod task;
pub mod user;

/// A TEXT column or request field held a value outside its enumeration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid {kind}: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl From<UnknownVariant> for sqlx::Error {
    fn from(err: UnknownVariant) -> Self {
        sqlx::Error::Decode(Box::new(err))
    }
}

/// Declares a string-backed enum with serde, `Display` and `FromStr`
/// implementations that agree on the spelling of every variant.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident as $kind:literal {
            $($variant:ident => $text:literal $(| $alias:literal)*),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text $(, alias = $alias)*)]
                $variant,
            )+
        }

        impl $name {
            /// Every variant, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Canonical spelling used on the wire and in the database
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::models::UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text $(| $alias)* => Ok($name::$variant),)+
                    other => Err($crate::models::UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

pub(crate) use text_enum;
