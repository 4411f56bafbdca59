// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative macros for reducing boilerplate.
//!
//! - [`simple_display!`] maps enum variants to string literals for `Display`
//! - [`status_from_str!`] maps the same literals back to variants for `FromStr`

/// Generate a `Display` impl that maps enum variants to string literals.
///
/// ```ignore
/// crate::simple_display! {
///     MyEnum {
///         Foo => "foo",
///         Bar => "bar",
///     }
/// }
/// ```
#[macro_export]
macro_rules! simple_display {
    ($enum:ty { $( $variant:ident => $str:expr ),+ $(,)? }) => {
        impl std::fmt::Display for $enum {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(match self {
                    $( Self::$variant => $str, )+
                })
            }
        }

        impl $enum {
            /// Stable string form used in the store's status columns.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $str, )+
                }
            }
        }
    };
}

/// Generate a `FromStr` impl that maps the same literals back to variants.
///
/// Unknown strings produce an error carrying the offending input, so a bad
/// status column surfaces with context instead of a silent default.
#[macro_export]
macro_rules! status_from_str {
    ($enum:ident { $( $str:expr => $variant:ident ),+ $(,)? }) => {
        impl std::str::FromStr for $enum {
            type Err = $crate::macros::UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $str => Ok(Self::$variant), )+
                    other => Err($crate::macros::UnknownVariant {
                        type_name: stringify!($enum),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// Error for [`status_from_str!`] parse failures.
#[derive(Debug, thiserror::Error)]
#[error("unknown {type_name} value: {value:?}")]
pub struct UnknownVariant {
    pub type_name: &'static str,
    pub value: String,
}
