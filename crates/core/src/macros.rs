// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative macros for reducing boilerplate.
//!
//! - [`as_str_display!`] maps the unit variants of a status-like enum to
//!   stable string names, generating `as_str()` plus `Display`
//! - [`setters!`] generates chained setter methods for request/config
//!   structs built field by field

/// Generate `as_str()` and `Display` for a unit-variant enum.
///
/// Every status and phase enum in the plan model has a stable string name
/// (the same one its serde tag uses); `as_str()` hands it out without an
/// allocation, and `Display` delegates to it.
///
/// ```ignore
/// crate::as_str_display! {
///     NodeStatus {
///         Pending => "pending",
///         Ready => "ready",
///     }
/// }
/// ```
#[macro_export]
macro_rules! as_str_display {
    ($enum:ty { $( $variant:ident => $name:literal ),+ $(,)? }) => {
        impl $enum {
            /// Stable string name of the variant.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $name, )+
                }
            }
        }

        impl std::fmt::Display for $enum {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// Generate chained setter methods inside an `impl` block.
///
/// One line per field. A plain `field: Type` setter takes the value as-is;
/// an `opt field: Type` setter targets an `Option<Type>` field and wraps
/// `Some(value.into())`, so callers pass `&str` for `Option<String>` and
/// the like.
///
/// ```ignore
/// impl ProcessRequest {
///     trellis_core::setters! {
///         args: Vec<String>,
///         opt timeout: Duration,
///     }
/// }
/// ```
#[macro_export]
macro_rules! setters {
    () => {};
    ( opt $field:ident : $ty:ty $(, $($rest:tt)* )? ) => {
        pub fn $field(mut self, value: impl Into<$ty>) -> Self {
            self.$field = Some(value.into());
            self
        }
        $( $crate::setters! { $($rest)* } )?
    };
    ( $field:ident : $ty:ty $(, $($rest:tt)* )? ) => {
        pub fn $field(mut self, value: $ty) -> Self {
            self.$field = value;
            self
        }
        $( $crate::setters! { $($rest)* } )?
    };
}
