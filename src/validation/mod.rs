//! Validation Module
//!
//! Request-level checks applied before any ceremony state is touched.
//!
//! - [`username`] - Username rules and display name derivation

pub mod username;

pub use username::{display_name_for, validate_username, MAX_USERNAME_LENGTH};
