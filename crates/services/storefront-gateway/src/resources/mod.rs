//! API resource implementations for the gateway client

/// Session lifecycle endpoints on the auth service
pub mod auth;

pub use auth::{Auth, LoginRequest};
