#![deny(clippy::all)]
#![warn(missing_docs)]

//! # `storefront-gateway`
//!
//! Async access layer for the storefront API gateway.
//!
//! Every call goes through the same pipeline:
//!
//! 1. the URL is composed from the service base, path, and query parameters;
//! 2. the URL is checked against the host allow-list (rejections are never sent);
//! 3. the request is sent with the transport's cookie store, so the session
//!    cookie travels without this crate ever reading it;
//! 4. failures are classified into [`GatewayError`];
//! 5. a 401 triggers one session refresh and, if it succeeds, one replay.
//!
//! ## Quick Start
//!
//! ```no_run
//! use storefront_gateway::{Client, GatewayConfig, RequestDescriptor};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::with_config(GatewayConfig::from_base("https://api.shop.example"));
//!
//! let req = RequestDescriptor::get("/products")
//!     .param("category", "lamps")
//!     .param_opt("page", None::<u32>);
//! let _products = client.send(&req).await?;
//! # Ok(())
//! # }
//! ```

/// HTTP client implementation
pub mod client;
/// Configuration types for the client
pub mod config;
/// Error types and response classification
pub mod error;
mod refresh;
/// Replayable request descriptors
pub mod request;
/// API resource implementations
pub mod resources;
/// Host allow-listing
pub mod security;
/// Session identity cache
pub mod session;
/// Test support utilities (for use in tests)
#[doc(hidden)]
pub mod test_support;
/// URL composition
pub mod url_builder;

pub use crate::client::Client;
pub use crate::config::{GatewayConfig, GatewaySettings};
pub use crate::error::{ApiErrorObject, ClassifiedError, ErrorCategory, GatewayError, NetworkFailure};
pub use crate::request::{MultipartForm, RequestBody, RequestDescriptor};
pub use crate::security::{AllowList, AllowedOrigin, HostPolicy};
pub use crate::session::{Identity, InMemorySessionStore, SessionStore};
pub use crate::url_builder::QueryParams;
pub use tokio_util::sync::CancellationToken;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::resources::LoginRequest;
    pub use crate::{
        CancellationToken, Client, GatewayConfig, GatewayError, QueryParams, RequestDescriptor,
    };
}
