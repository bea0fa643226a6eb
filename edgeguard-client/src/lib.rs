//! # edgeguard-client
//!
//! Shared API client core of the `EdgeGuard` Terraform provider: every
//! resource and data source talks to the remote API through one [`ApiClient`].
//!
//! ## What it does
//!
//! | Concern | Type | Behavior |
//! |---------|------|----------|
//! | OAuth2 tokens | [`TokenCache`] | client-credentials grant against `{ids}/connect/token`, cached until expiry, single-flight refresh |
//! | Requests | [`RequestBuilder`] | URL resolution, JSON or raw body, exactly one of `Bearer` / `TOK:` auth |
//! | Transport | [`Transport`] | bounded exponential backoff for transport failures; 4xx/5xx pass through |
//! | Responses | [`interpret`] | status check, body shape classification, literal fallback |
//!
//! ## Feature Flags
//!
//! - **`native-tls`** *(default)*: Use the platform's native TLS implementation.
//! - **`rustls`**: Use rustls. Recommended for cross-compilation.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use edgeguard_client::{ApiClient, AuthMode, ClientConfig, Json, LiteralResponse};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Zone {
//!     id: String,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 1. Read URLs and credentials from EDGEGUARD_* variables
//!     let client = ApiClient::new(ClientConfig::from_env()?)?;
//!
//!     // 2. Structured response, bearer auth
//!     let zones: Option<Vec<Zone>> = client.get("zones", AuthMode::Bearer).await?;
//!     for zone in zones.unwrap_or_default() {
//!         println!("{} ({})", zone.name, zone.id);
//!     }
//!
//!     // 3. Endpoint answering with a bare value
//!     let status: Option<LiteralResponse> = client.get("status", AuthMode::StaticToken).await?;
//!     if let Some(status) = status {
//!         println!("status: {}", status.value);
//!     }
//!
//!     // 4. Single object
//!     let zone: Option<Json<Zone>> = client.get("zones/42", AuthMode::Bearer).await?;
//!     if let Some(Json(zone)) = zone {
//!         println!("{}", zone.name);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, ClientError>`](ClientError):
//!
//! - [`ClientError::Api`]: the API answered 4xx/5xx; the body is kept verbatim
//! - [`ClientError::Transport`]: no response within the retry policy
//! - [`ClientError::TokenAcquisition`]: the identity service did not issue a token
//! - [`ClientError::MissingCredentials`] / [`ClientError::MissingToken`]: configuration gaps
//!
//! Only transport failures are retried. See [`RetryPolicy`].

mod client;
mod config;
mod credentials;
mod error;
mod request;
mod response;
mod token;
mod transport;
mod utils;

// Re-export error types
pub use error::{ClientError, Result};

// Re-export configuration
pub use config::{
    ClientConfig, ClientConfigBuilder, DEFAULT_API_URL, DEFAULT_IDS_URL, DEFAULT_LEGACY_API_URL,
    env,
};
pub use credentials::ClientCredentials;

// Re-export the pipeline
pub use client::{ApiBase, ApiClient};
pub use request::{
    AuthMode, DEFAULT_USER_AGENT, OutboundRequest, RequestBody, RequestBuilder, resolve_url,
};
pub use response::{
    BodyShape, Json, LiteralResponse, ResponseEnvelope, ResponseTarget, classify, ensure_success,
    interpret, interpret_into,
};
pub use token::{
    AccessToken, Clock, ManualClock, SystemClock, TOKEN_ENDPOINT_PATH, TokenCache, TokenProvider,
};
pub use transport::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, GATEWAY_STATUSES, RetryPolicy, Transport,
    create_http_client,
};

// Re-export utils module
pub use utils::log_sanitizer;
