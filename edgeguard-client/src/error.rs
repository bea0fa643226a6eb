use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for every operation of the API client core.
///
/// Variants carry string details rather than source errors so the whole enum
/// stays `Clone` and serializable for structured error reporting.
///
/// # Upstream diagnostics
///
/// [`Api`](Self::Api) keeps the upstream response body verbatim, and
/// [`TokenAcquisition`](Self::TokenAcquisition) embeds the identity service's
/// reply in its detail. The text an operator needs is always part of
/// `Display`.
///
/// # Retries
///
/// Only [`Transport`](Self::Transport) is produced after automatic retries;
/// every other variant is returned on first occurrence.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "code")]
pub enum ClientError {
    /// A required OAuth2 client-credentials field is empty.
    #[error("Missing IDS credentials: '{field}' must not be empty")]
    MissingCredentials {
        /// Name of the empty field.
        field: String,
    },

    /// Static token authentication was requested without an API token.
    #[error("Missing API token: static token authentication requires a non-empty token")]
    MissingToken,

    /// The identity service could not issue a token.
    #[error("Token acquisition failed: {detail}")]
    TokenAcquisition {
        /// Underlying cause, including the identity service's response body when there was one.
        detail: String,
    },

    /// The request could not be delivered.
    ///
    /// Produced when all attempts of the retry policy failed, or when the
    /// request could not be sent at all.
    #[error("Transport error after {attempts} attempt(s): {detail}")]
    Transport {
        /// Error details of the last attempt.
        detail: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// The upstream API answered with a 4xx/5xx status.
    #[error("API error (HTTP {status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body, untouched.
        body: String,
    },

    /// The response body matched none of the recognized shapes for the requested target.
    #[error("Decode error: {detail}")]
    Decode {
        /// Why decoding failed.
        detail: String,
        /// Raw response body.
        body: String,
    },

    /// A request body could not be serialized.
    #[error("Serialization error: {detail}")]
    Serialization {
        /// Error details.
        detail: String,
    },

    /// A URL could not be parsed or resolved.
    #[error("Invalid URL '{url}': {detail}")]
    InvalidUrl {
        /// The offending URL or path.
        url: String,
        /// Parser message.
        detail: String,
    },

    /// The client configuration is invalid.
    #[error("Invalid configuration '{field}': {detail}")]
    InvalidConfig {
        /// Configuration field name.
        field: String,
        /// What is wrong with it.
        detail: String,
    },
}

impl ClientError {
    /// Whether the error is caused by caller input or upstream business rules, used for log levels.
    ///
    /// `true` should be logged at `warn`, `false` at `error`.
    /// **Keep in sync when adding variants.**
    #[must_use]
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::MissingCredentials { .. }
                | Self::MissingToken
                | Self::Api { .. }
                | Self::InvalidUrl { .. }
                | Self::InvalidConfig { .. }
        )
    }

    /// HTTP status of an [`Api`](Self::Api) error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn transport(detail: impl ToString, attempts: u32) -> Self {
        Self::Transport {
            detail: detail.to_string(),
            attempts,
        }
    }

    pub(crate) fn token_acquisition(detail: impl ToString) -> Self {
        Self::TokenAcquisition {
            detail: detail.to_string(),
        }
    }

    pub(crate) fn invalid_config(field: &str, detail: impl ToString) -> Self {
        Self::InvalidConfig {
            field: field.to_string(),
            detail: detail.to_string(),
        }
    }
}

/// Convenience type alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;
