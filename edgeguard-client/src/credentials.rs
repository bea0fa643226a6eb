//! Credentials supplied when the client is constructed.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};
use crate::utils::log_sanitizer::mask_secret;

/// Authentication inputs for the API.
///
/// `api_token` is used for static token authentication (`Authorization: TOK:<token>`);
/// the IDS triple is used to obtain OAuth2 client-credentials tokens. Which one is
/// used is decided per request by [`AuthMode`](crate::AuthMode), never by which
/// fields happen to be populated.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCredentials {
    /// Long-lived API token.
    #[serde(default)]
    pub api_token: String,
    /// OAuth2 client id registered with the identity service.
    #[serde(default)]
    pub ids_client_id: String,
    /// OAuth2 client secret.
    #[serde(default)]
    pub ids_client_secret: String,
    /// Requested OAuth2 scope.
    #[serde(default)]
    pub ids_scope: String,
}

/// Validated view of the IDS client-credentials triple.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IdsCredentials<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub scope: &'a str,
}

impl ClientCredentials {
    /// Credentials carrying only a static API token.
    pub fn with_api_token(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            ..Self::default()
        }
    }

    /// Credentials carrying only the IDS client-credentials triple.
    pub fn with_client_credentials(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            ids_client_id: client_id.into(),
            ids_client_secret: client_secret.into(),
            ids_scope: scope.into(),
            ..Self::default()
        }
    }

    /// Construct credentials from flat provider configuration keys.
    ///
    /// Recognized keys: `apiToken`, `idsClientId`, `idsClientSecret`, `idsScope`.
    /// Missing keys become empty strings; validation happens when a request needs them.
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let get = |key: &str| map.get(key).cloned().unwrap_or_default();
        Self {
            api_token: get("apiToken"),
            ids_client_id: get("idsClientId"),
            ids_client_secret: get("idsClientSecret"),
            ids_scope: get("idsScope"),
        }
    }

    /// The static API token, or [`ClientError::MissingToken`] when it is empty.
    pub(crate) fn require_api_token(&self) -> Result<&str> {
        let token = self.api_token.trim();
        if token.is_empty() {
            return Err(ClientError::MissingToken);
        }
        Ok(token)
    }

    /// The IDS triple, or [`ClientError::MissingCredentials`] naming the first empty field.
    pub(crate) fn require_ids(&self) -> Result<IdsCredentials<'_>> {
        Ok(IdsCredentials {
            client_id: required_field("ids_client_id", &self.ids_client_id)?,
            client_secret: required_field("ids_client_secret", &self.ids_client_secret)?,
            scope: required_field("ids_scope", &self.ids_scope)?,
        })
    }
}

fn required_field<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ClientError::MissingCredentials {
            field: field.to_string(),
        });
    }
    Ok(value)
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("api_token", &mask_secret(&self.api_token))
            .field("ids_client_id", &self.ids_client_id)
            .field("ids_client_secret", &mask_secret(&self.ids_client_secret))
            .field("ids_scope", &self.ids_scope)
            .finish()
    }
}
