//! Client configuration
//!
//! Built with [`ClientConfig::builder`] or read from the provider's
//! environment variables with [`ClientConfig::from_env`].

use std::time::Duration;

use url::Url;

use crate::credentials::ClientCredentials;
use crate::error::{ClientError, Result};
use crate::transport::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, RetryPolicy};

/// Default base URL of the current API.
pub const DEFAULT_API_URL: &str = "https://api.edgeguard.io/v2/";
/// Default base URL of the legacy API.
pub const DEFAULT_LEGACY_API_URL: &str = "https://api.edgeguard.io/v1/";
/// Default identity service URL.
pub const DEFAULT_IDS_URL: &str = "https://ids.edgeguard.io/";

/// Environment variable names read by [`ClientConfig::from_env`].
pub mod env {
    pub const API_URL: &str = "EDGEGUARD_API_URL";
    pub const LEGACY_API_URL: &str = "EDGEGUARD_LEGACY_API_URL";
    pub const IDS_URL: &str = "EDGEGUARD_IDS_URL";
    pub const API_TOKEN: &str = "EDGEGUARD_API_TOKEN";
    pub const IDS_CLIENT_ID: &str = "EDGEGUARD_IDS_CLIENT_ID";
    pub const IDS_CLIENT_SECRET: &str = "EDGEGUARD_IDS_CLIENT_SECRET";
    pub const IDS_SCOPE: &str = "EDGEGUARD_IDS_SCOPE";
    pub const PARTNER_ID: &str = "EDGEGUARD_PARTNER_ID";
    pub const MAX_RETRIES: &str = "EDGEGUARD_MAX_RETRIES";
    pub const REQUEST_TIMEOUT: &str = "EDGEGUARD_REQUEST_TIMEOUT";
}

/// Validated client configuration.
///
/// Base URLs always end with `/`, so relative request paths resolve beneath them.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: Url,
    pub legacy_api_url: Url,
    pub ids_url: Url,
    pub credentials: ClientCredentials,
    pub partner_id: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub token_refresh_leeway: Duration,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Read the configuration from `EDGEGUARD_*` environment variables.
    ///
    /// Unset URLs fall back to the defaults; unset credentials stay empty and
    /// are only rejected when a request needs them.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut builder = Self::builder().credentials(ClientCredentials {
            api_token: get(env::API_TOKEN).unwrap_or_default(),
            ids_client_id: get(env::IDS_CLIENT_ID).unwrap_or_default(),
            ids_client_secret: get(env::IDS_CLIENT_SECRET).unwrap_or_default(),
            ids_scope: get(env::IDS_SCOPE).unwrap_or_default(),
        });

        if let Some(url) = get(env::API_URL) {
            builder = builder.api_url(url);
        }
        if let Some(url) = get(env::LEGACY_API_URL) {
            builder = builder.legacy_api_url(url);
        }
        if let Some(url) = get(env::IDS_URL) {
            builder = builder.ids_url(url);
        }
        if let Some(partner_id) = get(env::PARTNER_ID) {
            builder = builder.partner_id(partner_id);
        }
        if let Some(raw) = get(env::MAX_RETRIES) {
            builder = builder.max_retries(parse_number(env::MAX_RETRIES, &raw)?);
        }
        if let Some(raw) = get(env::REQUEST_TIMEOUT) {
            let secs = parse_number(env::REQUEST_TIMEOUT, &raw)?;
            builder = builder.request_timeout(Duration::from_secs(u64::from(secs)));
        }

        builder.build()
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    api_url: String,
    legacy_api_url: String,
    ids_url: String,
    credentials: ClientCredentials,
    partner_id: Option<String>,
    connect_timeout: Duration,
    request_timeout: Duration,
    retry: RetryPolicy,
    token_refresh_leeway: Duration,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            legacy_api_url: DEFAULT_LEGACY_API_URL.to_string(),
            ids_url: DEFAULT_IDS_URL.to_string(),
            credentials: ClientCredentials::default(),
            partner_id: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
            token_refresh_leeway: Duration::ZERO,
        }
    }
}

impl ClientConfigBuilder {
    #[must_use]
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    #[must_use]
    pub fn legacy_api_url(mut self, url: impl Into<String>) -> Self {
        self.legacy_api_url = url.into();
        self
    }

    #[must_use]
    pub fn ids_url(mut self, url: impl Into<String>) -> Self {
        self.ids_url = url.into();
        self
    }

    #[must_use]
    pub fn credentials(mut self, credentials: ClientCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    #[must_use]
    pub fn partner_id(mut self, partner_id: impl Into<String>) -> Self {
        self.partner_id = Some(partner_id.into());
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Replace the whole retry policy.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Set the maximum number of automatic retries for transport failures (default: 2).
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.retry.max_attempts = retries.saturating_add(1);
        self
    }

    /// Refresh access tokens this long before they expire (default: zero).
    #[must_use]
    pub fn token_refresh_leeway(mut self, leeway: Duration) -> Self {
        self.token_refresh_leeway = leeway;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    /// [`ClientError::InvalidConfig`] for an unparseable or non-HTTP(S) URL, or a zero timeout.
    pub fn build(self) -> Result<ClientConfig> {
        if self.connect_timeout.is_zero() {
            return Err(ClientError::invalid_config(
                "connect_timeout",
                "must be greater than zero",
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ClientError::invalid_config(
                "request_timeout",
                "must be greater than zero",
            ));
        }

        Ok(ClientConfig {
            api_url: parse_base_url("api_url", &self.api_url)?,
            legacy_api_url: parse_base_url("legacy_api_url", &self.legacy_api_url)?,
            ids_url: parse_base_url("ids_url", &self.ids_url)?,
            credentials: self.credentials,
            partner_id: self.partner_id,
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
            retry: self.retry,
            token_refresh_leeway: self.token_refresh_leeway,
        })
    }
}

/// Parse a base URL and make sure its path ends with `/`.
fn parse_base_url(field: &str, raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };

    let url = Url::parse(&normalized).map_err(|e| ClientError::invalid_config(field, e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::invalid_config(
            field,
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(ClientError::invalid_config(
            field,
            "base URL must not contain a query or fragment",
        ));
    }
    Ok(url)
}

fn parse_number(var: &str, raw: &str) -> Result<u32> {
    raw.trim()
        .parse()
        .map_err(|e| ClientError::invalid_config(var, format!("'{raw}' is not a number: {e}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = ClientConfig::builder().build().unwrap();
        assert_eq!(config.api_url.as_str(), DEFAULT_API_URL);
        assert_eq!(config.legacy_api_url.as_str(), DEFAULT_LEGACY_API_URL);
        assert_eq!(config.ids_url.as_str(), DEFAULT_IDS_URL);
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(config.partner_id.is_none());
    }

    #[test]
    fn base_urls_gain_trailing_slash() {
        let config = ClientConfig::builder()
            .api_url("https://api.example.test/v3")
            .build()
            .unwrap();
        assert_eq!(config.api_url.as_str(), "https://api.example.test/v3/");
        assert_eq!(
            config.api_url.join("zones").unwrap().as_str(),
            "https://api.example.test/v3/zones"
        );
    }

    #[test]
    fn rejects_unparseable_url() {
        let result = ClientConfig::builder().ids_url("not a url").build();
        assert!(
            matches!(&result, Err(ClientError::InvalidConfig { field, .. }) if field == "ids_url"),
            "unexpected result: {result:?}"
        );
    }

    #[test]
    fn rejects_non_http_scheme() {
        let result = ClientConfig::builder()
            .api_url("ftp://files.example.test/")
            .build();
        assert!(matches!(result, Err(ClientError::InvalidConfig { .. })));
    }

    #[test]
    fn rejects_base_url_with_query() {
        let result = ClientConfig::builder()
            .legacy_api_url("https://api.example.test/v1?x=1")
            .build();
        assert!(matches!(result, Err(ClientError::InvalidConfig { .. })));
    }

    #[test]
    fn rejects_zero_timeout() {
        let result = ClientConfig::builder()
            .request_timeout(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(ClientError::InvalidConfig { .. })));
    }

    #[test]
    fn max_retries_counts_extra_attempts() {
        let config = ClientConfig::builder().max_retries(4).build().unwrap();
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn from_lookup_reads_all_variables() {
        let config = ClientConfig::from_lookup(lookup(&[
            (env::API_URL, "https://api.example.test/v2"),
            (env::LEGACY_API_URL, "https://legacy.example.test/"),
            (env::IDS_URL, "https://ids.example.test"),
            (env::API_TOKEN, "static-abc"),
            (env::IDS_CLIENT_ID, "c1"),
            (env::IDS_CLIENT_SECRET, "s1"),
            (env::IDS_SCOPE, "api"),
            (env::PARTNER_ID, "partner-7"),
            (env::MAX_RETRIES, "0"),
            (env::REQUEST_TIMEOUT, "5"),
        ]))
        .unwrap();

        assert_eq!(config.api_url.as_str(), "https://api.example.test/v2/");
        assert_eq!(config.legacy_api_url.as_str(), "https://legacy.example.test/");
        assert_eq!(config.ids_url.as_str(), "https://ids.example.test/");
        assert_eq!(config.credentials.api_token, "static-abc");
        assert_eq!(config.credentials.ids_client_id, "c1");
        assert_eq!(config.credentials.ids_client_secret, "s1");
        assert_eq!(config.credentials.ids_scope, "api");
        assert_eq!(config.partner_id.as_deref(), Some("partner-7"));
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn from_lookup_treats_blank_as_unset() {
        let config = ClientConfig::from_lookup(lookup(&[(env::API_URL, "  ")])).unwrap();
        assert_eq!(config.api_url.as_str(), DEFAULT_API_URL);
    }

    #[test]
    fn from_lookup_rejects_bad_number() {
        let result = ClientConfig::from_lookup(lookup(&[(env::MAX_RETRIES, "many")]));
        assert!(
            matches!(&result, Err(ClientError::InvalidConfig { field, .. }) if field == env::MAX_RETRIES),
            "unexpected result: {result:?}"
        );
    }
}
