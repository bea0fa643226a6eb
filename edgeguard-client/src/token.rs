//! OAuth2 client-credentials token cache
//!
//! Holds at most one access token per client instance and refreshes it from
//! the identity service (IDS) when it has expired:
//! - reuse without network traffic while `now < expires_at`
//! - refreshes are serialized, concurrent callers share a single refresh
//! - a failed or cancelled refresh leaves the slot as it was

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use tokio::sync::Mutex;
use url::Url;

use crate::credentials::{ClientCredentials, IdsCredentials};
use crate::error::{ClientError, Result};
use crate::request::OutboundRequest;
use crate::transport::Transport;
use crate::utils::log_sanitizer::truncate_for_log;

/// Path of the token endpoint below the identity service URL.
pub const TOKEN_ENDPOINT_PATH: &str = "connect/token";

// ============ Clock ============

/// Source of the current time, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let millis = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.millis.store(now.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
            .unwrap_or(DateTime::UNIX_EPOCH)
    }
}

// ============ Tokens ============

/// An issued access token.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Expired when `now >= expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"****")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Anything that can hand out a bearer token.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// Token endpoint success payload; other fields are ignored.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: f64,
}

/// Caches the client-credentials access token of one client instance.
pub struct TokenCache {
    credentials: ClientCredentials,
    token_url: Url,
    transport: Transport,
    clock: Arc<dyn Clock>,
    refresh_leeway: chrono::Duration,
    slot: Mutex<Option<AccessToken>>,
}

impl TokenCache {
    /// Create an empty cache for the identity service at `ids_url`.
    ///
    /// The token endpoint is `{ids_url}/connect/token`.
    pub fn new(
        ids_url: &Url,
        credentials: ClientCredentials,
        transport: Transport,
    ) -> Result<Self> {
        let token_url = token_endpoint(ids_url)?;
        Ok(Self {
            credentials,
            token_url,
            transport,
            clock: Arc::new(SystemClock),
            refresh_leeway: chrono::Duration::zero(),
            slot: Mutex::new(None),
        })
    }

    /// Use a different time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Refresh this long before the token actually expires (default: zero).
    #[must_use]
    pub fn with_refresh_leeway(mut self, leeway: Duration) -> Self {
        self.refresh_leeway =
            chrono::Duration::from_std(leeway).unwrap_or(chrono::Duration::zero());
        self
    }

    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    /// Return a valid access token, refreshing it if needed.
    ///
    /// # Errors
    /// - [`ClientError::MissingCredentials`] if the IDS client id, secret or scope is empty
    /// - [`ClientError::TokenAcquisition`] if the identity service cannot issue a token;
    ///   the cached token, if any, is kept
    pub async fn get_token(&self) -> Result<String> {
        let ids = self.credentials.require_ids()?;

        // Held across the refresh so concurrent callers wait for it instead of racing.
        let mut slot = self.slot.lock().await;
        if let Some(token) = slot.as_ref()
            && !self.needs_refresh(token)
        {
            return Ok(token.value.clone());
        }

        let token = self.fetch(ids).await?;
        let value = token.value.clone();
        *slot = Some(token);
        Ok(value)
    }

    /// The cached token without refreshing, expired or not.
    pub async fn cached_token(&self) -> Option<AccessToken> {
        self.slot.lock().await.clone()
    }

    /// Drop the cached token so the next call refreshes.
    pub async fn invalidate(&self) {
        if self.slot.lock().await.take().is_some() {
            log::debug!("Access token invalidated");
        }
    }

    fn needs_refresh(&self, token: &AccessToken) -> bool {
        token.is_expired(self.clock.now() + self.refresh_leeway)
    }

    async fn fetch(&self, ids: IdsCredentials<'_>) -> Result<AccessToken> {
        log::debug!(
            "Requesting access token from {} for client '{}'",
            self.token_url,
            ids.client_id
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let request = OutboundRequest::new(
            Method::POST,
            self.token_url.clone(),
            headers,
            Some(form_body(ids)),
        );

        let envelope = self
            .transport
            .execute(&request)
            .await
            .map_err(ClientError::token_acquisition)?;

        let status = envelope.status_code();
        if !(200..300).contains(&status) {
            log::warn!(
                "Token endpoint returned HTTP {status}: {}",
                truncate_for_log(envelope.body())
            );
            return Err(ClientError::token_acquisition(format!(
                "HTTP {status}: {}",
                envelope.body()
            )));
        }

        let response: TokenResponse = serde_json::from_str(envelope.body()).map_err(|e| {
            log::error!(
                "Token response parse failed: {e}, raw: {}",
                truncate_for_log(envelope.body())
            );
            ClientError::token_acquisition(format!("invalid token response: {e}"))
        })?;

        let expires_at = expiry(self.clock.now(), response.expires_in)?;
        let token = AccessToken::new(response.access_token, expires_at);
        if token.value.is_empty() {
            return Err(ClientError::token_acquisition(
                "invalid token response: empty access_token",
            ));
        }

        log::info!("Access token acquired, expires at {}", token.expires_at);
        Ok(token)
    }
}

#[async_trait]
impl TokenProvider for TokenCache {
    async fn access_token(&self) -> Result<String> {
        self.get_token().await
    }
}

fn token_endpoint(ids_url: &Url) -> Result<Url> {
    let raw = format!(
        "{}/{TOKEN_ENDPOINT_PATH}",
        ids_url.as_str().trim_end_matches('/')
    );
    Url::parse(&raw).map_err(|e| ClientError::InvalidUrl {
        url: raw,
        detail: e.to_string(),
    })
}

fn form_body(ids: IdsCredentials<'_>) -> String {
    format!(
        "grant_type=client_credentials&scope={}&client_id={}&client_secret={}",
        urlencoding::encode(ids.scope),
        urlencoding::encode(ids.client_id),
        urlencoding::encode(ids.client_secret),
    )
}

/// `issued_at + expires_in`, rejecting lifetimes past the representable date range.
fn expiry(issued_at: DateTime<Utc>, expires_in: f64) -> Result<DateTime<Utc>> {
    issued_at
        .checked_add_signed(lifetime(expires_in)?)
        .ok_or_else(|| {
            ClientError::token_acquisition(format!(
                "invalid token response: expires_in {expires_in} is out of range"
            ))
        })
}

fn lifetime(expires_in: f64) -> Result<chrono::Duration> {
    if !expires_in.is_finite() || expires_in < 0.0 {
        return Err(ClientError::token_acquisition(format!(
            "invalid token response: expires_in {expires_in} is not a non-negative number"
        )));
    }
    Duration::try_from_secs_f64(expires_in)
        .ok()
        .and_then(|d| chrono::Duration::from_std(d).ok())
        .ok_or_else(|| {
            ClientError::token_acquisition(format!(
                "invalid token response: expires_in {expires_in} is out of range"
            ))
        })
}
