//! API client
//!
//! Ties the pieces together for one provider instance: a request goes through
//! [`RequestBuilder`] → [`Transport`] → [`interpret`].

use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::request::{AuthMode, RequestBody, RequestBuilder};
use crate::response::{ResponseEnvelope, ResponseTarget, ensure_success, interpret};
use crate::token::{Clock, SystemClock, TokenCache};
use crate::transport::{Transport, create_http_client};

/// Which API generation a request is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiBase {
    #[default]
    Primary,
    Legacy,
}

/// Shared client of one provider instance.
///
/// Holds the only token cache of the instance; share it behind an `Arc`
/// rather than creating one client per resource.
pub struct ApiClient {
    config: ClientConfig,
    transport: Transport,
    tokens: Arc<TokenCache>,
    builder: RequestBuilder,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Like [`new`](Self::new), with the token cache reading time from `clock`.
    pub fn with_clock(config: ClientConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let http = create_http_client(config.connect_timeout, config.request_timeout)?;
        let transport = Transport::new(http, config.retry.clone());

        let tokens = Arc::new(
            TokenCache::new(&config.ids_url, config.credentials.clone(), transport.clone())?
                .with_clock(clock)
                .with_refresh_leeway(config.token_refresh_leeway),
        );
        let builder = RequestBuilder::new(config.credentials.clone(), tokens.clone());

        log::debug!(
            "API client ready: api={}, legacy={}, ids={}",
            config.api_url,
            config.legacy_api_url,
            config.ids_url
        );

        Ok(Self {
            config,
            transport,
            tokens,
            builder,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn token_cache(&self) -> &TokenCache {
        &self.tokens
    }

    pub fn partner_id(&self) -> Option<&str> {
        self.config.partner_id.as_deref()
    }

    fn base_url(&self, base: ApiBase) -> &Url {
        match base {
            ApiBase::Primary => &self.config.api_url,
            ApiBase::Legacy => &self.config.legacy_api_url,
        }
    }

    /// Build, send and interpret one request.
    ///
    /// `Ok(None)` means the response was successful but its body was a scalar
    /// that `T` cannot hold.
    ///
    /// # Errors
    /// Any [`ClientError`](crate::ClientError) from request construction, the
    /// transport or response interpretation; 4xx/5xx become
    /// [`ClientError::Api`](crate::ClientError::Api) with the body verbatim.
    pub async fn request<T: ResponseTarget>(
        &self,
        base: ApiBase,
        method: Method,
        path: &str,
        body: RequestBody,
        auth: AuthMode,
    ) -> Result<Option<T>> {
        let envelope = self.exchange(base, method, path, body, auth).await?;
        interpret(&envelope)
    }

    /// Like [`request`](Self::request) for calls whose response body is not needed.
    pub async fn send(
        &self,
        base: ApiBase,
        method: Method,
        path: &str,
        body: RequestBody,
        auth: AuthMode,
    ) -> Result<()> {
        let envelope = self.exchange(base, method, path, body, auth).await?;
        ensure_success(&envelope)
    }

    async fn exchange(
        &self,
        base: ApiBase,
        method: Method,
        path: &str,
        body: RequestBody,
        auth: AuthMode,
    ) -> Result<ResponseEnvelope> {
        let request = self
            .builder
            .build(self.base_url(base), method, path, body, auth)
            .await
            .inspect_err(|e| log_failure(path, e))?;

        let envelope = self
            .transport
            .execute(&request)
            .await
            .inspect_err(|e| log_failure(path, e))?;

        if envelope.is_error() {
            log::warn!(
                "{} {} returned HTTP {}",
                request.method(),
                request.url(),
                envelope.status_code()
            );
        }
        Ok(envelope)
    }

    // ============ Convenience verbs (primary API) ============

    pub async fn get<T: ResponseTarget>(&self, path: &str, auth: AuthMode) -> Result<Option<T>> {
        self.request(ApiBase::Primary, Method::GET, path, RequestBody::None, auth)
            .await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B, auth: AuthMode) -> Result<Option<T>>
    where
        T: ResponseTarget,
        B: Serialize + ?Sized,
    {
        let body = RequestBody::json(body)?;
        self.request(ApiBase::Primary, Method::POST, path, body, auth)
            .await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B, auth: AuthMode) -> Result<Option<T>>
    where
        T: ResponseTarget,
        B: Serialize + ?Sized,
    {
        let body = RequestBody::json(body)?;
        self.request(ApiBase::Primary, Method::PUT, path, body, auth)
            .await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B, auth: AuthMode) -> Result<Option<T>>
    where
        T: ResponseTarget,
        B: Serialize + ?Sized,
    {
        let body = RequestBody::json(body)?;
        self.request(ApiBase::Primary, Method::PATCH, path, body, auth)
            .await
    }

    pub async fn delete(&self, path: &str, auth: AuthMode) -> Result<()> {
        self.send(
            ApiBase::Primary,
            Method::DELETE,
            path,
            RequestBody::None,
            auth,
        )
        .await
    }
}

fn log_failure(path: &str, error: &ClientError) {
    if error.is_expected() {
        log::warn!("Request to '{path}' failed: {error}");
    } else {
        log::error!("Request to '{path}' failed: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::ClientCredentials;

    fn client() -> ApiClient {
        let config = ClientConfig::builder()
            .api_url("https://api.example.test/v2")
            .legacy_api_url("https://api.example.test/v1")
            .ids_url("https://ids.example.test")
            .credentials(ClientCredentials::with_api_token("static-abc"))
            .partner_id("p-1")
            .build()
            .unwrap();
        ApiClient::new(config).unwrap()
    }

    #[test]
    fn base_selection() {
        let client = client();
        assert_eq!(
            client.base_url(ApiBase::Primary).as_str(),
            "https://api.example.test/v2/"
        );
        assert_eq!(
            client.base_url(ApiBase::Legacy).as_str(),
            "https://api.example.test/v1/"
        );
    }

    #[test]
    fn token_cache_targets_ids_endpoint() {
        let client = client();
        assert_eq!(
            client.token_cache().token_url().as_str(),
            "https://ids.example.test/connect/token"
        );
        assert_eq!(client.partner_id(), Some("p-1"));
    }
}
