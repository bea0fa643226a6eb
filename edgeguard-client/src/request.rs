//! Request construction
//!
//! Turns `(base url, method, path, body, auth mode)` into a fully-addressed,
//! authenticated [`OutboundRequest`]. Nothing here touches the network except
//! the bearer path, which may trigger a token refresh through the
//! [`TokenProvider`].

use std::sync::Arc;

use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use url::Url;

use crate::credentials::ClientCredentials;
use crate::error::{ClientError, Result};
use crate::token::TokenProvider;

/// Fixed `User-Agent` sent with every API request.
pub const DEFAULT_USER_AGENT: &str = concat!("edgeguard-client/", env!("CARGO_PKG_VERSION"));

const JSON_MEDIA_TYPE: &str = "application/json";

/// How a request authenticates. Exactly one mode applies per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// `Authorization: TOK:<api token>`.
    #[default]
    StaticToken,
    /// `Authorization: Bearer <access token>` from the OAuth2 token cache.
    Bearer,
}

/// Request payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    /// No body, no `Content-Type`.
    #[default]
    None,
    /// Pre-serialized payload, sent verbatim.
    Raw(String),
    /// Structured payload, JSON-encoded at build time.
    Json(serde_json::Value),
}

impl RequestBody {
    /// Structured body from any serializable value.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Self::Json)
            .map_err(|e| ClientError::Serialization {
                detail: e.to_string(),
            })
    }

    fn into_payload(self) -> Result<Option<String>> {
        match self {
            Self::None => Ok(None),
            Self::Raw(raw) => Ok(Some(raw)),
            Self::Json(value) => serde_json::to_string(&value).map(Some).map_err(|e| {
                ClientError::Serialization {
                    detail: e.to_string(),
                }
            }),
        }
    }
}

impl From<String> for RequestBody {
    fn from(raw: String) -> Self {
        Self::Raw(raw)
    }
}

impl From<&str> for RequestBody {
    fn from(raw: &str) -> Self {
        Self::Raw(raw.to_string())
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// A built request, ready for [`Transport`](crate::Transport).
///
/// Immutable once built; the transport clones what it needs per attempt.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<String>,
}

impl OutboundRequest {
    pub(crate) fn new(method: Method, url: Url, headers: HeaderMap, body: Option<String>) -> Self {
        Self {
            method,
            url,
            headers,
            body,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Value of a header as text, if present and visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Resolve `path` against `base` with standard relative-URL resolution.
///
/// Relative paths land beneath the base path (when it ends with `/`), absolute
/// paths replace it, query strings are preserved.
pub fn resolve_url(base: &Url, path: &str) -> Result<Url> {
    base.join(path).map_err(|e| ClientError::InvalidUrl {
        url: path.to_string(),
        detail: e.to_string(),
    })
}

/// Builds authenticated API requests.
pub struct RequestBuilder {
    credentials: ClientCredentials,
    tokens: Arc<dyn TokenProvider>,
    user_agent: HeaderValue,
}

impl RequestBuilder {
    pub fn new(credentials: ClientCredentials, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            credentials,
            tokens,
            user_agent: HeaderValue::from_static(DEFAULT_USER_AGENT),
        }
    }

    /// Build a request.
    ///
    /// # Errors
    /// - [`ClientError::InvalidUrl`] if `path` does not resolve against `base_url`
    /// - [`ClientError::Serialization`] if a structured body cannot be encoded
    /// - [`ClientError::MissingToken`] for [`AuthMode::StaticToken`] without an API token
    /// - any error of the token provider for [`AuthMode::Bearer`], unchanged
    pub async fn build(
        &self,
        base_url: &Url,
        method: Method,
        path: &str,
        body: RequestBody,
        auth: AuthMode,
    ) -> Result<OutboundRequest> {
        let url = resolve_url(base_url, path)?;
        let payload = body.into_payload()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_MEDIA_TYPE));
        headers.insert(USER_AGENT, self.user_agent.clone());
        if payload.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_MEDIA_TYPE));
        }
        headers.insert(AUTHORIZATION, self.authorization(auth).await?);

        log::debug!("Built {method} {url} ({auth:?})");

        Ok(OutboundRequest::new(method, url, headers, payload))
    }

    async fn authorization(&self, auth: AuthMode) -> Result<HeaderValue> {
        let (value, field) = match auth {
            AuthMode::Bearer => {
                let token = self.tokens.access_token().await?;
                (format!("Bearer {token}"), "access_token")
            }
            AuthMode::StaticToken => {
                let token = self.credentials.require_api_token()?;
                (format!("TOK:{token}"), "api_token")
            }
        };

        let mut header = HeaderValue::from_str(&value).map_err(|_| {
            ClientError::invalid_config(field, "contains characters not allowed in a header")
        })?;
        header.set_sensitive(true);
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    struct StubTokens {
        calls: AtomicUsize,
        result: Result<String>,
    }

    impl StubTokens {
        fn ok(token: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                result: Ok(token.to_string()),
            })
        }

        fn failing(err: ClientError) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                result: Err(err),
            })
        }
    }

    #[async_trait]
    impl TokenProvider for StubTokens {
        async fn access_token(&self) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn base() -> Url {
        Url::parse("https://api.example.test/v1/").unwrap()
    }

    fn full_credentials() -> ClientCredentials {
        ClientCredentials {
            api_token: "static-abc".into(),
            ids_client_id: "c1".into(),
            ids_client_secret: "s1".into(),
            ids_scope: "api".into(),
        }
    }

    #[tokio::test]
    async fn bearer_mode_never_sets_tok_header() {
        let tokens = StubTokens::ok("tok-abc");
        let builder = RequestBuilder::new(full_credentials(), tokens.clone());

        let req = builder
            .build(&base(), Method::GET, "zones", RequestBody::None, AuthMode::Bearer)
            .await
            .unwrap();

        assert_eq!(req.header("authorization"), Some("Bearer tok-abc"));
        assert_eq!(tokens.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn static_mode_never_calls_token_provider() {
        let tokens = StubTokens::ok("tok-abc");
        let builder = RequestBuilder::new(full_credentials(), tokens.clone());

        let req = builder
            .build(
                &base(),
                Method::GET,
                "zones",
                RequestBody::None,
                AuthMode::StaticToken,
            )
            .await
            .unwrap();

        assert_eq!(req.header("authorization"), Some("TOK:static-abc"));
        assert_eq!(tokens.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn static_mode_without_token_fails() {
        let creds = ClientCredentials::with_client_credentials("c1", "s1", "api");
        let builder = RequestBuilder::new(creds, StubTokens::ok("unused"));

        let result = builder
            .build(
                &base(),
                Method::GET,
                "zones",
                RequestBody::None,
                AuthMode::StaticToken,
            )
            .await;

        assert!(
            matches!(result, Err(ClientError::MissingToken)),
            "unexpected result: {result:?}"
        );
    }

    #[tokio::test]
    async fn bearer_failure_is_not_downgraded() {
        let tokens = StubTokens::failing(ClientError::token_acquisition("ids down"));
        let builder = RequestBuilder::new(full_credentials(), tokens);

        let result = builder
            .build(&base(), Method::GET, "zones", RequestBody::None, AuthMode::Bearer)
            .await;

        assert!(
            matches!(result, Err(ClientError::TokenAcquisition { .. })),
            "unexpected result: {result:?}"
        );
    }

    #[tokio::test]
    async fn standard_headers_without_body() {
        let builder = RequestBuilder::new(full_credentials(), StubTokens::ok("t"));
        let req = builder
            .build(
                &base(),
                Method::DELETE,
                "zones/42",
                RequestBody::None,
                AuthMode::StaticToken,
            )
            .await
            .unwrap();

        assert_eq!(req.header("accept"), Some("application/json"));
        assert_eq!(req.header("user-agent"), Some(DEFAULT_USER_AGENT));
        assert_eq!(req.header("content-type"), None);
        assert_eq!(req.body(), None);
        assert_eq!(*req.method(), Method::DELETE);
    }

    #[tokio::test]
    async fn raw_body_is_sent_verbatim() {
        let builder = RequestBuilder::new(full_credentials(), StubTokens::ok("t"));
        let raw = r#"{ "name" : "example.com" }"#;
        let req = builder
            .build(
                &base(),
                Method::POST,
                "zones",
                RequestBody::from(raw),
                AuthMode::StaticToken,
            )
            .await
            .unwrap();

        assert_eq!(req.body(), Some(raw));
        assert_eq!(req.header("content-type"), Some("application/json"));
    }

    #[tokio::test]
    async fn structured_body_is_json_encoded() {
        let builder = RequestBuilder::new(full_credentials(), StubTokens::ok("t"));
        let req = builder
            .build(
                &base(),
                Method::PUT,
                "zones/1",
                RequestBody::from(json!({"ttl": 300})),
                AuthMode::StaticToken,
            )
            .await
            .unwrap();

        assert_eq!(req.body(), Some(r#"{"ttl":300}"#));
    }

    #[tokio::test]
    async fn relative_path_and_query_resolve_under_base() {
        let builder = RequestBuilder::new(full_credentials(), StubTokens::ok("t"));
        let req = builder
            .build(
                &base(),
                Method::GET,
                "zones?page=2&per_page=50",
                RequestBody::None,
                AuthMode::StaticToken,
            )
            .await
            .unwrap();

        assert_eq!(
            req.url().as_str(),
            "https://api.example.test/v1/zones?page=2&per_page=50"
        );
    }

    #[test]
    fn absolute_path_replaces_base_path() {
        let url = resolve_url(&base(), "/legacy/token").unwrap();
        assert_eq!(url.as_str(), "https://api.example.test/legacy/token");
    }

    #[test]
    fn json_helper_serializes_structs() {
        #[derive(Serialize)]
        struct Zone {
            name: &'static str,
        }
        let body = RequestBody::json(&Zone {
            name: "example.com",
        })
        .unwrap();
        assert_eq!(body, RequestBody::Json(json!({"name": "example.com"})));
    }
}
