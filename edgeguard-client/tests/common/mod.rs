//! 共享测试工具和辅助函数

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use edgeguard_client::{
    ApiClient, ClientConfig, ClientCredentials, ManualClock, RetryPolicy, TokenCache, Transport,
};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// 断言 `Option` 为 `Some`，并解包返回内部值（失败则直接让测试失败）。
#[macro_export]
macro_rules! require_some {
    ($expr:expr $(,)?) => {{
        let opt = $expr;
        assert!(opt.is_some(), "expected Some(..), got None");
        let Some(val) = opt else {
            return;
        };
        val
    }};
    ($expr:expr, $($msg:tt)+) => {{
        let opt = $expr;
        assert!(opt.is_some(), "{}", format_args!($($msg)+));
        let Some(val) = opt else {
            return;
        };
        val
    }};
}

/// 断言 `Result` 为 `Ok`，并解包返回内部值（失败则直接让测试失败）。
#[macro_export]
macro_rules! require_ok {
    ($expr:expr $(,)?) => {{
        let res = $expr;
        assert!(res.is_ok(), "expected Ok(..), got {res:?}");
        let Ok(val) = res else {
            return;
        };
        val
    }};
    ($expr:expr, $($msg:tt)+) => {{
        let res = $expr;
        assert!(
            res.is_ok(),
            "{}: {res:?}",
            format_args!($($msg)+)
        );
        let Ok(val) = res else {
            return;
        };
        val
    }};
}

/// 固定起点，便于推算过期时间
pub fn epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(epoch()))
}

/// IDS 凭证 c1/s1/api，同时带静态令牌
pub fn credentials() -> ClientCredentials {
    ClientCredentials {
        api_token: "static-abc".to_string(),
        ids_client_id: "c1".to_string(),
        ids_client_secret: "s1".to_string(),
        ids_scope: "api".to_string(),
    }
}

/// 快速重试策略，避免测试等待
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(max_attempts)
        .with_backoff(Duration::from_millis(5), Duration::from_millis(20))
}

pub fn server_url(server: &MockServer) -> Url {
    Url::parse(&server.uri()).unwrap_or_else(|e| panic!("mock server uri: {e}"))
}

/// 指向 mock server 的令牌缓存
pub fn token_cache(server: &MockServer, credentials: ClientCredentials) -> TokenCache {
    let transport = Transport::with_policy(RetryPolicy::no_retry())
        .unwrap_or_else(|e| panic!("transport: {e}"));
    TokenCache::new(&server_url(server), credentials, transport)
        .unwrap_or_else(|e| panic!("token cache: {e}"))
}

/// 所有基础地址都指向同一个 mock server：主 API 在 `/v2/`，旧 API 在 `/v1/`
pub fn config(server: &MockServer, retry: RetryPolicy) -> ClientConfig {
    ClientConfig::builder()
        .api_url(format!("{}/v2", server.uri()))
        .legacy_api_url(format!("{}/v1", server.uri()))
        .ids_url(server.uri())
        .credentials(credentials())
        .retry_policy(retry)
        .build()
        .unwrap_or_else(|e| panic!("config: {e}"))
}

pub fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(config(server, RetryPolicy::no_retry()))
        .unwrap_or_else(|e| panic!("client: {e}"))
}

/// 令牌端点：校验表单字段，返回 `token`，有效期 `expires_in` 秒
pub fn token_endpoint(token: &str, expires_in: u64) -> Mock {
    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=c1"))
        .and(body_string_contains("client_secret=s1"))
        .and(body_string_contains("scope=api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": token,
            "expires_in": expires_in,
            "token_type": "Bearer",
        })))
}

/// 一个已释放的本地端口，连接会被拒绝
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap_or_else(|e| panic!("bind: {e}"));
    let port = listener
        .local_addr()
        .unwrap_or_else(|e| panic!("local addr: {e}"))
        .port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}
