//! Typed RPC calls against `ApiSpec` endpoints.

use std::time::Duration;

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::Method;
use serde::Serialize;
use url::Url;

use crate::config::ClientConfig;
use crate::route::RouteError;
use crate::router::body::BodyCodec;
use crate::router::error::BodyError;
use crate::router::respond::{APPLICATION_JSON, TEXT_PLAIN};
use crate::router::ApiSpec;

pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Invalid base url {url}: {source}")]
    BaseUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("Failed to build link: {0}")]
    Link(#[from] RouteError),

    #[error("Failed to join link: {0}")]
    Join(#[from] url::ParseError),

    #[error("Failed to encode request body: {0}")]
    Body(#[from] BodyError),

    #[error("Failed to contact server: timeout")]
    Timeout,

    #[error("Failed to contact server: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Request succeeded but no JSON payload found: {0}")]
    NoJson(String),

    #[error("Failed to decode result of rpc call to {url}: {message}")]
    Decode { url: String, message: String },

    /// Non-success status, with the JSON or text payload when present.
    #[error("{message}")]
    Status { status: u16, message: String },
}

/// HTTP client bound to one server.
#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl RpcClient {
    pub fn new(base_url: &str) -> Result<Self, RpcError> {
        let base_url = Url::parse(base_url).map_err(|source| RpcError::BaseUrl {
            url: base_url.to_string(),
            source,
        })?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            timeout: DEFAULT_RPC_TIMEOUT,
        })
    }

    pub fn from_config(base_url: &str, config: &ClientConfig) -> Result<Self, RpcError> {
        Ok(Self::new(base_url)?.with_timeout(Duration::from_millis(config.rpc_timeout_ms)))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for a server-relative link.
    pub fn url_for(&self, link: &str) -> Result<Url, RpcError> {
        Ok(self.base_url.join(link)?)
    }

    /// Call the endpoint described by `spec`.
    ///
    /// The whole exchange, body included, is bounded by the client timeout.
    pub async fn call<P, B, R>(
        &self,
        spec: &ApiSpec<P, B, R>,
        params: &P,
        body: &B::Value,
    ) -> Result<R::Value, RpcError>
    where
        P: Serialize,
        B: BodyCodec,
        R: BodyCodec,
    {
        let url = self.url_for(&spec.route.link(params)?)?;
        let payload = B::encode(body)?;

        tracing::debug!(method = %spec.method, url = %url, "RPC call");
        tokio::time::timeout(self.timeout, self.exchange::<R>(spec.method.clone(), url, payload))
            .await
            .map_err(|_| RpcError::Timeout)?
    }

    async fn exchange<R: BodyCodec>(
        &self,
        method: Method,
        url: Url,
        payload: Option<Vec<u8>>,
    ) -> Result<R::Value, RpcError> {
        let mut request = self.http.request(method, url.clone());
        if let Some(bytes) = payload {
            request = request.header(CONTENT_TYPE, APPLICATION_JSON).body(bytes);
        }
        let response = request.send().await?;
        let status = response.status();
        let content_type = content_type(response.headers());

        if status.is_success() {
            if !R::READS_BODY {
                return R::decode(&[]).map_err(|e| decode_error(&url, e));
            }
            if !content_type.starts_with(APPLICATION_JSON) {
                return Err(RpcError::NoJson(url.to_string()));
            }
            let bytes = response.bytes().await?;
            return R::decode(&bytes).map_err(|e| decode_error(&url, e));
        }

        let message = if content_type.starts_with(APPLICATION_JSON)
            || content_type.starts_with(TEXT_PLAIN)
        {
            format!("{}: {}", status.as_u16(), response.text().await?)
        } else {
            format!(
                "{} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or_default()
            )
        };
        tracing::warn!(url = %url, status = status.as_u16(), "RPC call failed");
        Err(RpcError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn decode_error(url: &Url, error: BodyError) -> RpcError {
    RpcError::Decode {
        url: url.to_string(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            RpcError::NoJson("http://h/x".into()).to_string(),
            "Request succeeded but no JSON payload found: http://h/x"
        );
        assert_eq!(
            RpcError::Timeout.to_string(),
            "Failed to contact server: timeout"
        );
    }

    #[test]
    fn test_url_for_joins_links() {
        let client = RpcClient::new("http://127.0.0.1:8080/").unwrap();
        let url = client.url_for("/todos/4?done=true").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/todos/4?done=true");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            RpcClient::new("not a url"),
            Err(RpcError::BaseUrl { .. })
        ));
    }
}
