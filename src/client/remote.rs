//! Loading state for values fetched from the server.

use serde::Serialize;
use tokio::sync::watch;

use crate::client::rpc::{RpcClient, RpcError};
use crate::router::body::BodyCodec;
use crate::router::ApiSpec;

/// Not yet loaded, loaded, or failed with a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Remote<T> {
    #[default]
    Initial,
    Loaded(T),
    Error(String),
}

impl<T> Remote<T> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Remote::Loaded(_))
    }

    pub fn loaded(&self) -> Option<&T> {
        match self {
            Remote::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Remote::Error(message) => Some(message),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Remote<U> {
        match self {
            Remote::Initial => Remote::Initial,
            Remote::Loaded(value) => Remote::Loaded(f(value)),
            Remote::Error(message) => Remote::Error(message),
        }
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for Remote<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Remote::Loaded(value),
            Err(e) => Remote::Error(e.to_string()),
        }
    }
}

/// Run an RPC call and publish its outcome into `target`.
pub async fn rpc_into_remote<P, B, R>(
    client: &RpcClient,
    spec: &ApiSpec<P, B, R>,
    params: &P,
    body: &B::Value,
    target: &watch::Sender<Remote<R::Value>>,
) where
    P: Serialize,
    B: BodyCodec,
    R: BodyCodec,
{
    let result = client.call(spec, params, body).await;
    if let Err(e) = &result {
        tracing::warn!(route = %spec.route.template(), error = %e, "RPC into remote failed");
    }
    target.send_replace(Remote::from(result));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_result() {
        let ok: Remote<u32> = Ok::<_, RpcError>(3).into();
        assert_eq!(ok.loaded(), Some(&3));
        let failed: Remote<u32> = Err::<u32, _>(RpcError::Timeout).into();
        assert_eq!(failed.error(), Some("Failed to contact server: timeout"));
        assert_eq!(Remote::<u32>::default(), Remote::Initial);
    }

    #[test]
    fn test_map_keeps_state() {
        assert_eq!(Remote::Loaded(2).map(|v| v * 2), Remote::Loaded(4));
        assert_eq!(
            Remote::<u32>::Error("x".into()).map(|v| v * 2),
            Remote::Error("x".into())
        );
    }

    #[tokio::test]
    async fn test_rpc_into_remote_records_failure() {
        use crate::route::{NoParams, Route};
        use crate::router::body::{Json, NoBody};

        let client = RpcClient::new("http://127.0.0.1:9/")
            .unwrap()
            .with_timeout(std::time::Duration::from_secs(2));
        let spec: ApiSpec<NoParams, NoBody, Json<Vec<u32>>> =
            ApiSpec::new(reqwest::Method::GET, Route::new("/items").unwrap());
        let (tx, rx) = watch::channel(Remote::Initial);
        rpc_into_remote(&client, &spec, &NoParams {}, &(), &tx).await;
        assert!(rx.borrow().error().is_some());
    }
}
