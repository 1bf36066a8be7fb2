//! Request and response body codecs.

use std::marker::PhantomData;

use axum::body::{Body, Bytes};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::router::error::BodyError;

/// Decodes a request body or encodes a response body.
///
/// `encode` returning `None` means "no payload": the dispatcher answers with
/// an empty `text/plain` 200.
pub trait BodyCodec: Send + Sync + 'static {
    type Value: Send + 'static;

    /// Whether the dispatcher needs to read the request body at all.
    const READS_BODY: bool;

    fn decode(bytes: &[u8]) -> Result<Self::Value, BodyError>;

    fn encode(value: &Self::Value) -> Result<Option<Vec<u8>>, BodyError>;
}

/// No body in, no payload out.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBody;

impl BodyCodec for NoBody {
    type Value = ();

    const READS_BODY: bool = false;

    fn decode(_bytes: &[u8]) -> Result<(), BodyError> {
        Ok(())
    }

    fn encode(_value: &()) -> Result<Option<Vec<u8>>, BodyError> {
        Ok(None)
    }
}

/// JSON body typed as `T`. An empty request body reads as `null`.
pub struct Json<T>(PhantomData<fn() -> T>);

impl<T> BodyCodec for Json<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    type Value = T;

    const READS_BODY: bool = true;

    fn decode(bytes: &[u8]) -> Result<T, BodyError> {
        let parsed = if bytes.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            serde_json::from_slice::<Value>(bytes)
                .map_err(|e| BodyError::InvalidJson(e.to_string()))?
        };
        T::deserialize(parsed).map_err(|e| BodyError::Decode(e.to_string()))
    }

    fn encode(value: &T) -> Result<Option<Vec<u8>>, BodyError> {
        serde_json::to_vec(value)
            .map(Some)
            .map_err(|e| BodyError::Encode(e.to_string()))
    }
}

/// Collect the request body, bounded by `limit` bytes, and decode it.
pub(crate) async fn read<B: BodyCodec>(
    body: Body,
    limit: usize,
) -> Result<(Bytes, B::Value), BodyError> {
    if !B::READS_BODY {
        return Ok((Bytes::new(), B::decode(&[])?));
    }
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| BodyError::Read(e.to_string()))?;
    let value = B::decode(&bytes)?;
    Ok((bytes, value))
}
