//! Size-capped JSON body extractor

use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Largest accepted request body, in bytes
pub const MAX_REQUEST_BODY_SIZE: usize = 1_000_000;

/// JSON body rejected with 400 when it is larger than
/// `MAX_REQUEST_BODY_SIZE` or fails to deserialize.
///
/// The whole body is buffered and decoded before the handler runs, so an
/// oversized request never reaches the store.
#[derive(Debug, Clone)]
pub struct BoundedJson<T>(pub T);

impl<S, T> FromRequest<S> for BoundedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let bytes = axum::body::to_bytes(req.into_body(), MAX_REQUEST_BODY_SIZE)
            .await
            .map_err(|_| {
                ApiError::BadRequest(format!(
                    "request body exceeds {} bytes",
                    MAX_REQUEST_BODY_SIZE
                ))
            })?;

        serde_json::from_slice(&bytes)
            .map(BoundedJson)
            .map_err(|e| ApiError::BadRequest(format!("invalid request body: {}", e)))
    }
}
