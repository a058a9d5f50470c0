use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::database::{Document, ObjectId, ID_FIELD};
use crate::error::ApiError;

/// Fields only the server may set
const SERVER_FIELDS: &[&str] = &[ID_FIELD, "createdAt", "updatedAt"];

/// JSON object request body with server-managed fields removed.
///
/// Any other shape (array, scalar, malformed JSON) is a 400.
#[derive(Debug)]
pub struct JsonObject(pub Document);

#[async_trait]
impl<S> FromRequest<S> for JsonObject
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<Value>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

        match value {
            Value::Object(mut fields) => {
                for field in SERVER_FIELDS {
                    fields.remove(*field);
                }
                Ok(JsonObject(fields))
            }
            _ => Err(ApiError::bad_request("Request body must be a JSON object")),
        }
    }
}

/// Path parameters. A segment that can't be decoded names nothing, so any
/// rejection is a 404 rather than the framework's plain-text 400.
#[derive(Debug)]
pub struct PathParams<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for PathParams<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(params)) => Ok(PathParams(params)),
            Err(rejection) => {
                tracing::debug!("Rejected path {}: {}", parts.uri.path(), rejection.body_text());
                Err(ApiError::not_found())
            }
        }
    }
}

/// Parse a path id. Anything that isn't a store id is reported as not found.
pub fn parse_object_id(id: &str) -> Result<ObjectId, ApiError> {
    id.parse().map_err(|_| ApiError::not_found())
}

/// Current time as stored in `createdAt` / `updatedAt`
pub fn timestamp() -> Value {
    Value::String(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
}
