use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Bearer-token gate for protected routes.
///
/// Verifies the token and injects the resulting `Identity` into request
/// extensions before the handler runs. Missing or malformed headers and
/// rejected tokens yield 401; an uninitialized verifier yields 503.
pub async fn require_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(request.headers()).map_err(ApiError::unauthorized)?;

    let identity = state.verifier.verify(token).await?;
    tracing::debug!("Authenticated request for {}", identity.uid);

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Extract the token from `Authorization: Bearer <token>`
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, &'static str> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or("Missing Authorization header")?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format")?;

    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or("Authorization header must use Bearer token format")?;

    if token.is_empty() || token.chars().any(char::is_whitespace) {
        return Err("Malformed bearer token");
    }
    Ok(token)
}
