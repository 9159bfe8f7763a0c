//! Bearer-token interceptor for the protected resource API.
//!
//! Validates the access token against the cached JWKS keys and injects an
//! immutable [`Principal`] into request extensions. A missing `kid` in
//! the cache triggers one rate-limited refresh inside the cache before
//! the request is rejected.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};

use crate::config::AppState;
use crate::error::RpcError;
use crate::utils::authz::Principal;
use crate::utils::jwt::{extract_kid, verify_with_key};

/// Validate the bearer token on every RPC and hand the handler a
/// [`Principal`]. All failure modes are `UNAUTHENTICATED`; permission
/// decisions happen later, in the handlers, against the principal.
pub async fn bearer_auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, RpcError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = auth_header
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| RpcError::Unauthenticated("missing bearer token".to_string()))?;

    let kid = extract_kid(token)
        .ok_or_else(|| RpcError::Unauthenticated("token has no key id".to_string()))?;

    // Cache miss handling (single-flight refresh, rate limiting) lives in
    // the cache; a second miss after refresh rejects the token.
    let key = state.jwks_cache.get_key(&kid).await?;

    // When the audience check is on, this resource server accepts only
    // tokens minted for the configured dashboard client.
    let expected_audience = (state.config.validate_audience
        && !state.config.default_oauth_client_id.is_empty())
    .then_some(state.config.default_oauth_client_id.as_str());

    let claims = verify_with_key(
        token,
        &key,
        &state.config.issuer,
        state.config.validate_audience,
        expected_audience,
    )?;

    request.extensions_mut().insert(Principal::from(claims));

    Ok(next.run(request).await)
}
