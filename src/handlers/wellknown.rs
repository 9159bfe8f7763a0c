//! Discovery and JWKS publication.

use axum::{extract::State, Json};

use crate::config::AppState;
use crate::dto::oauth::OpenIdConfiguration;
use crate::utils::jwt::JwksDocument;

/// GET /.well-known/openid-configuration
///
/// The issuer is the configured value, not the request host; this keeps
/// discovery consistent with the `iss` claim in every minted token.
pub async fn openid_configuration_handler(
    State(state): State<AppState>,
) -> Json<OpenIdConfiguration> {
    Json(OpenIdConfiguration::new(&state.config.issuer))
}

/// GET /.well-known/jwks.json
pub async fn jwks_handler(State(state): State<AppState>) -> Json<JwksDocument> {
    Json(state.jwks_document.as_ref().clone())
}
