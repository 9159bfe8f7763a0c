//! OAuth2 / OIDC protocol endpoints.
//!
//! - `GET /oauth/authorize` — authorization endpoint with consent screen
//! - `POST /oauth/authorize` — consent decision
//! - `POST /oauth/token` — token endpoint
//! - `POST /oauth/revoke` — revocation endpoint
//! - `POST /oauth/introspect` — introspection endpoint
//! - `GET /oauth/userinfo` — userinfo endpoint
//!
//! Error routing follows the protocol split: anything before the
//! redirect URI is validated renders an error page (no open redirect);
//! anything after flows back to the client via the redirect with the
//! original `state`.

use axum::{
    extract::{OriginalUri, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use axum_extra::extract::CookieJar;
use uuid::Uuid;

use crate::config::AppState;
use crate::dto::oauth::{
    AuthorizeParams, ConsentForm, IntrospectRequest, RevokeRequest, TokenRequest,
};
use crate::error::{error_page, html_escape, OAuthError};
use crate::models::{AuthSession, OAuthClient, User};
use crate::services::oauth::ClientCredentials;
use crate::services::scope_claims::scope_description;
use crate::utils::pkce::is_supported_method;
use crate::utils::secret::generate_csrf_token;

// ============================================================================
// Authorization endpoint
// ============================================================================

/// GET /oauth/authorize
pub async fn authorize_handler(
    State(state): State<AppState>,
    OriginalUri(original_uri): OriginalUri,
    Query(params): Query<AuthorizeParams>,
    jar: CookieJar,
) -> Response {
    let sessions = state.session_service();
    let (mut session, jar) = match sessions.load_or_start(jar).await {
        Ok(pair) => pair,
        Err(e) => return server_error_page(e),
    };

    // Not signed in: remember where we were headed and go to login. The
    // client_id rides along so the login page can name the client.
    if !session.is_authenticated() {
        session.original_url = Some(original_uri.to_string());
        if let Err(e) = sessions.save(&session).await {
            return server_error_page(e);
        }
        let login_url = match &params.client_id {
            Some(client_id) => format!("/login?client_id={}", urlencoding::encode(client_id)),
            None => "/login".to_string(),
        };
        return (jar, Redirect::to(&login_url)).into_response();
    }

    // Client and redirect URI validation happens before anything is sent
    // through the redirect.
    let (client, redirect_uri) = match resolve_client_and_redirect(
        &state,
        params.client_id.as_deref(),
        params.redirect_uri.as_deref(),
    )
    .await
    {
        Ok(pair) => pair,
        Err(response) => return response,
    };

    let user = match load_session_user(&state, &session).await {
        Ok(Some(user)) => user,
        Ok(None) => return (jar, Redirect::to("/login")).into_response(),
        Err(e) => return server_error_page(e),
    };

    let state_param = params.state.as_deref();

    if !user.is_active {
        return error_redirect(
            &redirect_uri,
            "access_denied",
            "account_not_activated",
            state_param,
        );
    }

    if params.response_type.as_deref() != Some("code") {
        return error_redirect(
            &redirect_uri,
            "invalid_request",
            "response_type must be code",
            state_param,
        );
    }

    let scope = params.scope_str().to_string();
    if !client.allows_scopes(scope.split_whitespace()) {
        return error_redirect(
            &redirect_uri,
            "invalid_scope",
            "Requested scope is not available to this client",
            state_param,
        );
    }

    if client.pkce_required && params.code_challenge.is_none() {
        return error_redirect(
            &redirect_uri,
            "invalid_request",
            "code_challenge is required",
            state_param,
        );
    }

    if let Some(method) = params.code_challenge_method.as_deref() {
        if !is_supported_method(method) {
            return error_redirect(
                &redirect_uri,
                "invalid_request",
                "code_challenge_method must be S256 or plain",
                state_param,
            );
        }
    }

    // Prior consent covering the requested scopes skips the screen,
    // unless the client forces re-consent.
    let force_consent = params.prompt.as_deref() == Some("consent");
    if !force_consent {
        match state
            .consent_service()
            .has_consent(user.id, client.id, &scope)
            .await
        {
            Ok(true) => {
                return issue_code_redirect(
                    &state,
                    &client,
                    &user,
                    &redirect_uri,
                    &scope,
                    params.nonce.as_deref(),
                    params.code_challenge.as_deref(),
                    params.code_challenge_method.as_deref(),
                    state_param,
                )
                .await;
            }
            Ok(false) => {}
            Err(e) => return error_redirect(&redirect_uri, e.code(), "", state_param),
        }
    }

    // Render the consent screen with a single-use CSRF token.
    let csrf_token = generate_csrf_token();
    session.csrf_token = Some(csrf_token.clone());
    if let Err(e) = sessions.save(&session).await {
        return server_error_page(e);
    }

    (
        jar,
        Html(consent_page(&client, &scope, &csrf_token, &params)),
    )
        .into_response()
}

/// POST /oauth/authorize — the consent decision.
pub async fn authorize_decision_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<ConsentForm>,
) -> Response {
    let sessions = state.session_service();
    let mut session = match sessions.load(&jar).await {
        Ok(Some(session)) if session.is_authenticated() => session,
        Ok(_) => return (jar, Redirect::to("/login")).into_response(),
        Err(e) => return server_error_page(e),
    };

    // Single-use CSRF check: the token must match and is cleared either way.
    let expected = session.csrf_token.take();
    if let Err(e) = sessions.save(&session).await {
        return server_error_page(e);
    }
    if expected.as_deref() != Some(form.csrf_token.as_str()) {
        return (
            StatusCode::BAD_REQUEST,
            Html(error_page("Request could not be verified. Please try again.")),
        )
            .into_response();
    }

    let (client, redirect_uri) = match resolve_client_and_redirect(
        &state,
        Some(form.client_id.as_str()),
        Some(form.redirect_uri.as_str()),
    )
    .await
    {
        Ok(pair) => pair,
        Err(response) => return response,
    };

    let user = match load_session_user(&state, &session).await {
        Ok(Some(user)) => user,
        Ok(None) => return (jar, Redirect::to("/login")).into_response(),
        Err(e) => return server_error_page(e),
    };

    let state_param = form.state.as_deref();

    if !user.is_active {
        return error_redirect(
            &redirect_uri,
            "access_denied",
            "account_not_activated",
            state_param,
        );
    }

    if form.action != "allow" {
        return error_redirect(
            &redirect_uri,
            "access_denied",
            "User denied the request",
            state_param,
        );
    }

    if let Err(e) = state
        .consent_service()
        .grant(user.id, client.id, &form.scope)
        .await
    {
        return error_redirect(&redirect_uri, e.code(), "", state_param);
    }

    issue_code_redirect(
        &state,
        &client,
        &user,
        &redirect_uri,
        &form.scope,
        form.nonce.as_deref(),
        form.code_challenge.as_deref(),
        form.code_challenge_method.as_deref(),
        state_param,
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn issue_code_redirect(
    state: &AppState,
    client: &OAuthClient,
    user: &User,
    redirect_uri: &str,
    scope: &str,
    nonce: Option<&str>,
    code_challenge: Option<&str>,
    code_challenge_method: Option<&str>,
    state_param: Option<&str>,
) -> Response {
    let code = match state
        .oauth_service()
        .create_authorization_code(
            client,
            user,
            redirect_uri,
            scope,
            nonce,
            code_challenge,
            code_challenge_method,
        )
        .await
    {
        Ok(code) => code,
        Err(e) => return error_redirect(redirect_uri, e.code(), "", state_param),
    };

    let mut params = vec![("code", code)];
    if let Some(s) = state_param {
        params.push(("state", s.to_string()));
    }
    Redirect::to(&append_query(redirect_uri, &params)).into_response()
}

/// Resolve the client and validate the redirect URI. Failures here render
/// an error page: redirecting to an unvalidated URI would be an open
/// redirect.
async fn resolve_client_and_redirect(
    state: &AppState,
    client_id: Option<&str>,
    redirect_uri: Option<&str>,
) -> Result<(OAuthClient, String), Response> {
    let client_id = client_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| param_error_page("Missing client_id"))?;

    if Uuid::parse_str(client_id).is_err() {
        return Err(param_error_page("Invalid client_id"));
    }

    let client = state
        .oauth_service()
        .client_repo()
        .find_by_client_id(client_id)
        .await
        .map_err(|e| server_error_page(anyhow::anyhow!(e)))?
        .ok_or_else(|| param_error_page("Unknown client"))?;

    let redirect_uri = redirect_uri
        .filter(|uri| !uri.is_empty())
        .ok_or_else(|| param_error_page("Missing redirect_uri"))?;

    if !client.has_redirect_uri(redirect_uri) {
        return Err(param_error_page("redirect_uri is not registered for this client"));
    }

    Ok((client, redirect_uri.to_string()))
}

async fn load_session_user(
    state: &AppState,
    session: &AuthSession,
) -> anyhow::Result<Option<User>> {
    let Some(user_id) = session.user_id else {
        return Ok(None);
    };
    crate::repositories::UserRepository::new(state.pool.clone())
        .find_by_id(user_id)
        .await
}

// ============================================================================
// Token endpoint
// ============================================================================

/// POST /oauth/token
pub async fn token_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(req): Form<TokenRequest>,
) -> Result<Response, OAuthError> {
    let oauth = state.oauth_service();

    let credentials = ClientCredentials::from_request(
        &headers,
        req.client_id.as_deref(),
        req.client_secret.as_deref(),
    )?;
    let client = oauth.authenticate_client(&credentials).await?;

    let token_response = match req.grant_type.as_deref() {
        Some("authorization_code") => {
            let code = req.code.as_deref().ok_or_else(|| {
                OAuthError::InvalidRequest("code is required".to_string())
            })?;
            let redirect_uri = req.redirect_uri.as_deref().ok_or_else(|| {
                OAuthError::InvalidRequest("redirect_uri is required".to_string())
            })?;
            oauth
                .exchange_authorization_code(
                    &client,
                    code,
                    redirect_uri,
                    req.code_verifier.as_deref(),
                )
                .await?
        }
        Some("refresh_token") => {
            let refresh_token = req.refresh_token.as_deref().ok_or_else(|| {
                OAuthError::InvalidRequest("refresh_token is required".to_string())
            })?;
            oauth.refresh_grant(&client, refresh_token).await?
        }
        _ => return Err(OAuthError::UnsupportedGrantType),
    };

    Ok(no_store(Json(token_response).into_response()))
}

// ============================================================================
// Revocation & introspection
// ============================================================================

/// POST /oauth/revoke
pub async fn revoke_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(req): Form<RevokeRequest>,
) -> Result<Response, OAuthError> {
    let oauth = state.oauth_service();

    let credentials = ClientCredentials::from_request(
        &headers,
        req.client_id.as_deref(),
        req.client_secret.as_deref(),
    )?;
    let client = oauth.authenticate_client(&credentials).await?;
    oauth.ensure_confidential(&client)?;

    oauth.revoke(&client, &req.token).await?;

    Ok(no_store(StatusCode::OK.into_response()))
}

/// POST /oauth/introspect
pub async fn introspect_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(req): Form<IntrospectRequest>,
) -> Result<Response, OAuthError> {
    let oauth = state.oauth_service();

    let credentials = ClientCredentials::from_request(
        &headers,
        req.client_id.as_deref(),
        req.client_secret.as_deref(),
    )?;
    let client = oauth.authenticate_client(&credentials).await?;
    oauth.ensure_confidential(&client)?;

    let response = oauth.introspect(&client, &req.token).await?;

    Ok(no_store(Json(response).into_response()))
}

// ============================================================================
// UserInfo
// ============================================================================

/// GET /oauth/userinfo
pub async fn userinfo_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, OAuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| OAuthError::InvalidRequest("Authorization header required".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or_else(|| OAuthError::InvalidRequest("Bearer token required".to_string()))?;

    let claims = state.oauth_service().userinfo(token).await?;
    Ok(Json(serde_json::Value::Object(claims)))
}

// ============================================================================
// Helpers
// ============================================================================

/// Append query parameters to a URL that may already carry some.
fn append_query(url: &str, params: &[(&str, String)]) -> String {
    let mut out = url.to_string();
    for (key, value) in params {
        out.push(if out.contains('?') { '&' } else { '?' });
        out.push_str(key);
        out.push('=');
        out.push_str(&urlencoding::encode(value));
    }
    out
}

/// Error response through the validated redirect URI, `state` preserved.
fn error_redirect(
    redirect_uri: &str,
    error: &str,
    description: &str,
    state: Option<&str>,
) -> Response {
    let mut params = vec![("error", error.to_string())];
    if !description.is_empty() {
        params.push(("error_description", description.to_string()));
    }
    if let Some(s) = state {
        params.push(("state", s.to_string()));
    }
    Redirect::to(&append_query(redirect_uri, &params)).into_response()
}

fn param_error_page(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Html(error_page(message))).into_response()
}

fn server_error_page(e: anyhow::Error) -> Response {
    tracing::error!(error = %e, "authorize endpoint internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(error_page("Something went wrong. Please try again.")),
    )
        .into_response()
}

fn no_store(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, "no-store".parse().unwrap());
    headers.insert(header::PRAGMA, "no-cache".parse().unwrap());
    response
}

fn consent_page(
    client: &OAuthClient,
    scope: &str,
    csrf_token: &str,
    params: &AuthorizeParams,
) -> String {
    let scope_items: String = scope
        .split_whitespace()
        .map(|s| format!("    <li>{}</li>\n", html_escape(scope_description(s))))
        .collect();

    let hidden = |name: &str, value: Option<&str>| match value {
        Some(v) => format!(
            r#"    <input type="hidden" name="{}" value="{}">
"#,
            name,
            html_escape(v)
        ),
        None => String::new(),
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Authorize {client_name}</title></head>
<body>
  <h1>Authorize {client_name}</h1>
  <p><strong>{client_name}</strong> is asking to:</p>
  <ul>
{scope_items}  </ul>
  <form method="post" action="/oauth/authorize">
    <input type="hidden" name="csrf_token" value="{csrf}">
{client_id}{redirect_uri}{scope_field}{state}{nonce}{challenge}{method}    <button type="submit" name="action" value="allow">Allow</button>
    <button type="submit" name="action" value="deny">Deny</button>
  </form>
</body>
</html>"#,
        client_name = html_escape(&client.name),
        scope_items = scope_items,
        csrf = html_escape(csrf_token),
        client_id = hidden("client_id", Some(client.client_id.as_str())),
        redirect_uri = hidden("redirect_uri", params.redirect_uri.as_deref()),
        scope_field = hidden("scope", Some(scope)),
        state = hidden("state", params.state.as_deref()),
        nonce = hidden("nonce", params.nonce.as_deref()),
        challenge = hidden("code_challenge", params.code_challenge.as_deref()),
        method = hidden("code_challenge_method", params.code_challenge_method.as_deref()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_query_handles_existing_query() {
        assert_eq!(
            append_query("https://app/cb", &[("code", "abc".to_string())]),
            "https://app/cb?code=abc"
        );
        assert_eq!(
            append_query("https://app/cb?x=1", &[("code", "a b".to_string())]),
            "https://app/cb?x=1&code=a%20b"
        );
    }

    #[test]
    fn error_redirect_preserves_state() {
        let response = error_redirect(
            "https://app/cb",
            "access_denied",
            "account_not_activated",
            Some("S123"),
        );
        let location = response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        assert!(location.starts_with("https://app/cb?error=access_denied"));
        assert!(location.contains("error_description=account_not_activated"));
        assert!(location.contains("state=S123"));
    }
}
