use axum::{
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// OAuth protocol errors, surfaced as the canonical `{error, error_description}`
/// JSON body defined by RFC 6749 §5.2.
#[allow(dead_code)]
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Client authentication failed")]
    InvalidClient,

    #[error("{0}")]
    InvalidGrant(String),

    #[error("Client is not authorized for this grant type")]
    UnauthorizedClient,

    #[error("Unsupported grant type")]
    UnsupportedGrantType,

    #[error("{0}")]
    InvalidScope(String),

    #[error("{0}")]
    AccessDenied(String),

    #[error("Internal server error")]
    ServerError(#[from] anyhow::Error),
}

impl OAuthError {
    /// The wire `error` code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidClient => "invalid_client",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::UnauthorizedClient => "unauthorized_client",
            OAuthError::UnsupportedGrantType => "unsupported_grant_type",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::AccessDenied(_) => "access_denied",
            OAuthError::ServerError(_) => "server_error",
        }
    }
}

#[derive(Serialize)]
pub struct OAuthErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            OAuthError::InvalidClient => StatusCode::UNAUTHORIZED,
            OAuthError::ServerError(e) => {
                tracing::error!(error = %e, "oauth endpoint internal error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        };

        let description = match &self {
            // Internal details never reach the wire.
            OAuthError::ServerError(_) => None,
            other => Some(other.to_string()),
        };

        let body = Json(OAuthErrorBody {
            error: self.code().to_string(),
            error_description: description,
        });

        let mut response = (status, body).into_response();
        let headers = response.headers_mut();
        // Token endpoint responses must never be cached.
        headers.insert(header::CACHE_CONTROL, "no-store".parse().unwrap());
        headers.insert(header::PRAGMA, "no-cache".parse().unwrap());
        if matches!(self, OAuthError::InvalidClient) {
            headers.insert(header::WWW_AUTHENTICATE, "Basic".parse().unwrap());
        }
        response
    }
}

/// Errors raised by the browser-facing login and verification flows.
/// These render as HTML pages, not OAuth redirects.
#[allow(dead_code)]
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Email address is not registered")]
    EmailNotRegistered,

    #[error("Too many codes requested. Try again later.")]
    OtpRateLimited,

    #[error("Invalid or expired code")]
    InvalidOtp,

    #[error("Invalid or expired verification link")]
    InvalidVerificationToken,

    #[error("Invalid client secret")]
    InvalidClientSecret,

    #[error("Sign-in with {0} failed")]
    UpstreamExchangeFailed(String),

    #[error("Login session expired. Please try again.")]
    StateMismatch,

    #[error("Request could not be verified. Please try again.")]
    CsrfMismatch,

    #[error("Account is not activated")]
    AccountNotActivated,

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl IntoResponse for FlowError {
    fn into_response(self) -> Response {
        let status = match &self {
            FlowError::OtpRateLimited => StatusCode::TOO_MANY_REQUESTS,
            FlowError::AccountNotActivated => StatusCode::FORBIDDEN,
            FlowError::InternalError(e) => {
                tracing::error!(error = %e, "login flow internal error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            FlowError::EmailNotRegistered
            | FlowError::InvalidOtp
            | FlowError::InvalidVerificationToken
            | FlowError::InvalidClientSecret
            | FlowError::StateMismatch
            | FlowError::CsrfMismatch => StatusCode::BAD_REQUEST,
            FlowError::UpstreamExchangeFailed(_) => StatusCode::BAD_GATEWAY,
        };

        let message = match &self {
            FlowError::InternalError(_) => "Something went wrong. Please try again.".to_string(),
            other => other.to_string(),
        };

        (status, Html(error_page(&message))).into_response()
    }
}

/// Minimal server-rendered error page shared by the browser flows.
pub fn error_page(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Error</title></head>
<body>
  <h1>Something went wrong</h1>
  <p>{}</p>
  <p><a href="/login">Back to sign in</a></p>
</body>
</html>"#,
        html_escape(message)
    )
}

/// Escape text interpolated into server-rendered HTML.
pub fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Authorization errors for the resource-server surface, using gRPC-style
/// codes so RPC callers can branch without parsing messages.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
pub struct RpcErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            RpcError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            RpcError::PermissionDenied(_) => (StatusCode::FORBIDDEN, "PERMISSION_DENIED"),
            RpcError::Internal(e) => {
                tracing::error!(error = %e, "rpc internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
            }
        };

        let message = match &self {
            RpcError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };

        (status, Json(RpcErrorBody { code, message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oauth_error_codes_match_canonical_set() {
        assert_eq!(OAuthError::InvalidRequest("x".into()).code(), "invalid_request");
        assert_eq!(OAuthError::InvalidClient.code(), "invalid_client");
        assert_eq!(OAuthError::InvalidGrant("x".into()).code(), "invalid_grant");
        assert_eq!(OAuthError::UnauthorizedClient.code(), "unauthorized_client");
        assert_eq!(OAuthError::UnsupportedGrantType.code(), "unsupported_grant_type");
        assert_eq!(OAuthError::InvalidScope("x".into()).code(), "invalid_scope");
        assert_eq!(OAuthError::AccessDenied("x".into()).code(), "access_denied");
        assert_eq!(
            OAuthError::ServerError(anyhow::anyhow!("boom")).code(),
            "server_error"
        );
    }

    #[test]
    fn invalid_client_response_carries_www_authenticate() {
        let response = OAuthError::InvalidClient.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Basic"
        );
    }

    #[test]
    fn oauth_responses_disable_caching() {
        let response = OAuthError::InvalidGrant("expired".into()).into_response();
        assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "no-store");
        assert_eq!(response.headers().get(header::PRAGMA).unwrap(), "no-cache");
    }

    #[test]
    fn server_error_hides_internal_details() {
        let response =
            OAuthError::ServerError(anyhow::anyhow!("connection refused")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn html_escape_neutralizes_markup() {
        assert_eq!(
            html_escape(r#"<script>"a"&'b'</script>"#),
            "&lt;script&gt;&quot;a&quot;&amp;&#x27;b&#x27;&lt;/script&gt;"
        );
    }
}
