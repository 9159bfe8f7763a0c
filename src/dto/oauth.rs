//! Wire shapes for the OAuth/OIDC endpoints.

use serde::{Deserialize, Serialize};

/// Query parameters accepted by `GET /oauth/authorize`. Everything is
/// optional at the parsing layer; the handler decides which absences are
/// protocol errors and which get an error page.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeParams {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub prompt: Option<String>,
}

impl AuthorizeParams {
    pub fn scope_str(&self) -> &str {
        self.scope.as_deref().unwrap_or("")
    }
}

/// The consent form posted back from the consent screen.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsentForm {
    /// "allow" or "deny".
    pub action: String,
    pub csrf_token: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// Form body of `POST /oauth/token`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
}

/// Successful token response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
}

impl TokenResponse {
    pub fn new(
        access_token: String,
        expires_in: i64,
        refresh_token: Option<String>,
        scope: &str,
    ) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
            refresh_token,
            scope: scope.to_string(),
        }
    }
}

/// Form body of `POST /oauth/introspect`.
#[derive(Debug, Clone, Deserialize)]
pub struct IntrospectRequest {
    pub token: String,
    #[allow(dead_code)]
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// RFC 7662 introspection response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl IntrospectionResponse {
    /// The response for anything that is not a live token.
    pub fn inactive() -> Self {
        Self {
            active: false,
            scope: None,
            client_id: None,
            sub: None,
            exp: None,
            token_type: None,
        }
    }
}

/// Form body of `POST /oauth/revoke`.
#[derive(Debug, Clone, Deserialize)]
pub struct RevokeRequest {
    pub token: String,
    #[allow(dead_code)]
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// OpenID Connect discovery document. The issuer is the configured value,
/// never the request host, so it always matches the `iss` claim in tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub revocation_endpoint: String,
    pub introspection_endpoint: String,
    pub jwks_uri: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub claims_supported: Vec<String>,
}

impl OpenIdConfiguration {
    pub fn new(issuer: &str) -> Self {
        let base = issuer.trim_end_matches('/');
        Self {
            issuer: base.to_string(),
            authorization_endpoint: format!("{}/oauth/authorize", base),
            token_endpoint: format!("{}/oauth/token", base),
            userinfo_endpoint: format!("{}/oauth/userinfo", base),
            revocation_endpoint: format!("{}/oauth/revoke", base),
            introspection_endpoint: format!("{}/oauth/introspect", base),
            jwks_uri: format!("{}/.well-known/jwks.json", base),
            response_types_supported: vec!["code".to_string()],
            grant_types_supported: vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
            ],
            subject_types_supported: vec!["public".to_string()],
            id_token_signing_alg_values_supported: vec!["RS256".to_string()],
            code_challenge_methods_supported: vec!["S256".to_string(), "plain".to_string()],
            token_endpoint_auth_methods_supported: vec![
                "client_secret_basic".to_string(),
                "none".to_string(),
            ],
            scopes_supported: vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
                "offline_access".to_string(),
            ],
            claims_supported: vec![
                "sub".to_string(),
                "email".to_string(),
                "email_verified".to_string(),
                "name".to_string(),
                "given_name".to_string(),
                "family_name".to_string(),
                "picture".to_string(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_endpoints_derive_from_issuer() {
        let config = OpenIdConfiguration::new("https://idp.example.com/");
        assert_eq!(config.issuer, "https://idp.example.com");
        assert_eq!(
            config.authorization_endpoint,
            "https://idp.example.com/oauth/authorize"
        );
        assert_eq!(config.jwks_uri, "https://idp.example.com/.well-known/jwks.json");
        assert_eq!(config.response_types_supported, vec!["code"]);
        assert_eq!(
            config.code_challenge_methods_supported,
            vec!["S256", "plain"]
        );
    }

    #[test]
    fn token_response_omits_absent_refresh_token() {
        let response = TokenResponse::new("at".to_string(), 3600, None, "openid");
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("refresh_token"));
        assert!(json.contains(r#""token_type":"Bearer""#));

        let with_refresh =
            TokenResponse::new("at".to_string(), 3600, Some("rt".to_string()), "openid");
        let json = serde_json::to_string(&with_refresh).unwrap();
        assert!(json.contains(r#""refresh_token":"rt""#));
    }

    #[test]
    fn inactive_introspection_is_bare() {
        let json = serde_json::to_string(&IntrospectionResponse::inactive()).unwrap();
        assert_eq!(json, r#"{"active":false}"#);
    }
}
