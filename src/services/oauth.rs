//! Core OAuth2 service: client authentication, authorization-code
//! issuance and exchange, refresh-token rotation, introspection and
//! revocation.
//!
//! Single-use semantics for codes and refresh tokens rest on the
//! repositories' guarded updates: of two concurrent exchanges exactly one
//! observes the row transition and wins; the other maps to `invalid_grant`.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::dto::oauth::{IntrospectionResponse, TokenResponse};
use crate::error::{FlowError, OAuthError};
use crate::models::{OAuthClient, User};
use crate::repositories::{
    AuthorizationCodeRepository, OAuthClientRepository, PermissionRepository,
    ProjectMemberRepository, RefreshTokenRepository, UserRepository,
};
use crate::services::scope_claims::{ScopeClaimRegistry, ScopeUser};
use crate::utils::jwt::{ProfileClaims, TokenSigner, TokenVerifier};
use crate::utils::pkce::{validate_code_verifier, verify_pkce, PKCE_METHOD_S256};
use crate::utils::secret::verify_client_secret;

/// Scope that opts a grant into refresh-token issuance.
pub const OFFLINE_ACCESS_SCOPE: &str = "offline_access";

/// Client credentials presented to a token-endpoint-authenticated route.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Option<String>,
    /// Whether the credentials arrived via HTTP Basic.
    pub via_basic: bool,
}

impl ClientCredentials {
    /// Extract credentials, preferring HTTP Basic over form fields.
    pub fn from_request(
        headers: &HeaderMap,
        form_client_id: Option<&str>,
        form_client_secret: Option<&str>,
    ) -> Result<Self, OAuthError> {
        if let Some(value) = headers.get(header::AUTHORIZATION) {
            let value = value
                .to_str()
                .map_err(|_| OAuthError::InvalidClient)?;
            if let Some(encoded) = value.strip_prefix("Basic ") {
                let decoded = BASE64_STANDARD
                    .decode(encoded.trim())
                    .map_err(|_| OAuthError::InvalidClient)?;
                let decoded = String::from_utf8(decoded).map_err(|_| OAuthError::InvalidClient)?;
                let (client_id, client_secret) = decoded
                    .split_once(':')
                    .ok_or(OAuthError::InvalidClient)?;
                return Ok(Self {
                    client_id: client_id.to_string(),
                    client_secret: Some(client_secret.to_string()),
                    via_basic: true,
                });
            }
        }

        let client_id = form_client_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| OAuthError::InvalidRequest("client_id is required".to_string()))?;

        Ok(Self {
            client_id: client_id.to_string(),
            client_secret: form_client_secret
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string()),
            via_basic: false,
        })
    }
}

#[derive(Clone)]
pub struct OAuthService {
    client_repo: OAuthClientRepository,
    code_repo: AuthorizationCodeRepository,
    token_repo: RefreshTokenRepository,
    user_repo: UserRepository,
    member_repo: ProjectMemberRepository,
    permission_repo: PermissionRepository,
    signer: TokenSigner,
    verifier: TokenVerifier,
    scope_registry: Arc<ScopeClaimRegistry>,
    code_expiry_seconds: i64,
    refresh_token_expiry_seconds: i64,
    refresh_token_default: bool,
}

impl OAuthService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: MySqlPool,
        signer: TokenSigner,
        verifier: TokenVerifier,
        scope_registry: Arc<ScopeClaimRegistry>,
        code_expiry_seconds: i64,
        refresh_token_expiry_seconds: i64,
        refresh_token_default: bool,
    ) -> Self {
        Self {
            client_repo: OAuthClientRepository::new(pool.clone()),
            code_repo: AuthorizationCodeRepository::new(pool.clone()),
            token_repo: RefreshTokenRepository::new(pool.clone()),
            user_repo: UserRepository::new(pool.clone()),
            member_repo: ProjectMemberRepository::new(pool.clone()),
            permission_repo: PermissionRepository::new(pool),
            signer,
            verifier,
            scope_registry,
            code_expiry_seconds,
            refresh_token_expiry_seconds,
            refresh_token_default,
        }
    }

    pub fn client_repo(&self) -> &OAuthClientRepository {
        &self.client_repo
    }

    // ========================================================================
    // Client authentication
    // ========================================================================

    /// Authenticate the client behind a token-endpoint request.
    ///
    /// Confidential clients must present their secret over HTTP Basic and
    /// have it verified against the stored hash. Public clients identify
    /// by `client_id` alone; a secret they happen to send is checked only
    /// if one is on file.
    pub async fn authenticate_client(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<OAuthClient, OAuthError> {
        let client = self
            .client_repo
            .find_by_client_id(&credentials.client_id)
            .await?
            .ok_or(OAuthError::InvalidClient)?;

        if client.confidential {
            if !credentials.via_basic {
                return Err(OAuthError::InvalidClient);
            }
            let secret = credentials
                .client_secret
                .as_deref()
                .ok_or(OAuthError::InvalidClient)?;
            let hash = client
                .client_secret_hash
                .as_deref()
                .ok_or(OAuthError::InvalidClient)?;
            match verify_client_secret(secret, hash) {
                Ok(()) => {}
                Err(FlowError::InvalidClientSecret) => return Err(OAuthError::InvalidClient),
                Err(e) => return Err(OAuthError::ServerError(anyhow::anyhow!(e))),
            }
        } else if let (Some(secret), Some(hash)) = (
            credentials.client_secret.as_deref(),
            client.client_secret_hash.as_deref(),
        ) {
            match verify_client_secret(secret, hash) {
                Ok(()) => {}
                Err(FlowError::InvalidClientSecret) => return Err(OAuthError::InvalidClient),
                Err(e) => return Err(OAuthError::ServerError(anyhow::anyhow!(e))),
            }
        }

        Ok(client)
    }

    /// Introspection and revocation are restricted to confidential clients.
    pub fn ensure_confidential(&self, client: &OAuthClient) -> Result<(), OAuthError> {
        if client.confidential {
            Ok(())
        } else {
            Err(OAuthError::InvalidClient)
        }
    }

    // ========================================================================
    // Authorization codes
    // ========================================================================

    /// Issue an authorization code after login and consent.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_authorization_code(
        &self,
        client: &OAuthClient,
        user: &User,
        redirect_uri: &str,
        scope: &str,
        nonce: Option<&str>,
        code_challenge: Option<&str>,
        code_challenge_method: Option<&str>,
    ) -> Result<String, OAuthError> {
        let code = Uuid::new_v4().to_string();

        // A challenge without a method defaults to S256.
        let method = code_challenge
            .is_some()
            .then(|| code_challenge_method.unwrap_or(PKCE_METHOD_S256));

        self.code_repo
            .create(
                &code,
                client.id,
                user.id,
                redirect_uri,
                scope,
                nonce,
                code_challenge,
                method,
                self.code_expiry_seconds,
            )
            .await?;

        tracing::info!(
            client_id = %client.client_id,
            user_id = user.id,
            scope = %scope,
            "authorization code issued"
        );
        Ok(code)
    }

    /// Exchange an authorization code for tokens (`grant_type=authorization_code`).
    pub async fn exchange_authorization_code(
        &self,
        client: &OAuthClient,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenResponse, OAuthError> {
        const BAD_CODE: &str = "Invalid or expired authorization code";

        if Uuid::parse_str(code).is_err() {
            return Err(OAuthError::InvalidGrant(BAD_CODE.to_string()));
        }

        let auth_code = self
            .code_repo
            .find_by_code(code)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant(BAD_CODE.to_string()))?;

        if auth_code.is_exchanged() || auth_code.is_expired() {
            return Err(OAuthError::InvalidGrant(BAD_CODE.to_string()));
        }

        if auth_code.client_id != client.id {
            return Err(OAuthError::InvalidGrant(
                "Authorization code was not issued to this client".to_string(),
            ));
        }

        // Byte-for-byte match with the URI used at /oauth/authorize.
        if auth_code.redirect_uri != redirect_uri {
            return Err(OAuthError::InvalidGrant(
                "redirect_uri does not match".to_string(),
            ));
        }

        // Public clients must always prove the verifier. A confidential
        // client's code issued without a challenge accepts (and ignores)
        // a stray verifier.
        if client.is_public() && code_verifier.is_none() {
            return Err(OAuthError::InvalidRequest(
                "code_verifier is required".to_string(),
            ));
        }

        if let Some(challenge) = &auth_code.code_challenge {
            let verifier = code_verifier.ok_or_else(|| {
                OAuthError::InvalidRequest("code_verifier is required".to_string())
            })?;

            if !validate_code_verifier(verifier) {
                return Err(OAuthError::InvalidRequest(
                    "Invalid code_verifier format".to_string(),
                ));
            }

            let method = auth_code
                .code_challenge_method
                .as_deref()
                .unwrap_or(PKCE_METHOD_S256);
            if !verify_pkce(verifier, challenge, method) {
                return Err(OAuthError::InvalidGrant(
                    "code_verifier does not match code_challenge".to_string(),
                ));
            }
        }

        // Single-use transition; a concurrent exchange loses here.
        if !self.code_repo.mark_exchanged(auth_code.id).await? {
            return Err(OAuthError::InvalidGrant(BAD_CODE.to_string()));
        }

        let user = self
            .user_repo
            .find_by_id(auth_code.user_id)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant(BAD_CODE.to_string()))?;

        if !user.is_active {
            return Err(OAuthError::InvalidGrant(
                "User account is not active".to_string(),
            ));
        }

        self.issue_token_pair(&user, client, &auth_code.scope).await
    }

    // ========================================================================
    // Refresh tokens
    // ========================================================================

    /// Rotate a refresh token (`grant_type=refresh_token`).
    pub async fn refresh_grant(
        &self,
        client: &OAuthClient,
        refresh_token: &str,
    ) -> Result<TokenResponse, OAuthError> {
        const BAD_TOKEN: &str = "Invalid or expired refresh token";

        if Uuid::parse_str(refresh_token).is_err() {
            return Err(OAuthError::InvalidGrant(BAD_TOKEN.to_string()));
        }

        let token = self
            .token_repo
            .find_by_token(refresh_token)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant(BAD_TOKEN.to_string()))?;

        if token.client_id != client.id {
            return Err(OAuthError::InvalidGrant(
                "Refresh token was not issued to this client".to_string(),
            ));
        }

        if token.is_exchanged() {
            return Err(OAuthError::InvalidGrant(
                "Refresh token has already been used".to_string(),
            ));
        }

        if token.is_expired() {
            return Err(OAuthError::InvalidGrant(BAD_TOKEN.to_string()));
        }

        let user = self
            .user_repo
            .find_by_id(token.user_id)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant(BAD_TOKEN.to_string()))?;

        if !user.is_active {
            return Err(OAuthError::InvalidGrant(
                "User account is not active".to_string(),
            ));
        }

        // Rotation: retire the old token, then mint a fresh pair carrying
        // the same scope.
        if !self.token_repo.mark_exchanged(token.id).await? {
            return Err(OAuthError::InvalidGrant(
                "Refresh token has already been used".to_string(),
            ));
        }

        self.issue_token_pair(&user, client, &token.scope).await
    }

    // ========================================================================
    // Introspection & revocation
    // ========================================================================

    /// RFC 7662 introspection, scoped to the authenticating client's own
    /// tokens: an access token is `active` only when its audience is the
    /// caller.
    pub async fn introspect(
        &self,
        client: &OAuthClient,
        token: &str,
    ) -> Result<IntrospectionResponse, OAuthError> {
        // Access-token path: a well-formed JWT with a valid signature.
        if let Ok(claims) = self.verifier.verify(token) {
            if claims.aud != client.client_id {
                return Ok(IntrospectionResponse::inactive());
            }
            let user = self.user_repo.find_by_public_id(&claims.sub).await?;
            let active = user.map(|u| u.is_active).unwrap_or(false);
            if !active {
                return Ok(IntrospectionResponse::inactive());
            }
            return Ok(IntrospectionResponse {
                active: true,
                scope: Some(claims.scope),
                client_id: Some(client.client_id.clone()),
                sub: Some(claims.sub),
                exp: Some(claims.exp),
                token_type: Some("access_token".to_string()),
            });
        }

        // Refresh-token path: an opaque UUID bound to this client.
        if Uuid::parse_str(token).is_ok() {
            if let Some(row) = self.token_repo.find_by_token(token).await? {
                if row.client_id == client.id && !row.is_exchanged() && !row.is_expired() {
                    let user = self.user_repo.find_by_id(row.user_id).await?;
                    if let Some(user) = user.filter(|u| u.is_active) {
                        return Ok(IntrospectionResponse {
                            active: true,
                            scope: Some(row.scope),
                            client_id: Some(client.client_id.clone()),
                            sub: Some(user.public_id),
                            exp: Some(row.expires_at.timestamp()),
                            token_type: Some("refresh_token".to_string()),
                        });
                    }
                }
            }
        }

        Ok(IntrospectionResponse::inactive())
    }

    /// RFC 7009 revocation. Refresh tokens are retired; access tokens are
    /// not tracked server-side, so revoking one silently succeeds.
    pub async fn revoke(&self, client: &OAuthClient, token: &str) -> Result<(), OAuthError> {
        if Uuid::parse_str(token).is_ok() {
            if let Some(row) = self.token_repo.find_by_token(token).await? {
                if row.client_id == client.id {
                    self.token_repo.mark_exchanged(row.id).await?;
                    tracing::info!(client_id = %client.client_id, "refresh token revoked");
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // UserInfo
    // ========================================================================

    /// Claims for the bearer of an access token, gated by its scopes.
    pub async fn userinfo(
        &self,
        token: &str,
    ) -> Result<serde_json::Map<String, serde_json::Value>, OAuthError> {
        let claims = self
            .verifier
            .verify(token)
            .map_err(|_| OAuthError::InvalidGrant("Invalid or expired token".to_string()))?;

        let user = self
            .user_repo
            .find_by_public_id(&claims.sub)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant("Invalid or expired token".to_string()))?;

        let scope_user = ScopeUser {
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            avatar_url: user.avatar_url.clone(),
            email_verified: user.email_verified,
        };

        let mut body = self.scope_registry.process_scopes(&claims.scope, &scope_user);
        body.insert(
            "sub".to_string(),
            serde_json::Value::String(user.public_id.clone()),
        );
        Ok(body)
    }

    // ========================================================================
    // Token minting
    // ========================================================================

    /// Mint an access token and, when the grant calls for it, a refresh
    /// token. The refresh row is durable before the response is returned.
    async fn issue_token_pair(
        &self,
        user: &User,
        client: &OAuthClient,
        scope: &str,
    ) -> Result<TokenResponse, OAuthError> {
        let perms = self
            .permission_repo
            .list_permission_names_for_user(user.id)
            .await?;

        let memberships: BTreeMap<String, String> = self
            .member_repo
            .list_for_user(user.id)
            .await?
            .into_iter()
            .map(|m| (m.project_public_id, m.role))
            .collect();

        let scope_user = ScopeUser {
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            avatar_url: user.avatar_url.clone(),
            email_verified: user.email_verified,
        };
        let fragments = self.scope_registry.process_scopes(scope, &scope_user);

        let profile = ProfileClaims {
            email: fragments
                .get("email")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            name: fragments
                .get("name")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            email_verified: user.email_verified,
        };

        let access_token = self
            .signer
            .sign(
                &user.public_id,
                &client.client_id,
                scope,
                profile,
                perms,
                memberships,
            )
            .map_err(OAuthError::ServerError)?;

        let wants_refresh = self.refresh_token_default
            || scope.split_whitespace().any(|s| s == OFFLINE_ACCESS_SCOPE);

        let refresh_token = if wants_refresh {
            let token = Uuid::new_v4().to_string();
            self.token_repo
                .create(
                    &token,
                    client.id,
                    user.id,
                    scope,
                    self.refresh_token_expiry_seconds,
                )
                .await?;
            Some(token)
        } else {
            None
        };

        tracing::info!(
            client_id = %client.client_id,
            user_id = user.id,
            scope = %scope,
            refresh = refresh_token.is_some(),
            "tokens issued"
        );

        Ok(TokenResponse::new(
            access_token,
            self.signer.access_token_expiry_secs(),
            refresh_token,
            scope,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_basic(id: &str, secret: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let encoded = BASE64_STANDARD.encode(format!("{}:{}", id, secret));
        headers.insert(
            header::AUTHORIZATION,
            format!("Basic {}", encoded).parse().unwrap(),
        );
        headers
    }

    #[test]
    fn basic_credentials_preferred_over_form() {
        let headers = headers_with_basic("c1", "s1");
        let creds =
            ClientCredentials::from_request(&headers, Some("form-client"), Some("form-secret"))
                .unwrap();

        assert_eq!(creds.client_id, "c1");
        assert_eq!(creds.client_secret.as_deref(), Some("s1"));
        assert!(creds.via_basic);
    }

    #[test]
    fn form_client_id_accepted_without_basic() {
        let creds =
            ClientCredentials::from_request(&HeaderMap::new(), Some("c2"), None).unwrap();
        assert_eq!(creds.client_id, "c2");
        assert_eq!(creds.client_secret, None);
        assert!(!creds.via_basic);
    }

    #[test]
    fn missing_credentials_is_invalid_request() {
        let result = ClientCredentials::from_request(&HeaderMap::new(), None, None);
        assert!(matches!(result, Err(OAuthError::InvalidRequest(_))));

        let result = ClientCredentials::from_request(&HeaderMap::new(), Some(""), None);
        assert!(matches!(result, Err(OAuthError::InvalidRequest(_))));
    }

    #[test]
    fn malformed_basic_header_is_invalid_client() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic not-base64!!!".parse().unwrap());
        let result = ClientCredentials::from_request(&headers, None, None);
        assert!(matches!(result, Err(OAuthError::InvalidClient)));

        let mut headers = HeaderMap::new();
        let no_colon = BASE64_STANDARD.encode("just-a-client-id");
        headers.insert(
            header::AUTHORIZATION,
            format!("Basic {}", no_colon).parse().unwrap(),
        );
        let result = ClientCredentials::from_request(&headers, None, None);
        assert!(matches!(result, Err(OAuthError::InvalidClient)));
    }

    #[test]
    fn secret_with_colon_splits_on_first() {
        let headers = headers_with_basic("c1", "se:cr:et");
        let creds = ClientCredentials::from_request(&headers, None, None).unwrap();
        assert_eq!(creds.client_secret.as_deref(), Some("se:cr:et"));
    }
}
