//! RS256 access-token signing and validation, plus JWKS publishing.
//!
//! Access tokens are JWTs signed with a single RSA key identified by a
//! stable `kid` embedded in the token header. The matching public key is
//! published at `/.well-known/jwks.json` so resource servers can validate
//! tokens without sharing secrets.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rsa::{pkcs8::DecodePublicKey, traits::PublicKeyParts, RsaPublicKey};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RpcError;

/// Claims carried by every access token.
///
/// `sub` is the user's opaque public id, `aud` the requesting `client_id`.
/// `perms` is the flattened global permission set and `memberships` maps
/// project public ids to the user's role within that project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub perms: Vec<String>,
    #[serde(default)]
    pub memberships: BTreeMap<String, String>,
    #[serde(default)]
    pub email_verified: bool,
}

impl AccessTokenClaims {
    /// Check if the token carries a specific scope.
    #[allow(dead_code)]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope.split_whitespace().any(|s| s == scope)
    }
}

/// Signs access tokens with a fixed RSA key and `kid`.
#[derive(Clone)]
pub struct TokenSigner {
    encoding_key: Arc<EncodingKey>,
    kid: String,
    issuer: String,
    access_token_expiry_secs: i64,
}

/// Profile claims selected by the granted scopes, merged into the token.
#[derive(Debug, Clone, Default)]
pub struct ProfileClaims {
    pub email: Option<String>,
    pub name: Option<String>,
    pub email_verified: bool,
}

impl TokenSigner {
    /// Create a new signer from an RSA private key in PEM format
    /// (PKCS#1 or PKCS#8).
    pub fn new(
        private_key_pem: &str,
        kid: &str,
        issuer: &str,
        access_token_expiry_secs: i64,
    ) -> anyhow::Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| anyhow::anyhow!("invalid private key: {}", e))?;

        Ok(Self {
            encoding_key: Arc::new(encoding_key),
            kid: kid.to_string(),
            issuer: issuer.to_string(),
            access_token_expiry_secs,
        })
    }

    /// Mint an access token.
    ///
    /// # Arguments
    /// * `subject` - The user's public id
    /// * `audience` - The requesting client_id
    /// * `scope` - Space-separated granted scopes
    /// * `profile` - Scope-gated profile claims
    /// * `perms` - Flattened global permission set
    /// * `memberships` - Project public id -> role in that project
    ///
    /// Refuses to issue when the configured issuer is empty: a token
    /// without `iss` can never be validated downstream.
    pub fn sign(
        &self,
        subject: &str,
        audience: &str,
        scope: &str,
        profile: ProfileClaims,
        perms: Vec<String>,
        memberships: BTreeMap<String, String>,
    ) -> anyhow::Result<String> {
        if self.issuer.is_empty() {
            return Err(anyhow::anyhow!("refusing to sign token with empty issuer"));
        }

        let now = Utc::now();
        let claims = AccessTokenClaims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            aud: audience.to_string(),
            exp: (now + Duration::seconds(self.access_token_expiry_secs)).timestamp(),
            iat: now.timestamp(),
            nbf: Some(now.timestamp()),
            jti: Some(Uuid::new_v4().to_string()),
            scope: scope.to_string(),
            email: profile.email,
            name: profile.name,
            perms,
            memberships,
            email_verified: profile.email_verified,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());

        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("token encoding failed: {}", e))
    }

    pub fn access_token_expiry_secs(&self) -> i64 {
        self.access_token_expiry_secs
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }
}

/// Validates access tokens against a known public key.
///
/// Signature, `exp` and `iss` are always checked; the audience check is
/// opt-in and driven by configuration.
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: Arc<DecodingKey>,
    issuer: String,
    validate_audience: bool,
}

impl TokenVerifier {
    /// Create a verifier from an RSA public key in PEM format.
    pub fn new(public_key_pem: &str, issuer: &str, validate_audience: bool) -> anyhow::Result<Self> {
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| anyhow::anyhow!("invalid public key: {}", e))?;

        Ok(Self {
            decoding_key: Arc::new(decoding_key),
            issuer: issuer.to_string(),
            validate_audience,
        })
    }

    /// Verify a token and return its claims.
    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, RpcError> {
        verify_with_key(token, &self.decoding_key, &self.issuer, self.validate_audience, None)
    }

    /// Verify a token and additionally require a specific audience.
    #[allow(dead_code)]
    pub fn verify_for_audience(
        &self,
        token: &str,
        audience: &str,
    ) -> Result<AccessTokenClaims, RpcError> {
        verify_with_key(
            token,
            &self.decoding_key,
            &self.issuer,
            true,
            Some(audience),
        )
    }
}

/// Verify a token against an explicit decoding key. Used both by the local
/// verifier and by the resource-side interceptor working off cached JWKS
/// keys.
pub fn verify_with_key(
    token: &str,
    key: &DecodingKey,
    issuer: &str,
    validate_audience: bool,
    expected_audience: Option<&str>,
) -> Result<AccessTokenClaims, RpcError> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = true;
    validation.set_issuer(&[issuer]);
    if validate_audience {
        if let Some(aud) = expected_audience {
            validation.set_audience(&[aud]);
        } else {
            // Audience is enforced per-call; without an expectation we
            // only verify its presence via the claims struct.
            validation.validate_aud = false;
        }
    } else {
        validation.validate_aud = false;
    }

    decode::<AccessTokenClaims>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                RpcError::Unauthenticated("token expired".to_string())
            }
            _ => RpcError::Unauthenticated("invalid token".to_string()),
        })
}

/// Extract the `kid` from a token header without verifying the signature.
pub fn extract_kid(token: &str) -> Option<String> {
    decode_header(token).ok().and_then(|h| h.kid)
}

/// A single JSON Web Key, RFC 7517 shape for an RSA signing key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub alg: String,
    pub kid: String,
    pub n: String,
    pub e: String,
}

/// The published key set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

impl JwksDocument {
    /// Build the JWKS document from an RSA public key PEM, serializing the
    /// modulus and exponent as unpadded base64url.
    pub fn from_public_key_pem(public_key_pem: &str, kid: &str) -> anyhow::Result<Self> {
        let public_key = RsaPublicKey::from_public_key_pem(public_key_pem)
            .map_err(|e| anyhow::anyhow!("invalid public key: {}", e))?;

        let n = URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be());

        Ok(Self {
            keys: vec![Jwk {
                kty: "RSA".to_string(),
                key_use: "sig".to_string(),
                alg: "RS256".to_string(),
                kid: kid.to_string(),
                n,
                e,
            }],
        })
    }
}

/// Build a `DecodingKey` from a JWK's modulus and exponent.
pub fn decoding_key_from_jwk(jwk: &Jwk) -> anyhow::Result<DecodingKey> {
    DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
        .map_err(|e| anyhow::anyhow!("invalid JWK components: {}", e))
}

#[cfg(test)]
pub(crate) mod test_keys {
    use once_cell::sync::Lazy;
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use rsa::{RsaPrivateKey, RsaPublicKey};

    /// A freshly generated RSA key pair shared across tests. Key
    /// generation is slow, so do it once.
    pub static TEST_KEY_PAIR: Lazy<(String, String)> = Lazy::new(|| {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("keygen");
        let public_key = RsaPublicKey::from(&private_key);
        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .expect("private pem")
            .to_string();
        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .expect("public pem");
        (private_pem, public_pem)
    });

    /// A second, unrelated key pair for rotation tests.
    pub static OTHER_KEY_PAIR: Lazy<(String, String)> = Lazy::new(|| {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("keygen");
        let public_key = RsaPublicKey::from(&private_key);
        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .expect("private pem")
            .to_string();
        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .expect("public pem");
        (private_pem, public_pem)
    });
}

#[cfg(test)]
mod tests {
    use super::test_keys::{OTHER_KEY_PAIR, TEST_KEY_PAIR};
    use super::*;

    const ISSUER: &str = "https://idp.example.com";

    fn signer() -> TokenSigner {
        TokenSigner::new(&TEST_KEY_PAIR.0, "key-1", ISSUER, 3600).unwrap()
    }

    fn verifier() -> TokenVerifier {
        TokenVerifier::new(&TEST_KEY_PAIR.1, ISSUER, false).unwrap()
    }

    fn sample_memberships() -> BTreeMap<String, String> {
        let mut m = BTreeMap::new();
        m.insert("proj0000000001".to_string(), "member".to_string());
        m
    }

    #[test]
    fn sign_verify_round_trip_preserves_claims() {
        let token = signer()
            .sign(
                "usr00000000001",
                "client-abc",
                "openid email",
                ProfileClaims {
                    email: Some("a@b.test".to_string()),
                    name: Some("Ada Lovelace".to_string()),
                    email_verified: true,
                },
                vec!["employee:read".to_string()],
                sample_memberships(),
            )
            .unwrap();

        let claims = verifier().verify(&token).unwrap();
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.sub, "usr00000000001");
        assert_eq!(claims.aud, "client-abc");
        assert_eq!(claims.scope, "openid email");
        assert_eq!(claims.email.as_deref(), Some("a@b.test"));
        assert_eq!(claims.name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(claims.perms, vec!["employee:read"]);
        assert_eq!(claims.memberships, sample_memberships());
        assert!(claims.email_verified);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn token_header_carries_kid() {
        let token = signer()
            .sign("u", "c", "openid", ProfileClaims::default(), vec![], BTreeMap::new())
            .unwrap();
        assert_eq!(extract_kid(&token).as_deref(), Some("key-1"));
    }

    #[test]
    fn signer_refuses_empty_issuer() {
        let signer = TokenSigner::new(&TEST_KEY_PAIR.0, "key-1", "", 3600).unwrap();
        let result = signer.sign("u", "c", "openid", ProfileClaims::default(), vec![], BTreeMap::new());
        assert!(result.is_err());
    }

    #[test]
    fn wrong_issuer_fails_validation() {
        let token = signer()
            .sign("u", "c", "openid", ProfileClaims::default(), vec![], BTreeMap::new())
            .unwrap();
        let other = TokenVerifier::new(&TEST_KEY_PAIR.1, "https://other.example.com", false).unwrap();
        assert!(matches!(other.verify(&token), Err(RpcError::Unauthenticated(_))));
    }

    #[test]
    fn wrong_key_fails_validation() {
        let token = signer()
            .sign("u", "c", "openid", ProfileClaims::default(), vec![], BTreeMap::new())
            .unwrap();
        let other = TokenVerifier::new(&OTHER_KEY_PAIR.1, ISSUER, false).unwrap();
        assert!(matches!(other.verify(&token), Err(RpcError::Unauthenticated(_))));
    }

    #[test]
    fn audience_check_is_opt_in() {
        let token = signer()
            .sign("u", "client-abc", "openid", ProfileClaims::default(), vec![], BTreeMap::new())
            .unwrap();

        // Lenient verifier accepts any audience.
        assert!(verifier().verify(&token).is_ok());

        // Strict check rejects a different audience.
        let strict = TokenVerifier::new(&TEST_KEY_PAIR.1, ISSUER, true).unwrap();
        assert!(strict.verify_for_audience(&token, "client-abc").is_ok());
        assert!(strict.verify_for_audience(&token, "client-xyz").is_err());
    }

    #[test]
    fn expired_token_fails_validation() {
        let signer = TokenSigner::new(&TEST_KEY_PAIR.0, "key-1", ISSUER, -120).unwrap();
        let token = signer
            .sign("u", "c", "openid", ProfileClaims::default(), vec![], BTreeMap::new())
            .unwrap();

        let err = verifier().verify(&token).unwrap_err();
        match err {
            RpcError::Unauthenticated(msg) => assert!(msg.contains("expired")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn jwks_document_shape() {
        let doc = JwksDocument::from_public_key_pem(&TEST_KEY_PAIR.1, "key-1").unwrap();
        assert_eq!(doc.keys.len(), 1);
        let jwk = &doc.keys[0];
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.key_use, "sig");
        assert_eq!(jwk.alg, "RS256");
        assert_eq!(jwk.kid, "key-1");
        assert!(!jwk.n.is_empty());
        assert!(!jwk.e.is_empty());
        // base64url without padding
        assert!(!jwk.n.contains('='));
        assert!(!jwk.n.contains('+'));
        assert!(!jwk.n.contains('/'));
    }

    #[test]
    fn jwk_round_trips_into_decoding_key() {
        let token = signer()
            .sign("u", "c", "openid", ProfileClaims::default(), vec![], BTreeMap::new())
            .unwrap();

        let doc = JwksDocument::from_public_key_pem(&TEST_KEY_PAIR.1, "key-1").unwrap();
        let key = decoding_key_from_jwk(&doc.keys[0]).unwrap();
        let claims = verify_with_key(&token, &key, ISSUER, false, None).unwrap();
        assert_eq!(claims.sub, "u");
    }
}
