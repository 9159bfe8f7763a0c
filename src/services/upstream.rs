//! Upstream identity providers (Google, GitHub).
//!
//! Each adapter builds the provider's authorization URL and exchanges a
//! callback code for a normalized [`UserInfo`]. Upstream access tokens
//! never leave the adapter; only the profile snapshot comes out.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::FlowError;

/// Normalized profile returned by every provider.
#[derive(Debug, Clone, PartialEq)]
pub struct UserInfo {
    pub provider_user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: Option<String>,
}

/// An upstream identity provider.
#[async_trait]
pub trait UpstreamIdP: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Build the provider authorization URL carrying our `state`.
    fn authorization_url(&self, state: &str) -> String;

    /// Exchange a callback code for the normalized profile.
    async fn exchange_code(&self, code: &str) -> Result<UserInfo, FlowError>;
}

/// Providers by name, as configured at startup.
#[derive(Clone, Default)]
pub struct UpstreamRegistry {
    providers: HashMap<String, Arc<dyn UpstreamIdP>>,
}

impl UpstreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn UpstreamIdP>) {
        self.providers
            .insert(provider.provider_name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn UpstreamIdP>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Split a display name into first/last on the first space.
fn split_name(full: &str) -> (String, String) {
    match full.trim().split_once(' ') {
        Some((first, last)) => (first.to_string(), last.trim().to_string()),
        None => (full.trim().to_string(), String::new()),
    }
}

// ============================================================================
// Google
// ============================================================================

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

pub struct GoogleIdP {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    http: reqwest::Client,
}

impl GoogleIdP {
    pub fn new(client_id: &str, client_secret: &str, redirect_uri: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: redirect_uri.to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct GoogleUser {
    id: String,
    email: String,
    #[serde(default)]
    given_name: String,
    #[serde(default)]
    family_name: String,
    picture: Option<String>,
}

#[async_trait]
impl UpstreamIdP for GoogleIdP {
    fn provider_name(&self) -> &'static str {
        "google"
    }

    fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            GOOGLE_AUTH_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode("openid email profile"),
            urlencoding::encode(state),
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<UserInfo, FlowError> {
        let token: GoogleTokenResponse = self
            .http
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
                ("redirect_uri", &self.redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                tracing::warn!(error = %e, "google code exchange failed");
                FlowError::UpstreamExchangeFailed("Google".to_string())
            })?
            .json()
            .await
            .map_err(|_| FlowError::UpstreamExchangeFailed("Google".to_string()))?;

        let profile: GoogleUser = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                tracing::warn!(error = %e, "google userinfo fetch failed");
                FlowError::UpstreamExchangeFailed("Google".to_string())
            })?
            .json()
            .await
            .map_err(|_| FlowError::UpstreamExchangeFailed("Google".to_string()))?;

        Ok(UserInfo {
            provider_user_id: profile.id,
            email: profile.email,
            first_name: profile.given_name,
            last_name: profile.family_name,
            avatar_url: profile.picture,
        })
    }
}

// ============================================================================
// GitHub
// ============================================================================

const GITHUB_AUTH_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_USER_URL: &str = "https://api.github.com/user";
const GITHUB_EMAILS_URL: &str = "https://api.github.com/user/emails";

pub struct GitHubIdP {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    http: reqwest::Client,
}

impl GitHubIdP {
    pub fn new(client_id: &str, client_secret: &str, redirect_uri: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: redirect_uri.to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct GitHubTokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct GitHubUser {
    id: i64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

#[async_trait]
impl UpstreamIdP for GitHubIdP {
    fn provider_name(&self) -> &'static str {
        "github"
    }

    fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&scope={}&state={}",
            GITHUB_AUTH_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode("read:user user:email"),
            urlencoding::encode(state),
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<UserInfo, FlowError> {
        let token: GitHubTokenResponse = self
            .http
            .post(GITHUB_TOKEN_URL)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("code", code),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
                ("redirect_uri", &self.redirect_uri),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                tracing::warn!(error = %e, "github code exchange failed");
                FlowError::UpstreamExchangeFailed("GitHub".to_string())
            })?
            .json()
            .await
            .map_err(|_| FlowError::UpstreamExchangeFailed("GitHub".to_string()))?;

        let profile: GitHubUser = self
            .http
            .get(GITHUB_USER_URL)
            .header(reqwest::header::USER_AGENT, "idp-server")
            .bearer_auth(&token.access_token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                tracing::warn!(error = %e, "github profile fetch failed");
                FlowError::UpstreamExchangeFailed("GitHub".to_string())
            })?
            .json()
            .await
            .map_err(|_| FlowError::UpstreamExchangeFailed("GitHub".to_string()))?;

        // The profile email is often private; fall back to the primary
        // verified address from the emails API.
        let email = match profile.email {
            Some(email) => email,
            None => {
                let emails: Vec<GitHubEmail> = self
                    .http
                    .get(GITHUB_EMAILS_URL)
                    .header(reqwest::header::USER_AGENT, "idp-server")
                    .bearer_auth(&token.access_token)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|_| FlowError::UpstreamExchangeFailed("GitHub".to_string()))?
                    .json()
                    .await
                    .map_err(|_| FlowError::UpstreamExchangeFailed("GitHub".to_string()))?;

                emails
                    .into_iter()
                    .find(|e| e.primary && e.verified)
                    .map(|e| e.email)
                    .ok_or_else(|| FlowError::UpstreamExchangeFailed("GitHub".to_string()))?
            }
        };

        let (first_name, last_name) = split_name(profile.name.as_deref().unwrap_or(&profile.login));

        Ok(UserInfo {
            provider_user_id: profile.id.to_string(),
            email,
            first_name,
            last_name,
            avatar_url: profile.avatar_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn google_authorization_url_carries_state_and_scopes() {
        let idp = GoogleIdP::new("gid", "gsecret", "https://idp.example.com/auth/callback");
        let url = idp.authorization_url("st_abc/+&");

        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("client_id=gid"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=openid%20email%20profile"));
        assert!(url.contains("state=st_abc%2F%2B%26"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fidp.example.com%2Fauth%2Fcallback"));
        // The client secret never appears in the front-channel URL.
        assert!(!url.contains("gsecret"));
    }

    #[test]
    fn github_authorization_url_carries_state_and_scopes() {
        let idp = GitHubIdP::new("ghid", "ghsecret", "https://idp.example.com/auth/callback");
        let url = idp.authorization_url("st_xyz");

        assert!(url.starts_with(GITHUB_AUTH_URL));
        assert!(url.contains("client_id=ghid"));
        assert!(url.contains("scope=read%3Auser%20user%3Aemail"));
        assert!(url.contains("state=st_xyz"));
        assert!(!url.contains("ghsecret"));
    }

    #[test]
    fn split_name_handles_shapes() {
        assert_eq!(split_name("Ada Lovelace"), ("Ada".into(), "Lovelace".into()));
        assert_eq!(
            split_name("Ada King Lovelace"),
            ("Ada".into(), "King Lovelace".into())
        );
        assert_eq!(split_name("ada"), ("ada".into(), String::new()));
        assert_eq!(split_name("  Ada  "), ("Ada".into(), String::new()));
    }

    #[test]
    fn registry_resolves_by_name() {
        let mut registry = UpstreamRegistry::new();
        registry.register(Arc::new(GoogleIdP::new("g", "s", "https://x/cb")));
        registry.register(Arc::new(GitHubIdP::new("h", "s", "https://x/cb")));

        assert!(registry.get("google").is_some());
        assert!(registry.get("github").is_some());
        assert!(registry.get("gitlab").is_none());
        assert_eq!(registry.names(), vec!["github", "google"]);
    }
}
