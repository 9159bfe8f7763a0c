//! Scope-claim registry: maps scope names to claim-fragment handlers.
//!
//! Adding a scope means registering a handler; the token and userinfo
//! paths stay free of per-scope branching. `openid` and `offline_access`
//! are presence-only scopes with no claim contribution, and unknown
//! scopes are ignored here but still echoed back in the `scope` field of
//! the token response.

use serde_json::{Map, Value};

/// The profile view handed to scope handlers.
#[derive(Debug, Clone)]
pub struct ScopeUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: Option<String>,
    pub email_verified: bool,
}

/// A handler returns the claim fragment its scope contributes.
pub type ScopeHandler = fn(&ScopeUser) -> Map<String, Value>;

/// Registry of scope handlers, iterated in registration order.
#[derive(Clone)]
pub struct ScopeClaimRegistry {
    handlers: Vec<(String, ScopeHandler)>,
}

impl ScopeClaimRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// The standard OIDC scopes.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("email", email_claims);
        registry.register("profile", profile_claims);
        registry
    }

    pub fn register(&mut self, scope: &str, handler: ScopeHandler) {
        self.handlers.push((scope.to_string(), handler));
    }

    /// Union the claim fragments for the requested scopes. Handlers run in
    /// registration order, so on key collision the later registration wins.
    pub fn process_scopes(&self, requested: &str, user: &ScopeUser) -> Map<String, Value> {
        let requested: Vec<&str> = requested.split_whitespace().collect();
        let mut claims = Map::new();

        for (scope, handler) in &self.handlers {
            if requested.iter().any(|r| r == scope) {
                for (key, value) in handler(user) {
                    claims.insert(key, value);
                }
            }
        }

        claims
    }
}

fn email_claims(user: &ScopeUser) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("email".to_string(), Value::String(user.email.clone()));
    m.insert("email_verified".to_string(), Value::Bool(user.email_verified));
    m
}

fn profile_claims(user: &ScopeUser) -> Map<String, Value> {
    let name = match (user.first_name.is_empty(), user.last_name.is_empty()) {
        (false, false) => format!("{} {}", user.first_name, user.last_name),
        (false, true) => user.first_name.clone(),
        (true, false) => user.last_name.clone(),
        (true, true) => user.email.clone(),
    };

    let mut m = Map::new();
    m.insert("name".to_string(), Value::String(name));
    m.insert("given_name".to_string(), Value::String(user.first_name.clone()));
    m.insert("family_name".to_string(), Value::String(user.last_name.clone()));
    if let Some(picture) = &user.avatar_url {
        m.insert("picture".to_string(), Value::String(picture.clone()));
    }
    m
}

/// Human-readable descriptions for the consent screen. Unknown scopes
/// fall back to the scope name itself.
pub fn scope_description(scope: &str) -> &str {
    match scope {
        "openid" => "Confirm your identity",
        "email" => "View your email address",
        "profile" => "View your basic profile (name, picture)",
        "offline_access" => "Keep access when you are offline",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> ScopeUser {
        ScopeUser {
            email: "ada@example.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            avatar_url: Some("https://cdn.example.com/ada.png".to_string()),
            email_verified: true,
        }
    }

    #[test]
    fn email_scope_contributes_email_claims() {
        let registry = ScopeClaimRegistry::with_defaults();
        let claims = registry.process_scopes("email", &user());

        assert_eq!(claims["email"], "ada@example.com");
        assert_eq!(claims["email_verified"], true);
        assert!(!claims.contains_key("name"));
    }

    #[test]
    fn profile_scope_contributes_profile_claims() {
        let registry = ScopeClaimRegistry::with_defaults();
        let claims = registry.process_scopes("profile", &user());

        assert_eq!(claims["name"], "Ada Lovelace");
        assert_eq!(claims["given_name"], "Ada");
        assert_eq!(claims["family_name"], "Lovelace");
        assert_eq!(claims["picture"], "https://cdn.example.com/ada.png");
        assert!(!claims.contains_key("email"));
    }

    #[test]
    fn picture_omitted_without_avatar() {
        let registry = ScopeClaimRegistry::with_defaults();
        let mut u = user();
        u.avatar_url = None;
        let claims = registry.process_scopes("profile", &u);
        assert!(!claims.contains_key("picture"));
    }

    #[test]
    fn openid_and_unknown_scopes_contribute_nothing() {
        let registry = ScopeClaimRegistry::with_defaults();
        let claims = registry.process_scopes("openid offline_access repo:read", &user());
        assert!(claims.is_empty());
    }

    #[test]
    fn scopes_union_across_handlers() {
        let registry = ScopeClaimRegistry::with_defaults();
        let claims = registry.process_scopes("openid email profile", &user());

        assert!(claims.contains_key("email"));
        assert!(claims.contains_key("name"));
        assert!(claims.contains_key("email_verified"));
    }

    #[test]
    fn collisions_resolve_last_registration_wins() {
        fn variant_a(_: &ScopeUser) -> Map<String, Value> {
            let mut m = Map::new();
            m.insert("tier".to_string(), Value::String("a".to_string()));
            m
        }
        fn variant_b(_: &ScopeUser) -> Map<String, Value> {
            let mut m = Map::new();
            m.insert("tier".to_string(), Value::String("b".to_string()));
            m
        }

        let mut registry = ScopeClaimRegistry::new();
        registry.register("tier_a", variant_a);
        registry.register("tier_b", variant_b);

        // Request order does not matter; registration order does.
        let claims = registry.process_scopes("tier_b tier_a", &user());
        assert_eq!(claims["tier"], "b");
    }

    #[test]
    fn descriptions_fall_back_to_scope_name() {
        assert_eq!(scope_description("email"), "View your email address");
        assert_eq!(scope_description("repo:read"), "repo:read");
    }
}
