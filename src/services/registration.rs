//! First-login registration pipeline for federated users.
//!
//! A callback profile resolves, in order: an existing identity (login),
//! an existing user with the same email (identity linking), or a brand
//! new user with its identity, default project membership and global
//! role.

use serde_json::json;
use sqlx::MySqlPool;

use crate::error::FlowError;
use crate::models::{ProjectRole, User};
use crate::repositories::{
    PermissionRepository, ProjectMemberRepository, UserIdentityRepository, UserRepository,
};
use crate::services::upstream::UserInfo;
use crate::services::verification::VerificationService;
use crate::utils::secret::generate_public_id;

/// The global role every self-registered user starts with.
const DEFAULT_GLOBAL_ROLE: &str = "user";

/// Where the registration started, inferred from the `client_id` carried
/// by the original URL the user was heading to. Decides the project role
/// of the default membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationContext {
    /// Direct visit, no OAuth client involved.
    Standalone,
    /// Arrived via the configured dashboard client.
    Dashboard,
    /// Arrived via any other OAuth client.
    CustomClient,
    /// Created by admin tooling.
    AdminCreated,
}

impl RegistrationContext {
    /// Infer the context from the pre-login URL.
    pub fn from_original_url(original_url: Option<&str>, dashboard_client_id: &str) -> Self {
        let Some(url) = original_url else {
            return RegistrationContext::Standalone;
        };

        match query_param(url, "client_id") {
            Some(client_id) if client_id == dashboard_client_id => RegistrationContext::Dashboard,
            Some(_) => RegistrationContext::CustomClient,
            None => RegistrationContext::Standalone,
        }
    }

    /// The project role for the default membership.
    pub fn project_role(&self) -> ProjectRole {
        match self {
            RegistrationContext::Standalone => ProjectRole::User,
            RegistrationContext::Dashboard => ProjectRole::Member,
            RegistrationContext::CustomClient => ProjectRole::User,
            RegistrationContext::AdminCreated => ProjectRole::Member,
        }
    }
}

/// Extract a query parameter from a URL string without a full URL parser.
fn query_param(url: &str, name: &str) -> Option<String> {
    let query = url.split_once('?')?.1;
    let query = query.split('#').next().unwrap_or(query);
    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key == name {
            return urlencoding::decode(value).ok().map(|v| v.into_owned());
        }
    }
    None
}

#[derive(Clone)]
pub struct RegistrationService {
    user_repo: UserRepository,
    identity_repo: UserIdentityRepository,
    member_repo: ProjectMemberRepository,
    permission_repo: PermissionRepository,
    verification: VerificationService,
    auto_activate: bool,
    default_project_id: String,
}

impl RegistrationService {
    pub fn new(
        pool: MySqlPool,
        verification: VerificationService,
        auto_activate: bool,
        default_project_id: &str,
    ) -> Self {
        Self {
            user_repo: UserRepository::new(pool.clone()),
            identity_repo: UserIdentityRepository::new(pool.clone()),
            member_repo: ProjectMemberRepository::new(pool.clone()),
            permission_repo: PermissionRepository::new(pool),
            verification,
            auto_activate,
            default_project_id: default_project_id.to_string(),
        }
    }

    /// Resolve a federated callback profile to a local user, creating the
    /// user on first login.
    pub async fn handle_federated_login(
        &self,
        provider: &str,
        info: &UserInfo,
        context: RegistrationContext,
    ) -> Result<User, FlowError> {
        let metadata = json!({
            "email": info.email,
            "first_name": info.first_name,
            "last_name": info.last_name,
            "avatar_url": info.avatar_url,
        });

        // Returning user: identity already linked.
        if let Some(identity) = self
            .identity_repo
            .find_by_provider(provider, &info.provider_user_id)
            .await?
        {
            self.identity_repo
                .touch_login(identity.id, Some(&metadata))
                .await?;

            let user = self
                .user_repo
                .find_by_id(identity.user_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("identity without user"))?;
            return Ok(user);
        }

        // Same email, new provider: link a new identity to that user.
        if let Some(user) = self.user_repo.find_by_email(&info.email).await? {
            self.identity_repo
                .create(user.id, provider, &info.provider_user_id, Some(&metadata))
                .await?;
            tracing::info!(user_id = user.id, provider, "linked new identity");
            return Ok(user);
        }

        // First login ever: create the user and its surroundings.
        let user = self
            .user_repo
            .create(
                &generate_public_id(),
                &info.email,
                &info.first_name,
                &info.last_name,
                info.avatar_url.as_deref(),
                self.auto_activate,
            )
            .await?;

        self.identity_repo
            .create(user.id, provider, &info.provider_user_id, Some(&metadata))
            .await?;

        self.member_repo
            .create(
                &self.default_project_id,
                user.id,
                context.project_role().as_str(),
            )
            .await?;

        self.permission_repo
            .assign_role_by_name(user.id, DEFAULT_GLOBAL_ROLE)
            .await?;

        if self.auto_activate {
            self.verification.send_verification(&user).await?;
        }

        tracing::info!(user_id = user.id, provider, "registered new user");
        Ok(user)
    }
}

/// Where to send a user after a successful login.
pub fn post_login_redirect(user: &User, original_url: Option<&str>) -> String {
    if !user.is_active {
        return "/pending-activation".to_string();
    }
    match original_url {
        Some(url) if !url.is_empty() => url.to_string(),
        _ => "/profile".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const DASHBOARD: &str = "5d0a9b63-3f43-4b53-9a2a-111111111111";

    #[test]
    fn context_from_original_url() {
        assert_eq!(
            RegistrationContext::from_original_url(None, DASHBOARD),
            RegistrationContext::Standalone
        );
        assert_eq!(
            RegistrationContext::from_original_url(Some("/oauth/authorize"), DASHBOARD),
            RegistrationContext::Standalone
        );
        assert_eq!(
            RegistrationContext::from_original_url(
                Some(&format!("/oauth/authorize?client_id={}&scope=openid", DASHBOARD)),
                DASHBOARD
            ),
            RegistrationContext::Dashboard
        );
        assert_eq!(
            RegistrationContext::from_original_url(
                Some("/oauth/authorize?client_id=other-client"),
                DASHBOARD
            ),
            RegistrationContext::CustomClient
        );
    }

    #[test]
    fn context_decides_project_role() {
        assert_eq!(RegistrationContext::Standalone.project_role(), ProjectRole::User);
        assert_eq!(RegistrationContext::Dashboard.project_role(), ProjectRole::Member);
        assert_eq!(RegistrationContext::CustomClient.project_role(), ProjectRole::User);
        assert_eq!(RegistrationContext::AdminCreated.project_role(), ProjectRole::Member);
    }

    #[test]
    fn query_param_extraction() {
        assert_eq!(
            query_param("/a?client_id=x%2Fy&b=2", "client_id").as_deref(),
            Some("x/y")
        );
        assert_eq!(query_param("/a?b=2", "client_id"), None);
        assert_eq!(query_param("/a", "client_id"), None);
        assert_eq!(
            query_param("/a?client_id=x#frag", "client_id").as_deref(),
            Some("x")
        );
    }

    fn user(is_active: bool) -> User {
        User {
            id: 1,
            public_id: "usr00000000001".to_string(),
            email: "a@b.test".to_string(),
            first_name: "A".to_string(),
            last_name: "B".to_string(),
            avatar_url: None,
            is_active,
            email_verified: false,
            activated_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn redirect_prefers_pending_activation() {
        assert_eq!(
            post_login_redirect(&user(false), Some("/oauth/authorize?x=1")),
            "/pending-activation"
        );
    }

    #[test]
    fn redirect_resumes_original_url() {
        assert_eq!(
            post_login_redirect(&user(true), Some("/oauth/authorize?x=1")),
            "/oauth/authorize?x=1"
        );
        assert_eq!(post_login_redirect(&user(true), None), "/profile");
        assert_eq!(post_login_redirect(&user(true), Some("")), "/profile");
    }
}
