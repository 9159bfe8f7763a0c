//! User consent: durable per-user-per-client scope grants.

use sqlx::MySqlPool;

use crate::error::OAuthError;
use crate::models::UserConsent;
use crate::repositories::UserConsentRepository;

/// Consent service. A request whose scopes are covered by an unrevoked
/// grant skips the consent screen.
#[derive(Clone)]
pub struct ConsentService {
    consent_repo: UserConsentRepository,
}

impl ConsentService {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            consent_repo: UserConsentRepository::new(pool),
        }
    }

    /// Whether an existing grant subsumes the requested scope string.
    pub async fn has_consent(
        &self,
        user_id: i64,
        client_id: i64,
        requested_scope: &str,
    ) -> Result<bool, OAuthError> {
        let consent = self
            .consent_repo
            .find_by_user_and_client(user_id, client_id)
            .await?;

        Ok(consent.map(|c| c.covers(requested_scope)).unwrap_or(false))
    }

    /// Store or refresh a grant (upsert; re-granting clears a revocation).
    pub async fn grant(
        &self,
        user_id: i64,
        client_id: i64,
        scope: &str,
    ) -> Result<UserConsent, OAuthError> {
        let consent = self.consent_repo.upsert(user_id, client_id, scope).await?;
        tracing::info!(user_id, client_id, scope = %scope, "consent granted");
        Ok(consent)
    }

    /// Revoke a grant.
    pub async fn revoke(&self, user_id: i64, client_id: i64) -> Result<(), OAuthError> {
        self.consent_repo.revoke(user_id, client_id).await?;
        tracing::info!(user_id, client_id, "consent revoked");
        Ok(())
    }

    /// All active grants for a user.
    pub async fn list(&self, user_id: i64) -> Result<Vec<UserConsent>, OAuthError> {
        Ok(self.consent_repo.list_by_user(user_id).await?)
    }
}
