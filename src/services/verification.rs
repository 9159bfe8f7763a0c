//! Email verification: one-shot 256-bit tokens mailed as links.

use sqlx::MySqlPool;

use crate::error::FlowError;
use crate::models::User;
use crate::repositories::{UserRepository, VerificationTokenRepository};
use crate::services::email::Mailer;
use crate::utils::secret::{generate_verification_token, sha256_hex};

#[derive(Clone)]
pub struct VerificationService {
    user_repo: UserRepository,
    token_repo: VerificationTokenRepository,
    mailer: Mailer,
    expiry_hours: i64,
}

impl VerificationService {
    pub fn new(pool: MySqlPool, mailer: Mailer, expiry_hours: i64) -> Self {
        Self {
            user_repo: UserRepository::new(pool.clone()),
            token_repo: VerificationTokenRepository::new(pool),
            mailer,
            expiry_hours,
        }
    }

    /// Issue and mail a fresh verification token.
    ///
    /// Prior unused tokens are invalidated first so at most one link is
    /// live per user. An already-verified user is a silent success.
    pub async fn send_verification(&self, user: &User) -> Result<(), FlowError> {
        if user.email_verified {
            return Ok(());
        }

        self.token_repo.invalidate_user_tokens(user.id).await?;

        let token = generate_verification_token();
        self.token_repo
            .create(user.id, &sha256_hex(&token), self.expiry_hours)
            .await?;

        self.mailer
            .send_verification_link(&user.email, &token)
            .await
            .map_err(FlowError::InternalError)?;

        tracing::info!(user_id = user.id, "verification email sent");
        Ok(())
    }

    /// Consume a verification token and mark the user verified.
    ///
    /// The guarded mark-used makes consumption single-use: replaying a
    /// once-valid token fails `InvalidVerificationToken`. Marking the
    /// user verified also fills `activated_at` on first verification.
    pub async fn verify(&self, token: &str) -> Result<User, FlowError> {
        let row = self
            .token_repo
            .find_valid(&sha256_hex(token))
            .await?
            .ok_or(FlowError::InvalidVerificationToken)?;

        if !self.token_repo.mark_used(row.id).await? {
            return Err(FlowError::InvalidVerificationToken);
        }

        self.user_repo.mark_email_verified(row.user_id).await?;

        let user = self
            .user_repo
            .find_by_id(row.user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("verified user disappeared"))?;

        tracing::info!(user_id = user.id, "email verified");
        Ok(user)
    }
}
