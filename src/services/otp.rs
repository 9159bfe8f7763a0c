//! Email OTP login.
//!
//! Issuance is rate limited per address over a rolling window, and an
//! unknown address never triggers a send. Verification consumes the
//! latest matching code through a guarded update so a code verifies at
//! most once even under concurrent attempts.

use sqlx::MySqlPool;

use crate::error::FlowError;
use crate::models::User;
use crate::repositories::{OtpTokenRepository, UserRepository};
use crate::services::email::Mailer;
use crate::utils::secret::{generate_otp, sha256_hex};

#[derive(Clone)]
pub struct OtpService {
    user_repo: UserRepository,
    otp_repo: OtpTokenRepository,
    mailer: Mailer,
    expiry_seconds: i64,
    rate_limit: i64,
    rate_window_seconds: i64,
}

impl OtpService {
    pub fn new(
        pool: MySqlPool,
        mailer: Mailer,
        expiry_seconds: i64,
        rate_limit: i64,
        rate_window_seconds: i64,
    ) -> Self {
        Self {
            user_repo: UserRepository::new(pool.clone()),
            otp_repo: OtpTokenRepository::new(pool),
            mailer,
            expiry_seconds,
            rate_limit,
            rate_window_seconds,
        }
    }

    /// Issue a login code to a registered address.
    ///
    /// Fails `EmailNotRegistered` for unknown addresses without sending
    /// anything, and `OtpRateLimited` once the window is exhausted.
    /// Returns the canonical (stored) form of the address so the rest of
    /// the flow is insensitive to the casing the user typed.
    pub async fn request_code(&self, email: &str) -> Result<String, FlowError> {
        let user = self
            .user_repo
            .find_by_email(email)
            .await?
            .ok_or(FlowError::EmailNotRegistered)?;

        let recent = self
            .otp_repo
            .count_recent(&user.email, self.rate_window_seconds)
            .await?;
        if recent >= self.rate_limit {
            tracing::warn!(email = %user.email, "OTP rate limit hit");
            return Err(FlowError::OtpRateLimited);
        }

        let code = generate_otp();
        self.otp_repo
            .create(&user.email, &sha256_hex(&code), self.expiry_seconds)
            .await?;

        self.mailer
            .send_otp_code(&user.email, &code)
            .await
            .map_err(FlowError::InternalError)?;

        tracing::info!(email = %user.email, "OTP issued");
        Ok(user.email)
    }

    /// Verify a submitted code and return the signed-in user.
    ///
    /// Two-step atomic consumption: find the latest valid row, then mark
    /// it used behind a `used_at IS NULL` guard. If the guard hits zero
    /// rows a concurrent verification won; this one fails.
    pub async fn verify_code(&self, email: &str, code: &str) -> Result<User, FlowError> {
        let row = self
            .otp_repo
            .find_valid(email, &sha256_hex(code))
            .await?
            .ok_or(FlowError::InvalidOtp)?;

        if !self.otp_repo.mark_used(row.id).await? {
            return Err(FlowError::InvalidOtp);
        }

        let user = self
            .user_repo
            .find_by_email(email)
            .await?
            .ok_or(FlowError::EmailNotRegistered)?;

        tracing::info!(email = %email, "OTP verified");
        Ok(user)
    }
}
