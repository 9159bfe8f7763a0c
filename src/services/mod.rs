pub mod consent;
pub mod email;
pub mod jwks_cache;
pub mod oauth;
pub mod otp;
pub mod registration;
pub mod scope_claims;
pub mod session;
pub mod upstream;
pub mod verification;

pub use consent::ConsentService;
pub use email::{EmailSender, Mailer};
pub use jwks_cache::JwksCache;
pub use oauth::OAuthService;
pub use otp::OtpService;
pub use registration::RegistrationService;
pub use scope_claims::ScopeClaimRegistry;
pub use session::SessionService;
pub use upstream::UpstreamRegistry;
pub use verification::VerificationService;
