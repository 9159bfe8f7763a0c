pub mod authorization_code;
pub mod oauth_client;
pub mod otp_token;
pub mod permission;
pub mod project_member;
pub mod refresh_token;
pub mod session;
pub mod user;
pub mod user_consent;
pub mod user_identity;
pub mod verification_token;

pub use authorization_code::AuthorizationCodeRepository;
pub use oauth_client::OAuthClientRepository;
pub use otp_token::OtpTokenRepository;
pub use permission::PermissionRepository;
pub use project_member::ProjectMemberRepository;
pub use refresh_token::RefreshTokenRepository;
pub use session::SessionRepository;
pub use user::UserRepository;
pub use user_consent::UserConsentRepository;
pub use user_identity::UserIdentityRepository;
pub use verification_token::VerificationTokenRepository;
