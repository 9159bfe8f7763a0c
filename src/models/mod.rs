pub mod authorization_code;
pub mod oauth_client;
pub mod otp_token;
pub mod project_member;
pub mod rbac;
pub mod refresh_token;
pub mod session;
pub mod user;
pub mod user_consent;
pub mod user_identity;
pub mod verification_token;

pub use authorization_code::AuthorizationCode;
pub use oauth_client::OAuthClient;
pub use otp_token::OtpToken;
pub use project_member::{ProjectMember, ProjectRole};
pub use rbac::{is_valid_rbac_name, Permission, Role};
pub use refresh_token::RefreshToken;
pub use session::AuthSession;
pub use user::User;
pub use user_consent::UserConsent;
pub use user_identity::UserIdentity;
pub use verification_token::EmailVerificationToken;
