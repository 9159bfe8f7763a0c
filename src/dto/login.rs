//! Wire shapes for the browser login flows.

use serde::Deserialize;

/// Query string for the login page.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginQuery {
    /// Propagated so the page can show which client requested the login.
    pub client_id: Option<String>,
    pub error: Option<String>,
}

/// Form body of `POST /login/email`.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailLoginForm {
    pub email: String,
}

/// Form body of `POST /login/otp/verify`.
#[derive(Debug, Clone, Deserialize)]
pub struct OtpVerifyForm {
    pub otp: String,
}

/// Query string of the upstream provider callback.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Query string of `GET /verify-email`.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyEmailQuery {
    pub token: Option<String>,
}
