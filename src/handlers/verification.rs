//! Email-verification endpoints.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;

use crate::config::AppState;
use crate::dto::login::VerifyEmailQuery;
use crate::error::{error_page, html_escape, FlowError};
use crate::repositories::UserRepository;

/// GET /verify-email?token=…
pub async fn verify_email_handler(
    State(state): State<AppState>,
    Query(query): Query<VerifyEmailQuery>,
) -> Result<Response, FlowError> {
    let Some(token) = query.token.as_deref().filter(|t| !t.is_empty()) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Html(error_page("The verification link is incomplete.")),
        )
            .into_response());
    };

    let user = state.verification_service().verify(token).await?;

    Ok(Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Email verified</title></head>
<body>
  <h1>Email verified</h1>
  <p>Thanks, {email} is now verified.</p>
  <p><a href="/profile">Continue</a></p>
</body>
</html>"#,
        email = html_escape(&user.email),
    ))
    .into_response())
}

/// POST /resend-verification — for the signed-in user.
pub async fn resend_verification_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, FlowError> {
    let Some(session) = state.session_service().load(&jar).await? else {
        return Ok(Redirect::to("/login").into_response());
    };
    let Some(user_id) = session.user_id else {
        return Ok(Redirect::to("/login").into_response());
    };
    let Some(user) = UserRepository::new(state.pool.clone())
        .find_by_id(user_id)
        .await?
    else {
        return Ok(Redirect::to("/login").into_response());
    };

    // No-op (and no email) when the address is already verified.
    state.verification_service().send_verification(&user).await?;

    Ok(Html(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Verification sent</title></head>
<body>
  <h1>Check your inbox</h1>
  <p>If your address still needs verification, a fresh link is on its way.</p>
  <p><a href="/profile">Back to profile</a></p>
</body>
</html>"#
            .to_string(),
    )
    .into_response())
}
