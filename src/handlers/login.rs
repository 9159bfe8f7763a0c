//! Browser-facing login surface: federated sign-in, email OTP fallback,
//! profile and logout.

use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use axum_extra::extract::CookieJar;

use crate::config::AppState;
use crate::dto::login::{CallbackQuery, EmailLoginForm, LoginQuery, OtpVerifyForm};
use crate::error::{html_escape, FlowError};
use crate::models::User;
use crate::repositories::UserRepository;
use crate::services::registration::{post_login_redirect, RegistrationContext};
use crate::utils::secret::generate_state_token;

/// GET / — route to the profile or the login page.
pub async fn root_handler(State(state): State<AppState>, jar: CookieJar) -> Response {
    match state.session_service().load(&jar).await {
        Ok(Some(session)) if session.is_authenticated() => {
            Redirect::to("/profile").into_response()
        }
        _ => Redirect::to("/login").into_response(),
    }
}

/// GET /login — provider buttons plus the email fallback.
pub async fn login_page_handler(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> Result<Html<String>, FlowError> {
    // Name the requesting client when we can resolve it.
    let client_name = match &query.client_id {
        Some(client_id) => state
            .oauth_service()
            .client_repo()
            .find_by_client_id(client_id)
            .await?
            .map(|c| c.name),
        None => None,
    };

    let provider_links: String = state
        .upstreams
        .names()
        .iter()
        .map(|name| {
            format!(
                r#"    <p><a href="/login/{name}">Continue with {label}</a></p>
"#,
                name = name,
                label = capitalize(name),
            )
        })
        .collect();

    let intro = match client_name {
        Some(name) => format!(
            "<p><strong>{}</strong> is asking you to sign in.</p>",
            html_escape(&name)
        ),
        None => String::new(),
    };

    let error_banner = match query.error.as_deref() {
        Some("state_mismatch") => {
            "<p>Your sign-in attempt expired. Please try again.</p>".to_string()
        }
        Some(other) => format!("<p>Sign-in failed: {}</p>", html_escape(other)),
        None => String::new(),
    };

    Ok(Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Sign in</title></head>
<body>
  <h1>Sign in</h1>
{intro}{error_banner}{provider_links}  <p><a href="/login/email">Continue with email</a></p>
</body>
</html>"#,
    )))
}

/// GET /login/{provider} — start a federated login.
pub async fn provider_start_handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> Result<Response, FlowError> {
    let upstream = state
        .upstreams
        .get(&provider)
        .ok_or_else(|| anyhow::anyhow!("unknown provider: {}", provider))
        .map_err(|_| FlowError::UpstreamExchangeFailed(provider.clone()))?;

    let sessions = state.session_service();
    let (mut session, jar) = sessions.load_or_start(jar).await?;

    let oauth_state = generate_state_token();
    session.oauth_state = Some(oauth_state.clone());
    session.oauth_provider = Some(provider);
    sessions.save(&session).await?;

    Ok((jar, Redirect::to(&upstream.authorization_url(&oauth_state))).into_response())
}

/// GET /auth/callback — upstream provider redirects back here.
pub async fn callback_handler(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<Response, FlowError> {
    if query.error.is_some() {
        return Ok(Redirect::to("/login?error=upstream_denied").into_response());
    }

    let sessions = state.session_service();
    let Some(mut session) = sessions.load(&jar).await? else {
        return Ok(Redirect::to("/login?error=state_mismatch").into_response());
    };

    // The state must round-trip exactly; anything else aborts the login.
    let expected_state = session.oauth_state.take();
    let provider_name = session.oauth_provider.take();
    sessions.save(&session).await?;

    let valid = matches!((&expected_state, &query.state), (Some(a), Some(b)) if a == b);
    if !valid {
        tracing::warn!("oauth state mismatch on callback");
        return Ok(Redirect::to("/login?error=state_mismatch").into_response());
    }

    let provider_name = provider_name
        .ok_or_else(|| anyhow::anyhow!("callback without provider in session"))?;
    let upstream = state
        .upstreams
        .get(&provider_name)
        .ok_or_else(|| anyhow::anyhow!("provider vanished: {}", provider_name))?;

    let code = query
        .code
        .as_deref()
        .ok_or(FlowError::StateMismatch)?;

    let info = upstream.exchange_code(code).await?;

    let context = RegistrationContext::from_original_url(
        session.original_url.as_deref(),
        &state.config.default_oauth_client_id,
    );

    let user = state
        .registration_service()
        .handle_federated_login(&provider_name, &info, context)
        .await?;

    finish_login(&state, session, user).await
}

/// GET /login/email — the email form.
pub async fn email_login_page_handler() -> Html<String> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Sign in with email</title></head>
<body>
  <h1>Sign in with email</h1>
  <p>We'll send a one-time code to your address.</p>
  <form method="post" action="/login/email">
    <input type="email" name="email" placeholder="you@example.com" required>
    <button type="submit">Send code</button>
  </form>
  <p><a href="/login">Back</a></p>
</body>
</html>"#
            .to_string(),
    )
}

/// POST /login/email — issue an OTP and move to the code form.
pub async fn email_login_submit_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<EmailLoginForm>,
) -> Result<Response, FlowError> {
    let email = state.otp_service().request_code(&form.email).await?;

    let sessions = state.session_service();
    let (mut session, jar) = sessions.load_or_start(jar).await?;
    session.pending_otp_email = Some(email);
    sessions.save(&session).await?;

    Ok((jar, Redirect::to("/login/otp")).into_response())
}

/// GET /login/otp — the code entry form.
pub async fn otp_page_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, FlowError> {
    let session = state.session_service().load(&jar).await?;
    let Some(email) = session.and_then(|s| s.pending_otp_email) else {
        return Ok(Redirect::to("/login/email").into_response());
    };

    Ok(Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Enter your code</title></head>
<body>
  <h1>Enter your code</h1>
  <p>We sent a 6-digit code to <strong>{email}</strong>.</p>
  <form method="post" action="/login/otp/verify">
    <input type="text" name="otp" inputmode="numeric" pattern="[0-9]{{6}}" required>
    <button type="submit">Sign in</button>
  </form>
</body>
</html>"#,
        email = html_escape(&email),
    ))
    .into_response())
}

/// POST /login/otp/verify — verify the code and establish the session.
pub async fn otp_verify_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<OtpVerifyForm>,
) -> Result<Response, FlowError> {
    let sessions = state.session_service();
    let Some(session) = sessions.load(&jar).await? else {
        return Ok(Redirect::to("/login/email").into_response());
    };
    let Some(email) = session.pending_otp_email.clone() else {
        return Ok(Redirect::to("/login/email").into_response());
    };

    let user = state.otp_service().verify_code(&email, &form.otp).await?;

    finish_login(&state, session, user).await
}

/// POST /logout
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, FlowError> {
    let jar = state.session_service().destroy(jar).await?;
    Ok((jar, Redirect::to("/login")).into_response())
}

/// GET /profile
pub async fn profile_handler(
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

    let verified = if user.email_verified {
        "verified".to_string()
    } else {
        r#"not verified — <form method="post" action="/resend-verification" style="display:inline"><button type="submit">resend verification email</button></form>"#
            .to_string()
    };

    Ok(Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Profile</title></head>
<body>
  <h1>{name}</h1>
  <p>Email: {email} ({verified})</p>
  <form method="post" action="/logout"><button type="submit">Sign out</button></form>
</body>
</html>"#,
        name = html_escape(&user.full_name()),
        email = html_escape(&user.email),
        verified = verified,
    ))
    .into_response())
}

/// GET /pending-activation
pub async fn pending_activation_handler() -> Html<String> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Account pending</title></head>
<body>
  <h1>Your account is waiting for activation</h1>
  <p>An administrator needs to activate your account before you can continue.
     You'll receive an email once it's ready.</p>
</body>
</html>"#
            .to_string(),
    )
}

/// Bind the user to the session and send them on their way.
async fn finish_login(
    state: &AppState,
    mut session: crate::models::AuthSession,
    user: User,
) -> Result<Response, FlowError> {
    let sessions = state.session_service();

    let redirect = post_login_redirect(&user, session.original_url.as_deref());
    if session.original_url.as_deref() == Some(redirect.as_str()) {
        session.original_url = None;
    }

    sessions.login(&mut session, user.id).await?;

    Ok(Redirect::to(&redirect).into_response())
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capitalize_provider_names() {
        assert_eq!(capitalize("google"), "Google");
        assert_eq!(capitalize("github"), "Github");
        assert_eq!(capitalize(""), "");
    }
}
