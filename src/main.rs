mod config;
mod dto;
mod error;
mod handlers;
mod middleware;
mod models;
mod repositories;
mod services;
mod utils;

use axum::{
    http::{header, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{AppState, Config};
use crate::handlers::{
    api::{get_project_handler, list_projects_handler, principal_handler},
    login::{
        callback_handler, email_login_page_handler, email_login_submit_handler,
        login_page_handler, logout_handler, otp_page_handler, otp_verify_handler,
        pending_activation_handler, profile_handler, provider_start_handler, root_handler,
    },
    oauth::{
        authorize_decision_handler, authorize_handler, introspect_handler, revoke_handler,
        token_handler, userinfo_handler,
    },
    verification::{resend_verification_handler, verify_email_handler},
    wellknown::{jwks_handler, openid_configuration_handler},
};
use crate::middleware::bearer_auth_middleware;
use crate::services::email::{EmailConfig, EmailSender, NoopEmailSender, SmtpEmailSender};

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness check - verifies database connection
async fn ready_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<HealthResponse>, axum::http::StatusCode> {
    sqlx::query("SELECT 1")
        .execute(&state.pool)
        .await
        .map_err(|_| axum::http::StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(Json(HealthResponse {
        status: "ready",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// Create the application router with all routes configured.
///
/// ## Browser routes (cookie session)
/// - GET  /              - route to profile or login
/// - GET  /login         - login page (providers + email)
/// - GET  /login/{provider} - start a federated login
/// - GET  /auth/callback - upstream provider callback
/// - GET  /login/email, POST /login/email - email OTP issuance
/// - GET  /login/otp, POST /login/otp/verify - OTP verification
/// - GET  /verify-email, POST /resend-verification - email verification
/// - GET  /profile, GET /pending-activation, POST /logout
///
/// ## OAuth2 / OIDC protocol routes
/// - GET/POST /oauth/authorize - authorization endpoint + consent
/// - POST /oauth/token      - token endpoint
/// - POST /oauth/revoke     - revocation endpoint
/// - POST /oauth/introspect - introspection endpoint
/// - GET  /oauth/userinfo   - userinfo endpoint
/// - GET  /.well-known/openid-configuration, /.well-known/jwks.json
///
/// ## Protected resource API (bearer token via JWKS)
/// - GET /api/projects - projects visible to the caller
/// - GET /api/profile  - the authenticated principal
pub fn create_router(state: AppState) -> Router {
    // Browser-facing login routes - cookie session, no token auth
    let browser_routes = Router::new()
        .route("/", get(root_handler))
        .route("/login", get(login_page_handler))
        .route("/login/email", get(email_login_page_handler))
        .route("/login/email", post(email_login_submit_handler))
        .route("/login/otp", get(otp_page_handler))
        .route("/login/otp/verify", post(otp_verify_handler))
        .route("/login/:provider", get(provider_start_handler))
        .route("/auth/callback", get(callback_handler))
        .route("/verify-email", get(verify_email_handler))
        .route("/resend-verification", post(resend_verification_handler))
        .route("/pending-activation", get(pending_activation_handler))
        .route("/profile", get(profile_handler))
        .route("/logout", post(logout_handler));

    // OAuth2 protocol routes
    let oauth_routes = Router::new()
        .route("/authorize", get(authorize_handler))
        .route("/authorize", post(authorize_decision_handler))
        .route("/token", post(token_handler))
        .route("/revoke", post(revoke_handler))
        .route("/introspect", post(introspect_handler))
        .route("/userinfo", get(userinfo_handler));

    // Discovery endpoints
    let wellknown_routes = Router::new()
        .route("/openid-configuration", get(openid_configuration_handler))
        .route("/jwks.json", get(jwks_handler));

    // Protected resource API - bearer token validated against the JWKS
    let api_routes = Router::new()
        .route("/projects", get(list_projects_handler))
        .route("/projects/:project_id", get(get_project_handler))
        .route("/profile", get(principal_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            bearer_auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .merge(browser_routes)
        .nest("/oauth", oauth_routes)
        .nest("/.well-known", wellknown_routes)
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([
                    header::AUTHORIZATION,
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                ])
                .max_age(Duration::from_secs(3600)),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "idp_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    // Create database pool with production settings
    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database_url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    // Email transport: SMTP when configured, logged no-op otherwise
    let email_sender: Arc<dyn EmailSender> = match EmailConfig::from_env() {
        Some(email_config) => Arc::new(SmtpEmailSender::new(email_config)?),
        None => Arc::new(NoopEmailSender),
    };

    let addr = config.socket_addr();
    let state = AppState::new(pool, config, email_sender)?;
    let app = create_router(state);

    tracing::info!(
        "idp-server v{} listening on {}",
        env!("CARGO_PKG_VERSION"),
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
