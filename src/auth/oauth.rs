//! GitHub OAuth flow
//!
//! Every failure on the callback ends in a redirect to the login page;
//! the reason is only logged.

use axum::{
    Router,
    extract::{Query, State, rejection::QueryRejection},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use serde::Deserialize;
use std::time::Duration;

use super::middleware::MaybeUser;
use super::principal::Principal;
use super::provider::{AuthResult, ProviderError, ProviderExchange};
use super::session::{
    SessionId, build_session_cookie, clear_session_cookie, session_id_from_jar, sign_session_id,
};
use super::LOGIN_PATH;
use crate::AppState;
use crate::api::views;
use crate::error::AppError;

const OAUTH_STATE_COOKIE: &str = "oauth_state";
const OAUTH_STATE_COOKIE_PATH: &str = "/auth/github";
const OAUTH_STATE_TTL_MINUTES: i64 = 10;

/// Create authentication router
///
/// Routes:
/// - GET /login - Login page
/// - GET /logout - Logout
/// - GET /auth/github - Redirect to GitHub
/// - GET /auth/github/callback - OAuth callback
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route(LOGIN_PATH, get(login_page))
        .route("/logout", get(logout))
        .route("/auth/github", get(github_redirect))
        .route("/auth/github/callback", get(github_callback))
}

// =============================================================================
// Login Page
// =============================================================================

/// GET /login
async fn login_page(MaybeUser(principal): MaybeUser) -> Html<String> {
    Html(views::login(principal.as_ref()))
}

// =============================================================================
// GitHub OAuth
// =============================================================================

/// GET /auth/github
///
/// Issues a CSRF state in a short-lived cookie and sends the browser to
/// the provider.
async fn github_redirect(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let csrf_state = generate_csrf_state();
    let location = state.provider.authorize_url(&csrf_state);

    tracing::debug!(provider = state.provider.name(), "Redirecting to provider");

    let jar = jar.add(build_state_cookie(
        csrf_state,
        state.config.should_use_secure_cookies(),
    ));
    (jar, Redirect::to(location.as_str()))
}

/// Query parameters from the provider callback
///
/// All optional: a malformed callback is a failed login, not a 400.
#[derive(Debug, Deserialize)]
struct GitHubCallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// GET /auth/github/callback
///
/// # Steps
/// 1. Verify CSRF state against the cookie (cookie is cleared either way)
/// 2. Let the provider exchange the code and fetch the profile
/// 3. On success, bind the principal to a fresh session and redirect home
/// 4. On failure, leave the session alone and redirect to login
async fn github_callback(
    State(state): State<AppState>,
    query: Result<Query<GitHubCallbackQuery>, QueryRejection>,
    jar: CookieJar,
) -> Response {
    use crate::metrics::LOGIN_ATTEMPTS_TOTAL;

    let expected_state = jar
        .get(OAUTH_STATE_COOKIE)
        .map(|cookie| cookie.value().to_owned());
    let jar = jar.remove(Cookie::build(OAUTH_STATE_COOKIE).path(OAUTH_STATE_COOKIE_PATH));

    let exchange = match query {
        Ok(Query(query)) => complete_callback(&state, &query, expected_state.as_deref()).await,
        Err(rejection) => Err(ProviderError::MalformedCallback(rejection.body_text())),
    };

    let principal = match AuthResult::from_exchange(exchange) {
        AuthResult::Success(principal) => principal,
        AuthResult::Failure(reason) => {
            tracing::warn!(provider = state.provider.name(), %reason, "Login failed");
            LOGIN_ATTEMPTS_TOTAL.with_label_values(&["failure"]).inc();
            return (jar, Redirect::to(LOGIN_PATH)).into_response();
        }
    };

    let previous = session_id_from_jar(
        &jar,
        &state.config.session.cookie_name,
        &state.config.session.secret,
    );

    match establish_session(&state, previous.as_ref(), &principal).await {
        Ok(cookie) => {
            tracing::info!(
                provider = %principal.provider,
                principal_id = %principal.id,
                "Login succeeded"
            );
            LOGIN_ATTEMPTS_TOTAL.with_label_values(&["success"]).inc();
            (jar.add(cookie), Redirect::to("/")).into_response()
        }
        Err(error) => {
            tracing::error!(%error, "Failed to establish session after login");
            LOGIN_ATTEMPTS_TOTAL.with_label_values(&["failure"]).inc();
            (jar, Redirect::to(LOGIN_PATH)).into_response()
        }
    }
}

async fn complete_callback(
    state: &AppState,
    query: &GitHubCallbackQuery,
    expected_state: Option<&str>,
) -> Result<ProviderExchange, ProviderError> {
    if let Some(error) = &query.error {
        return Err(ProviderError::Denied(
            query
                .error_description
                .clone()
                .unwrap_or_else(|| error.clone()),
        ));
    }

    verify_csrf_state(query.state.as_deref(), expected_state)?;

    let code = query
        .code
        .as_deref()
        .filter(|code| !code.is_empty())
        .ok_or(ProviderError::MissingCode)?;

    state.provider.complete_authorization(code).await
}

/// Bind the principal under a new session ID, then discard the old one
///
/// The previous session survives if the new one cannot be stored.
async fn establish_session(
    state: &AppState,
    previous: Option<&SessionId>,
    principal: &Principal,
) -> Result<Cookie<'static>, AppError> {
    let id = state.sessions.create();
    let signed = sign_session_id(&id, &state.config.session.secret)?;
    state.sessions.attach_principal(&id, principal).await?;

    if let Some(previous) = previous {
        if let Err(error) = state.sessions.destroy(previous).await {
            tracing::warn!(%error, "Failed to discard previous session");
        }
    }

    Ok(build_session_cookie(
        &state.config.session.cookie_name,
        signed,
        state.config.should_use_secure_cookies(),
        Duration::from_secs(state.config.session.max_age_seconds),
    ))
}

// =============================================================================
// Logout
// =============================================================================

/// GET /logout
///
/// Destroys the session and clears its cookie. A store error is logged
/// and the redirect still happens.
async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    use crate::metrics::LOGOUTS_TOTAL;
    LOGOUTS_TOTAL.inc();

    let cookie_name = &state.config.session.cookie_name;
    if let Some(id) = session_id_from_jar(&jar, cookie_name, &state.config.session.secret) {
        if let Err(error) = state.sessions.destroy(&id).await {
            tracing::warn!(%error, "Failed to destroy session during logout");
        }
    }

    let jar = jar.remove(clear_session_cookie(cookie_name));
    (jar, Redirect::to("/"))
}

// =============================================================================
// Helpers
// =============================================================================

/// Generate a random CSRF state token
fn generate_csrf_state() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn build_state_cookie(csrf_state: String, secure: bool) -> Cookie<'static> {
    Cookie::build((OAUTH_STATE_COOKIE, csrf_state))
        .path(OAUTH_STATE_COOKIE_PATH)
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::minutes(OAUTH_STATE_TTL_MINUTES))
        .build()
}

/// Verify CSRF state from cookie matches callback state
fn verify_csrf_state(received: Option<&str>, expected: Option<&str>) -> Result<(), ProviderError> {
    match (received, expected) {
        (Some(received), Some(expected)) if !expected.is_empty() && received == expected => Ok(()),
        _ => Err(ProviderError::StateMismatch),
    }
}
