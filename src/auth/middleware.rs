//! Authentication middleware
//!
//! `restore_session` runs for every request and attaches the
//! [`CurrentSession`]. `require_auth` is the gate for protected routes:
//! it admits or redirects to the login page, nothing else.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, State},
    http::{HeaderMap, Request, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;

use super::LOGIN_PATH;
use super::principal::Principal;
use super::session::{SessionId, session_id_from_jar};
use crate::AppState;

/// Session state restored for the current request
#[derive(Debug, Clone, Default)]
pub struct CurrentSession {
    /// Validly signed session ID from the cookie, if any
    pub id: Option<SessionId>,
    /// Principal bound to that session, if any
    pub principal: Option<Principal>,
}

impl CurrentSession {
    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }
}

/// Outcome of evaluating the auth gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Admit,
    Redirect,
}

impl GateDecision {
    fn as_str(self) -> &'static str {
        match self {
            GateDecision::Admit => "admit",
            GateDecision::Redirect => "redirect",
        }
    }
}

/// Gate evaluation: admit when a principal is present, redirect otherwise
pub fn evaluate(principal: Option<&Principal>) -> GateDecision {
    match principal {
        Some(_) => GateDecision::Admit,
        None => GateDecision::Redirect,
    }
}

/// Look up the session named by the request's cookie
pub async fn load_session(state: &AppState, headers: &HeaderMap) -> CurrentSession {
    let jar = CookieJar::from_headers(headers);
    let id = session_id_from_jar(
        &jar,
        &state.config.session.cookie_name,
        &state.config.session.secret,
    );

    let principal = match &id {
        Some(id) => state.sessions.lookup(id).await,
        None => None,
    };

    CurrentSession { id, principal }
}

/// Middleware restoring the session for every request
pub async fn restore_session(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let session = load_session(&state, request.headers()).await;
    request.extensions_mut().insert(session);
    next.run(request).await
}

/// Middleware to require authentication
///
/// Adds the `Principal` to request extensions when admitted.
///
/// # Usage
/// ```ignore
/// let protected_routes = Router::new()
///     .route("/account", get(account))
///     .layer(middleware::from_fn_with_state(state, require_auth));
/// ```
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let session = match request.extensions().get::<CurrentSession>() {
        Some(session) => session.clone(),
        None => load_session(&state, request.headers()).await,
    };

    let decision = evaluate(session.principal.as_ref());

    use crate::metrics::GATE_DECISIONS_TOTAL;
    GATE_DECISIONS_TOTAL
        .with_label_values(&[decision.as_str()])
        .inc();

    match (decision, session.principal) {
        (GateDecision::Admit, Some(principal)) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        _ => {
            tracing::debug!(path = %request.uri().path(), "Anonymous request redirected to login");
            Redirect::to(LOGIN_PATH).into_response()
        }
    }
}

/// Extractor for the authenticated principal
///
/// Rejects with a redirect to the login page.
///
/// # Usage
/// ```ignore
/// async fn handler(CurrentUser(principal): CurrentUser) -> impl IntoResponse {
///     format!("Hello, {}", principal.label())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let MaybeUser(principal) = match MaybeUser::from_request_parts(parts, state).await {
            Ok(user) => user,
            Err(infallible) => match infallible {},
        };

        principal
            .map(CurrentUser)
            .ok_or_else(|| Redirect::to(LOGIN_PATH))
    }
}

/// Optional current user extractor
///
/// Returns None if not authenticated, instead of error.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Principal>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>().cloned() {
            return Ok(MaybeUser(Some(principal)));
        }

        if let Some(session) = parts.extensions.get::<CurrentSession>() {
            return Ok(MaybeUser(session.principal.clone()));
        }

        let app_state = AppState::from_ref(state);
        let session = load_session(&app_state, &parts.headers).await;
        let principal = session.principal.clone();
        parts.extensions.insert(session);

        Ok(MaybeUser(principal))
    }
}
