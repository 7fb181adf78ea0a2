//! Landing and account pages

use axum::{Router, middleware, response::Html, routing::get};

use super::views;
use crate::AppState;
use crate::auth::{CurrentUser, MaybeUser, require_auth};
use crate::error::AppError;

/// Create pages router
///
/// Routes:
/// - GET / - Landing page, anonymous or not
/// - GET /account - Principal details, behind the auth gate
pub fn pages_router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/account", get(account))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    Router::new().route("/", get(landing)).merge(protected)
}

/// GET /
async fn landing(MaybeUser(principal): MaybeUser) -> Html<String> {
    Html(views::landing(principal.as_ref()))
}

/// GET /account
async fn account(CurrentUser(principal): CurrentUser) -> Result<Html<String>, AppError> {
    let page = views::account(&principal).map_err(|e| AppError::Internal(e.into()))?;
    Ok(Html(page))
}
