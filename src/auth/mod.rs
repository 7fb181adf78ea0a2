//! GitHub OAuth authentication
//!
//! Handles:
//! - GitHub OAuth flow
//! - Server-side sessions
//! - Authentication gate

mod middleware;
mod oauth;
pub mod principal;
pub mod provider;
pub mod session;

pub use middleware::{
    CurrentSession, CurrentUser, GateDecision, MaybeUser, evaluate, require_auth, restore_session,
};
pub use oauth::auth_router;
pub use principal::Principal;
pub use provider::{AuthResult, GitHubProvider, OAuthProvider, ProviderError, ProviderExchange};
pub use session::{MemorySessionStore, SessionId, SessionStore};

/// Entry point anonymous visitors are redirected to
pub const LOGIN_PATH: &str = "/login";
