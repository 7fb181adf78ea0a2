//! Session management
//!
//! Sessions live server-side, keyed by an opaque random identifier. The
//! browser only holds `{id}.{hmac_sha256(id)}` in a cookie. Nothing is
//! stored until a principal is attached.

use axum::async_trait;
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{Engine as _, engine::general_purpose};
use hmac::{Hmac, Mac};
use moka::future::Cache;
use prometheus::IntGauge;
use rand::RngCore;
use sha2::Sha256;
use std::time::Duration;

use super::principal::{Principal, SessionValue, decode_principal, encode_principal};
use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

const SESSION_ID_BYTES: usize = 32;

/// Opaque server-generated session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Server-side session storage
///
/// `attach_principal` and `destroy` must be atomic per identifier.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Allocate a new anonymous session; nothing is persisted yet
    fn create(&self) -> SessionId {
        SessionId::generate()
    }

    /// Bind a principal, replacing any previous one
    async fn attach_principal(&self, id: &SessionId, principal: &Principal)
    -> Result<(), AppError>;

    /// Current principal, or `None` for anonymous, unknown or expired sessions
    async fn lookup(&self, id: &SessionId) -> Option<Principal>;

    /// Remove the session; succeeds whether or not it existed
    async fn destroy(&self, id: &SessionId) -> Result<(), AppError>;
}

/// In-memory session store
///
/// Volatile, cleared on restart. Entries idle longer than the configured
/// max age are evicted.
pub struct MemorySessionStore {
    /// Session ID -> encoded principal
    sessions: Cache<SessionId, SessionValue>,
    active: IntGauge,
}

impl MemorySessionStore {
    /// Create a store whose sessions expire after `max_age` of inactivity
    pub fn new(max_age: Duration) -> Self {
        use crate::metrics::SESSIONS_ACTIVE;
        Self::with_gauge(max_age, SESSIONS_ACTIVE.clone())
    }

    /// Create a store that reports its size to `active`
    ///
    /// Every removal (logout, overwrite, idle expiry) is reported through
    /// the eviction listener, so the gauge stays in step with the cache.
    pub fn with_gauge(max_age: Duration, active: IntGauge) -> Self {
        let on_evict = active.clone();
        let sessions = Cache::builder()
            .time_to_idle(max_age)
            .eviction_listener(move |_id, _value, _cause| on_evict.dec())
            .build();
        Self { sessions, active }
    }

    /// Evict expired sessions now instead of on the next housekeeping pass
    pub async fn run_pending_tasks(&self) {
        self.sessions.run_pending_tasks().await;
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn attach_principal(
        &self,
        id: &SessionId,
        principal: &Principal,
    ) -> Result<(), AppError> {
        let value = encode_principal(principal).map_err(|e| AppError::Session(e.to_string()))?;
        // An overwrite reports the replaced value to the listener
        self.sessions.insert(id.clone(), value).await;
        self.active.inc();
        Ok(())
    }

    async fn lookup(&self, id: &SessionId) -> Option<Principal> {
        let value = self.sessions.get(id).await?;
        match decode_principal(value) {
            Ok(principal) => Some(principal),
            Err(error) => {
                tracing::warn!(%error, "Discarding undecodable session value");
                None
            }
        }
    }

    async fn destroy(&self, id: &SessionId) -> Result<(), AppError> {
        self.sessions.invalidate(id).await;
        Ok(())
    }
}

// =============================================================================
// Cookie
// =============================================================================

/// Sign a session ID for the cookie
///
/// Format: `{id}.{base64url(hmac_sha256(id))}`
pub fn sign_session_id(id: &SessionId, secret: &str) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Session(e.to_string()))?;
    mac.update(id.as_str().as_bytes());
    let signature = general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", id.as_str(), signature))
}

/// Verify a signed cookie value and recover the session ID
///
/// Malformed or tampered values yield `None`; the request is then anonymous.
pub fn verify_session_cookie(value: &str, secret: &str) -> Option<SessionId> {
    let (id, signature_b64) = value.split_once('.')?;
    if id.is_empty() {
        return None;
    }

    let signature = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .ok()?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(id.as_bytes());
    mac.verify_slice(&signature).ok()?;

    Some(SessionId(id.to_string()))
}

/// Session ID carried by the request, if any and validly signed
pub fn session_id_from_jar(jar: &CookieJar, cookie_name: &str, secret: &str) -> Option<SessionId> {
    jar.get(cookie_name)
        .and_then(|cookie| verify_session_cookie(cookie.value(), secret))
}

/// Build the session cookie
pub fn build_session_cookie(
    cookie_name: &str,
    signed_value: String,
    secure: bool,
    max_age: Duration,
) -> Cookie<'static> {
    Cookie::build((cookie_name.to_string(), signed_value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::try_from(max_age).unwrap_or(time::Duration::DAY))
        .build()
}

/// Session cookie as named for `CookieJar::remove`
pub fn clear_session_cookie(cookie_name: &str) -> Cookie<'static> {
    Cookie::build((cookie_name.to_string(), String::new()))
        .path("/")
        .build()
}
