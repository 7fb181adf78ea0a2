//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::async_trait;
use github_login::AppState;
use github_login::auth::session::{sign_session_id, verify_session_cookie};
use github_login::auth::{
    MemorySessionStore, OAuthProvider, Principal, ProviderError, ProviderExchange, SessionId,
    SessionStore,
};
use github_login::config::AppConfig;
use github_login::error::AppError;
use serde_json::json;
use tokio::net::TcpListener;
use url::Url;

pub const SESSION_SECRET: &str = "test-secret-key-32-bytes-long!!!";

/// Provider that answers from a fixed script instead of calling GitHub
///
/// - `good`  -> `{id: "42", name: "Ada"}`
/// - `grace` -> `{id: "7", name: "Grace"}`
/// - anything else -> exchange failure
pub struct ScriptedProvider;

#[async_trait]
impl OAuthProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn authorize_url(&self, state: &str) -> Url {
        let mut url = Url::parse("https://github.test/login/oauth/authorize").unwrap();
        url.query_pairs_mut()
            .append_pair("client_id", "test-client-id")
            .append_pair("scope", "user")
            .append_pair("state", state);
        url
    }

    async fn complete_authorization(
        &self,
        code: &str,
    ) -> Result<ProviderExchange, ProviderError> {
        let profile = match code {
            "good" => ada(),
            "grace" => Principal::from_github_user(json!({ "id": "7", "name": "Grace" }))?,
            _ => {
                return Err(ProviderError::Exchange(
                    "bad_verification_code".to_string(),
                ));
            }
        };

        Ok(ProviderExchange {
            access_token: "gho_test".to_string(),
            refresh_token: None,
            profile,
        })
    }
}

/// The principal produced by the `good` code
pub fn ada() -> Principal {
    Principal::from_github_user(json!({ "id": "42", "name": "Ada" })).unwrap()
}

/// Configuration as loaded from a minimal environment
pub fn test_config(extra: &[(&str, &str)]) -> AppConfig {
    let mut env: ::config::Map<String, String> = [
        ("GITHUB_CLIENT_ID", "test-client-id"),
        ("GITHUB_CLIENT_SECRET", "test-client-secret"),
        ("GITHUB_LOGIN__SESSION__SECRET", SESSION_SECRET),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    env.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));

    AppConfig::load_from(None, env).unwrap()
}

/// Memory store whose writes can be made to fail
///
/// Lookups always go to the inner store, so a failed write leaves
/// existing sessions readable.
pub struct FailingStore {
    inner: MemorySessionStore,
    fail_attach: AtomicBool,
    fail_destroy: AtomicBool,
}

impl FailingStore {
    pub fn new() -> Self {
        Self {
            inner: MemorySessionStore::new(std::time::Duration::from_secs(60)),
            fail_attach: AtomicBool::new(false),
            fail_destroy: AtomicBool::new(false),
        }
    }

    pub fn fail_attach(&self, fail: bool) {
        self.fail_attach.store(fail, Ordering::SeqCst);
    }

    pub fn fail_destroy(&self, fail: bool) {
        self.fail_destroy.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionStore for FailingStore {
    async fn attach_principal(
        &self,
        id: &SessionId,
        principal: &Principal,
    ) -> Result<(), AppError> {
        if self.fail_attach.load(Ordering::SeqCst) {
            return Err(AppError::Session("store unavailable".to_string()));
        }
        self.inner.attach_principal(id, principal).await
    }

    async fn lookup(&self, id: &SessionId) -> Option<Principal> {
        self.inner.lookup(id).await
    }

    async fn destroy(&self, id: &SessionId) -> Result<(), AppError> {
        if self.fail_destroy.load(Ordering::SeqCst) {
            return Err(AppError::Session("store unavailable".to_string()));
        }
        self.inner.destroy(id).await
    }
}

/// `sid=...` cookie pair for a session ID signed with the test secret
pub fn signed_cookie_pair(id: &SessionId) -> String {
    format!("sid={}", sign_session_id(id, SESSION_SECRET).unwrap())
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Server backed by the scripted provider
    pub async fn new() -> Self {
        let config = test_config(&[]);
        let sessions = Arc::new(MemorySessionStore::new(std::time::Duration::from_secs(
            config.session.max_age_seconds,
        )));
        let state = AppState::with_parts(config, sessions, Arc::new(ScriptedProvider));
        Self::with_state(state).await
    }

    /// Server backed by the scripted provider and an explicit session store
    pub async fn with_sessions(sessions: Arc<dyn SessionStore>) -> Self {
        let state = AppState::with_parts(test_config(&[]), sessions, Arc::new(ScriptedProvider));
        Self::with_state(state).await
    }

    /// Server for an explicit state
    pub async fn with_state(state: AppState) -> Self {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = github_login::build_router(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: format!("http://{}", addr),
            state,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// GET with an optional Cookie header
    pub async fn get(&self, path: &str, cookie: Option<&str>) -> reqwest::Response {
        let mut request = self.client.get(self.url(path));
        if let Some(cookie) = cookie {
            request = request.header("Cookie", cookie);
        }
        request.send().await.unwrap()
    }

    /// Start a login: returns the `state` sent to the provider and the
    /// `oauth_state=...` cookie pair
    pub async fn begin_login(&self) -> (String, String) {
        let response = self.get("/auth/github", None).await;
        assert!(response.status().is_redirection());

        let location = Url::parse(&location(&response)).unwrap();
        let state = location
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .expect("state parameter");
        let cookie = set_cookie_pair(&response, "oauth_state").expect("oauth_state cookie");

        (state, cookie)
    }

    /// Run the callback with a valid state; `existing` is an extra cookie pair
    pub async fn callback(&self, code: &str, existing: Option<&str>) -> reqwest::Response {
        let (state, state_cookie) = self.begin_login().await;
        let cookie = match existing {
            Some(existing) => format!("{state_cookie}; {existing}"),
            None => state_cookie,
        };

        self.get(
            &format!("/auth/github/callback?code={code}&state={state}"),
            Some(&cookie),
        )
        .await
    }

    /// Log in with `code` and return the `sid=...` cookie pair
    pub async fn login(&self, code: &str) -> String {
        let response = self.callback(code, None).await;
        assert_eq!(location(&response), "/");
        set_cookie_pair(&response, "sid").expect("session cookie")
    }

    /// Principal stored for a `sid=...` cookie pair
    pub async fn stored_principal(&self, cookie_pair: &str) -> Option<Principal> {
        let id = session_id(cookie_pair)?;
        self.state.sessions.lookup(&id).await
    }
}

/// Session ID named by a `sid=...` cookie pair
pub fn session_id(cookie_pair: &str) -> Option<SessionId> {
    let (_, value) = cookie_pair.split_once('=')?;
    verify_session_cookie(value, SESSION_SECRET)
}

pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string()
}

/// `name=value` from the Set-Cookie header for `name`, if any
pub fn set_cookie_pair(response: &reqwest::Response, name: &str) -> Option<String> {
    set_cookie_headers(response)
        .into_iter()
        .filter_map(|header| header.split(';').next().map(str::to_string))
        .find(|pair| pair.starts_with(&format!("{name}=")))
}

pub fn set_cookie_headers(response: &reqwest::Response) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok().map(ToString::to_string))
        .collect()
}
