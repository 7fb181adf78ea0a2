//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, config/local.toml)
//! 3. Environment variables (GITHUB_LOGIN__*, override)
//! 4. `GITHUB_CLIENT_ID` / `GITHUB_CLIENT_SECRET`

use serde::Deserialize;
use std::path::Path;

use crate::error::AppError;

const MIN_SESSION_SECRET_BYTES: usize = 32;

/// Ten years; the session cache refuses idle timeouts beyond 1000 years
const MAX_SESSION_MAX_AGE_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub github: GitHubOAuthConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 3000)
    pub port: u16,
    /// Externally visible base URL (e.g., "https://login.example.com")
    pub public_url: String,
}

impl ServerConfig {
    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.public_url.trim_end_matches('/')
    }
}

/// GitHub OAuth configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubOAuthConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Defaults to `{server.public_url}/auth/github/callback`
    #[serde(default)]
    pub callback_url: String,
    /// Requested scope (default: "user")
    pub scope: String,
    pub authorize_url: String,
    pub token_url: String,
    /// Profile endpoint queried with the access token
    pub user_api_url: String,
}

/// Session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Name of the session cookie (default: "sid")
    pub cookie_name: String,
    /// Cookie signing secret (32+ bytes). Generated at startup when empty.
    #[serde(default)]
    pub secret: String,
    /// Idle lifetime of a session in seconds (default: 86400)
    pub max_age_seconds: u64,
    /// Set when `secret` was generated rather than configured
    #[serde(skip)]
    pub secret_generated: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub fn filter_directive(&self) -> String {
        format!("github_login={},tower_http=debug", self.level)
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    /// Load configuration from `config/` and the process environment
    ///
    /// # Errors
    /// Returns `AppError::Config` if the GitHub credentials are missing
    /// or any value is invalid.
    pub fn load() -> Result<Self, AppError> {
        let env: config::Map<String, String> = std::env::vars().collect();
        Self::load_from(Some(Path::new("config")), env)
    }

    /// Load configuration from an explicit directory and environment map
    ///
    /// `config_dir = None` skips file sources entirely.
    pub fn load_from(
        config_dir: Option<&Path>,
        env: config::Map<String, String>,
    ) -> Result<Self, AppError> {
        use config::{Config, Environment, File};

        let mut builder = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.public_url", "http://localhost:3000")?
            .set_default("github.scope", "user")?
            .set_default(
                "github.authorize_url",
                "https://github.com/login/oauth/authorize",
            )?
            .set_default(
                "github.token_url",
                "https://github.com/login/oauth/access_token",
            )?
            .set_default("github.user_api_url", "https://api.github.com/user")?
            .set_default("session.cookie_name", "sid")?
            .set_default("session.max_age_seconds", 86400)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?;

        if let Some(dir) = config_dir {
            builder = builder
                .add_source(File::with_name(&dir.join("default").to_string_lossy()).required(false))
                .add_source(File::with_name(&dir.join("local").to_string_lossy()).required(false));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("GITHUB_LOGIN")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(env.clone())),
            )
            .set_override_option("github.client_id", env.get("GITHUB_CLIENT_ID").cloned())?
            .set_override_option(
                "github.client_secret",
                env.get("GITHUB_CLIENT_SECRET").cloned(),
            )?
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let mut app_config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;
        app_config.validate()?;
        app_config.resolve();
        Ok(app_config)
    }

    /// Secure cookies whenever the public URL is served over https
    pub fn should_use_secure_cookies(&self) -> bool {
        self.server
            .public_url
            .trim_start()
            .to_ascii_lowercase()
            .starts_with("https://")
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.github.client_id.trim().is_empty() {
            return Err(AppError::Config("GITHUB_CLIENT_ID is required".to_string()));
        }

        if self.github.client_secret.trim().is_empty() {
            return Err(AppError::Config(
                "GITHUB_CLIENT_SECRET is required".to_string(),
            ));
        }

        if url::Url::parse(&self.server.public_url).is_err() {
            return Err(AppError::Config(format!(
                "server.public_url is not a valid URL: {}",
                self.server.public_url
            )));
        }

        if !self.session.secret.is_empty()
            && self.session.secret.as_bytes().len() < MIN_SESSION_SECRET_BYTES
        {
            return Err(AppError::Config(format!(
                "session.secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        if self.session.max_age_seconds == 0 {
            return Err(AppError::Config(
                "session.max_age_seconds must be greater than 0".to_string(),
            ));
        }

        if self.session.max_age_seconds > MAX_SESSION_MAX_AGE_SECONDS {
            return Err(AppError::Config(format!(
                "session.max_age_seconds must be at most {}",
                MAX_SESSION_MAX_AGE_SECONDS
            )));
        }

        Ok(())
    }

    /// Fill in values derived from other settings
    fn resolve(&mut self) {
        if self.github.callback_url.trim().is_empty() {
            self.github.callback_url = format!("{}/auth/github/callback", self.server.base_url());
        }

        if self.session.secret.is_empty() {
            self.session.secret = generate_secret();
            self.session.secret_generated = true;
        }
    }
}

fn generate_secret() -> String {
    use base64::{Engine as _, engine::general_purpose};
    use rand::RngCore;

    let mut bytes = [0u8; 48];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> config::Map<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn credentials() -> Vec<(&'static str, &'static str)> {
        vec![
            ("GITHUB_CLIENT_ID", "github-client-id"),
            ("GITHUB_CLIENT_SECRET", "github-client-secret"),
        ]
    }

    #[test]
    fn load_applies_defaults_and_credentials() {
        let config = AppConfig::load_from(None, env(&credentials())).expect("valid config");

        assert_eq!(config.github.client_id, "github-client-id");
        assert_eq!(config.github.client_secret, "github-client-secret");
        assert_eq!(config.github.scope, "user");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.session.cookie_name, "sid");
        assert_eq!(
            config.github.callback_url,
            "http://localhost:3000/auth/github/callback"
        );
        assert!(config.session.secret.len() >= MIN_SESSION_SECRET_BYTES);
        assert!(config.session.secret_generated);
        assert_eq!(
            config.logging.filter_directive(),
            "github_login=info,tower_http=debug"
        );
        assert!(!config.should_use_secure_cookies());
    }

    #[test]
    fn load_rejects_missing_client_id() {
        let error = AppConfig::load_from(None, env(&[("GITHUB_CLIENT_SECRET", "secret")]))
            .expect_err("missing client id must fail");
        assert!(matches!(
            error,
            AppError::Config(message) if message.contains("GITHUB_CLIENT_ID")
        ));
    }

    #[test]
    fn load_rejects_empty_client_secret() {
        let error = AppConfig::load_from(
            None,
            env(&[("GITHUB_CLIENT_ID", "id"), ("GITHUB_CLIENT_SECRET", "  ")]),
        )
        .expect_err("blank client secret must fail");
        assert!(matches!(
            error,
            AppError::Config(message) if message.contains("GITHUB_CLIENT_SECRET")
        ));
    }

    #[test]
    fn prefixed_environment_overrides_defaults() {
        let mut pairs = credentials();
        pairs.push(("GITHUB_LOGIN__SERVER__PORT", "8081"));
        pairs.push(("GITHUB_LOGIN__SERVER__PUBLIC_URL", "https://login.example.com/"));

        let config = AppConfig::load_from(None, env(&pairs)).expect("valid config");

        assert_eq!(config.server.port, 8081);
        assert!(!config.logging.is_json());
        assert_eq!(
            config.github.callback_url,
            "https://login.example.com/auth/github/callback"
        );
        assert!(config.should_use_secure_cookies());
    }

    #[test]
    fn load_rejects_short_session_secret() {
        let mut pairs = credentials();
        pairs.push(("GITHUB_LOGIN__SESSION__SECRET", "keyboard cat"));

        let error = AppConfig::load_from(None, env(&pairs))
            .expect_err("session secret shorter than 32 bytes must fail");
        assert!(matches!(
            error,
            AppError::Config(message) if message.contains("session.secret")
        ));
    }

    #[test]
    fn load_rejects_session_max_age_beyond_cache_limit() {
        let mut pairs = credentials();
        pairs.push(("GITHUB_LOGIN__SESSION__MAX_AGE_SECONDS", "1000000000000"));

        let error = AppConfig::load_from(None, env(&pairs))
            .expect_err("oversized max age must fail");
        assert!(matches!(
            error,
            AppError::Config(message) if message.contains("session.max_age_seconds")
        ));

        let mut pairs = credentials();
        pairs.push(("GITHUB_LOGIN__SESSION__MAX_AGE_SECONDS", "315360000"));
        let config = AppConfig::load_from(None, env(&pairs)).expect("ten years is accepted");
        assert_eq!(config.session.max_age_seconds, MAX_SESSION_MAX_AGE_SECONDS);
    }
}
