//! Authenticated principal
//!
//! The whole provider profile is kept as the session value. A hardened
//! deployment would store only `id` and re-fetch the profile from a
//! canonical store on each request.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::provider::ProviderError;

/// Authenticated identity attached to a session
///
/// Immutable once stored: there is no refresh flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    /// Provider name (e.g. "github")
    pub provider: String,
    /// Stable provider-assigned identifier
    pub id: String,
    /// Login handle
    #[serde(default)]
    pub username: Option<String>,
    /// Display name
    #[serde(default)]
    pub display_name: Option<String>,
    /// Public profile URL
    #[serde(default)]
    pub profile_url: Option<String>,
    /// Raw provider profile, untouched
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Principal {
    /// Build a principal from a GitHub `/user` response
    ///
    /// `id` may be a JSON number or a non-empty string; every other field
    /// is optional. The raw object is retained as `metadata`.
    pub fn from_github_user(raw: Value) -> Result<Self, ProviderError> {
        let Value::Object(metadata) = raw else {
            return Err(ProviderError::Profile(
                "profile is not a JSON object".to_string(),
            ));
        };

        let id = match metadata.get("id") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            _ => {
                return Err(ProviderError::Profile(
                    "profile has no usable id".to_string(),
                ));
            }
        };

        let text = |key: &str| {
            metadata
                .get(key)
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
        };

        Ok(Self {
            provider: "github".to_string(),
            id,
            username: text("login"),
            display_name: text("name"),
            profile_url: text("html_url"),
            metadata,
        })
    }

    /// Name shown in views: display name, then login, then id
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or(&self.id)
    }
}

/// Representation of a principal inside the session store
#[derive(Debug, Clone, PartialEq)]
pub struct SessionValue(Value);

/// Encode a principal for storage; stores the whole object
pub fn encode_principal(principal: &Principal) -> Result<SessionValue, serde_json::Error> {
    serde_json::to_value(principal).map(SessionValue)
}

/// Decode a stored principal; exact inverse of [`encode_principal`]
pub fn decode_principal(value: SessionValue) -> Result<Principal, serde_json::Error> {
    serde_json::from_value(value.0)
}
