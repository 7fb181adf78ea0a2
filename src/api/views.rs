//! HTML views
//!
//! Plain string rendering. Every value coming from the provider is
//! escaped before it is written into the page.

use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::auth::Principal;

fn layout(title: &str, principal: Option<&Principal>, body: &str) -> String {
    let nav = match principal {
        Some(_) => r#"<a href="/">Home</a> | <a href="/account">Account</a> | <a href="/logout">Log Out</a>"#,
        None => r#"<a href="/">Home</a> | <a href="/login">Log In</a>"#,
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{title}</title></head>
<body>
<nav>{nav}</nav>
{body}
</body>
</html>
"#,
        title = encode_text(title),
    )
}

/// GET /
pub fn landing(principal: Option<&Principal>) -> String {
    let body = match principal {
        Some(principal) => format!(
            "<h2>Hello, {}.</h2>",
            encode_text(principal.label())
        ),
        None => "<h2>Welcome! Please log in.</h2>".to_string(),
    };
    layout("Home", principal, &body)
}

/// GET /login
pub fn login(principal: Option<&Principal>) -> String {
    let body = r#"<h2>Log in</h2>
<p><a href="/auth/github">Sign in with GitHub</a></p>"#;
    layout("Login", principal, body)
}

/// GET /account
///
/// # Errors
/// Fails only if the stored metadata cannot be re-serialized.
pub fn account(principal: &Principal) -> Result<String, serde_json::Error> {
    let metadata = serde_json::to_string_pretty(&principal.metadata)?;

    let optional = |value: Option<&str>| encode_text(value.unwrap_or("-")).into_owned();
    let profile_link = match principal.profile_url.as_deref() {
        Some(url) if is_web_url(url) => format!(
            r#"<a href="{}">{}</a>"#,
            encode_double_quoted_attribute(url),
            encode_text(url)
        ),
        Some(url) => encode_text(url).into_owned(),
        None => "-".to_string(),
    };

    let body = format!(
        r#"<h2>Account</h2>
<dl data-principal-id="{id_attr}">
<dt>ID</dt><dd>{id}</dd>
<dt>Provider</dt><dd>{provider}</dd>
<dt>Username</dt><dd>{username}</dd>
<dt>Name</dt><dd>{name}</dd>
<dt>Profile</dt><dd>{profile_link}</dd>
</dl>
<h3>Profile data</h3>
<pre>{metadata}</pre>"#,
        id_attr = encode_double_quoted_attribute(&principal.id),
        id = encode_text(&principal.id),
        provider = encode_text(&principal.provider),
        username = optional(principal.username.as_deref()),
        name = optional(principal.display_name.as_deref()),
        metadata = encode_text(&metadata),
    );

    Ok(layout("Account", Some(principal), &body))
}

/// Only http(s) URLs become links
fn is_web_url(value: &str) -> bool {
    url::Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}
