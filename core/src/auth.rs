//! Credentials and the schemes used to attach them to a request.

use std::fmt;

use secrecy::SecretString;

/// Target server root plus the caller's secret.
///
/// `base_url` is joined with request paths verbatim, so a trailing slash is
/// significant. The token is kept in a `SecretString` and never printed.
#[derive(Clone)]
pub struct Credential {
    base_url: String,
    token: SecretString,
}

impl Credential {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: SecretString::new(token.into()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> &SecretString {
        &self.token
    }

    /// Copy with the base URL replaced.
    pub fn with_base_url(&self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: self.token.clone(),
        }
    }

    /// Copy with the token replaced.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            base_url: self.base_url.clone(),
            token: SecretString::new(token.into()),
        }
    }

    /// `base_url` followed by `path`, without inserting a separator.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// How a token is attached to an outgoing request.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`; `None` sends no Authorization header.
    Bearer { token: Option<String> },
    /// `Authorization: Basic <encoded>`, where `encoded` is already
    /// `base64(user:token)`.
    Basic { encoded: String },
    /// `user:token@` inserted into the URL authority; no header.
    UserTokenInUrl { user: String, token: String },
}

impl fmt::Debug for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthScheme::Bearer { .. } => f.write_str("Bearer"),
            AuthScheme::Basic { .. } => f.write_str("Basic"),
            AuthScheme::UserTokenInUrl { user, .. } => {
                f.debug_struct("UserTokenInUrl").field("user", user).finish_non_exhaustive()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn debug_never_prints_token() {
        let cred = Credential::new("https://api.example:6443/", "s3cr3t");
        let out = format!("{cred:?}");
        assert!(out.contains("https://api.example:6443/"));
        assert!(!out.contains("s3cr3t"));

        let scheme = AuthScheme::UserTokenInUrl {
            user: "admin".to_string(),
            token: "s3cr3t".to_string(),
        };
        assert!(!format!("{scheme:?}").contains("s3cr3t"));
    }

    #[test]
    fn url_for_keeps_trailing_slash_semantics() {
        let with_slash = Credential::new("http://jenkins:8080/", "t");
        assert_eq!(with_slash.url_for("api/json"), "http://jenkins:8080/api/json");

        let without = Credential::new("http://jenkins:8080", "t");
        assert_eq!(without.url_for("api/json"), "http://jenkins:8080api/json");
    }

    #[test]
    fn with_token_leaves_original_untouched() {
        let cred = Credential::new("http://h/", "old");
        let next = cred.with_token("new");
        assert_eq!(cred.token().expose_secret(), "old");
        assert_eq!(next.token().expose_secret(), "new");
        assert_eq!(next.base_url(), "http://h/");
    }
}
