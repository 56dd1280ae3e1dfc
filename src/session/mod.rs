use axum::http::{header::COOKIE, HeaderMap};
use secrecy::SecretString;

/// Cookie carrying the session token, scoped to the site root.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Set-Cookie value that expires the session cookie immediately.
pub const CLEAR_SESSION_COOKIE: &str =
    "access_token=; Path=/; Secure; SameSite=Strict; Expires=Thu, 01 Jan 1970 00:00:00 GMT";

/// Per-request session context, derived from the incoming Cookie header.
///
/// Absence of a token is a normal state, not an error: the request simply
/// goes out unauthenticated and the backend rejects it if it must.
#[derive(Debug, Clone, Default)]
pub struct Session {
    token: Option<SecretString>,
}

impl Session {
    /// Read the session token from the request headers, if any.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(token_from_cookie_header)
            .map_or_else(Self::default, Self::with_token)
    }

    /// Session holding a known token, bypassing cookie parsing.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(SecretString::from(token.into())),
        }
    }

    #[must_use]
    pub fn token(&self) -> Option<&SecretString> {
        self.token.as_ref()
    }

    #[must_use]
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }
}

/// Set-Cookie value storing a freshly issued session token.
#[must_use]
pub fn session_cookie(token: &str) -> String {
    format!("{ACCESS_TOKEN_COOKIE}={token}; Path=/; Secure; SameSite=Strict")
}

fn token_from_cookie_header(header: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|pair| {
        let (name, value) = pair.split_once('=')?;

        (name == ACCESS_TOKEN_COOKIE && !value.is_empty()).then(|| value.to_string())
    })
}
