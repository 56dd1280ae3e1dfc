use base64ct::{Base64UrlUnpadded, Encoding};
use serde::Deserialize;

pub const ROLE_ADMIN: &str = "ROLE_ADMIN";
pub const ROLE_USER: &str = "ROLE_USER";

/// Claims carried in the session token payload.
///
/// Decoded without signature verification: enough to steer navigation, never
/// a security boundary on its own. The backend re-validates the signature and
/// roles on every privileged call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Claims {
    /// Decode the middle segment of a three-segment token.
    ///
    /// Returns `None` for anything malformed; callers treat a token that does
    /// not decode exactly like no token at all.
    #[must_use]
    pub fn decode(token: &str) -> Option<Self> {
        let mut segments = token.split('.');

        let payload = match (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => return None,
        };

        let decoded = Base64UrlUnpadded::decode_vec(payload).ok()?;

        serde_json::from_slice(&decoded).ok()
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.has_role(ROLE_ADMIN)
    }
}
