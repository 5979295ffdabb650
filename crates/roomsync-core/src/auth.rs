use std::fmt;

/// Identity used when a verified credential carries no name.
pub const ANONYMOUS: &str = "Anonymous";

/// Verified caller identity, resolved once per connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn anonymous() -> Self {
        Self(ANONYMOUS.to_owned())
    }

    /// Use `name` if it is present and non-blank, otherwise [`ANONYMOUS`].
    pub fn or_anonymous(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            Some(n) if !n.is_empty() => Self::new(n),
            _ => Self::anonymous(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing credential")]
    Missing,
    #[error("credential rejected: {0}")]
    Rejected(String),
}

impl From<AuthError> for crate::errors::SyncError {
    fn from(e: AuthError) -> Self {
        Self::Unauthenticated(e.to_string())
    }
}

/// Turns a bearer credential into an identity.
///
/// Consulted once per connection at the transport boundary; the gateway
/// itself never sees an unauthenticated call.
pub trait Authenticator: Send + Sync {
    fn verify(&self, credential: &str) -> Result<Identity, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn or_anonymous_falls_back() {
        assert_eq!(Identity::or_anonymous(None).as_str(), ANONYMOUS);
        assert_eq!(Identity::or_anonymous(Some("  ")).as_str(), ANONYMOUS);
        assert_eq!(Identity::or_anonymous(Some("alice")).as_str(), "alice");
        assert!(Identity::anonymous().is_anonymous());
        assert!(!Identity::new("bob").is_anonymous());
    }

    #[test]
    fn auth_error_becomes_unauthenticated() {
        let err: crate::errors::SyncError = AuthError::Missing.into();
        assert_eq!(err.code(), "UNAUTHENTICATED");
        assert!(err.to_string().contains("missing credential"));
    }

    #[test]
    fn auth_error_display() {
        assert_eq!(AuthError::Missing.to_string(), "missing credential");
        assert_eq!(
            AuthError::Rejected("expired".into()).to_string(),
            "credential rejected: expired"
        );
    }
}
