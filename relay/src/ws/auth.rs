//! Handshake token validation.

use secrecy::{ExposeSecret, SecretString};

/// Outcome of validating a handshake token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    /// The client may stay connected.
    Accepted,
    /// The client is closed and removed.
    Rejected,
}

/// Decides whether a connecting client's token is acceptable.
pub trait Authenticator: Send + Sync {
    /// Validates the token carried in a client's handshake.
    fn validate(&self, token: &str) -> AuthDecision;
}

/// Accepts every token. This is the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Authenticator for AcceptAll {
    fn validate(&self, _token: &str) -> AuthDecision {
        AuthDecision::Accepted
    }
}

/// Accepts only one configured token.
#[derive(Debug, Clone)]
pub struct StaticToken {
    expected: SecretString,
}

impl StaticToken {
    /// Creates an authenticator expecting `expected`.
    #[must_use]
    pub fn new(expected: SecretString) -> Self {
        Self { expected }
    }
}

impl Authenticator for StaticToken {
    fn validate(&self, token: &str) -> AuthDecision {
        if self.expected.expose_secret() == token {
            AuthDecision::Accepted
        } else {
            AuthDecision::Rejected
        }
    }
}

impl<F> Authenticator for F
where
    F: Fn(&str) -> AuthDecision + Send + Sync,
{
    fn validate(&self, token: &str) -> AuthDecision {
        self(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_all_never_rejects() {
        assert_eq!(AcceptAll.validate(""), AuthDecision::Accepted);
        assert_eq!(AcceptAll.validate("anything"), AuthDecision::Accepted);
    }

    #[test]
    fn static_token_matches_exactly() {
        let auth = StaticToken::new(SecretString::new("sesame".into()));
        assert_eq!(auth.validate("sesame"), AuthDecision::Accepted);
        assert_eq!(auth.validate("Sesame"), AuthDecision::Rejected);
        assert_eq!(auth.validate(""), AuthDecision::Rejected);
    }

    #[test]
    fn closures_are_authenticators() {
        let auth = |token: &str| {
            if token.starts_with("dm-") {
                AuthDecision::Accepted
            } else {
                AuthDecision::Rejected
            }
        };
        assert_eq!(auth.validate("dm-1"), AuthDecision::Accepted);
        assert_eq!(auth.validate("player"), AuthDecision::Rejected);
    }
}
