use hyper::HeaderMap;
use hyper::header::AUTHORIZATION;
use std::collections::HashSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthDecision {
    Granted,
    /// No credentials were presented.
    MissingCredentials,
    /// Credentials were presented but do not carry the admin capability.
    Denied,
}

/// Decides whether a request may report conflicts. Runs before the request
/// reaches the merger.
pub trait AuthorizationGuard: Send + Sync {
    fn authorize(&self, headers: &HeaderMap) -> AuthDecision;
}

/// Grants access to requests carrying `Authorization: Bearer <token>` with
/// one of the configured admin tokens.
pub struct BearerTokenGuard {
    tokens: HashSet<String>,
}

impl BearerTokenGuard {
    pub fn new<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        BearerTokenGuard {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }
}

impl AuthorizationGuard for BearerTokenGuard {
    fn authorize(&self, headers: &HeaderMap) -> AuthDecision {
        let Some(value) = headers.get(AUTHORIZATION) else {
            return AuthDecision::MissingCredentials;
        };

        let token = value
            .to_str()
            .ok()
            .and_then(|v| v.split_once(' '))
            .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
            .map(|(_, token)| token.trim());

        match token {
            Some(token) if self.tokens.contains(token) => AuthDecision::Granted,
            _ => AuthDecision::Denied,
        }
    }
}
