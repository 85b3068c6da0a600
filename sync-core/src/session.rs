//! Session context: the authenticated identity for one login.
//!
//! The identity and token are produced by an external authentication flow.
//! The context is passed explicitly to the components that need it and is
//! consumed at logout, at which point the token bytes are zeroed.

use std::fmt;
use threadline_types::{Identity, UserId};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Bearer token for the message store. Zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wrap a token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Expose the raw token for an Authorization header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthToken([{} chars REDACTED])", self.0.len())
    }
}

/// Who is logged in, for the lifetime of the session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    identity: Identity,
    token: AuthToken,
}

impl SessionContext {
    /// Create a session from an externally supplied identity and token.
    pub fn new(identity: Identity, token: AuthToken) -> Self {
        Self { identity, token }
    }

    /// The session user.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Shorthand for the session user's id.
    pub fn user_id(&self) -> &UserId {
        &self.identity.id
    }

    /// The store bearer token.
    pub fn token(&self) -> &AuthToken {
        &self.token
    }

    /// End the session. The token is zeroed when the returned value drops.
    pub fn end(self) -> Identity {
        self.identity
    }
}
