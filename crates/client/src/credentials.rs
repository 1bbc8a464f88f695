//! Access-credential boundary.
//!
//! The login flow lives elsewhere; the connection layer only asks "what is
//! the current access token, if any" right before each handshake. Absence
//! of a token is a fatal precondition for connecting, never retried.

use std::sync::Mutex;

/// Supplies the current access token for socket handshakes.
pub trait CredentialProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// Token holder the auth layer updates on login/refresh/logout.
#[derive(Default)]
pub struct StaticCredentials {
    token: Mutex<Option<String>>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.lock().expect("credential lock poisoned") = Some(token.into());
    }

    pub fn clear(&self) {
        *self.token.lock().expect("credential lock poisoned") = None;
    }
}

impl CredentialProvider for StaticCredentials {
    fn access_token(&self) -> Option<String> {
        self.token.lock().expect("credential lock poisoned").clone()
    }
}
