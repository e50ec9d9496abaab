use std::collections::HashMap;

use async_trait::async_trait;
use roomsync_core::{Auth, AuthError, UserId};

/// A static bearer-token lookup, standing in for a real identity provider
/// (out of scope here per §1/§6.1) so this crate is runnable end-to-end
/// without one. Tokens are provisioned once at startup; there is no
/// issuance or rotation.
pub struct DevTokenAuth {
    tokens: HashMap<String, UserId>,
}

impl DevTokenAuth {
    pub fn new(tokens: HashMap<String, UserId>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl Auth for DevTokenAuth {
    async fn verify_token(&self, token: &str) -> Result<UserId, AuthError> {
        self.tokens.get(token).copied().ok_or(AuthError::InvalidToken)
    }
}
