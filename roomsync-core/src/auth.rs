use async_trait::async_trait;
use thiserror::Error;

use crate::UserId;

/// The token-verification capability consumed by the Session Registry (§4.1, §6.1).
/// Core never issues or stores tokens itself; it only verifies what the
/// Gateway hands it on the first handshake message.
#[async_trait]
pub trait Auth: Send + Sync {
    async fn verify_token(&self, token: &str) -> Result<UserId, AuthError>;
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token is missing, malformed, or expired")]
    InvalidToken,
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}
