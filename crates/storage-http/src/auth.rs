//! Bearer token sources.

use async_trait::async_trait;

use crate::error::HttpError;

/// Supplies the bearer token attached to every request.
///
/// Called once per request, so implementations may refresh tokens.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Current bearer token, without the `Bearer ` prefix.
    async fn bearer_token(&self) -> Result<String, HttpError>;
}

/// A fixed token.
#[derive(Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl AuthProvider for StaticToken {
    async fn bearer_token(&self) -> Result<String, HttpError> {
        if self.token.is_empty() {
            return Err(HttpError::Auth {
                message: "empty token".into(),
            });
        }
        Ok(self.token.clone())
    }
}
