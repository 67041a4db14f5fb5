//! Authorization — session checks in front of the pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::AuthError;
use crate::store::Storage;

/// Session-based authorization.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Verify that `session_id` is a live session belonging to `account_id`.
    async fn authorize(&self, account_id: &str, session_id: &str) -> Result<(), AuthError>;
}

/// Authorizer backed by the sessions table.
pub struct StorageAuthorizer {
    storage: Arc<dyn Storage>,
}

impl StorageAuthorizer {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Authorizer for StorageAuthorizer {
    async fn authorize(&self, account_id: &str, session_id: &str) -> Result<(), AuthError> {
        let session = self
            .storage
            .get_session(session_id)
            .await?
            .ok_or_else(|| AuthError::Denied("unknown session".to_string()))?;

        if session.account_id != account_id {
            return Err(AuthError::Denied(
                "session does not belong to account".to_string(),
            ));
        }

        debug!(account = %account_id, "Session authorized");
        Ok(())
    }
}
