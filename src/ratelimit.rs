//! Per-account, fixed-window rate limiting over two independent quotas.
//!
//! One abstraction, two backends: a local counter table over `Storage`, or
//! a delegated remote check. The counter path is deliberately lock-free:
//! concurrent admissions for the same account may both read a stale count
//! and overshoot the limit slightly. That imprecision is accepted in
//! exchange for not serializing unrelated requests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::model::{QuotaKind, RateLimitCounter};
use crate::store::Storage;

/// Fixed admission window. Buckets are not sliding.
const WINDOW: Duration = Duration::from_secs(60);

/// Result of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied(String),
}

/// Admission control for one (account, quota) pair.
///
/// Infallible by contract: backends translate their own failures into a
/// denial rather than surfacing an error, so a broken limiter never turns
/// into a 500 for the caller.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn admit(&self, account_id: &str, kind: QuotaKind) -> Admission;
}

// ── Local counter backend ───────────────────────────────────────────

/// Fixed-window limiter over the storage counter table.
pub struct WindowRateLimiter {
    storage: Arc<dyn Storage>,
}

impl WindowRateLimiter {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    async fn check(&self, account_id: &str, kind: QuotaKind) -> Result<Admission, StorageError> {
        let limit = match self.storage.get_account(account_id).await? {
            Some(account) => match kind {
                QuotaKind::General => account.general_limit,
                QuotaKind::Ai => account.ai_limit,
            },
            None => {
                warn!(account = %account_id, "No account row for rate-limit check");
                0
            }
        };

        let now = Utc::now();
        let fresh = RateLimitCounter {
            account_id: account_id.to_string(),
            invocations: 1,
            window_expiry: now + WINDOW,
        };

        let counter = match self.storage.get_rate_counter(account_id, kind).await? {
            // First hit for this account/quota: open a window and admit.
            None => {
                self.storage.put_rate_counter(kind, &fresh).await?;
                return Ok(Admission::Allowed);
            }
            Some(counter) => counter,
        };

        // Window elapsed: reset to 1 and admit.
        if now > counter.window_expiry {
            self.storage.put_rate_counter(kind, &fresh).await?;
            return Ok(Admission::Allowed);
        }

        if counter.invocations >= limit {
            debug!(
                account = %account_id,
                quota = kind.as_str(),
                count = counter.invocations,
                limit,
                "Admission denied"
            );
            return Ok(Admission::Denied(format!(
                "{} rate limit exceeded",
                kind.as_str()
            )));
        }

        // Admission refreshes the window alongside the increment.
        let updated = RateLimitCounter {
            account_id: account_id.to_string(),
            invocations: counter.invocations + 1,
            window_expiry: now + WINDOW,
        };
        self.storage.put_rate_counter(kind, &updated).await?;
        Ok(Admission::Allowed)
    }
}

#[async_trait]
impl RateLimiter for WindowRateLimiter {
    async fn admit(&self, account_id: &str, kind: QuotaKind) -> Admission {
        match self.check(account_id, kind).await {
            Ok(admission) => admission,
            Err(e) => {
                warn!(account = %account_id, quota = kind.as_str(), error = %e,
                      "Rate-limit check failed");
                Admission::Denied("rate limit check failed".to_string())
            }
        }
    }
}

// ── Delegated backend ───────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct RemoteCheckRequest<'a> {
    account_id: &'a str,
    quota: &'a str,
}

#[derive(Debug, Deserialize)]
struct RemoteCheckResponse {
    allowed: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// Limiter that delegates the admission decision to an external service.
pub struct RemoteRateLimiter {
    client: reqwest::Client,
    url: String,
}

impl RemoteRateLimiter {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl RateLimiter for RemoteRateLimiter {
    async fn admit(&self, account_id: &str, kind: QuotaKind) -> Admission {
        let request = RemoteCheckRequest {
            account_id,
            quota: kind.as_str(),
        };
        let result = async {
            let response = self.client.post(&self.url).json(&request).send().await?;
            response.error_for_status_ref()?;
            response.json::<RemoteCheckResponse>().await
        }
        .await;

        match result {
            Ok(body) if body.allowed => Admission::Allowed,
            Ok(body) => Admission::Denied(
                body.reason
                    .unwrap_or_else(|| format!("{} rate limit exceeded", kind.as_str())),
            ),
            Err(e) => {
                warn!(account = %account_id, quota = kind.as_str(), error = %e,
                      "Delegated rate-limit check failed");
                Admission::Denied("rate limit check failed".to_string())
            }
        }
    }
}
