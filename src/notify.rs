// src/notify.rs

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::Serialize;
use thiserror::Error;

/// Queue the external mail worker consumes from.
const NOTIFICATION_QUEUE: &str = "notifications";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Redis connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A notification destined for the mail worker. The `destiny` tag selects
/// the email template on the worker side; payload fields carry everything
/// the template needs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "destiny", rename_all = "snake_case")]
pub enum Notice {
    /// Registration received, pending review.
    Approval { name: String, email: String },
    /// Registration accepted; `token` verifies the account.
    Accept {
        name: String,
        email: String,
        token: String,
    },
    /// Registration rejected.
    Reject { name: String, email: String },
    /// Password reset link.
    Forgot {
        name: String,
        email: String,
        token: String,
    },
    /// Heads-up to the admin mailbox about a new registration.
    AdminApproval {
        name: String,
        surname: String,
        email: String,
    },
    /// A QA request exceeded the latency threshold.
    QaTimeLimit {
        filename: String,
        tokens: i32,
        total_time: f64,
        gigachat_time: f64,
        question: String,
        answer: String,
    },
    /// A quiz-generation request exceeded the latency threshold.
    TestTimeLimit {
        filename: String,
        tokens: i32,
        total_time: f64,
        gigachat_time: f64,
        generation_attempts: i32,
        question: String,
        options: Vec<String>,
        right_answer: String,
    },
    /// A user crossed the daily token budget.
    TokenLimit {
        name: String,
        surname: String,
        email: String,
        tokens_by_doc: HashMap<String, i64>,
    },
}

impl Notice {
    /// The destiny tag, for log lines.
    pub fn destiny(&self) -> &'static str {
        match self {
            Notice::Approval { .. } => "approval",
            Notice::Accept { .. } => "accept",
            Notice::Reject { .. } => "reject",
            Notice::Forgot { .. } => "forgot",
            Notice::AdminApproval { .. } => "admin_approval",
            Notice::QaTimeLimit { .. } => "qa_time_limit",
            Notice::TestTimeLimit { .. } => "test_time_limit",
            Notice::TokenLimit { .. } => "token_limit",
        }
    }
}

/// Destination for notices. Implementations must be fire-and-forget safe:
/// `submit` failures are logged by the dispatcher, never surfaced to the
/// request that produced the notice.
#[async_trait]
pub trait NotifySink: Send + Sync {
    async fn submit(&self, notice: Notice) -> Result<(), NotifyError>;
}

/// Redis-backed sink: notices are LPUSHed as JSON onto the notification
/// queue; the mail worker RPOPs and renders/sends the email.
pub struct RedisNotifier {
    redis: ConnectionManager,
}

impl RedisNotifier {
    pub async fn connect(redis_url: &str) -> Result<Self, NotifyError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| NotifyError::ConnectionFailed(e.to_string()))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| NotifyError::ConnectionFailed(e.to_string()))?;

        Ok(Self { redis })
    }
}

#[async_trait]
impl NotifySink for RedisNotifier {
    async fn submit(&self, notice: Notice) -> Result<(), NotifyError> {
        let serialized = serde_json::to_string(&notice)?;
        let mut conn = self.redis.clone();
        conn.lpush::<_, _, ()>(NOTIFICATION_QUEUE, serialized).await?;
        Ok(())
    }
}

/// Sink that drops every notice. Used in tests and when no broker is
/// configured.
pub struct DiscardNotifier;

#[async_trait]
impl NotifySink for DiscardNotifier {
    async fn submit(&self, _notice: Notice) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Cloneable handle that enqueues notices without blocking the request.
/// Delivery is at-least-once on the worker side; on the enqueue side a
/// failure is logged and forgotten.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotifySink>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotifySink>) -> Self {
        Self { sink }
    }

    pub fn discard() -> Self {
        Self {
            sink: Arc::new(DiscardNotifier),
        }
    }

    /// Fire-and-forget dispatch. Never fails the caller.
    pub fn dispatch(&self, notice: Notice) {
        let sink = self.sink.clone();
        let destiny = notice.destiny();
        tokio::spawn(async move {
            if let Err(e) = sink.submit(notice).await {
                tracing::warn!("Failed to enqueue '{}' notice: {}", destiny, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_serializes_with_destiny_tag() {
        let notice = Notice::Accept {
            name: "Ivan".to_string(),
            email: "ivan@example.com".to_string(),
            token: "tok".to_string(),
        };

        let value = serde_json::to_value(&notice).unwrap();
        assert_eq!(value["destiny"], "accept");
        assert_eq!(value["email"], "ivan@example.com");
    }

    #[test]
    fn destiny_names_match_worker_contract() {
        let notice = Notice::TokenLimit {
            name: "a".into(),
            surname: "b".into(),
            email: "c@d.e".into(),
            tokens_by_doc: HashMap::new(),
        };
        assert_eq!(notice.destiny(), "token_limit");
        let value = serde_json::to_value(&notice).unwrap();
        assert_eq!(value["destiny"], "token_limit");
    }
}
