use crate::config::RetryConfig;
use bson::Document as BsonDocument;
use std::time::Duration;

/// Result of one read-transform-conditional-write cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The write landed; carries the content now stored (or, for deletes, the content removed).
    Done(BsonDocument),
    /// Lost a version race. Nothing was written; re-run the whole operation.
    Retry,
    /// The filter matched no document.
    NotFound,
}

impl WriteOutcome {
    #[must_use]
    pub fn into_document(self) -> Option<BsonDocument> {
        match self {
            Self::Done(d) => Some(d),
            Self::Retry | Self::NotFound => None,
        }
    }

    #[must_use]
    pub const fn is_retry(&self) -> bool {
        matches!(self, Self::Retry)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldRemovalReport {
    pub modified: usize,
    pub rounds: u32,
}

/// Bound on caller-side retries. `max_attempts == 0` retries until the write lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self { max_attempts, backoff }
    }

    #[must_use]
    pub const fn unbounded() -> Self {
        Self { max_attempts: 0, backoff: Duration::ZERO }
    }

    pub(crate) const fn allows(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self { max_attempts: cfg.max_attempts, backoff: Duration::from_millis(cfg.backoff_ms) }
    }
}
