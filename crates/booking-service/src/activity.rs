use std::sync::Arc;

use audit_store::ActivityLogRepository;
use ticket_domain::{ActivityLog, LogLevel};
use tracing::warn;

/// Best-effort writer for the admin activity trail.
#[derive(Clone)]
pub struct ActivityRecorder {
    repo: Arc<dyn ActivityLogRepository>,
}

impl ActivityRecorder {
    #[must_use]
    pub fn new(repo: Arc<dyn ActivityLogRepository>) -> Self {
        Self { repo }
    }

    #[must_use]
    pub fn repository(&self) -> Arc<dyn ActivityLogRepository> {
        Arc::clone(&self.repo)
    }

    /// A failed write is logged and swallowed.
    pub async fn record(&self, log: ActivityLog) {
        if let Err(err) = self.repo.insert_log(&log).await {
            warn!(
                error = %err,
                level = log.level.as_str(),
                message = %log.message,
                "failed to record activity"
            );
        }
    }

    pub async fn info(&self, message: impl Into<String>, user: impl Into<String>) {
        self.record(ActivityLog::new(LogLevel::Info, message, user))
            .await;
    }

    pub async fn warn(&self, message: impl Into<String>, user: impl Into<String>) {
        self.record(ActivityLog::new(LogLevel::Warn, message, user))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use audit_store::{AuditStoreError, InMemoryAuditRepository, LogFilter};
    use ticket_domain::PageRequest;

    use super::*;

    struct BrokenRepository;

    #[async_trait]
    impl ActivityLogRepository for BrokenRepository {
        async fn insert_log(&self, _log: &ActivityLog) -> Result<(), AuditStoreError> {
            Err(AuditStoreError::Database("disk full".to_string()))
        }

        async fn list_logs(
            &self,
            _filter: &LogFilter,
            _page: PageRequest,
        ) -> Result<Vec<ActivityLog>, AuditStoreError> {
            Ok(Vec::new())
        }

        async fn count_logs(&self, _filter: &LogFilter) -> Result<u64, AuditStoreError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn failed_writes_do_not_propagate() {
        let recorder = ActivityRecorder::new(Arc::new(BrokenRepository));
        recorder.info("Public route accessed", "guest").await;
    }

    #[tokio::test]
    async fn records_land_in_repository() {
        let repo = InMemoryAuditRepository::default();
        let recorder = ActivityRecorder::new(Arc::new(repo.clone()));
        recorder.warn("Login failed", "guest").await;
        let logs = repo.logs.lock().expect("lock");
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].level, LogLevel::Warn);
    }
}
