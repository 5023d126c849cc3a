use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row, postgres::PgRow};
use thiserror::Error;
use ticket_domain::{ActivityLog, LogId, LogLevel, PageRequest};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AuditStoreError {
    #[error("store lock poisoned")]
    LockPoisoned,
    #[error("database error: {0}")]
    Database(String),
    #[error("invalid value in column {field}: {value}")]
    InvalidColumn { field: &'static str, value: String },
}

impl From<sqlx::Error> for AuditStoreError {
    fn from(value: sqlx::Error) -> Self {
        Self::Database(value.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    pub level: Option<LogLevel>,
    pub user: Option<String>,
}

impl LogFilter {
    fn matches(&self, log: &ActivityLog) -> bool {
        self.level.is_none_or(|level| log.level == level)
            && self.user.as_deref().is_none_or(|user| log.user == user)
    }
}

#[async_trait]
pub trait ActivityLogRepository: Send + Sync {
    async fn insert_log(&self, log: &ActivityLog) -> Result<(), AuditStoreError>;

    /// Newest first.
    async fn list_logs(
        &self,
        filter: &LogFilter,
        page: PageRequest,
    ) -> Result<Vec<ActivityLog>, AuditStoreError>;

    async fn count_logs(&self, filter: &LogFilter) -> Result<u64, AuditStoreError>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditRepository {
    pub logs: Arc<Mutex<Vec<ActivityLog>>>,
}

#[async_trait]
impl ActivityLogRepository for InMemoryAuditRepository {
    async fn insert_log(&self, log: &ActivityLog) -> Result<(), AuditStoreError> {
        self.logs
            .lock()
            .map_err(|_| AuditStoreError::LockPoisoned)?
            .push(log.clone());
        Ok(())
    }

    async fn list_logs(
        &self,
        filter: &LogFilter,
        page: PageRequest,
    ) -> Result<Vec<ActivityLog>, AuditStoreError> {
        let guard = self
            .logs
            .lock()
            .map_err(|_| AuditStoreError::LockPoisoned)?;
        let mut matching: Vec<ActivityLog> = guard
            .iter()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(matching
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect())
    }

    async fn count_logs(&self, filter: &LogFilter) -> Result<u64, AuditStoreError> {
        let guard = self
            .logs
            .lock()
            .map_err(|_| AuditStoreError::LockPoisoned)?;
        Ok(guard.iter().filter(|log| filter.matches(log)).count() as u64)
    }
}

#[derive(Debug, Clone)]
pub struct PostgresAuditRepository {
    pool: PgPool,
}

impl PostgresAuditRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_activity_log(row: &PgRow) -> Result<ActivityLog, AuditStoreError> {
    let level: String = row.try_get("level")?;
    Ok(ActivityLog {
        id: LogId(row.try_get::<Uuid, _>("log_id")?),
        level: level.parse().map_err(|_| AuditStoreError::InvalidColumn {
            field: "level",
            value: level.clone(),
        })?,
        message: row.try_get("message")?,
        error: row.try_get("error")?,
        method: row.try_get("method")?,
        url: row.try_get("url")?,
        user: row.try_get("user_label")?,
        ip: row.try_get("ip")?,
        timestamp: row.try_get::<DateTime<Utc>, _>("logged_at")?,
    })
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl ActivityLogRepository for PostgresAuditRepository {
    async fn insert_log(&self, log: &ActivityLog) -> Result<(), AuditStoreError> {
        sqlx::query(
            r#"
            INSERT INTO activity_logs (
                log_id, level, message, error, method, url, user_label, ip, logged_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(log.id.0)
        .bind(log.level.as_str())
        .bind(&log.message)
        .bind(&log.error)
        .bind(&log.method)
        .bind(&log.url)
        .bind(&log.user)
        .bind(&log.ip)
        .bind(log.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_logs(
        &self,
        filter: &LogFilter,
        page: PageRequest,
    ) -> Result<Vec<ActivityLog>, AuditStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM activity_logs
            WHERE ($1::text IS NULL OR level = $1)
              AND ($2::text IS NULL OR user_label = $2)
            ORDER BY logged_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.level.map(LogLevel::as_str))
        .bind(filter.user.as_deref())
        .bind(to_i64(page.limit))
        .bind(to_i64(page.offset))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_activity_log).collect()
    }

    async fn count_logs(&self, filter: &LogFilter) -> Result<u64, AuditStoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM activity_logs
            WHERE ($1::text IS NULL OR level = $1)
              AND ($2::text IS NULL OR user_label = $2)
            "#,
        )
        .bind(filter.level.map(LogLevel::as_str))
        .bind(filter.user.as_deref())
        .fetch_one(&self.pool)
        .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}
