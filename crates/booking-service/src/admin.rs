use std::sync::Arc;

use audit_store::{ActivityLogRepository, LogFilter};
use chrono::Utc;
use serde::Serialize;
use ticket_domain::{ActivityLog, ContactId, ContactMessage, LogLevel, PageRequest};
use ticket_store::TicketStore;
use tracing::info;

use crate::catalog::MAX_PAGE_LIMIT;
use crate::context::Actor;
use crate::error::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_user_logins: u64,
    pub total_movies_added: u64,
    pub total_bookings: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    pub logs: Vec<ActivityLog>,
    pub total: u64,
    pub page: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ContactInput {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

pub struct AdminService {
    store: Arc<dyn TicketStore>,
    logs: Arc<dyn ActivityLogRepository>,
}

impl AdminService {
    #[must_use]
    pub fn new(store: Arc<dyn TicketStore>, logs: Arc<dyn ActivityLogRepository>) -> Self {
        Self { store, logs }
    }

    /// `totalUserLogins` counts registered accounts.
    pub async fn dashboard_stats(&self, actor: &Actor) -> Result<DashboardStats, ServiceError> {
        actor.require_admin()?;
        Ok(DashboardStats {
            total_user_logins: self.store.count_users().await?,
            total_movies_added: self.store.count_movies().await?,
            total_bookings: self.store.count_bookings().await?,
        })
    }

    pub async fn list_logs(
        &self,
        actor: &Actor,
        level: Option<LogLevel>,
        page: usize,
        limit: usize,
    ) -> Result<LogPage, ServiceError> {
        actor.require_admin()?;
        if page == 0 || limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(ServiceError::bad_request(format!(
                "page must be at least 1 and limit between 1 and {MAX_PAGE_LIMIT}"
            )));
        }
        let filter = LogFilter { level, user: None };
        let logs = self
            .logs
            .list_logs(&filter, PageRequest::from_page(page, limit))
            .await?;
        let total = self.logs.count_logs(&filter).await?;
        Ok(LogPage {
            logs,
            total,
            page,
            limit,
        })
    }

    pub async fn submit_contact(&self, input: ContactInput) -> Result<ContactMessage, ServiceError> {
        let fields = [&input.name, &input.email, &input.subject, &input.message];
        if fields.iter().any(|value| value.trim().is_empty()) {
            return Err(ServiceError::bad_request("Please enter all fields"));
        }
        let email = input.email.trim();
        if !looks_like_email(email) {
            return Err(ServiceError::bad_request("Please enter a valid email"));
        }
        let message = ContactMessage {
            id: ContactId::new(),
            name: input.name.trim().to_string(),
            email: email.to_string(),
            subject: input.subject.trim().to_string(),
            message: input.message.trim().to_string(),
            created_at: Utc::now(),
        };
        self.store.insert_contact(&message).await?;
        info!(contact_id = %message.id, "contact message received");
        Ok(message)
    }

    pub async fn list_contacts(&self, actor: &Actor) -> Result<Vec<ContactMessage>, ServiceError> {
        actor.require_admin()?;
        Ok(self.store.list_contacts().await?)
    }
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use ticket_domain::UserId;

    use super::*;
    use crate::test_support::fixture;

    fn contact(email: &str) -> ContactInput {
        ContactInput {
            name: "Hari".to_string(),
            email: email.to_string(),
            subject: "Refund".to_string(),
            message: "My show was cancelled.".to_string(),
        }
    }

    #[tokio::test]
    async fn stats_are_admin_only() {
        let fx = fixture();
        assert!(matches!(
            fx.services
                .admin
                .dashboard_stats(&Actor::user(UserId::new()))
                .await,
            Err(ServiceError::Forbidden(_))
        ));
        let stats = fx
            .services
            .admin
            .dashboard_stats(&Actor::admin(UserId::new()))
            .await
            .expect("stats");
        assert_eq!(stats.total_bookings, 0);
        let value = serde_json::to_value(stats).expect("serialize");
        assert!(value.get("totalMoviesAdded").is_some());
    }

    #[tokio::test]
    async fn logs_filter_by_level_and_page() {
        let fx = fixture();
        fx.services.activity.info("Public route accessed", "guest").await;
        fx.services.activity.warn("Login failed", "guest").await;
        fx.services.activity.warn("Login failed", "guest").await;

        let admin = Actor::admin(UserId::new());
        let page = fx
            .services
            .admin
            .list_logs(&admin, Some(LogLevel::Warn), 1, 1)
            .await
            .expect("logs");
        assert_eq!(page.logs.len(), 1);
        assert_eq!(page.total, 2);
        assert!(
            fx.services
                .admin
                .list_logs(&admin, None, 0, 10)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn contact_messages_are_validated_and_listed_for_admins() {
        let fx = fixture();
        assert!(
            fx.services
                .admin
                .submit_contact(contact("not-an-email"))
                .await
                .is_err()
        );
        fx.services
            .admin
            .submit_contact(contact("hari@example.com"))
            .await
            .expect("submit");
        assert!(
            fx.services
                .admin
                .list_contacts(&Actor::user(UserId::new()))
                .await
                .is_err()
        );
        let contacts = fx
            .services
            .admin
            .list_contacts(&Actor::admin(UserId::new()))
            .await
            .expect("contacts");
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].subject, "Refund");
    }
}
