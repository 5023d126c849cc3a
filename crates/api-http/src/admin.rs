use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use booking_service::{ContactInput, DashboardStats, LogPage, ServiceError};
use platform_core::ResponseEnvelope;
use serde::{Deserialize, Serialize};
use ticket_domain::{ContactMessage, LogLevel};
use tracing::info;

use crate::{AdminUser, ApiError, ApiResult, AppState, JsonBody, catalog::page_number, ok};

const DEFAULT_LOG_LIMIT: usize = 20;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogsQuery {
    pub level: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactPayload {
    pub contact: ContactMessage,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactsPayload {
    pub contacts: Vec<ContactMessage>,
}

pub async fn dashboard_stats(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
) -> ApiResult<DashboardStats> {
    info!(route = "/api/admin/dashboard_stats", "api http request");
    let stats = state.services.admin.dashboard_stats(&actor).await?;
    Ok(ok("Dashboard statistics fetched successfully", stats))
}

pub async fn get_logs(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
    Query(query): Query<LogsQuery>,
) -> ApiResult<LogPage> {
    info!(route = "/api/admin/logs", level = ?query.level, "api http request");
    let level = query
        .level
        .as_deref()
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .map(str::parse::<LogLevel>)
        .transpose()
        .map_err(ServiceError::from)?;
    let page = page_number(query.page.as_deref(), 1, "page")?;
    let limit = page_number(query.limit.as_deref(), DEFAULT_LOG_LIMIT, "limit")?;
    let logs = state
        .services
        .admin
        .list_logs(&actor, level, page, limit)
        .await?;
    Ok(ok("Logs fetched successfully", logs))
}

pub async fn create_contact(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<ContactRequest>,
) -> Result<(StatusCode, Json<ResponseEnvelope<ContactPayload>>), ApiError> {
    info!(route = "/api/contact/create", "api http request");
    let contact = state
        .services
        .admin
        .submit_contact(ContactInput {
            name: body.name,
            email: body.email,
            subject: body.subject,
            message: body.message,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        ok("Message sent successfully", ContactPayload { contact }),
    ))
}

pub async fn get_contacts(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
) -> ApiResult<ContactsPayload> {
    info!(route = "/api/contact/get_contact", "api http request");
    let contacts = state.services.admin.list_contacts(&actor).await?;
    Ok(ok("Contacts fetched successfully", ContactsPayload { contacts }))
}
