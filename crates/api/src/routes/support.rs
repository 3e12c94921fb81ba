//! Support conversation routes
//!
//! Thin handlers over [`SupportEngine`]: parse the request, build the caller's
//! [`Actor`](helpdesk_shared::Actor) and map engine errors to HTTP.

use std::str::FromStr;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use helpdesk_shared::{
    Attachment, Conversation, ConversationFilter, ConversationWithMessages, Message, Page,
};

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
    support::{ConversationSummary, ListQuery, NewConversation, NewMessage},
};

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    pub subject: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub channel: Option<String>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    /// USER, AGENT or INTERNAL; defaults by role
    pub kind: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    /// `null` unassigns
    pub assigned_to_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct PriorityRequest {
    pub priority: String,
}

#[derive(Debug, Deserialize)]
pub struct TagsRequest {
    #[serde(default)]
    pub add: Vec<String>,
    #[serde(default)]
    pub remove: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListConversationsQuery {
    #[serde(rename = "box")]
    pub mailbox: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub tag: Option<String>,
    pub q: Option<String>,
    pub sla: Option<String>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// Parse an optional enum-valued parameter, treating blank as absent
fn parse_opt<T>(value: Option<&str>) -> ApiResult<Option<T>>
where
    T: FromStr<Err = String>,
{
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => raw.parse().map(Some).map_err(ApiError::Validation),
        None => Ok(None),
    }
}

fn parse_required<T>(value: &str) -> ApiResult<T>
where
    T: FromStr<Err = String>,
{
    value.trim().parse().map_err(ApiError::Validation)
}

impl ListConversationsQuery {
    fn into_list_query(self) -> ApiResult<ListQuery> {
        let filter = ConversationFilter {
            mailbox: parse_opt(self.mailbox.as_deref())?.unwrap_or_default(),
            status: parse_opt(self.status.as_deref())?,
            priority: parse_opt(self.priority.as_deref())?,
            tag: self.tag.filter(|t| !t.trim().is_empty()),
            q: self.q.filter(|q| !q.trim().is_empty()),
            sla: parse_opt(self.sla.as_deref())?,
        };

        Ok(ListQuery {
            filter,
            sort: parse_opt(self.sort.as_deref())?.unwrap_or_default(),
            page: self.page,
            page_size: self.page_size,
        })
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Open a new conversation with its first message
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateConversationRequest>,
) -> ApiResult<(StatusCode, Json<ConversationWithMessages>)> {
    let created = state
        .engine
        .create_conversation(
            &auth_user.actor(),
            NewConversation {
                subject: req.subject,
                text: req.text,
                attachments: req.attachments,
                channel: req.channel,
                customer_name: req.customer_name,
                customer_email: req.customer_email,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// Staff inbox: filter, sort and paginate
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<ListConversationsQuery>,
) -> ApiResult<Json<Page<ConversationSummary>>> {
    let list = query.into_list_query()?;
    let page = state.engine.list(&auth_user.actor(), list).await?;
    Ok(Json(page))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Json<ConversationWithMessages>> {
    let conversation = state
        .engine
        .get_conversation(&auth_user.actor(), conversation_id)
        .await?;
    Ok(Json(conversation))
}

/// Post a message into a conversation
pub async fn send_message(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let message = state
        .engine
        .ingest_message(
            &auth_user.actor(),
            conversation_id,
            NewMessage {
                kind: parse_opt(req.kind.as_deref())?,
                text: req.text,
                attachments: req.attachments,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_seen(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Json<Conversation>> {
    let conversation = state
        .engine
        .mark_seen(&auth_user.actor(), conversation_id)
        .await?;
    Ok(Json(conversation))
}

pub async fn assign_conversation(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<AssignRequest>,
) -> ApiResult<Json<Conversation>> {
    let conversation = state
        .engine
        .assign(&auth_user.actor(), conversation_id, req.assigned_to_id)
        .await?;
    Ok(Json(conversation))
}

pub async fn update_status(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<StatusRequest>,
) -> ApiResult<Json<Conversation>> {
    let status = parse_required(&req.status)?;
    let conversation = state
        .engine
        .set_status(&auth_user.actor(), conversation_id, status)
        .await?;
    Ok(Json(conversation))
}

pub async fn update_priority(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<PriorityRequest>,
) -> ApiResult<Json<Conversation>> {
    let priority = parse_required(&req.priority)?;
    let conversation = state
        .engine
        .set_priority(&auth_user.actor(), conversation_id, priority)
        .await?;
    Ok(Json(conversation))
}

pub async fn update_tags(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<TagsRequest>,
) -> ApiResult<Json<Conversation>> {
    let conversation = state
        .engine
        .update_tags(&auth_user.actor(), conversation_id, &req.add, &req.remove)
        .await?;
    Ok(Json(conversation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpdesk_shared::{ConversationStatus, Mailbox, SlaStatus, SortOrder};

    #[test]
    fn test_list_query_parsing() {
        let query = ListConversationsQuery {
            mailbox: Some("mine".into()),
            status: Some("pending".into()),
            sla: Some("atRisk".into()),
            sort: Some("timeToBreachAsc".into()),
            q: Some("  ".into()),
            ..Default::default()
        };

        let list = query.into_list_query().unwrap();
        assert_eq!(list.filter.mailbox, Mailbox::Mine);
        assert_eq!(list.filter.status, Some(ConversationStatus::Pending));
        assert_eq!(list.filter.sla, Some(SlaStatus::AtRisk));
        assert_eq!(list.filter.q, None);
        assert_eq!(list.sort, SortOrder::TimeToBreachAsc);
    }

    #[test]
    fn test_list_query_defaults() {
        let list = ListConversationsQuery::default().into_list_query().unwrap();
        assert_eq!(list.filter.mailbox, Mailbox::All);
        assert_eq!(list.sort, SortOrder::LastMessageDesc);
        assert_eq!(list.page, None);
    }

    #[test]
    fn test_invalid_enum_is_validation_error() {
        let query = ListConversationsQuery {
            priority: Some("critical".into()),
            ..Default::default()
        };
        assert!(matches!(query.into_list_query(), Err(ApiError::Validation(_))));
    }
}
