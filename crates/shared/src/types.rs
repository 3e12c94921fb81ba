//! Domain types for the support-ticketing engine

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Lifecycle state of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConversationStatus {
    Open,
    Pending,
    Resolved,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Pending => "PENDING",
            Self::Resolved => "RESOLVED",
            Self::Closed => "CLOSED",
        }
    }

    /// Resolved and closed conversations are reopened by customer activity
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OPEN" => Ok(Self::Open),
            "PENDING" => Ok(Self::Pending),
            "RESOLVED" => Ok(Self::Resolved),
            "CLOSED" => Ok(Self::Closed),
            _ => Err(format!("Invalid conversation status: {}", s)),
        }
    }
}

/// Conversation priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
            Self::Urgent => "URGENT",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "NORMAL" => Ok(Self::Normal),
            "HIGH" => Ok(Self::High),
            "URGENT" => Ok(Self::Urgent),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

/// Who (or what) authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    /// Customer-authored
    User,
    /// Staff reply visible to the customer
    Agent,
    /// Emitted by internal processes only
    System,
    /// Staff-only note, never delivered to the customer
    Internal,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Agent => "AGENT",
            Self::System => "SYSTEM",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn is_staff_only(&self) -> bool {
        matches!(self, Self::Internal)
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "USER" => Ok(Self::User),
            "AGENT" => Ok(Self::Agent),
            "SYSTEM" => Ok(Self::System),
            "INTERNAL" => Ok(Self::Internal),
            _ => Err(format!("Invalid message kind: {}", s)),
        }
    }
}

/// Platform role carried by a verified token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    #[default]
    Customer,
    Support,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "CUSTOMER",
            Self::Support => "SUPPORT",
            Self::Admin => "ADMIN",
        }
    }

    /// ADMIN and SUPPORT may manage any conversation
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Support | Self::Admin)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CUSTOMER" | "USER" => Ok(Self::Customer),
            "SUPPORT" => Ok(Self::Support),
            "ADMIN" => Ok(Self::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

// =============================================================================
// Actors
// =============================================================================

/// The authenticated caller of an engine operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    /// Owner or staff
    pub fn can_access(&self, conversation: &Conversation) -> bool {
        self.is_staff() || conversation.user_id == Some(self.id)
    }
}

/// Directory entry for a platform user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Role,
}

// =============================================================================
// Conversations
// =============================================================================

/// A support ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub subject: Option<String>,
    pub status: ConversationStatus,
    pub priority: Priority,
    pub channel: String,

    pub user_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub assigned_to_id: Option<Uuid>,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_message_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_customer_message_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_agent_message_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub first_response_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub resolved_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_seen_by_customer_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_seen_by_staff_at: Option<OffsetDateTime>,

    // SLA deadlines (business time)
    #[serde(with = "time::serde::rfc3339::option")]
    pub first_response_sla_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub resolution_sla_at: Option<OffsetDateTime>,

    pub tags: BTreeSet<String>,
}

impl Conversation {
    /// A fresh OPEN conversation with no metrics or deadlines yet
    pub fn new(user_id: Option<Uuid>, created_at: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject: None,
            status: ConversationStatus::Open,
            priority: Priority::Normal,
            channel: DEFAULT_CHANNEL.to_string(),
            user_id,
            customer_name: None,
            customer_email: None,
            assigned_to_id: None,
            created_at,
            updated_at: None,
            last_message_at: None,
            last_customer_message_at: None,
            last_agent_message_at: None,
            first_response_at: None,
            resolved_at: None,
            last_seen_by_customer_at: None,
            last_seen_by_staff_at: None,
            first_response_sla_at: None,
            resolution_sla_at: None,
            tags: BTreeSet::new(),
        }
    }
}

/// Origin tag applied when the caller does not name one
pub const DEFAULT_CHANNEL: &str = "WEB";

// =============================================================================
// Messages
// =============================================================================

/// File reference owned by exactly one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    pub mime: String,
    pub size: i64,
}

/// One immutable entry in a conversation timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub author_id: Option<Uuid>,
    pub kind: MessageKind,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub attachments: Vec<Attachment>,
}

/// A conversation together with its visible timeline
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationWithMessages {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(
            serde_json::to_string(&ConversationStatus::Resolved).unwrap(),
            r#""RESOLVED""#
        );
        assert_eq!(serde_json::to_string(&Priority::Urgent).unwrap(), r#""URGENT""#);
        assert_eq!(
            serde_json::from_str::<MessageKind>(r#""INTERNAL""#).unwrap(),
            MessageKind::Internal
        );
    }

    #[test]
    fn test_from_str_is_case_insensitive() {
        assert_eq!("pending".parse::<ConversationStatus>(), Ok(ConversationStatus::Pending));
        assert_eq!("High".parse::<Priority>(), Ok(Priority::High));
        assert!("archived".parse::<ConversationStatus>().is_err());
    }

    #[test]
    fn test_staff_roles() {
        assert!(Role::Admin.is_staff());
        assert!(Role::Support.is_staff());
        assert!(!Role::Customer.is_staff());
    }

    #[test]
    fn test_actor_access() {
        let owner = Uuid::new_v4();
        let conv = Conversation::new(Some(owner), OffsetDateTime::now_utc());

        assert!(Actor::new(owner, Role::Customer).can_access(&conv));
        assert!(Actor::new(Uuid::new_v4(), Role::Support).can_access(&conv));
        assert!(!Actor::new(Uuid::new_v4(), Role::Customer).can_access(&conv));
    }

    #[test]
    fn test_conversation_serializes_camel_case() {
        let conv = Conversation::new(None, OffsetDateTime::UNIX_EPOCH);
        let json = serde_json::to_value(&conv).unwrap();
        assert_eq!(json["status"], "OPEN");
        assert!(json.get("firstResponseSlaAt").is_some());
        assert!(json["userId"].is_null());
    }
}
