//! Stream event types and serialization
//!
//! Every frame pushed to a subscriber is one [`StreamEvent`], serialized as a
//! single JSON object tagged by `type` and terminated by a newline.

use std::collections::BTreeSet;

use helpdesk_shared::{Conversation, ConversationStatus, Message, Priority};
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// Events sent from server to subscriber
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum StreamEvent {
    /// New ticket opened (staff feed only)
    #[serde(rename = "conversation.created")]
    ConversationCreated { conversation: Conversation },

    /// Message appended to a conversation timeline
    #[serde(rename = "message.created")]
    MessageCreated {
        conversation_id: Uuid,
        message: Message,
    },

    #[serde(rename = "conversation.assigned")]
    ConversationAssigned {
        conversation_id: Uuid,
        assigned_to_id: Option<Uuid>,
    },

    #[serde(rename = "conversation.status")]
    ConversationStatus {
        conversation_id: Uuid,
        status: ConversationStatus,
        #[serde(with = "time::serde::rfc3339::option")]
        resolved_at: Option<OffsetDateTime>,
        #[serde(with = "time::serde::rfc3339::option")]
        resolution_sla_at: Option<OffsetDateTime>,
    },

    #[serde(rename = "conversation.priority")]
    ConversationPriority {
        conversation_id: Uuid,
        priority: Priority,
    },

    #[serde(rename = "conversation.tags")]
    ConversationTags {
        conversation_id: Uuid,
        tags: BTreeSet<String>,
    },

    #[serde(rename = "conversation.seen")]
    ConversationSeen {
        conversation_id: Uuid,
        by_staff: bool,
        #[serde(with = "time::serde::rfc3339")]
        seen_at: OffsetDateTime,
    },

    /// Connection acknowledged, always the first frame
    #[serde(rename = "ready")]
    Ready { subscriber_id: Uuid },

    /// Keep-alive frame
    #[serde(rename = "heartbeat")]
    Heartbeat,
}

impl StreamEvent {
    pub fn status_changed(conversation: &Conversation) -> Self {
        StreamEvent::ConversationStatus {
            conversation_id: conversation.id,
            status: conversation.status,
            resolved_at: conversation.resolved_at,
            resolution_sla_at: conversation.resolution_sla_at,
        }
    }

    /// Wire name of the event
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::ConversationCreated { .. } => "conversation.created",
            StreamEvent::MessageCreated { .. } => "message.created",
            StreamEvent::ConversationAssigned { .. } => "conversation.assigned",
            StreamEvent::ConversationStatus { .. } => "conversation.status",
            StreamEvent::ConversationPriority { .. } => "conversation.priority",
            StreamEvent::ConversationTags { .. } => "conversation.tags",
            StreamEvent::ConversationSeen { .. } => "conversation.seen",
            StreamEvent::Ready { .. } => "ready",
            StreamEvent::Heartbeat => "heartbeat",
        }
    }

    /// Whether customer-facing subscribers must not receive this event
    pub fn is_staff_only(&self) -> bool {
        matches!(
            self,
            StreamEvent::MessageCreated { message, .. } if message.kind.is_staff_only()
        )
    }

    /// Serialize as one newline-terminated frame
    pub fn to_ndjson_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_default();
        line.push('\n');
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpdesk_shared::MessageKind;
    use time::macros::datetime;

    fn message(kind: MessageKind) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            author_id: None,
            kind,
            text: "hi".into(),
            created_at: datetime!(2024-01-01 10:00 UTC),
            attachments: Vec::new(),
        }
    }

    #[test]
    fn test_transport_frames() {
        assert_eq!(StreamEvent::Heartbeat.to_ndjson_line(), "{\"type\":\"heartbeat\"}\n");

        let id = Uuid::nil();
        let json = serde_json::to_value(StreamEvent::Ready { subscriber_id: id }).unwrap();
        assert_eq!(json["type"], "ready");
        assert_eq!(json["subscriberId"], id.to_string());
    }

    #[test]
    fn test_domain_event_shape() {
        let id = Uuid::new_v4();
        let event = StreamEvent::ConversationPriority {
            conversation_id: id,
            priority: Priority::Urgent,
        };
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "conversation.priority");
        assert_eq!(json["conversationId"], id.to_string());
        assert_eq!(json["priority"], "URGENT");
        assert_eq!(event.event_type(), "conversation.priority");
    }

    #[test]
    fn test_internal_messages_are_staff_only() {
        let internal = StreamEvent::MessageCreated {
            conversation_id: Uuid::new_v4(),
            message: message(MessageKind::Internal),
        };
        let reply = StreamEvent::MessageCreated {
            conversation_id: Uuid::new_v4(),
            message: message(MessageKind::Agent),
        };

        assert!(internal.is_staff_only());
        assert!(!reply.is_staff_only());
        assert!(!StreamEvent::Heartbeat.is_staff_only());
    }
}
